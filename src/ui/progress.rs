use indicatif::{HumanDuration, ProgressBar};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

use crate::ui::{theme, Icons};

/// Spinner for long running steps, hidden when stdout is not a terminal.
pub struct Spinner {
    pb: ProgressBar,
    started: Instant,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if console::Term::stdout().is_term() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self {
            pb,
            started: Instant::now(),
        }
    }

    /// Clear the spinner and print a completion line with the elapsed time.
    pub fn finish_with_summary(&self, msg: &str) {
        self.pb.finish_and_clear();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("{} in {}", msg, HumanDuration(self.started.elapsed())).style(theme().success.clone())
        );
    }

    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }
}
