use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for CLI output
#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub warn: Style,
    /// Product name in the version banner
    pub info: Style,
    /// Labels and subtitles
    pub dim: Style,
    pub muted: Style,
    /// Directory names in listings
    pub directory: Style,
}

impl Theme {
    /// Colored on a terminal unless `NO_COLOR` is set.
    pub fn detect() -> Self {
        let colored = console::Term::stdout().is_term() && std::env::var_os("NO_COLOR").is_none();
        Self::with_colors(colored)
    }

    pub fn with_colors(colored: bool) -> Self {
        if !colored {
            return Self {
                success: Style::new(),
                warn: Style::new(),
                info: Style::new(),
                dim: Style::new(),
                muted: Style::new(),
                directory: Style::new(),
            };
        }
        Self {
            success: Style::new().green().bold(),
            warn: Style::new().yellow().bold(),
            info: Style::new().magenta(),
            dim: Style::new().white().dimmed(),
            muted: Style::new().bright_black(),
            directory: Style::new().blue().bold(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
