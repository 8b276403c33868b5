//! Exclusion rules applied when importing a directory tree

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// File read from the import root for additional patterns.
pub const IGNORE_FILE: &str = ".resourceignore";

pub struct IgnoreFilter {
    inner: Gitignore,
}

impl IgnoreFilter {
    pub fn new(root: &Path, extra_excludes: Option<&[String]>) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        // 1. Load from the import root, if present
        builder.add(root.join(IGNORE_FILE));

        // 2. Add defaults
        let defaults = [
            // Version control and editor state
            ".git/", ".svn/", ".hg/", ".idea/", ".vscode/",
            IGNORE_FILE,

            // Live database files
            "*.db-journal", "*.db-wal", "*.db-shm", "*.lock",

            // Editor leftovers
            "*~", "*.swp", ".DS_Store",
        ];

        for pattern in defaults {
            builder.add_line(None, pattern).ok();
        }

        // 3. Add configured excludes
        if let Some(excludes) = extra_excludes {
            for pattern in excludes {
                if let Err(e) = builder.add_line(None, pattern) {
                    tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", pattern, e);
                }
            }
        }

        Self {
            inner: builder.build().unwrap_or_else(|_| Gitignore::empty()),
        }
    }

    /// Whether `path`, relative to the import root, is excluded.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.inner.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}
