//! Catalog loading and watching configuration.
//!
//! # Responsibility
//! - Describe which documents under a root directory are artifacts.
//! - Validate and normalize settings before any filesystem work starts.
//!
//! # Invariants
//! - Extensions are stored lowercase without a leading dot.
//! - `validate()` never touches the filesystem.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_EXTENSIONS: &[&str] = &["md", "mdx"];
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
const MIN_DEBOUNCE: Duration = Duration::from_millis(10);
const MAX_DEBOUNCE: Duration = Duration::from_secs(60);

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyRoot,
    NoExtensions,
    InvalidExtension(String),
    DebounceOutOfRange(Duration),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRoot => write!(f, "artifact root directory must not be empty"),
            Self::NoExtensions => write!(f, "at least one document extension is required"),
            Self::InvalidExtension(value) => {
                write!(f, "document extension is invalid: `{value}`")
            }
            Self::DebounceOutOfRange(value) => write!(
                f,
                "debounce {}ms is outside {}..={}ms",
                value.as_millis(),
                MIN_DEBOUNCE.as_millis(),
                MAX_DEBOUNCE.as_millis()
            ),
        }
    }
}

impl Error for ConfigError {}

/// Where artifact documents live and how changes are picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Directory scanned recursively for documents.
    pub root: PathBuf,
    /// Accepted file extensions (`md`, `mdx`, ...).
    pub extensions: Vec<String>,
    /// Quiet period before a burst of file events is applied.
    pub debounce: Duration,
    /// Whether directory walks follow symbolic links.
    pub follow_symlinks: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            debounce: DEFAULT_DEBOUNCE,
            follow_symlinks: false,
        }
    }
}

impl CatalogConfig {
    /// Creates a default configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Validates settings and returns a normalized copy.
    ///
    /// # Errors
    /// - `EmptyRoot`, `NoExtensions`, `InvalidExtension`, `DebounceOutOfRange`.
    pub fn validate(&self) -> Result<CatalogConfig, ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        let mut extensions = Vec::with_capacity(self.extensions.len());
        for raw in &self.extensions {
            let normalized = raw.trim().trim_start_matches('.').to_ascii_lowercase();
            if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::InvalidExtension(raw.clone()));
            }
            if !extensions.contains(&normalized) {
                extensions.push(normalized);
            }
        }

        if self.debounce < MIN_DEBOUNCE || self.debounce > MAX_DEBOUNCE {
            return Err(ConfigError::DebounceOutOfRange(self.debounce));
        }

        Ok(CatalogConfig {
            root: self.root.clone(),
            extensions,
            debounce: self.debounce,
            follow_symlinks: self.follow_symlinks,
        })
    }

    /// Returns whether `path` names a candidate artifact document.
    ///
    /// Hidden files and files inside hidden directories below `root` are
    /// never candidates.
    pub fn is_document(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false);
        if !has_extension {
            return false;
        }

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        !has_hidden_component(relative)
    }

    /// Returns whether `path` is `root` or lies below it outside any hidden
    /// directory. Directory-level watch events are only expanded for such
    /// paths.
    pub fn is_within_root(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|relative| !has_hidden_component(relative))
            .unwrap_or(false)
    }
}

fn has_hidden_component(relative: &Path) -> bool {
    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|name| name.starts_with('.') && name != "." && name != "..")
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::{CatalogConfig, ConfigError};
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn validate_normalizes_extensions() {
        let config = CatalogConfig::new("/docs")
            .with_extensions([".MD", "md", "mdx"])
            .validate()
            .unwrap();
        assert_eq!(config.extensions, vec!["md", "mdx"]);
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert_eq!(
            CatalogConfig::new("").validate().unwrap_err(),
            ConfigError::EmptyRoot
        );
        assert_eq!(
            CatalogConfig::new("/docs")
                .with_extensions(Vec::<String>::new())
                .validate()
                .unwrap_err(),
            ConfigError::NoExtensions
        );
        assert!(matches!(
            CatalogConfig::new("/docs")
                .with_extensions(["m d"])
                .validate()
                .unwrap_err(),
            ConfigError::InvalidExtension(_)
        ));
        assert!(matches!(
            CatalogConfig::new("/docs")
                .with_debounce(Duration::from_secs(600))
                .validate()
                .unwrap_err(),
            ConfigError::DebounceOutOfRange(_)
        ));
    }

    #[test]
    fn hidden_paths_are_not_documents() {
        let config = CatalogConfig::new("/docs").validate().unwrap();
        assert!(config.is_document(Path::new("/docs/decisions/adr-1.md")));
        assert!(config.is_document(Path::new("/docs/guides/intro.MDX")));
        assert!(!config.is_document(Path::new("/docs/.drafts/adr-2.md")));
        assert!(!config.is_document(Path::new("/docs/.adr-3.md")));
        assert!(!config.is_document(Path::new("/docs/notes.txt")));
    }

    #[test]
    fn within_root_respects_component_boundaries() {
        let config = CatalogConfig::new("/docs").validate().unwrap();
        assert!(config.is_within_root(Path::new("/docs")));
        assert!(config.is_within_root(Path::new("/docs/decisions")));
        assert!(!config.is_within_root(Path::new("/docs2/decisions")));
        assert!(!config.is_within_root(Path::new("/docs/.git/objects")));
    }
}
