//! Error handling for the CLI core.
//!
//! The error system is built around two types:
//! - [`KilnError`] — enumerated failure cases for the update and plugin subsystems.
//! - [`ErrorContext`] — wraps a [`KilnError`] with an optional suggestion and details,
//!   and renders a colored report to stderr.
//!
//! Common library errors convert into [`KilnError`] via `#[from]`; call sites otherwise
//! propagate `anyhow::Result` and attach context with `anyhow::Context`.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// All failure cases surfaced by the updater, locker, extractor, plugin manager, and
/// dispatcher, each carrying the detail needed to render a useful message.
#[derive(Error, Debug)]
pub enum KilnError {
    /// A network request failed at the transport level (DNS, TLS, connection reset).
    #[error("network request failed: {reason}")]
    NetworkError {
        /// Underlying transport error description.
        reason: String,
    },

    /// The remote responded with a non-2xx status other than the recognized 403 case.
    #[error("request to {url} failed with HTTP {status}")]
    HttpStatus {
        /// The request URL.
        url: String,
        /// The HTTP status code returned.
        status: u16,
    },

    /// The remote rejected the channel name (HTTP 403).
    #[error("HTTP 403: Invalid channel {channel}")]
    InvalidChannel {
        /// The channel name that was rejected.
        channel: String,
    },

    /// A downloaded archive's computed SHA-256 did not match the manifest's declared value.
    #[error("SHA mismatch: expected {actual} to be {expected}")]
    ChecksumMismatch {
        /// The checksum recorded in the manifest.
        expected: String,
        /// The checksum actually computed from the downloaded bytes.
        actual: String,
    },

    /// An archive entry was neither a regular file, directory, nor symlink.
    #[error("unsupported archive entry type at {path}")]
    UnknownEntryType {
        /// The path of the offending entry within the archive.
        path: String,
    },

    /// A filesystem operation failed (permissions, missing path, disk full).
    #[error("filesystem error at {path}: {reason}")]
    FilesystemError {
        /// The path the operation targeted.
        path: String,
        /// A description of the underlying OS error.
        reason: String,
    },

    /// A lock file could not be acquired or released.
    #[error("failed to acquire lock at {path}: {reason}")]
    LockError {
        /// The lock file path.
        path: String,
        /// A description of the failure.
        reason: String,
    },

    /// A plugin failed to load or register its commands; the plugin is omitted from the
    /// merged catalog rather than aborting the process.
    #[error("plugin {name} failed to load: {reason}")]
    PluginLoadError {
        /// The plugin's declared name.
        name: String,
        /// A description of the failure.
        reason: String,
    },

    /// A plugin manifest or `package.json` entry was structurally invalid.
    #[error("invalid plugin {name}: {reason}")]
    InvalidPlugin {
        /// The plugin's declared name.
        name: String,
        /// A description of the structural problem.
        reason: String,
    },

    /// Dispatch could not resolve the given id to a command or topic.
    #[error("command not found: {id}")]
    NotFound {
        /// The unresolved command or topic id.
        id: String,
    },

    /// The process received an interrupt during an interactive action.
    #[error("interrupted")]
    Cancelled,

    /// A catch-all for errors that don't merit their own variant.
    #[error("{message}")]
    Other {
        /// Free-form error message.
        message: String,
    },
}

impl From<std::io::Error> for KilnError {
    fn from(err: std::io::Error) -> Self {
        Self::FilesystemError {
            path: String::new(),
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for KilnError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::HttpStatus {
                url: err.url().map(ToString::to_string).unwrap_or_default(),
                status: status.as_u16(),
            }
        } else {
            Self::NetworkError {
                reason: err.to_string(),
            }
        }
    }
}

/// Wraps a [`KilnError`] with optional suggestion and details for presentation.
///
/// Displayed as:
/// 1. `error:` — the main message, red and bold
/// 2. `details:` — additional context, yellow (optional)
/// 3. `suggestion:` — an actionable next step, green (optional)
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error.
    pub error: KilnError,
    /// An actionable suggestion for resolving the error.
    pub suggestion: Option<String>,
    /// Additional context about why the error occurred.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from a [`KilnError`] with no suggestion or details.
    #[must_use]
    pub const fn new(error: KilnError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion, rendered in green.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details, rendered in yellow.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the colored error report to stderr.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Converts a [`KilnError`] into an [`anyhow::Error`] carrying the given [`ErrorContext`].
pub trait IntoAnyhowWithContext {
    /// Wrap `self` in the given context and erase it into an [`anyhow::Error`].
    fn into_anyhow_with_context(self, context: ErrorContext) -> anyhow::Error;
}

impl IntoAnyhowWithContext for KilnError {
    fn into_anyhow_with_context(self, context: ErrorContext) -> anyhow::Error {
        anyhow::Error::new(ErrorContext {
            error: self,
            suggestion: context.suggestion,
            details: context.details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_details_and_suggestion() {
        let ctx = ErrorContext::new(KilnError::NotFound {
            id: "frobnicate".to_string(),
        })
        .with_details("checked builtin, linked, and user providers")
        .with_suggestion("run `kiln help` to list available commands");

        let rendered = ctx.to_string();
        assert!(rendered.contains("command not found: frobnicate"));
        assert!(rendered.contains("checked builtin"));
        assert!(rendered.contains("run `kiln help`"));
    }

    #[test]
    fn checksum_mismatch_message_matches_scenario_wording() {
        let err = KilnError::ChecksumMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        assert_eq!(err.to_string(), "SHA mismatch: expected def456 to be abc123");
    }
}
