//! Conversion from arbitrary [`anyhow::Error`] chains into a user-friendly [`ErrorContext`].

use super::{ErrorContext, KilnError};

const NETWORK_ERROR_KEYWORDS: &[&str] = &["network", "connection", "timeout", "dns"];
const PERMISSION_ERROR_KEYWORDS: &[&str] = &["permission", "denied", "access"];

/// Convert any error into a user-friendly format with contextual suggestions.
///
/// Walks the error chain looking for a [`KilnError`] first; falls back to keyword
/// sniffing on the rendered message for errors that originate outside this crate
/// (e.g. a raw [`std::io::Error`] from a dependency).
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let mut current_error: &dyn std::error::Error = error.as_ref();
    loop {
        if let Some(kiln_error) = current_error.downcast_ref::<KilnError>() {
            return create_error_context(kiln_error);
        }
        match current_error.source() {
            Some(source) => current_error = source,
            None => break,
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        return match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                ErrorContext::new(KilnError::FilesystemError {
                    path: String::new(),
                    reason: io_error.to_string(),
                })
                .with_suggestion("check file permissions and try again")
            }
            _ => ErrorContext::new(KilnError::FilesystemError {
                path: String::new(),
                reason: io_error.to_string(),
            })
            .with_suggestion("check that the path exists and disk space is available"),
        };
    }

    let error_msg = error.to_string();

    if NETWORK_ERROR_KEYWORDS.iter().any(|&k| error_msg.to_lowercase().contains(k)) {
        return ErrorContext::new(KilnError::NetworkError {
            reason: error_msg,
        })
        .with_suggestion("check your internet connection and try again");
    }

    if PERMISSION_ERROR_KEYWORDS.iter().any(|&k| error_msg.to_lowercase().contains(k)) {
        return ErrorContext::new(KilnError::Other {
            message: error_msg,
        })
        .with_suggestion("check file permissions and try running with appropriate privileges");
    }

    ErrorContext::new(KilnError::Other {
        message: error_msg,
    })
    .with_suggestion("check the error message above for more details")
}

/// Build the user-friendly suggestion/details pair for a known [`KilnError`] variant.
pub fn create_error_context(error: &KilnError) -> ErrorContext {
    match error {
        KilnError::InvalidChannel { channel } => {
            ErrorContext::new(KilnError::InvalidChannel { channel: channel.clone() })
                .with_suggestion("check the channel name and available channels for this release stream")
        }
        KilnError::ChecksumMismatch { expected, actual } => ErrorContext::new(
            KilnError::ChecksumMismatch { expected: expected.clone(), actual: actual.clone() },
        )
        .with_suggestion("retry the update; if this persists the release asset may be corrupted upstream")
        .with_details("the downloaded archive did not match its declared checksum"),
        KilnError::NetworkError { reason } => {
            ErrorContext::new(KilnError::NetworkError { reason: reason.clone() })
                .with_suggestion("check your internet connection and try again")
        }
        KilnError::LockError { path, reason } => {
            ErrorContext::new(KilnError::LockError { path: path.clone(), reason: reason.clone() })
                .with_details(format!("lock file: {path}"))
                .with_suggestion("another process may be holding this lock; wait and retry")
        }
        KilnError::PluginLoadError { name, reason } => ErrorContext::new(KilnError::PluginLoadError {
            name: name.clone(),
            reason: reason.clone(),
        })
        .with_details(format!("plugin '{name}' was skipped: {reason}"))
        .with_suggestion("reinstall the plugin or remove it with `plugins:uninstall`"),
        KilnError::NotFound { id } => ErrorContext::new(KilnError::NotFound { id: id.clone() })
            .with_suggestion("run `kiln help` to list available commands"),
        _ => ErrorContext::new(KilnError::Other {
            message: error.to_string(),
        })
        .with_suggestion("check the error message above for more details"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_permission_denied_maps_to_filesystem_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let ctx = user_friendly_error(anyhow::Error::from(io_err));
        assert!(matches!(ctx.error, KilnError::FilesystemError { .. }));
    }

    #[test]
    fn network_keyword_maps_to_network_error() {
        let ctx = user_friendly_error(anyhow::Error::msg("connection reset by peer"));
        assert!(matches!(ctx.error, KilnError::NetworkError { .. }));
    }

    #[test]
    fn kiln_error_in_chain_is_preferred_over_keywords() {
        let err = anyhow::Error::new(KilnError::InvalidChannel {
            channel: "nightly".to_string(),
        })
        .context("while fetching manifest");
        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, KilnError::InvalidChannel { .. }));
    }
}
