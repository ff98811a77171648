//! Timing constants governing the update and autoupdate subsystems.
//!
//! Centralized in one `constants.rs` the same way timeout/retry constants live
//! elsewhere in this crate, so the update and autoupdate timing numbers have exactly
//! one home.

use std::time::Duration;

/// Minimum interval between autoupdate *attempts*.
pub const AUTOUPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60 * 60);

/// Debounce window inside `update --autoupdate`: a second autoupdate within this
/// window of the previous one sleeps and rechecks rather than proceeding.
pub const AUTOUPDATE_DEBOUNCE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Poll interval while waiting out the debounce window.
pub const AUTOUPDATE_DEBOUNCE_POLL: Duration = Duration::from_secs(60);

/// Release trees older than this are removed by tidy, except the current version.
pub const RELEASE_TREE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Maximum rate of progress bar redraws during a download.
pub const PROGRESS_REDRAW_HZ: u32 = 2;

/// Timeout for the final stdout flush before the process exits regardless.
pub const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum lines retained in the internal error log after a rotation.
pub const ERR_LOG_MAX_LINES: usize = 1000;
