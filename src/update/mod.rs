//! Self-update orchestration: version decisions, download/extract/swap, and retention.

pub mod random;
pub mod updater;

pub use random::{FixedRandom, RandomSource, SystemRandom};
pub use updater::{
    autoupdate_needed, bin_path, minor_version_greater, tidy, touch_autoupdate_file, update_to,
    warn_if_update_available, UpdateOutcome,
};
