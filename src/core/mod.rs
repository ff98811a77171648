//! Core error types shared by every subsystem: the updater, the lock, the extractor,
//! the plugin manager, and the dispatcher all fail into the same [`KilnError`] taxonomy
//! and render through the same [`ErrorContext`].

pub mod error;
pub mod error_formatting;

pub use error::{ErrorContext, IntoAnyhowWithContext, KilnError};
pub use error_formatting::{create_error_context, user_friendly_error};
