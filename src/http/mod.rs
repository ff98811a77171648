//! Remote manifest/version fetching and release archive streaming.
//!
//! Builds on the same `reqwest` client configuration as `upgrade::self_updater::download_file`'s
//! download client: an explicit timeout and a fixed `User-Agent`, generalized here to
//! `config.user_agent()`.

pub mod manifest;

pub use manifest::{fetch_manifest, fetch_version, stream_build, Manifest, Version};
