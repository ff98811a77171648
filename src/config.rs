//! The single [`Config`] value threaded through every constructor in this crate.
//!
//! There is no ambient global config: `main` builds one [`Config`] from parsed CLI
//! arguments, environment variables, and compile-time constants, then passes it by
//! reference everywhere it's needed. This directly replaces the old
//! `config::get_cache_dir`-style free functions with an explicit value passed
//! everywhere instead of read from global state.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable overriding the data directory (release trees, plugins).
pub const ENV_DATA_DIR: &str = "KILN_DATA_DIR";
/// Environment variable overriding the cache directory (locks, version cache, logs).
pub const ENV_CACHE_DIR: &str = "KILN_CACHE_DIR";
/// Environment variable pointing at an already-resolved binary, bypassing `clientBin`.
pub const ENV_BINPATH: &str = "CLI_BINPATH";
/// Suppresses the "update available" message when set.
pub const ENV_HIDE_UPDATE_MESSAGE: &str = "KILN_HIDE_UPDATED_MESSAGE";
/// Verbosity selector consulted only when `RUST_LOG` is unset.
pub const ENV_LOG: &str = "KILN_LOG";

fn default_aliases() -> HashMap<String, Vec<String>> {
    let mut aliases = HashMap::new();
    aliases.insert("plugins:uninstall".to_string(), vec!["plugins:unlink".to_string(), "unlink".to_string()]);
    aliases
}

/// Process-wide configuration, built once in `main` and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// The binary's own name (`kiln`), used to build the user-agent string and the
    /// `<BIN>_*` environment variable prefix passed to a spawned autoupdater.
    pub bin: String,
    /// The display name of the distributed product (may differ from `bin`).
    pub name: String,
    /// This build's own version.
    pub version: semver::Version,
    /// The release channel this install tracks (e.g. "stable").
    pub channel: String,
    /// `std::env::consts::OS`-style platform identifier used in release asset names.
    pub platform: String,
    /// `std::env::consts::ARCH`-style architecture identifier.
    pub arch: String,
    /// True when running on Windows, where the bin handoff is a copy/`.cmd` shim
    /// rather than a symlink.
    pub windows: bool,
    /// Root of persistent data: release trees and the user plugin tree.
    pub data_dir: PathBuf,
    /// Root of cache/ephemeral data: locks, version cache, autoupdate markers, logs.
    pub cache_dir: PathBuf,
    /// When true, self-update and autoupdate are both disabled entirely.
    pub update_disabled: bool,
    /// Base host serving channel manifests, versions, and release archives.
    pub s3_host: String,
    /// The argv vector passed to dispatch (after the binary name and global flags).
    pub argv: Vec<String>,
    /// Command run when argv is empty (typically `"help"`).
    pub default_command: String,
    /// Canonical command id -> list of aliases that resolve to it.
    pub aliases: HashMap<String, Vec<String>>,
    /// `RUST_LOG`/`KILN_LOG`-derived filter directive, if any.
    pub log_level: Option<String>,
    /// Disables progress bars and animated output.
    pub no_progress: bool,
    /// `--all`: include hidden commands/topics in help listings.
    pub show_hidden: bool,
}

impl Config {
    /// Build the default configuration for the current process environment.
    ///
    /// `channel` and `argv` are supplied by the CLI parser; everything else is
    /// derived from compile-time constants and the environment.
    pub fn new(channel: String, argv: Vec<String>) -> Result<Self> {
        let bin = env!("CARGO_PKG_NAME").trim_end_matches("-cli").to_string();
        let version = semver::Version::parse(env!("CARGO_PKG_VERSION"))
            .context("crate version is not valid semver")?;
        let windows = cfg!(target_os = "windows");

        let data_dir = Self::resolve_dir(ENV_DATA_DIR, windows, &bin, "data")?;
        let cache_dir = Self::resolve_dir(ENV_CACHE_DIR, windows, &bin, "cache")?;

        Ok(Self {
            name: bin.clone(),
            bin,
            version,
            channel,
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            windows,
            data_dir,
            cache_dir,
            update_disabled: false,
            s3_host: "https://releases.example.invalid".to_string(),
            argv,
            default_command: "help".to_string(),
            aliases: default_aliases(),
            log_level: None,
            no_progress: false,
            show_hidden: false,
        })
    }

    /// A config suitable for unit tests: isolated temp dirs, fixed version/channel,
    /// empty argv. Gated behind `#[cfg(test)]`-equivalent visibility via the crate's
    /// `test-utils` feature, matching the `test-utils` feature convention used elsewhere.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn for_test() -> Self {
        let dir = std::env::temp_dir().join(format!("kiln-test-{}", std::process::id()));
        Self {
            bin: "kiln".to_string(),
            name: "kiln".to_string(),
            version: semver::Version::new(1, 2, 3),
            channel: "stable".to_string(),
            platform: "linux".to_string(),
            arch: "x86_64".to_string(),
            windows: false,
            data_dir: dir.join("data"),
            cache_dir: dir.join("cache"),
            update_disabled: false,
            s3_host: "https://releases.example.invalid".to_string(),
            argv: Vec::new(),
            default_command: "help".to_string(),
            aliases: HashMap::new(),
            log_level: None,
            no_progress: false,
            show_hidden: false,
        }
    }

    /// The `User-Agent` header sent on every request to `s3_host`.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.bin, self.version)
    }

    /// The `<BIN>` prefix used for child-process environment variables
    /// (`<BIN>_TIMESTAMPS`, `<BIN>_SKIP_ANALYTICS`): the binary name uppercased with
    /// `-` replaced by `_`.
    #[must_use]
    pub fn env_prefix(&self) -> String {
        self.bin.to_uppercase().replace('-', "_")
    }

    fn resolve_dir(env_var: &str, windows: bool, bin: &str, leaf: &str) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(env_var) {
            return Ok(PathBuf::from(dir));
        }

        let base = if windows {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("unable to determine local data directory"))?
        } else {
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("unable to determine home directory"))?
        };

        let dir = if windows {
            base.join(bin).join(leaf)
        } else {
            base.join(format!(".{bin}")).join(leaf)
        };

        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_override_takes_precedence() {
        // SAFETY: test runs single-threaded within this process for this var.
        unsafe {
            std::env::set_var(ENV_DATA_DIR, "/tmp/kiln-override");
        }
        let config = Config::new("stable".to_string(), vec![]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/kiln-override"));
        unsafe {
            std::env::remove_var(ENV_DATA_DIR);
        }
    }

    #[test]
    fn user_agent_is_bin_slash_version() {
        let config = Config::for_test();
        assert_eq!(config.user_agent(), "kiln/1.2.3");
    }

    #[test]
    fn env_prefix_uppercases_and_replaces_dashes() {
        let mut config = Config::for_test();
        config.bin = "my-cli".to_string();
        assert_eq!(config.env_prefix(), "MY_CLI");
    }
}
