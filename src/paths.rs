//! Pure, side-effect-free path resolution for cache, data, and plugin directories.
//!
//! Every function here is a function of [`Config`] alone: given the same config they
//! always return the same absolute path, and none of them touch the filesystem. This
//! mirrors the `config::get_cache_dir` resolution style, generalized to the full set
//! of files this core reads and writes.

use crate::config::Config;
use std::path::{Path, PathBuf};

/// Marker file whose mtime records the last autoupdate *attempt*.
#[must_use]
pub fn autoupdate_file(config: &Config) -> PathBuf {
    config.cache_dir.join("autoupdate")
}

/// Append-only log of autoupdate spawn attempts.
#[must_use]
pub fn autoupdate_log_file(config: &Config) -> PathBuf {
    config.cache_dir.join("autoupdate.log")
}

/// Reader/writer lock guarding mutation of and execution out of the client tree.
#[must_use]
pub fn update_lock_file(config: &Config) -> PathBuf {
    config.cache_dir.join("update.lock")
}

/// Reader/writer lock guarding the user plugins directory.
#[must_use]
pub fn plugins_lock_file(config: &Config) -> PathBuf {
    config.cache_dir.join("plugins.lock")
}

/// Cached JSON `Version` document for a channel.
#[must_use]
pub fn version_file(config: &Config, channel: &str) -> PathBuf {
    config.cache_dir.join(format!("{channel}.version"))
}

/// Root directory under which every release tree (and the stable `bin` symlink) lives.
#[must_use]
pub fn client_root(config: &Config) -> PathBuf {
    config.data_dir.join("client")
}

/// The stable path the dispatcher and any shell wrapper invoke: a symlink (or, on
/// Windows, a copy/`.cmd` shim) into the current release tree.
#[must_use]
pub fn client_bin(config: &Config) -> PathBuf {
    let name = if config.windows {
        format!("{}.cmd", config.bin)
    } else {
        config.bin.clone()
    };
    client_root(config).join("bin").join(name)
}

/// The `bin/<binName>` path inside a specific extracted release tree.
#[must_use]
pub fn release_bin(config: &Config, version: &str) -> PathBuf {
    let name = if config.windows {
        format!("{}.exe", config.bin)
    } else {
        config.bin.clone()
    };
    client_root(config).join(version).join("bin").join(name)
}

/// Directory holding the user-installed plugin tree (`package.json`, `node_modules`-style
/// install layout, `.yarnrc`).
#[must_use]
pub fn user_plugins_dir(config: &Config) -> PathBuf {
    config.data_dir.join("plugins")
}

/// On-disk cache mapping installed plugin name to its merged command/topic metadata,
/// so dispatch doesn't need to load plugin code to compute help.
#[must_use]
pub fn user_plugins_manifest(config: &Config) -> PathBuf {
    user_plugins_dir(config).join("plugins.json")
}

/// `package.json` inside the user plugins directory; the dependency manifest the
/// external package manager operates on.
#[must_use]
pub fn user_plugins_package_json(config: &Config) -> PathBuf {
    user_plugins_dir(config).join("package.json")
}

/// Append-only internal error log, rotated at update time.
#[must_use]
pub fn err_log_file(config: &Config) -> PathBuf {
    config.cache_dir.join("error.log")
}

/// Archive staging directory for a specific `<name>-v<version>-<platform>-<arch>` build,
/// used before the post-extraction rename into `<version>`.
#[must_use]
pub fn staging_dir(config: &Config, base: &str) -> PathBuf {
    client_root(config).join(base)
}

/// Final extracted release tree for `version`.
#[must_use]
pub fn release_dir(config: &Config, version: &str) -> PathBuf {
    client_root(config).join(version)
}

/// True if `path` lies directly under [`client_root`] (used by tidy to decide what's
/// eligible for retention sweeping).
#[must_use]
pub fn is_under_client_root(config: &Config, path: &Path) -> bool {
    path.parent().is_some_and(|parent| parent == client_root(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config(windows: bool) -> Config {
        let mut config = Config::for_test();
        config.windows = windows;
        config
    }

    #[test]
    fn client_bin_uses_cmd_shim_on_windows() {
        let config = test_config(true);
        assert!(client_bin(&config).to_string_lossy().ends_with("kiln.cmd"));
    }

    #[test]
    fn client_bin_is_plain_name_on_unix() {
        let config = test_config(false);
        assert!(client_bin(&config).to_string_lossy().ends_with("/bin/kiln"));
    }

    #[test]
    fn version_file_is_per_channel() {
        let config = test_config(false);
        assert_ne!(version_file(&config, "stable"), version_file(&config, "beta"));
    }

    #[test]
    fn release_dir_is_under_client_root() {
        let config = test_config(false);
        let dir = release_dir(&config, "1.2.3");
        assert!(is_under_client_root(&config, &dir));
        assert!(!is_under_client_root(&config, &client_root(&config)));
    }

    #[test]
    fn all_paths_are_absolute() {
        let config = test_config(false);
        assert!(autoupdate_file(&config).is_absolute());
        assert!(update_lock_file(&config).is_absolute());
        assert!(client_bin(&config).is_absolute());
        assert!(user_plugins_manifest(&config).is_absolute());
    }
}
