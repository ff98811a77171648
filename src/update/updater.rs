//! Orchestrates the version check, download, atomic swap, and retention sweep for a
//! self-update. Grounded on `upgrade::self_updater::SelfUpdater`, whose
//! download/verify/replace flow this generalizes from a GitHub-releases single-binary
//! model to a channel/manifest/release-tree model.

use crate::config::Config;
use crate::constants::RELEASE_TREE_RETENTION;
use crate::core::KilnError;
use crate::http::manifest::{self, Manifest};
use crate::lock;
use crate::paths;
use crate::update::random::RandomSource;
use crate::extractor;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::SystemTime;
use tracing::{info, warn};

/// The result of a completed `update_to` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Already on the manifest's version/channel; nothing was downloaded.
    NoOp {
        /// The version that was already current.
        version: semver::Version,
    },
    /// A new release tree was installed and `clientBin` repointed.
    Updated {
        /// The version replaced.
        from: semver::Version,
        /// The version now current.
        to: semver::Version,
    },
    /// Skipped by the priority rollout sampler (autoupdate only).
    SkippedByPriority {
        /// The version that would have been installed.
        available: semver::Version,
    },
}

/// True iff `remote` is a minor-version-only advance over `current` (same major,
/// strictly greater minor). Used by `warn_if_update_available`.
#[must_use]
pub fn minor_version_greater(current: &semver::Version, remote: &semver::Version) -> bool {
    current.major == remote.major && remote.minor > current.minor
}

fn should_update(
    manifest: &Manifest,
    current_version: &semver::Version,
    current_channel: &str,
    manual: bool,
    random: &dyn RandomSource,
) -> bool {
    if &manifest.version == current_version && manifest.channel == current_channel {
        return false;
    }

    if manual {
        return true;
    }

    match manifest.priority {
        Some(priority) => random.next_priority_roll() < priority,
        None => true,
    }
}

/// Run the full update flow for `channel`: acquire the writer lock, decide whether to
/// update, download and extract if so, swap the stable bin pointer, and release.
pub async fn update_to(
    config: &Config,
    channel: &str,
    manual: bool,
    random: &dyn RandomSource,
) -> Result<UpdateOutcome> {
    let lock_path = paths::update_lock_file(config);
    let guard = lock::writer_acquire(&lock_path).await?;

    let fetched = manifest::fetch_manifest(config, channel).await?;

    if !should_update(&fetched, &config.version, &config.channel, manual, random) {
        if &fetched.version == &config.version && fetched.channel == config.channel {
            info!("already on latest version: {}", config.version);
            guard.release();
            return Ok(UpdateOutcome::NoOp {
                version: config.version.clone(),
            });
        }
        guard.release();
        return Ok(UpdateOutcome::SkippedByPriority {
            available: fetched.version,
        });
    }

    let base = format!("{}-v{}-{}-{}", config.name, fetched.version, config.platform, config.arch);
    let staging = paths::staging_dir(config, &base);

    let sidecar = checksum_sidecar_path(&staging);

    if staging.exists() {
        match verify_existing_download(&staging, &fetched).await {
            Ok(true) => {
                info!("reusing previously verified partial download at {}", staging.display());
            }
            _ => {
                tokio::fs::remove_dir_all(&staging)
                    .await
                    .with_context(|| format!("failed to remove stale download at {}", staging.display()))?;
                tokio::fs::remove_file(&sidecar).await.ok();
                download_and_extract(config, &fetched, &staging).await?;
            }
        }
    } else {
        download_and_extract(config, &fetched, &staging).await?;
    }

    let release_dir = paths::release_dir(config, &fetched.version.to_string());
    if release_dir.exists() {
        tokio::fs::remove_dir_all(&release_dir).await.ok();
    }
    tokio::fs::rename(&staging, &release_dir)
        .await
        .with_context(|| format!("failed to move {} into place", release_dir.display()))?;
    tokio::fs::remove_file(&sidecar).await.ok();

    repoint_client_bin(config, &fetched.version.to_string()).await?;

    guard.release();

    Ok(UpdateOutcome::Updated {
        from: config.version.clone(),
        to: fetched.version,
    })
}

async fn download_and_extract(config: &Config, fetched: &Manifest, staging: &std::path::Path) -> Result<()> {
    let (stream, content_length) = manifest::stream_build(config, fetched).await?;

    let progress = if config.no_progress {
        None
    } else {
        let bar = ProgressBar::new(content_length.unwrap_or(0));
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    };

    let tee_stream = {
        use futures::StreamExt;
        let progress = progress.clone();
        stream.inspect(move |chunk| {
            if let (Some(bar), Ok(bytes)) = (&progress, chunk) {
                bar.inc(bytes.len() as u64);
            }
        })
    };

    extractor::extract_stream(tee_stream, staging, &fetched.sha256gz).await?;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    tokio::fs::write(checksum_sidecar_path(staging), &fetched.sha256gz)
        .await
        .with_context(|| format!("failed to record checksum for {}", staging.display()))?;

    Ok(())
}

/// Path of the sidecar file recording the sha256gz a staging directory was last
/// extracted against. Kept alongside `staging` rather than inside it so it never ends
/// up inside the release tree once `staging` is renamed into place.
fn checksum_sidecar_path(staging: &std::path::Path) -> std::path::PathBuf {
    let mut name = staging.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".sha256gz");
    staging.with_file_name(name)
}

async fn repoint_client_bin(config: &Config, version: &str) -> Result<()> {
    let bin_target = paths::client_bin(config);
    let release_bin = paths::release_bin(config, version);

    if let Some(parent) = bin_target.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let _ = tokio::fs::remove_file(&bin_target).await;

    #[cfg(unix)]
    {
        tokio::fs::symlink(&release_bin, &bin_target)
            .await
            .with_context(|| format!("failed to symlink {}", bin_target.display()))?;
    }
    #[cfg(windows)]
    {
        tokio::fs::copy(&release_bin, &bin_target)
            .await
            .with_context(|| format!("failed to copy {}", bin_target.display()))?;
    }

    Ok(())
}

/// Verify a prior partial download against the sha256gz recorded in its checksum
/// sidecar file before deciding whether to reuse it. A missing sidecar, an unreadable
/// sidecar, or a sidecar recording a different checksum than the current manifest all
/// mean the staging directory cannot be trusted blind and must be redone; its mere
/// presence on disk is never sufficient.
pub(crate) async fn verify_existing_download(staging: &std::path::Path, manifest: &Manifest) -> Result<bool> {
    if !staging.is_dir() {
        return Ok(false);
    }

    let sidecar = checksum_sidecar_path(staging);
    let recorded = match tokio::fs::read_to_string(&sidecar).await {
        Ok(contents) => contents,
        Err(_) => return Ok(false),
    };

    Ok(recorded.trim() == manifest.sha256gz)
}

/// Remove release trees under `clientRoot` older than [`RELEASE_TREE_RETENTION`],
/// except the directory matching `current_version`. Errors removing an individual
/// entry are logged and do not abort the sweep.
pub async fn tidy(config: &Config, current_version: &str) -> Result<()> {
    let root = paths::client_root(config);
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let now = SystemTime::now();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = entry.file_name();
        if name == "bin" || name == current_version {
            continue;
        }

        let mtime = match newest_mtime(&path).await {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!("tidy: failed to read mtime for {}: {}", path.display(), e);
                continue;
            }
        };

        let age = match now.duration_since(mtime) {
            Ok(age) => age,
            Err(_) => continue,
        };

        if age > RELEASE_TREE_RETENTION {
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!("tidy: failed to remove {}: {}", path.display(), e);
            }
        }
    }

    Ok(())
}

async fn newest_mtime(path: &std::path::Path) -> Result<SystemTime> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_dir() {
        return Ok(metadata.modified()?);
    }

    let mut newest = metadata.modified()?;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else if let Ok(modified) = meta.modified()
                && modified > newest
            {
                newest = modified;
            }
        }
    }
    Ok(newest)
}

/// Best-effort "a newer minor version is available" notice. Errors are swallowed; this
/// must never fail the invoking command.
pub async fn warn_if_update_available(config: &Config) {
    let version = match manifest::fetch_version(config, &config.channel, false).await {
        Ok(version) => version,
        Err(e) => {
            warn!("update check failed: {}", e);
            return;
        }
    };

    if minor_version_greater(&config.version, &version.version) {
        eprintln!(
            "A new version of {} is available: {} (current: {})",
            config.name, version.version, config.version
        );
    }

    if let Some(message) = version.message {
        eprintln!("{message}");
    }
}

/// Resolve the binary to invoke for a spawned autoupdate: `clientBin` if updates are
/// enabled and it exists, else the `CLI_BINPATH` override, else `config.bin` resolved
/// on PATH via `which`.
pub fn bin_path(config: &Config) -> Result<std::path::PathBuf> {
    if !config.update_disabled {
        let client_bin = paths::client_bin(config);
        if client_bin.exists() {
            return Ok(client_bin);
        }
    }

    if let Ok(path) = std::env::var(crate::config::ENV_BINPATH) {
        return Ok(std::path::PathBuf::from(path));
    }

    which::which(&config.bin)
        .with_context(|| format!("could not resolve {} on PATH", config.bin))
        .map_err(|e| anyhow::Error::new(KilnError::Other { message: e.to_string() }))
}

/// Autoupdate's decision rule: true when `mtime(autoupdatefile)` is older than
/// [`crate::constants::AUTOUPDATE_INTERVAL`], or the file is missing, or its mtime
/// cannot be read.
pub async fn autoupdate_needed(config: &Config) -> bool {
    let path = paths::autoupdate_file(config);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(_) => return true,
    };
    let Ok(modified) = metadata.modified() else {
        return true;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > crate::constants::AUTOUPDATE_INTERVAL,
        Err(_) => true,
    }
}

/// Touch the autoupdate marker file, creating it if absent, advancing its mtime.
pub async fn touch_autoupdate_file(config: &Config) -> Result<()> {
    let path = paths::autoupdate_file(config);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    tokio::fs::write(&path, []).await.with_context(|| format!("failed to touch {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::random::FixedRandom;
    use std::collections::HashMap;

    fn manifest_with(version: u64, channel: &str, priority: Option<u8>) -> Manifest {
        Manifest {
            version: semver::Version::new(version, 0, 0),
            channel: channel.to_string(),
            sha256gz: "irrelevant".to_string(),
            priority,
            builds: HashMap::new(),
        }
    }

    #[test]
    fn no_op_when_version_and_channel_match() {
        let m = manifest_with(1, "stable", None);
        let current = semver::Version::new(1, 0, 0);
        assert!(!should_update(&m, &current, "stable", false, &FixedRandom(0)));
    }

    #[test]
    fn manual_update_always_proceeds_even_with_low_priority() {
        let m = manifest_with(2, "stable", Some(1));
        let current = semver::Version::new(1, 0, 0);
        assert!(should_update(&m, &current, "stable", true, &FixedRandom(99)));
    }

    #[test]
    fn autoupdate_skips_when_roll_meets_or_exceeds_priority() {
        let m = manifest_with(2, "stable", Some(80));
        let current = semver::Version::new(1, 0, 0);
        assert!(!should_update(&m, &current, "stable", false, &FixedRandom(80)));
        assert!(should_update(&m, &current, "stable", false, &FixedRandom(79)));
    }

    #[test]
    fn minor_version_greater_requires_same_major() {
        let current = semver::Version::new(1, 2, 3);
        assert!(minor_version_greater(&current, &semver::Version::new(1, 3, 0)));
        assert!(!minor_version_greater(&current, &semver::Version::new(2, 0, 0)));
        assert!(!minor_version_greater(&current, &semver::Version::new(1, 2, 9)));
    }

    #[tokio::test]
    async fn verify_existing_download_rejects_a_directory_with_no_sidecar() {
        let dir = tempfile::TempDir::new().unwrap();
        let staging = dir.path().join("kiln-v1.0.0");
        tokio::fs::create_dir_all(&staging).await.unwrap();
        let manifest = manifest_with(1, "stable", None);
        assert!(!verify_existing_download(&staging, &manifest).await.unwrap());
    }

    #[tokio::test]
    async fn verify_existing_download_rejects_a_mismatched_sidecar() {
        let dir = tempfile::TempDir::new().unwrap();
        let staging = dir.path().join("kiln-v1.0.0");
        tokio::fs::create_dir_all(&staging).await.unwrap();
        tokio::fs::write(checksum_sidecar_path(&staging), "some-other-hash").await.unwrap();
        let manifest = manifest_with(1, "stable", None);
        assert!(!verify_existing_download(&staging, &manifest).await.unwrap());
    }

    #[tokio::test]
    async fn verify_existing_download_accepts_a_matching_sidecar() {
        let dir = tempfile::TempDir::new().unwrap();
        let staging = dir.path().join("kiln-v1.0.0");
        tokio::fs::create_dir_all(&staging).await.unwrap();
        let manifest = manifest_with(1, "stable", None);
        tokio::fs::write(checksum_sidecar_path(&staging), &manifest.sha256gz).await.unwrap();
        assert!(verify_existing_download(&staging, &manifest).await.unwrap());
    }

    #[test]
    fn checksum_sidecar_path_is_a_sibling_not_a_child() {
        let staging = std::path::Path::new("/tmp/kiln/kiln-v1.0.0-linux-x86_64");
        let sidecar = checksum_sidecar_path(staging);
        assert_eq!(sidecar, std::path::Path::new("/tmp/kiln/kiln-v1.0.0-linux-x86_64.sha256gz"));
    }

    #[tokio::test]
    async fn autoupdate_needed_true_when_file_absent() {
        let config = Config::for_test();
        assert!(autoupdate_needed(&config).await);
    }

    #[tokio::test]
    async fn autoupdate_needed_false_right_after_touch() {
        let config = Config::for_test();
        touch_autoupdate_file(&config).await.unwrap();
        assert!(!autoupdate_needed(&config).await);
    }
}
