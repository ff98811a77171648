//! Channel manifest and version fetching, with a filesystem-backed version cache.
//!
//! Mirrors `upgrade::version_check::VersionChecker`'s caching strategy
//! (JSON file in the cache directory, TTL-free here since freshness is keyed by the
//! caller's `force` flag rather than age) and its download-client configuration in
//! `upgrade::self_updater::download_file` (explicit timeout, fixed `User-Agent`).

use crate::config::Config;
use crate::core::KilnError;
use crate::paths;
use anyhow::{Context, Result};
use futures::Stream;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A single release's download location, checksum, and declared size for one
/// platform-architecture pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildInfo {
    /// URL of the gzipped tarball for this platform/arch.
    pub url: String,
    /// Hex-encoded SHA-256 of the gzipped tarball.
    pub sha256: String,
    /// Declared size in bytes, used to size the progress bar.
    pub bytes: u64,
}

/// Describes one downloadable release for one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// The release version.
    pub version: semver::Version,
    /// The channel this manifest was fetched for.
    pub channel: String,
    /// SHA-256 of the gzipped tarball (authoritative; `builds` entries must agree).
    pub sha256gz: String,
    /// Optional staged-rollout priority in `0..100`, compared against a random draw.
    #[serde(default)]
    pub priority: Option<u8>,
    /// Per-platform build artifacts, keyed by `"<platform>-<arch>"`.
    pub builds: HashMap<String, BuildInfo>,
}

/// A lightweight version pointer, cheap to fetch and cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    /// The latest version on this channel.
    pub version: semver::Version,
    /// The channel this version belongs to.
    pub channel: String,
    /// An optional message to surface to the user (e.g. release notes pointer).
    #[serde(default)]
    pub message: Option<String>,
}

fn client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(config.user_agent())
        .build()
        .context("failed to build HTTP client")
}

fn channel_url(config: &Config, channel: &str, suffix: &str) -> String {
    format!(
        "{}/{}/channels/{}/{}",
        config.s3_host.trim_end_matches('/'),
        config.name,
        channel,
        suffix
    )
}

/// Fetch the manifest for `channel`, remapping HTTP 403 to [`KilnError::InvalidChannel`].
/// Retries once on a transport-level (not HTTP-status) error.
pub async fn fetch_manifest(config: &Config, channel: &str) -> Result<Manifest> {
    let url = channel_url(config, channel, &format!("{}-{}", config.platform, config.arch));
    let http = client(config)?;

    let response = match http.get(&url).send().await {
        Ok(resp) => resp,
        Err(first_err) => {
            warn!("manifest fetch transport error, retrying once: {}", first_err);
            http.get(&url)
                .send()
                .await
                .map_err(|e| anyhow::Error::new(KilnError::from(e)))?
        }
    };

    if response.status() == StatusCode::FORBIDDEN {
        return Err(anyhow::Error::new(KilnError::InvalidChannel {
            channel: channel.to_string(),
        }));
    }

    if !response.status().is_success() {
        return Err(anyhow::Error::new(KilnError::HttpStatus {
            url,
            status: response.status().as_u16(),
        }));
    }

    response
        .json::<Manifest>()
        .await
        .map_err(|e| anyhow::Error::new(KilnError::from(e)))
}

/// Fetch the version pointer for `channel`. When `force` is false, a cached copy at
/// `paths::version_file` is read first; a cache miss or parse error falls back to a
/// remote fetch, and the result is best-effort written back to the cache (write
/// failures are swallowed, matching the tolerant cache-write behavior elsewhere here).
pub async fn fetch_version(config: &Config, channel: &str, force: bool) -> Result<Version> {
    let cache_path = paths::version_file(config, channel);

    if !force
        && let Ok(bytes) = tokio::fs::read(&cache_path).await
        && let Ok(version) = serde_json::from_slice::<Version>(&bytes)
    {
        debug!("using cached version for channel {}", channel);
        return Ok(version);
    }

    let url = channel_url(config, channel, "version");
    let http = client(config)?;
    let response = http.get(&url).send().await.map_err(|e| anyhow::Error::new(KilnError::from(e)))?;

    if response.status() == StatusCode::FORBIDDEN {
        return Err(anyhow::Error::new(KilnError::InvalidChannel {
            channel: channel.to_string(),
        }));
    }
    if !response.status().is_success() {
        return Err(anyhow::Error::new(KilnError::HttpStatus {
            url,
            status: response.status().as_u16(),
        }));
    }

    let version: Version =
        response.json().await.map_err(|e| anyhow::Error::new(KilnError::from(e)))?;

    if let Some(parent) = cache_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    if let Ok(json) = serde_json::to_vec(&version) {
        let _ = tokio::fs::write(&cache_path, json).await;
    }

    Ok(version)
}

/// Open the release archive for `manifest` and return a byte stream plus the
/// declared content length, for progress-bar sizing.
pub async fn stream_build(
    config: &Config,
    manifest: &Manifest,
) -> Result<(impl Stream<Item = reqwest::Result<bytes::Bytes>>, Option<u64>)> {
    let build_key = format!("{}-{}", config.platform, config.arch);
    let build = manifest
        .builds
        .get(&build_key)
        .ok_or_else(|| anyhow::anyhow!("no build available for {build_key}"))?;

    let http = client(config)?;
    let response = http
        .get(&build.url)
        .send()
        .await
        .map_err(|e| anyhow::Error::new(KilnError::from(e)))?;

    if !response.status().is_success() {
        return Err(anyhow::Error::new(KilnError::HttpStatus {
            url: build.url.clone(),
            status: response.status().as_u16(),
        }));
    }

    let content_length = response.content_length().or(Some(build.bytes));
    Ok((response.bytes_stream(), content_length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let mut builds = HashMap::new();
        builds.insert(
            "linux-x86_64".to_string(),
            BuildInfo {
                url: "https://example.invalid/a.tar.gz".to_string(),
                sha256: "abc123".to_string(),
                bytes: 1024,
            },
        );
        let manifest = Manifest {
            version: semver::Version::new(1, 2, 3),
            channel: "stable".to_string(),
            sha256gz: "abc123".to_string(),
            priority: Some(50),
            builds,
        };

        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn version_without_message_deserializes() {
        let json = r#"{"version":"1.0.0","channel":"beta"}"#;
        let version: Version = serde_json::from_str(json).unwrap();
        assert_eq!(version.message, None);
    }

    #[tokio::test]
    async fn fetch_version_reads_cache_without_network_when_present() {
        let config = Config::for_test();
        tokio::fs::create_dir_all(&config.cache_dir).await.unwrap();
        let cached = Version {
            version: semver::Version::new(9, 9, 9),
            channel: "stable".to_string(),
            message: None,
        };
        tokio::fs::write(
            paths::version_file(&config, "stable"),
            serde_json::to_vec(&cached).unwrap(),
        )
        .await
        .unwrap();

        let result = fetch_version(&config, "stable", false).await.unwrap();
        assert_eq!(result, cached);
    }
}
