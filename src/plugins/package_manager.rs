//! External package manager abstraction used by user plugin install/update/remove.
//!
//! Shells out to a Node package manager binary the same way `upgrade::self_updater`
//! extracts `.tar.xz` archives by invoking the system `tar` rather than reimplementing
//! xz decompression: an external, well-tested tool handles dependency resolution, and
//! this crate only needs to drive its CLI and check its exit status.

use crate::core::KilnError;
use anyhow::{Context, Result};
use std::path::Path;

/// Operations a package manager must support to back user plugin lifecycle commands.
///
/// Consumers are generic over `PM: PackageManager` rather than storing `dyn` trait
/// objects, so the `async fn`s here stay unboxed.
pub trait PackageManager: Send + Sync {
    /// Install (or update, if already present) dependencies declared in `package.json`
    /// under `cwd`.
    fn install(&self, cwd: &Path) -> impl Future<Output = Result<()>> + Send;
    /// Upgrade all dependencies under `cwd` to the latest version satisfying their
    /// declared ranges.
    fn upgrade(&self, cwd: &Path) -> impl Future<Output = Result<()>> + Send;
    /// Remove `package` from `cwd`'s dependency tree.
    fn remove(&self, cwd: &Path, package: &str) -> impl Future<Output = Result<()>> + Send;
}

/// A [`PackageManager`] that drives `yarn` via `tokio::process::Command`, matching the
/// registry-pinned `.yarnrc` convention a user plugin's `package.json` is expected to use.
#[derive(Debug, Clone, Copy, Default)]
pub struct YarnPackageManager;

impl YarnPackageManager {
    async fn run(cwd: &Path, args: &[&str]) -> Result<()> {
        let output = tokio::process::Command::new("yarn")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .with_context(|| format!("failed to spawn yarn {}", args.join(" ")))?;

        if !output.status.success() {
            return Err(anyhow::Error::new(KilnError::PluginLoadError {
                name: cwd.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            }));
        }
        Ok(())
    }
}

impl PackageManager for YarnPackageManager {
    async fn install(&self, cwd: &Path) -> Result<()> {
        Self::run(cwd, &["install", "--non-interactive"]).await
    }

    async fn upgrade(&self, cwd: &Path) -> Result<()> {
        Self::run(cwd, &["upgrade", "--non-interactive"]).await
    }

    async fn remove(&self, cwd: &Path, package: &str) -> Result<()> {
        Self::run(cwd, &["remove", package, "--non-interactive"]).await
    }
}

/// A test double that records invocations without spawning a process.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct FakePackageManager {
    /// Calls recorded as `(operation, cwd, package)`.
    pub calls: std::sync::Mutex<Vec<(String, std::path::PathBuf, Option<String>)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl PackageManager for FakePackageManager {
    async fn install(&self, cwd: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(("install".to_string(), cwd.to_path_buf(), None));
        Ok(())
    }

    async fn upgrade(&self, cwd: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(("upgrade".to_string(), cwd.to_path_buf(), None));
        Ok(())
    }

    async fn remove(&self, cwd: &Path, package: &str) -> Result<()> {
        self.calls.lock().unwrap().push((
            "remove".to_string(),
            cwd.to_path_buf(),
            Some(package.to_string()),
        ));
        Ok(())
    }
}
