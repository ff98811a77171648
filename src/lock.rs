//! Cross-process advisory reader/writer locks.
//!
//! Generalizes `cache::lock::CacheLock` (a single exclusive-only lock) into a full
//! reader/writer lock: many readers may hold a path concurrently, a writer excludes
//! everyone. Built on the `fs4` advisory-locking idiom, bridging the blocking `flock`
//! calls off the tokio runtime via `spawn_blocking`.
//!
//! # `skip_own_pid`
//!
//! POSIX `flock` locks are associated with the open file description, not the
//! process — two separate `open()` calls by the *same* process on the same path
//! would deadlock against each other. A process-local registry tracks how many
//! readers/writers this process already holds per path; re-entrant acquisition within
//! the same process is served from that registry instead of calling into the OS lock
//! a second time. This is the one legitimate process-global in the crate.

use crate::core::KilnError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// The real OS-level lock (and its held file) lives here, keyed by path, not on any
/// individual guard. A guard only ever holds a process-local count/depth; the file is
/// unlocked exactly once, when the registry decides the last in-process holder of that
/// kind has gone.
#[derive(Default)]
struct LockState {
    readers: u32,
    reader_file: Option<File>,
    writer: bool,
    writer_depth: u32,
    writer_file: Option<File>,
}

fn registry() -> &'static Mutex<HashMap<PathBuf, LockState>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, LockState>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn canonical_or_self(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create lock directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))
}

fn remove_if_idle(registry: &mut HashMap<PathBuf, LockState>, path: &Path) {
    if registry.get(path).is_some_and(|s| s.readers == 0 && !s.writer) {
        registry.remove(path);
    }
}

/// A held reader lock. Releases (or decrements the process-local reader count) on drop.
pub struct ReaderGuard {
    path: PathBuf,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        let mut registry = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = registry.get_mut(&self.path) {
            state.readers = state.readers.saturating_sub(1);
            // The OS-level shared lock is released exactly once, when the last
            // in-process reader goes, not when whichever guard happened to open it
            // drops first.
            if state.readers == 0 {
                if let Some(file) = state.reader_file.take() {
                    let _ = FileExt::unlock(&file);
                }
            }
        }
        remove_if_idle(&mut registry, &self.path);
    }
}

/// A held writer lock. Releases (or decrements the process-local re-entrancy depth) on
/// drop.
pub struct WriterGuard {
    path: PathBuf,
}

impl WriterGuard {
    /// Explicitly release the lock before the guard would otherwise drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        let mut registry = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = registry.get_mut(&self.path) {
            state.writer_depth = state.writer_depth.saturating_sub(1);
            if state.writer_depth == 0 {
                state.writer = false;
                if let Some(file) = state.writer_file.take() {
                    let _ = FileExt::unlock(&file);
                }
            }
        }
        remove_if_idle(&mut registry, &self.path);
    }
}

/// Acquire a reader lock on `path`, blocking until no writer holds it.
///
/// If this process already holds a reader or writer lock on `path`, the acquisition
/// is served from the process-local registry without a second OS-level lock call.
pub async fn reader_acquire(path: &Path) -> Result<ReaderGuard> {
    let canon = canonical_or_self(path);

    {
        let mut registry = registry().lock().unwrap_or_else(|e| e.into_inner());
        let state = registry.entry(canon.clone()).or_default();
        if state.writer {
            // We already hold the writer lock in this process; a reader is implied.
            state.readers += 1;
            return Ok(ReaderGuard { path: canon });
        }
        if state.readers > 0 {
            state.readers += 1;
            return Ok(ReaderGuard { path: canon });
        }
        state.readers += 1;
    }

    let owned_path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || -> Result<File> {
        let file = open_lock_file(&owned_path)?;
        file.lock_shared().map_err(|e| {
            anyhow::Error::new(KilnError::LockError {
                path: owned_path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(file)
    })
    .await
    .context("failed to join lock acquisition task")??;

    let mut registry = registry().lock().unwrap_or_else(|e| e.into_inner());
    registry.entry(canon.clone()).or_default().reader_file = Some(file);

    Ok(ReaderGuard { path: canon })
}

/// Acquire an exclusive writer lock on `path`, blocking until no reader or writer
/// holds it.
pub async fn writer_acquire(path: &Path) -> Result<WriterGuard> {
    let canon = canonical_or_self(path);

    {
        let mut registry = registry().lock().unwrap_or_else(|e| e.into_inner());
        let state = registry.entry(canon.clone()).or_default();
        if state.writer {
            // Re-entrant writer acquisition within the same process.
            state.writer_depth += 1;
            return Ok(WriterGuard { path: canon });
        }
    }

    let owned_path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || -> Result<File> {
        let file = open_lock_file(&owned_path)?;
        file.lock_exclusive().map_err(|e| {
            anyhow::Error::new(KilnError::LockError {
                path: owned_path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(file)
    })
    .await
    .context("failed to join lock acquisition task")??;

    let mut registry = registry().lock().unwrap_or_else(|e| e.into_inner());
    let state = registry.entry(canon.clone()).or_default();
    state.writer = true;
    state.writer_depth = 1;
    state.writer_file = Some(file);

    Ok(WriterGuard { path: canon })
}

/// Non-blocking probe: true if a writer currently holds `path`, in this process or
/// another. Used by the autoupdater to decide whether a concurrent update is already
/// in flight before it bothers touching the debounce marker.
pub fn has_writer(path: &Path) -> Result<bool> {
    let canon = canonical_or_self(path);
    {
        let registry = registry().lock().unwrap_or_else(|e| e.into_inner());
        if registry.get(&canon).is_some_and(|s| s.writer) {
            return Ok(true);
        }
    }

    if !path.exists() {
        return Ok(false);
    }

    let file = open_lock_file(path)?;
    match file.try_lock_shared() {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(false)
        }
        Err(_) => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn writer_blocks_second_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");
        let barrier = Arc::new(Barrier::new(2));

        let path1 = path.clone();
        let barrier1 = barrier.clone();
        let h1 = tokio::spawn(async move {
            let _guard = writer_acquire(&path1).await.unwrap();
            barrier1.wait().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let path2 = path.clone();
        let h2 = tokio::spawn(async move {
            barrier.wait().await;
            let start = Instant::now();
            let _guard = writer_acquire(&path2).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(50));
        });

        h1.await.unwrap();
        h2.await.unwrap();
    }

    #[tokio::test]
    async fn readers_do_not_block_each_other() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");

        let g1 = reader_acquire(&path).await.unwrap();
        let start = Instant::now();
        let g2 = reader_acquire(&path).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn has_writer_reflects_active_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");

        assert!(!has_writer(&path).unwrap());
        let guard = writer_acquire(&path).await.unwrap();
        assert!(has_writer(&path).unwrap());
        drop(guard);
    }

    #[tokio::test]
    async fn same_process_reentrant_writer_does_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");

        let _outer = writer_acquire(&path).await.unwrap();
        // Without skip_own_pid handling this would hang forever.
        let _inner = writer_acquire(&path).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_first_reader_does_not_release_other_live_readers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");

        // g1 is the guard that actually opened the OS-level shared lock; g2 is served
        // from the process-local registry and holds no file of its own.
        let g1 = reader_acquire(&path).await.unwrap();
        let g2 = reader_acquire(&path).await.unwrap();
        drop(g1);

        let barrier = Arc::new(Barrier::new(2));
        let path2 = path.clone();
        let barrier2 = barrier.clone();
        let writer_task = tokio::spawn(async move {
            barrier2.wait().await;
            let start = Instant::now();
            let _guard = writer_acquire(&path2).await.unwrap();
            start.elapsed()
        });

        barrier.wait().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(g2);

        let elapsed = writer_task.await.unwrap();
        assert!(elapsed >= Duration::from_millis(50));
    }
}
