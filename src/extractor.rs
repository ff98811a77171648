//! Streaming gzip+tar extraction with simultaneous SHA-256 verification.
//!
//! The incoming byte stream is tee'd: every chunk updates a running SHA-256 hash (the
//! same tee'd-hashing idiom a `clawde-io-apps`-style daemon uses in its updater's
//! `download` step) and is forwarded over a channel into a blocking task running
//! `flate2::GzDecoder` piped into `tar::Archive`, the same `flate2`+`tar` pairing other
//! release-archive handlers already use.
//! Extraction runs inside `tokio::task::spawn_blocking`, the same bridging idiom the
//! crate uses for blocking file-lock acquisition in `cache::lock::CacheLock::acquire`.
//!
//! Entry policy: files and directories are extracted; symlinks are silently skipped
//! (not extracted, not an error) for Windows portability; any other entry type is
//! fatal.

use crate::core::KilnError;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::EntryType;
use tokio::sync::mpsc;

struct ChannelReader {
    rx: mpsc::Receiver<bytes::Bytes>,
    buf: bytes::Bytes,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if self.buf.is_empty() {
            match self.rx.blocking_recv() {
                Some(chunk) => self.buf = chunk,
                None => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf = self.buf.split_off(n);
        Ok(n)
    }
}

fn extract_archive(reader: ChannelReader, target_dir: PathBuf) -> Result<()> {
    let gz = GzDecoder::new(reader);
    let mut archive = tar::Archive::new(gz);

    for entry in archive.entries().context("failed to read tar entries")? {
        let mut entry = entry.context("failed to read tar entry header")?;
        let entry_type = entry.header().entry_type();
        let entry_path = entry.path().context("invalid entry path")?.to_path_buf();

        match entry_type {
            EntryType::Regular | EntryType::Directory => {
                entry.unpack_in(&target_dir).with_context(|| {
                    format!("failed to extract {}", entry_path.display())
                })?;
            }
            EntryType::Symlink => {
                // Skipped intentionally: symlink semantics differ on Windows.
                std::io::copy(&mut entry, &mut std::io::sink())
                    .context("failed to skip symlink entry")?;
            }
            _ => {
                return Err(anyhow::Error::new(KilnError::UnknownEntryType {
                    path: entry_path.display().to_string(),
                }));
            }
        }
    }

    Ok(())
}

/// Stream-decompress, verify, and extract `stream` into `target_dir`.
///
/// On checksum mismatch or any extraction error, `target_dir` is removed before the
/// error is returned.
pub async fn extract_stream<S, E>(
    mut stream: S,
    target_dir: &Path,
    expected_sha256: &str,
) -> Result<()>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::fs::create_dir_all(target_dir)
        .await
        .with_context(|| format!("failed to create {}", target_dir.display()))?;

    let (tx, rx) = mpsc::channel::<bytes::Bytes>(8);
    let reader = ChannelReader {
        rx,
        buf: bytes::Bytes::new(),
    };

    let target_dir_owned = target_dir.to_path_buf();
    let extract_task = tokio::task::spawn_blocking(move || extract_archive(reader, target_dir_owned));

    let mut hasher = Sha256::new();
    let mut stream_err = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                hasher.update(&bytes);
                if tx.send(bytes).await.is_err() {
                    // Extraction task ended early (likely due to an error); stop feeding it.
                    break;
                }
            }
            Err(e) => {
                stream_err = Some(anyhow::Error::new(e));
                break;
            }
        }
    }
    drop(tx);

    let extract_result = extract_task.await.context("extraction task panicked")?;

    if let Some(err) = stream_err {
        let _ = tokio::fs::remove_dir_all(target_dir).await;
        return Err(err).context("download stream failed during extraction");
    }

    if let Err(e) = extract_result {
        let _ = tokio::fs::remove_dir_all(target_dir).await;
        return Err(e);
    }

    let actual = hex::encode(hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected_sha256) {
        let _ = tokio::fs::remove_dir_all(target_dir).await;
        return Err(anyhow::Error::new(KilnError::ChecksumMismatch {
            expected: expected_sha256.to_string(),
            actual,
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn build_archive(files: &[(&str, &[u8])]) -> (Vec<u8>, String) {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            for (name, content) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, *content).unwrap();
            }
            builder.finish().unwrap();
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let sha = hex::encode(Sha256::digest(&gz_bytes));
        (gz_bytes, sha)
    }

    fn as_stream(bytes: Vec<u8>) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(vec![Ok(bytes::Bytes::from(bytes))])
    }

    #[tokio::test]
    async fn extracts_regular_files_with_matching_checksum() {
        let (archive, sha) = build_archive(&[("hello.txt", b"hi there")]);
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");

        extract_stream(as_stream(archive), &target, &sha).await.unwrap();

        let content = std::fs::read_to_string(target.join("hello.txt")).unwrap();
        assert_eq!(content, "hi there");
    }

    #[tokio::test]
    async fn checksum_mismatch_removes_target_dir() {
        let (archive, _sha) = build_archive(&[("hello.txt", b"hi there")]);
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out");

        let result = extract_stream(as_stream(archive), &target, "0".repeat(64).as_str()).await;

        assert!(result.is_err());
        assert!(!target.exists());
    }
}
