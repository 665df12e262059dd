//! Session manifest persistence.
//!
//! One manifest per recording session, written with write-to-temp-then-rename
//! so concurrent observers never read a half-written file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::Result;
use crate::utils::fs;

/// File name of the manifest inside a session directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Metadata of one recording session (channel × stream × start time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub channel_id: String,
    pub stream_id: String,
    pub requested_quality: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub segment_count: u64,
}

impl SessionManifest {
    pub fn new(
        channel_id: impl Into<String>,
        stream_id: impl Into<String>,
        requested_quality: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            stream_id: stream_id.into(),
            requested_quality: requested_quality.into(),
            started_at: Utc::now(),
            ended_at: None,
            segment_count: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Exclusive writer for one session's manifest.
///
/// All writes are serialized through an internal lock; after [`finish`]
/// further segment-count updates are ignored.
///
/// [`finish`]: ManifestWriter::finish
#[derive(Debug)]
pub struct ManifestWriter {
    path: PathBuf,
    manifest: Mutex<SessionManifest>,
}

impl ManifestWriter {
    /// Manifest path inside a session directory.
    pub fn path_in(session_dir: &Path) -> PathBuf {
        session_dir.join(MANIFEST_FILE_NAME)
    }

    /// Initialize the manifest for a new session and persist it immediately.
    pub async fn create(path: PathBuf, manifest: SessionManifest) -> Result<Self> {
        let writer = Self {
            path,
            manifest: Mutex::new(manifest),
        };
        {
            let manifest = writer.manifest.lock().await;
            writer.flush(&manifest).await?;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Update the persisted segment count.
    ///
    /// Returns `false` when nothing was written because the count is unchanged
    /// or the session is already finalized.
    pub async fn set_segment_count(&self, count: u64) -> Result<bool> {
        let mut manifest = self.manifest.lock().await;
        if manifest.is_finished() || manifest.segment_count == count {
            return Ok(false);
        }
        manifest.segment_count = count;
        self.flush(&manifest).await?;
        Ok(true)
    }

    /// Record `ended_at` and persist. Idempotent: later calls return the
    /// already-finalized manifest without rewriting it.
    pub async fn finish(&self) -> Result<SessionManifest> {
        let mut manifest = self.manifest.lock().await;
        if !manifest.is_finished() {
            manifest.ended_at = Some(Utc::now());
            self.flush(&manifest).await?;
            debug!(
                channel_id = %manifest.channel_id,
                stream_id = %manifest.stream_id,
                segments = manifest.segment_count,
                "Session manifest finalized"
            );
        }
        Ok(manifest.clone())
    }

    /// Current in-memory manifest.
    pub async fn snapshot(&self) -> SessionManifest {
        self.manifest.lock().await.clone()
    }

    /// Read a persisted manifest back from disk.
    pub async fn load(path: &Path) -> Result<SessionManifest> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| fs::io_error("reading manifest", path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn flush(&self, manifest: &SessionManifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest)?;
        fs::write_atomic(&self.path, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_writer(dir: &Path) -> ManifestWriter {
        ManifestWriter::create(
            ManifestWriter::path_in(dir),
            SessionManifest::new("UC123", "V1", "720p"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_persists_initial_manifest() {
        let temp = TempDir::new().unwrap();
        let writer = create_writer(temp.path()).await;

        let loaded = ManifestWriter::load(writer.path()).await.unwrap();
        assert_eq!(loaded.channel_id, "UC123");
        assert_eq!(loaded.stream_id, "V1");
        assert_eq!(loaded.requested_quality, "720p");
        assert_eq!(loaded.segment_count, 0);
        assert!(loaded.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_finish_sets_ended_at_after_started_at() {
        let temp = TempDir::new().unwrap();
        let writer = create_writer(temp.path()).await;
        writer.set_segment_count(4).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let finished = writer.finish().await.unwrap();
        let loaded = ManifestWriter::load(writer.path()).await.unwrap();

        assert_eq!(finished, loaded);
        assert_eq!(loaded.segment_count, 4);
        assert!(loaded.started_at < loaded.ended_at.unwrap());
    }

    #[tokio::test]
    async fn test_finish_is_idempotent_and_freezes_segment_count() {
        let temp = TempDir::new().unwrap();
        let writer = create_writer(temp.path()).await;

        let first = writer.finish().await.unwrap();
        assert!(!writer.set_segment_count(9).await.unwrap());
        let second = writer.finish().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.segment_count, 0);
    }

    #[tokio::test]
    async fn test_unchanged_segment_count_skips_write() {
        let temp = TempDir::new().unwrap();
        let writer = create_writer(temp.path()).await;

        assert!(writer.set_segment_count(2).await.unwrap());
        assert!(!writer.set_segment_count(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_updates_never_expose_partial_file() {
        let temp = TempDir::new().unwrap();
        let writer = Arc::new(create_writer(temp.path()).await);
        let path = writer.path().to_path_buf();

        let updater = {
            let writer = writer.clone();
            tokio::spawn(async move {
                for n in 1..=50 {
                    writer.set_segment_count(n).await.unwrap();
                }
            })
        };

        let reader = tokio::spawn(async move {
            for _ in 0..50 {
                let bytes = tokio::fs::read(&path).await.unwrap();
                serde_json::from_slice::<SessionManifest>(&bytes).unwrap();
                tokio::task::yield_now().await;
            }
        });

        updater.await.unwrap();
        reader.await.unwrap();
        assert_eq!(writer.snapshot().await.segment_count, 50);
    }
}
