//! Artifact store: a flat directory of generated, never-reused keys.
//!
//! Every blob the gateway handles (uploads, engine outputs, fetched imagery,
//! inspection reports) lives here under a key minted by the store itself.
//! Caller-supplied names never reach the filesystem; at most a sanitized
//! extension is carried over so format-sniffing engines keep working.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// Longest extension carried over from a caller-supplied name or format.
const MAX_EXTENSION_LEN: usize = 10;

/// Attempts at minting a fresh key before giving up.
const CREATE_ATTEMPTS: usize = 3;

/// Opaque key of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    /// Parse a key, rejecting anything that could escape the store directory.
    pub fn parse(key: &str) -> Option<Self> {
        let valid = !key.is_empty()
            && key.len() <= 64
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
        valid.then(|| Self(key.to_string()))
    }

    fn generate(extension: Option<&str>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        match extension.and_then(sanitize_extension) {
            Some(ext) => Self(format!("{id}.{ext}")),
            None => Self(id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension of the key, if it was minted with one.
    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, ext)| ext)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce an extension (or a file name) to a short lower-case alphanumeric tail.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_extension(raw: &str) -> Option<String> {
    let tail = raw.rsplit('.').next().unwrap_or(raw);
    let ext: String = tail
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}

/// Extension worth keeping from an advisory upload name (`scene.TIF` → `tif`).
pub fn extension_from_name(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    sanitize_extension(ext)
}

/// File-backed artifact store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::io_path("creating store directory", &root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of an artifact. Engines read and write through this.
    pub fn path_of(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(artifact.as_str())
    }

    /// Mint a fresh key without creating anything.
    ///
    /// Used for outputs written by external engines; the key is unique, so
    /// the engine cannot clobber another artifact.
    pub fn allocate(&self, extension: Option<&str>) -> ArtifactRef {
        ArtifactRef::generate(extension)
    }

    /// Start writing a new artifact under a freshly minted key.
    pub async fn create(&self, extension: Option<&str>) -> Result<ArtifactWriter> {
        let mut last_err = None;
        for _ in 0..CREATE_ATTEMPTS {
            let artifact = ArtifactRef::generate(extension);
            let path = self.path_of(&artifact);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(ArtifactWriter {
                        artifact,
                        path,
                        file: BufWriter::new(file),
                        written: 0,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(artifact = %artifact, "Artifact key collision, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(Error::io_path("creating artifact", &path, e)),
            }
        }
        Err(Error::io_path(
            "creating artifact",
            &self.root,
            last_err.unwrap_or_else(|| std::io::Error::other("key collision")),
        ))
    }

    /// Persist `bytes` under a fresh key.
    pub async fn put(&self, bytes: &[u8]) -> Result<ArtifactRef> {
        self.put_with_extension(bytes, None).await
    }

    /// Persist `bytes` under a fresh key carrying `extension`.
    pub async fn put_with_extension(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<ArtifactRef> {
        let mut writer = self.create(extension).await?;
        if let Err(e) = writer.write(bytes).await {
            writer.abort().await;
            return Err(e);
        }
        writer.finish().await
    }

    /// Read an artifact back in full.
    pub async fn get(&self, artifact: &ArtifactRef) -> Result<Bytes> {
        let path = self.path_of(artifact);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::not_found("Artifact", artifact.as_str()))
            }
            Err(e) => Err(Error::io_path("reading artifact", &path, e)),
        }
    }

    pub async fn exists(&self, artifact: &ArtifactRef) -> bool {
        tokio::fs::try_exists(self.path_of(artifact))
            .await
            .unwrap_or(false)
    }

    /// Remove an artifact. Removing a missing artifact succeeds.
    pub async fn delete(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.path_of(artifact);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(artifact = %artifact, "Deleted artifact");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_path("deleting artifact", &path, e)),
        }
    }

    /// Blocking [`delete`](Self::delete), for use alongside the directory walk.
    pub fn delete_blocking(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.path_of(artifact);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_path("deleting artifact", &path, e)),
        }
    }

    /// Artifacts whose age exceeds `max_age` right now.
    pub fn list_older_than(&self, max_age: Duration) -> Result<AgedArtifacts> {
        self.list_older_than_at(max_age, SystemTime::now())
    }

    /// Artifacts whose age, measured at `now`, exceeds `max_age`.
    ///
    /// The returned iterator walks the directory lazily and ends once every
    /// entry present has been visited. Call again to restart the walk.
    pub fn list_older_than_at(&self, max_age: Duration, now: SystemTime) -> Result<AgedArtifacts> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| Error::io_path("listing store directory", &self.root, e))?;
        Ok(AgedArtifacts {
            entries,
            max_age,
            now,
        })
    }
}

/// Lazy walk over the store yielding artifacts past a retention age.
#[derive(Debug)]
pub struct AgedArtifacts {
    entries: std::fs::ReadDir,
    max_age: Duration,
    now: SystemTime,
}

impl AgedArtifacts {
    fn is_expired(&self, entry: &std::fs::DirEntry) -> Option<bool> {
        let metadata = entry.metadata().ok()?;
        if !metadata.is_file() {
            return Some(false);
        }
        let modified = metadata.modified().ok()?;
        // Timestamps in the future count as age zero.
        let age = self.now.duration_since(modified).unwrap_or(Duration::ZERO);
        Some(age > self.max_age)
    }
}

impl Iterator for AgedArtifacts {
    type Item = ArtifactRef;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable store entry");
                    continue;
                }
            };

            let Some(artifact) = entry.file_name().to_str().and_then(ArtifactRef::parse) else {
                continue;
            };

            if self.is_expired(&entry) == Some(true) {
                return Some(artifact);
            }
        }
    }
}

/// In-progress artifact write. Either [`finish`](Self::finish) or
/// [`abort`](Self::abort) it; an abandoned writer leaves a partial file for
/// the sweeper.
#[derive(Debug)]
pub struct ArtifactWriter {
    artifact: ArtifactRef,
    path: PathBuf,
    file: BufWriter<File>,
    written: u64,
}

impl ArtifactWriter {
    pub fn artifact(&self) -> &ArtifactRef {
        &self.artifact
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| Error::io_path("writing artifact", &self.path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and hand back the key. A failed flush removes the file.
    pub async fn finish(mut self) -> Result<ArtifactRef> {
        match self.file.flush().await {
            Ok(()) => Ok(self.artifact),
            Err(e) => {
                let err = Error::io_path("flushing artifact", &self.path, e);
                self.abort().await;
                Err(err)
            }
        }
    }

    /// Drop the partial write.
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.path).await
            && e.kind() != ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "Failed to remove partial artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("store")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get_returns_same_bytes() {
        let (_dir, store) = open_store();
        let artifact = store.put(b"raster bytes").await.unwrap();

        let data = store.get(&artifact).await.unwrap();
        assert_eq!(&data[..], b"raster bytes");
    }

    #[tokio::test]
    async fn test_put_never_reuses_keys() {
        let (_dir, store) = open_store();
        let a = store.put(b"same").await.unwrap();
        let b = store.put(b"same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_put_with_extension_keeps_sanitized_extension() {
        let (_dir, store) = open_store();
        let artifact = store
            .put_with_extension(b"{}", Some("Geo/JSON"))
            .await
            .unwrap();
        assert_eq!(artifact.extension(), Some("geojson"));
        assert!(store.path_of(&artifact).starts_with(store.root()));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = open_store();
        let artifact = store.allocate(Some("tif"));
        let err = store.get(&artifact).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = open_store();
        let artifact = store.put(b"x").await.unwrap();

        store.delete(&artifact).await.unwrap();
        store.delete(&artifact).await.unwrap();
        assert!(!store.exists(&artifact).await);
    }

    #[tokio::test]
    async fn test_list_older_than_uses_call_time() {
        let (_dir, store) = open_store();
        let artifact = store.put(b"old").await.unwrap();

        let now: Vec<_> = store
            .list_older_than(Duration::from_secs(3600))
            .unwrap()
            .collect();
        assert!(now.is_empty());

        let later = SystemTime::now() + Duration::from_secs(2 * 3600);
        let aged: Vec<_> = store
            .list_older_than_at(Duration::from_secs(3600), later)
            .unwrap()
            .collect();
        assert_eq!(aged, vec![artifact]);
    }

    #[tokio::test]
    async fn test_list_skips_foreign_entries() {
        let (_dir, store) = open_store();
        std::fs::write(store.root().join(".hidden"), b"x").unwrap();
        std::fs::create_dir(store.root().join("subdir")).unwrap();

        let later = SystemTime::now() + Duration::from_secs(10);
        let aged: Vec<_> = store
            .list_older_than_at(Duration::ZERO, later)
            .unwrap()
            .collect();
        assert!(aged.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_writer_leaves_nothing() {
        let (_dir, store) = open_store();
        let mut writer = store.create(Some("png")).await.unwrap();
        writer.write(b"partial").await.unwrap();
        let artifact = writer.artifact().clone();
        writer.abort().await;

        assert!(!store.exists(&artifact).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_finish_leaves_nothing() {
        let (_dir, store) = open_store();
        let artifact = store.allocate(Some("png"));
        let path = store.path_of(&artifact);
        std::fs::write(&path, b"").unwrap();

        // Buffered writes land; the flush hits a full device.
        let full = OpenOptions::new().write(true).open("/dev/full").await.unwrap();
        let mut writer = ArtifactWriter {
            artifact: artifact.clone(),
            path,
            file: BufWriter::new(full),
            written: 0,
        };
        writer.write(b"partial").await.unwrap();

        let err = writer.finish().await.unwrap_err();
        assert!(matches!(err, Error::IoPath { .. }), "{err}");
        assert!(!store.exists(&artifact).await);
    }

    #[test]
    fn test_artifact_ref_parse_rejects_traversal() {
        assert!(ArtifactRef::parse("../etc/passwd").is_none());
        assert!(ArtifactRef::parse("a/b").is_none());
        assert!(ArtifactRef::parse("").is_none());
        assert!(ArtifactRef::parse(".hidden").is_none());
        assert!(ArtifactRef::parse("0f3c2a.tif").is_some());
    }

    #[test]
    fn test_extension_from_name() {
        assert_eq!(extension_from_name("scene.TIF"), Some("tif".to_string()));
        assert_eq!(
            extension_from_name("../../evil.geo json"),
            Some("geojson".to_string())
        );
        assert_eq!(extension_from_name("noext"), None);
        assert_eq!(extension_from_name("trailing."), None);
    }
}
