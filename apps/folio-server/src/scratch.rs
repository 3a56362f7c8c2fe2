//! Scratch Directory
//!
//! Per-request working storage for uploaded PDFs and generated documents.
//!
//! Every file placed here is owned by a [`ScratchFile`] guard. Dropping the
//! guard deletes the file, so cleanup follows ownership: whichever stage of a
//! request ends up holding the guard last (the converter on failure, the
//! response body stream on success) releases it on every exit path.
//!
//! Names are `<unix-millis>-<uuid>.<ext>`, so concurrent requests never share
//! a path and no locking is needed.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

/// Handle on the shared scratch directory
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: Arc<PathBuf>,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    ///
    /// Safe to call from many requests at once.
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.as_path()).await
    }

    /// Reserve a fresh, collision-resistant path with the given extension.
    ///
    /// Nothing is created on disk; wrap the path with [`ScratchDir::adopt`]
    /// before writing to it.
    pub fn allocate(&self, extension: &str) -> PathBuf {
        let token = format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4().simple());
        self.root.join(format!("{}.{}", token, extension))
    }

    /// Take ownership of a scratch path; the file is removed when the guard drops
    pub fn adopt(&self, path: PathBuf) -> ScratchFile {
        ScratchFile { path }
    }

    /// Remove regular files left behind by a previous process.
    ///
    /// Returns the number of files removed. A missing directory counts as empty.
    pub async fn purge(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(self.root.as_path()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to purge stale scratch file"
                ),
            }
        }

        Ok(removed)
    }
}

/// A file in the scratch directory, deleted exactly once on drop
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        // Cleanup is best-effort: failures are reported, never propagated.
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Scratch file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => tracing::warn!(
                path = %self.path.display(),
                "Scratch file already removed"
            ),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_is_unique() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());

        let paths: HashSet<PathBuf> = (0..1000).map(|_| scratch.allocate("pdf")).collect();
        assert_eq!(paths.len(), 1000);

        let sample = scratch.allocate("pdf");
        assert_eq!(sample.parent(), Some(temp_dir.path()));
        assert_eq!(sample.extension().and_then(|e| e.to_str()), Some("pdf"));
    }

    #[tokio::test]
    async fn test_guard_removes_file_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());

        let path = scratch.allocate("docx");
        let guard = scratch.adopt(path.clone());
        tokio::fs::write(guard.path(), b"content").await.unwrap();
        assert!(path.exists());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_tolerates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());

        // Never written: dropping must not panic
        let guard = scratch.adopt(scratch.allocate("docx"));
        drop(guard);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path().join("nested").join("uploads"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scratch = scratch.clone();
                tokio::spawn(async move { scratch.ensure().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        scratch.ensure().await.unwrap();
        assert!(scratch.path().is_dir());
    }

    #[tokio::test]
    async fn test_purge_removes_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path());

        std::fs::write(temp_dir.path().join("1700000000000-a.pdf"), b"a").unwrap();
        std::fs::write(temp_dir.path().join("1700000000000-a.docx"), b"b").unwrap();
        std::fs::create_dir(temp_dir.path().join("keep")).unwrap();

        assert_eq!(scratch.purge().await.unwrap(), 2);
        assert!(temp_dir.path().join("keep").is_dir());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_purge_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let scratch = ScratchDir::new(temp_dir.path().join("absent"));
        assert_eq!(scratch.purge().await.unwrap(), 0);
    }
}
