use crate::config::UploadsConfig;
use crate::error::Error;
use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// An image written to the upload directory
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Generated file name, `<uuid><ext>`
    pub filename: String,
    pub path: PathBuf,
}

/// Owns the upload directory. Files are only ever addressed by their base
/// name, so no caller can reach outside the directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_prefix: String,
}

impl UploadStore {
    pub fn new(dir: &Path, public_prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Io(format!("Failed to create upload dir {}: {}", dir.display(), e))
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &UploadsConfig) -> Result<Self> {
        Self::new(&config.dir, &config.public_prefix)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Write bytes under a fresh unique name, keeping the original extension
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<StoredUpload> {
        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let filename = format!("{}{}", Uuid::new_v4(), extension);
        let path = self.dir.join(&filename);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Io(format!("Failed to write upload {}: {}", filename, e)))?;

        debug!("Stored upload {} ({} bytes)", filename, bytes.len());

        Ok(StoredUpload { filename, path })
    }

    /// Map an image reference (bare name or public path) to its file
    pub fn resolve(&self, image: &str) -> Option<PathBuf> {
        let name = Path::new(image).file_name()?;
        Some(self.dir.join(name))
    }

    /// Remove the file behind an image reference.
    /// Returns `false` when it was already absent.
    pub async fn remove(&self, image: &str) -> Result<bool> {
        let Some(path) = self.resolve(image) else {
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(format!("Failed to remove {}: {}", path.display(), e)).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_keeps_extension_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::new(dir.path(), "/uploads").unwrap();

        let stored = uploads.save(Some("frame.JPG"), b"abc").await.unwrap();
        assert!(stored.filename.ends_with(".JPG"));
        assert!(stored.path.exists());

        let public = format!("/uploads/{}", stored.filename);
        assert!(uploads.remove(&public).await.unwrap());
        assert!(!uploads.remove(&public).await.unwrap());
    }

    #[tokio::test]
    async fn save_without_name_has_no_extension() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::new(dir.path(), "/uploads").unwrap();
        let stored = uploads.save(None, b"abc").await.unwrap();
        assert!(!stored.filename.contains('.'));
    }

    #[test]
    fn resolve_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadStore::new(dir.path(), "/uploads").unwrap();
        assert_eq!(
            uploads.resolve("../../etc/passwd").unwrap(),
            dir.path().join("passwd")
        );
        assert!(uploads.resolve("..").is_none());
    }
}
