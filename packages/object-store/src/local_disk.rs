//! Object store backed by a directory on local disk.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{ObjectEntry, ObjectStore, ObjectStoreError, RemoveOutcome, Result};

/// Stores each object as a file beneath `root`, one directory per key segment.
///
/// Content types are not persisted; they are derived from the file extension
/// when listing, so every stored file lists with a content type and only
/// directories come back as bare prefixes. Directories emptied by `remove`
/// are pruned so the disk layout mirrors a flat store.
pub struct LocalDiskObjectStore {
    root: PathBuf,
}

impl LocalDiskObjectStore {
    /// Open a store rooted at an existing, writable directory.
    pub fn new(root: PathBuf) -> Result<Self> {
        let attr = std::fs::metadata(&root)?;

        if !attr.is_dir() {
            return Err(ObjectStoreError::Io(io::Error::other(format!(
                "root path {} must be a directory",
                root.display()
            ))));
        }

        if attr.permissions().readonly() {
            return Err(ObjectStoreError::Io(io::Error::other(format!(
                "root directory {} must be writable",
                root.display()
            ))));
        }

        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_file_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Ok(self.root.clone());
        }

        let mut file_path = self.root.clone();
        for segment in key.split('/') {
            let invalid = |message: &str| ObjectStoreError::InvalidKey {
                key: key.to_string(),
                message: message.to_string(),
            };
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if segment.contains('\\') || segment.contains('\0') {
                return Err(invalid("forbidden character"));
            }
            match Path::new(segment).components().next() {
                Some(Component::Normal(_)) => file_path.push(segment),
                _ => return Err(invalid("segment escapes the store root")),
            }
        }
        Ok(file_path)
    }

    async fn prune_empty_parents(&self, file_path: &Path) {
        let mut dir = file_path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

/// Content type guessed from a file name's extension, falling back to
/// `application/octet-stream`.
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl ObjectStore for LocalDiskObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let dir = self.key_to_file_path(prefix)?;
        debug!("Listing {}...", dir.display());

        match fs::metadata(&dir).await {
            Ok(attr) if attr.is_dir() => {}
            Ok(_) => return Ok(Vec::new()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        }

        let mut read_dir = fs::read_dir(&dir).await?;

        let mut entries = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let Ok(name) = dir_entry.file_name().into_string() else {
                warn!(path = %dir_entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            let file_type = dir_entry.file_type().await?;
            if file_type.is_dir() {
                entries.push(ObjectEntry::prefix(name));
            } else if file_type.is_file() {
                let size = dir_entry.metadata().await?.len();
                let content_type = content_type_for(&name);
                entries.push(ObjectEntry::object(name, size, Some(content_type)));
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn remove(&self, keys: &[String]) -> Result<RemoveOutcome> {
        let mut outcome = RemoveOutcome::default();

        for key in keys {
            let file_path = match self.key_to_file_path(key) {
                Ok(file_path) if !key.is_empty() => file_path,
                _ => {
                    warn!(key = %key, "refusing to remove invalid key");
                    outcome.failed_keys.push(key.clone());
                    continue;
                }
            };

            match fs::remove_file(&file_path).await {
                Ok(()) => self.prune_empty_parents(&file_path).await,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to remove object");
                    outcome.failed_keys.push(key.clone());
                }
            }
        }

        Ok(outcome)
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        if key.is_empty() {
            return Err(ObjectStoreError::InvalidKey {
                key: key.to_string(),
                message: "empty key".to_string(),
            });
        }
        let file_path = self.key_to_file_path(key)?;
        debug!(
            content_type = content_type.unwrap_or("-"),
            "Writing {}...",
            file_path.display()
        );

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ObjectStoreError::AlreadyExists {
                    key: key.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        let file_path = self.key_to_file_path(key)?;
        match fs::read(&file_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(ObjectStoreError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, key: &str) -> Result<String> {
        let file_path = self.key_to_file_path(key)?;
        url::Url::from_file_path(&file_path)
            .map(|url| url.to_string())
            .map_err(|()| ObjectStoreError::InvalidKey {
                key: key.to_string(),
                message: "cannot be expressed as a file URL".to_string(),
            })
    }
}
