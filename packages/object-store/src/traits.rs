//! The object store trait and the values that cross it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One row of a single-level listing.
///
/// Objects stored directly under the listed prefix carry metadata. Deeper
/// keys are collapsed into a bare prefix entry named after the child, and
/// bare prefixes carry no metadata at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub content_type: Option<String>,
}

impl ObjectEntry {
    /// An entry for a stored object.
    pub fn object(name: impl Into<String>, size_bytes: u64, content_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes: Some(size_bytes),
            content_type,
        }
    }

    /// An entry for a bare prefix (a child with deeper keys beneath it).
    pub fn prefix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes: None,
            content_type: None,
        }
    }
}

/// Per-key result of a batched removal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Keys the backend could not remove. Every other key in the request
    /// is gone (or was never there).
    pub failed_keys: Vec<String>,
}

/// A flat, key-addressed object store.
///
/// Keys are `/`-joined strings. The store knows nothing about folders:
/// `list` groups keys by their next segment, and that is all.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn ObjectStore>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the direct children of `prefix` (no trailing slash).
    ///
    /// A prefix with nothing beneath it lists as empty.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;

    /// Remove a batch of keys.
    ///
    /// Removing a key that does not exist succeeds. Failures of individual
    /// keys are reported in the outcome; `Err` means the whole call failed.
    async fn remove(&self, keys: &[String]) -> Result<RemoveOutcome>;

    /// Store `data` at `key`. Never overwrites: an occupied key fails with
    /// [`ObjectStoreError::AlreadyExists`](crate::ObjectStoreError::AlreadyExists).
    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Fetch the bytes stored at `key`.
    async fn download(&self, key: &str) -> Result<Bytes>;

    /// A URL that opens the object directly, without going through this API.
    fn public_url(&self, key: &str) -> Result<String>;
}

// Blanket implementations for references, boxes and shared pointers

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        (**self).list(prefix).await
    }

    async fn remove(&self, keys: &[String]) -> Result<RemoveOutcome> {
        (**self).remove(keys).await
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        (**self).upload(key, data, content_type).await
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        (**self).download(key).await
    }

    fn public_url(&self, key: &str) -> Result<String> {
        (**self).public_url(key)
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        self.as_ref().list(prefix).await
    }

    async fn remove(&self, keys: &[String]) -> Result<RemoveOutcome> {
        self.as_ref().remove(keys).await
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.as_ref().upload(key, data, content_type).await
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        self.as_ref().download(key).await
    }

    fn public_url(&self, key: &str) -> Result<String> {
        self.as_ref().public_url(key)
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        self.as_ref().list(prefix).await
    }

    async fn remove(&self, keys: &[String]) -> Result<RemoveOutcome> {
        self.as_ref().remove(keys).await
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.as_ref().upload(key, data, content_type).await
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        self.as_ref().download(key).await
    }

    fn public_url(&self, key: &str) -> Result<String> {
        self.as_ref().public_url(key)
    }
}
