//! The folder marker convention.
//!
//! The object store has no directories. A folder exists when a zero-byte
//! object named `.keep` sits directly inside it, or when any key lives
//! beneath its prefix. Listings report folders as entries without a content
//! type, which is also how an uploaded file with no detectable type looks;
//! such a file is misclassified as a folder. That is a known limitation of
//! the convention.

use bytes::Bytes;
use keepfs_object_store::{ObjectEntry, ObjectStore, ObjectStoreError};
use tracing::debug;

use crate::error::{Error, Result};
use crate::path::VirtualPath;

/// Name of the marker object that keeps an empty folder listable.
pub const MARKER_NAME: &str = ".keep";

/// `<folder>/.keep` for a virtual path.
pub fn folder_marker_key(folder: &VirtualPath) -> String {
    folder.child_key(MARKER_NAME)
}

/// `<folder_key>/.keep` for a raw key prefix.
pub fn marker_key_for(folder_key: &str) -> String {
    format!("{}/{}", folder_key, MARKER_NAME)
}

/// True for the marker object's name.
pub fn is_marker_name(name: &str) -> bool {
    name == MARKER_NAME
}

/// True exactly when the entry carries no content-type metadata.
pub fn is_folder_entry(entry: &ObjectEntry) -> bool {
    entry.content_type.is_none()
}

/// Create the marker for `folder`.
///
/// Returns the marker key. An existing marker is reported as
/// [`Error::AlreadyExists`] and left untouched.
pub async fn create_folder(store: &dyn ObjectStore, folder: &VirtualPath) -> Result<String> {
    let key = folder_marker_key(folder);
    match store.upload(&key, Bytes::new(), None).await {
        Ok(()) => {
            debug!(key = %key, "created folder marker");
            Ok(key)
        }
        Err(ObjectStoreError::AlreadyExists { .. }) => Err(Error::AlreadyExists { key }),
        Err(e) => Err(e.into()),
    }
}
