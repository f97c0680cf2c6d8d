//! keepfs object store: the flat storage seam.
//!
//! Everything at this level is a flat string key. There are no folders,
//! only keys that happen to share a `/`-delimited prefix:
//! - `ObjectStore`: async list/remove/upload/download/public URL
//! - `ObjectEntry`: one row of a single-level listing
//! - `InMemoryObjectStore`: reference backend with fault injection
//! - `LocalDiskObjectStore`: files beneath a root directory
//!
//! Folder semantics (markers, depth, recursive delete, archives) are layered
//! on top of this trait by `keepfs-file-manager`.

pub use bytes::Bytes;

mod error;
mod local_disk;
mod memory;
mod traits;

pub use error::{ObjectStoreError, Result};
pub use local_disk::{content_type_for, LocalDiskObjectStore};
pub use memory::{CallCounts, InMemoryObjectStore};
pub use traits::{ObjectEntry, ObjectStore, RemoveOutcome};
