//! keepfs: hierarchical folders over a flat object store.
//!
//! The store only knows keys. keepfs layers per-contract folder trees on top
//! of it using zero-byte `.keep` markers, with recursive delete, archive
//! export and a browsing session.
//!
//! - [`store`]: the `ObjectStore` trait and its in-memory and local-disk backends
//! - everything else: the file manager, re-exported at the top level

pub use keepfs_file_manager::*;

/// The flat object store seam.
pub mod store {
    pub use keepfs_object_store::*;
}
