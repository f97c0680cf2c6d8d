//! keepfs file manager: virtual folders over a flat object store.
//!
//! Each contract owns a tree rooted at `<root_prefix>/<contractId>`. Folders
//! exist through zero-byte `.keep` markers or through keys beneath them;
//! nothing else in the store knows about directories.
//!
//! Building blocks, bottom-up:
//! - [`sanitize`] turns user-typed names into safe path segments
//! - [`VirtualPath`] is a depth-bounded location inside one contract
//! - [`marker`] is the `.keep` convention
//! - [`RecursiveLister`] lists one folder or walks a whole subtree
//! - [`BatchDeleter`] plans and executes recursive deletes
//! - [`ArchiveBundler`] bundles files into a `.tar.gz`
//! - [`FileManager`] ties them to one store and one [`FileManagerConfig`]
//! - [`BrowserSession`] tracks the current folder and selection
//!
//! The crate logs through `tracing` and never installs a subscriber.

mod archive;
mod cancel;
mod config;
mod deleter;
mod error;
mod lister;
mod manager;
pub mod marker;
mod path;
pub mod sanitize;
mod session;

pub use archive::{
    archive_file_name, ArchiveBundle, ArchiveBundler, ArchiveManifest, ArchiveProgress, ManifestEntry,
};
pub use cancel::CancelFlag;
pub use config::{FileManagerConfig, SeparatorPolicy};
pub use deleter::{BatchDeleter, ConfirmDeleteAll, DeleteReport, DeleteRequest, DeletionSet};
pub use error::{Error, NameError, Result, Severity};
pub use lister::{
    is_post_ordered, post_order_cmp, Entry, FolderListing, RecursiveLister, TreeEntry, TreeEntryKind,
    TreeListing,
};
pub use manager::FileManager;
pub use path::{ContractRoot, VirtualPath};
pub use sanitize::{sanitize, sanitize_file_name, sanitize_with, SafeSegment};
pub use session::BrowserSession;
