//! The file manager: one object store, one configuration, every operation.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use keepfs_object_store::{content_type_for, ObjectStore};
use tracing::{debug, info};

use crate::archive::{ArchiveBundle, ArchiveBundler, ArchiveManifest, ArchiveProgress};
use crate::cancel::CancelFlag;
use crate::config::FileManagerConfig;
use crate::deleter::{BatchDeleter, DeleteReport, DeleteRequest, DeletionSet};
use crate::error::{Error, Result};
use crate::lister::{FolderListing, RecursiveLister, TreeListing};
use crate::marker;
use crate::path::{ContractRoot, VirtualPath};
use crate::sanitize::{sanitize_file_name, sanitize_with, SafeSegment};

/// Entry point for browsing and editing contract folders.
///
/// Cheap to clone; clones share the store.
///
/// ```rust,ignore
/// let manager = FileManager::new(Arc::new(InMemoryObjectStore::new()), FileManagerConfig::default())?;
/// let root = manager.root_path("c42")?;
/// let drafts = manager.create_folder(&root, "Drafts").await?;
/// let listing = manager.list_folder(&drafts).await?;
/// ```
#[derive(Clone)]
pub struct FileManager {
    store: Arc<dyn ObjectStore>,
    config: FileManagerConfig,
    lister: RecursiveLister,
    deleter: BatchDeleter,
    bundler: ArchiveBundler,
}

impl FileManager {
    /// Build a manager after validating `config`.
    pub fn new(store: Arc<dyn ObjectStore>, config: FileManagerConfig) -> Result<Self> {
        config.validate()?;
        let lister = RecursiveLister::new(Arc::clone(&store), config.concurrency);
        let deleter = BatchDeleter::new(Arc::clone(&store), lister.clone(), config.remove_batch_size);
        let bundler = ArchiveBundler::new(
            Arc::clone(&store),
            lister.clone(),
            config.concurrency,
            config.progress_threshold,
        );
        debug!(root_prefix = %config.root_prefix, max_depth = config.max_depth, "file manager ready");
        Ok(Self {
            store,
            config,
            lister,
            deleter,
            bundler,
        })
    }

    pub fn config(&self) -> &FileManagerConfig {
        &self.config
    }

    pub fn contract_root(&self, contract_id: &str) -> Result<ContractRoot> {
        ContractRoot::new(&self.config.root_prefix, contract_id)
    }

    /// The top folder of a contract's tree.
    pub fn root_path(&self, contract_id: &str) -> Result<VirtualPath> {
        Ok(self.contract_root(contract_id)?.path())
    }

    pub fn parse_path(&self, s: &str, root: &ContractRoot) -> Result<VirtualPath> {
        VirtualPath::parse(s, root, self.config.max_depth)
    }

    /// Sanitize a folder name under the configured separator policy.
    pub fn sanitize_name(&self, raw: &str) -> Result<SafeSegment> {
        Ok(sanitize_with(raw, self.config.separator_policy)?)
    }

    /// `folder` joined with an existing segment, within the depth limit.
    pub fn child_path(&self, folder: &VirtualPath, segment: &SafeSegment) -> Result<VirtualPath> {
        folder.join(segment, self.config.max_depth)
    }

    pub async fn list_folder(&self, folder: &VirtualPath) -> Result<FolderListing> {
        self.lister.list_folder(folder).await
    }

    pub async fn list_tree(&self, folder: &VirtualPath, cancel: &CancelFlag) -> Result<TreeListing> {
        self.lister.list_tree(&folder.render(), cancel).await
    }

    /// Create a subfolder of `parent` from a user-typed name.
    ///
    /// Returns the new folder's path. The name is sanitized first and the
    /// depth limit is checked before anything is written.
    pub async fn create_folder(&self, parent: &VirtualPath, raw_name: &str) -> Result<VirtualPath> {
        let segment = self.sanitize_name(raw_name)?;
        let folder = self.child_path(parent, &segment)?;
        let key = marker::create_folder(self.store.as_ref(), &folder).await?;
        info!(folder = %folder, key = %key, "folder created");
        Ok(folder)
    }

    /// Upload a file into `folder` under a sanitized name.
    ///
    /// Without an explicit content type one is guessed from the extension,
    /// so the upload is never listed as a folder. Returns the stored key.
    pub async fn upload_file(
        &self,
        folder: &VirtualPath,
        raw_name: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<String> {
        let name = sanitize_file_name(raw_name, self.config.separator_policy)?;
        let key = folder.child_key(&name);
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(&name));
        let size = data.len();
        self.store.upload(&key, data, Some(content_type.as_str())).await?;
        info!(key = %key, size, content_type = %content_type, "file uploaded");
        Ok(key)
    }

    /// A URL the named file can be opened at.
    pub async fn public_url(&self, folder: &VirtualPath, name: &str) -> Result<String> {
        let listing = self.lister.list_children(&folder.render()).await?;
        let entry = listing
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
                path: folder.render(),
            })?;
        if marker::is_folder_entry(entry) {
            return Err(Error::NotAFile {
                name: name.to_string(),
            });
        }
        Ok(self.store.public_url(&folder.child_key(name))?)
    }

    pub async fn plan_delete(
        &self,
        folder: &VirtualPath,
        request: &DeleteRequest,
        cancel: &CancelFlag,
    ) -> Result<DeletionSet> {
        self.deleter.plan_delete(folder, request, cancel).await
    }

    pub async fn execute_delete(&self, set: &DeletionSet, cancel: &CancelFlag) -> Result<DeleteReport> {
        self.deleter.execute_delete(set, cancel).await
    }

    /// Plan and execute in one step.
    pub async fn delete(
        &self,
        folder: &VirtualPath,
        request: &DeleteRequest,
        cancel: &CancelFlag,
    ) -> Result<DeleteReport> {
        let set = self.plan_delete(folder, request, cancel).await?;
        self.execute_delete(&set, cancel).await
    }

    pub async fn plan_archive(
        &self,
        folder: &VirtualPath,
        names: &BTreeSet<String>,
        cancel: &CancelFlag,
    ) -> Result<ArchiveManifest> {
        self.bundler.plan_archive(folder, names, cancel).await
    }

    pub async fn build_archive<F>(
        &self,
        manifest: &ArchiveManifest,
        cancel: &CancelFlag,
        on_progress: F,
    ) -> Result<ArchiveBundle>
    where
        F: FnMut(&ArchiveProgress),
    {
        self.bundler.build_archive(manifest, cancel, on_progress).await
    }

    /// Plan and build an archive in one step.
    pub async fn download<F>(
        &self,
        folder: &VirtualPath,
        names: &BTreeSet<String>,
        cancel: &CancelFlag,
        on_progress: F,
    ) -> Result<ArchiveBundle>
    where
        F: FnMut(&ArchiveProgress),
    {
        let manifest = self.plan_archive(folder, names, cancel).await?;
        self.build_archive(&manifest, cancel, on_progress).await
    }
}
