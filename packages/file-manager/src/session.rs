//! Browsing state for one person looking at one contract's files.

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::archive::{ArchiveBundle, ArchiveProgress};
use crate::cancel::CancelFlag;
use crate::deleter::{ConfirmDeleteAll, DeleteReport, DeleteRequest};
use crate::error::{Error, Result};
use crate::lister::{Entry, FolderListing};
use crate::manager::FileManager;
use crate::path::VirtualPath;
use crate::sanitize::SafeSegment;

/// The current folder, its last listing and the selection within it.
///
/// The selection holds names from the current folder only and is cleared
/// whenever the folder changes. Operations that fail leave the state as it
/// was.
pub struct BrowserSession {
    manager: FileManager,
    current: VirtualPath,
    listing: FolderListing,
    selection: BTreeSet<String>,
}

impl BrowserSession {
    /// Start at the root of `contract_id`'s tree.
    pub async fn open(manager: FileManager, contract_id: &str) -> Result<Self> {
        let current = manager.root_path(contract_id)?;
        let listing = manager.list_folder(&current).await?;
        debug!(folder = %current, "session opened");
        Ok(Self {
            manager,
            current,
            listing,
            selection: BTreeSet::new(),
        })
    }

    pub fn manager(&self) -> &FileManager {
        &self.manager
    }

    pub fn current_path(&self) -> &VirtualPath {
        &self.current
    }

    pub fn listing(&self) -> &FolderListing {
        &self.listing
    }

    pub fn entries(&self) -> &[Entry] {
        &self.listing.entries
    }

    /// The last listing failed because the store was unreachable.
    pub fn retry_available(&self) -> bool {
        self.listing.retry_available
    }

    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    pub fn can_navigate_up(&self) -> bool {
        !self.current.is_root()
    }

    /// Re-list the current folder. Selected names that disappeared are
    /// dropped from the selection.
    pub async fn refresh(&mut self) -> Result<()> {
        let listing = self.manager.list_folder(&self.current).await?;
        self.selection.retain(|name| listing.get(name).is_some());
        self.listing = listing;
        Ok(())
    }

    /// Enter the subfolder `name` of the current folder.
    pub async fn navigate_into(&mut self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        if !entry.is_folder {
            return Err(Error::NotAFolder {
                name: name.to_string(),
            });
        }
        let segment = SafeSegment::try_new(name)?;
        let target = self.manager.child_path(&self.current, &segment)?;
        self.go_to(target).await
    }

    /// Go to the parent folder. Fails with [`Error::AtRoot`] at the top.
    pub async fn navigate_up(&mut self) -> Result<()> {
        let target = self.current.parent()?;
        self.go_to(target).await
    }

    /// Flip whether `name` is selected. Returns the new state.
    pub fn toggle_selection(&mut self, name: &str) -> Result<bool> {
        self.entry(name)?;
        if self.selection.remove(name) {
            Ok(false)
        } else {
            self.selection.insert(name.to_string());
            Ok(true)
        }
    }

    pub fn select_all(&mut self) {
        self.selection = self.listing.entries.iter().map(|e| e.name.clone()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Create a subfolder of the current folder and re-list.
    pub async fn create_folder(&mut self, raw_name: &str) -> Result<VirtualPath> {
        let folder = self.manager.create_folder(&self.current, raw_name).await?;
        self.refresh_after_change().await;
        Ok(folder)
    }

    /// Upload into the current folder and re-list.
    pub async fn upload_file(
        &mut self,
        raw_name: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<String> {
        let key = self
            .manager
            .upload_file(&self.current, raw_name, data, content_type)
            .await?;
        self.refresh_after_change().await;
        Ok(key)
    }

    /// Delete the selected entries, including folder contents.
    ///
    /// The selection is cleared and the folder re-listed once anything was
    /// attempted, even if some keys failed.
    pub async fn delete_selected(&mut self, cancel: &CancelFlag) -> Result<DeleteReport> {
        if self.selection.is_empty() {
            return Err(Error::NothingSelected);
        }
        let request = DeleteRequest::Selected(self.selection.clone());
        self.delete(&request, cancel).await
    }

    /// Delete every entry in the current folder. The folder itself stays.
    pub async fn delete_all(&mut self, confirm: ConfirmDeleteAll, cancel: &CancelFlag) -> Result<DeleteReport> {
        self.delete(&DeleteRequest::Everything(confirm), cancel).await
    }

    /// Archive the selection, or the whole folder when nothing is selected.
    /// Session state is not touched.
    pub async fn download_selected<F>(&self, cancel: &CancelFlag, on_progress: F) -> Result<ArchiveBundle>
    where
        F: FnMut(&ArchiveProgress),
    {
        self.manager
            .download(&self.current, &self.selection, cancel, on_progress)
            .await
    }

    /// URL for opening the file `name` in the current folder.
    pub async fn open_file(&self, name: &str) -> Result<String> {
        self.manager.public_url(&self.current, name).await
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.listing.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
            path: self.current.render(),
        })
    }

    async fn go_to(&mut self, target: VirtualPath) -> Result<()> {
        let listing = self.manager.list_folder(&target).await?;
        debug!(from = %self.current, to = %target, "navigated");
        self.current = target;
        self.listing = listing;
        self.selection.clear();
        Ok(())
    }

    async fn delete(&mut self, request: &DeleteRequest, cancel: &CancelFlag) -> Result<DeleteReport> {
        let report = self.manager.delete(&self.current, request, cancel).await?;
        self.selection.clear();
        self.refresh_after_change().await;
        Ok(report)
    }

    async fn refresh_after_change(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!(folder = %self.current, error = %e, "re-list after change failed");
        }
    }
}
