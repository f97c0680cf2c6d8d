//! Bundling selected files and folders into one `.tar.gz` download.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use keepfs_object_store::{ObjectEntry, ObjectStore, ObjectStoreError};
use tar::{Builder, EntryType, Header};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::lister::RecursiveLister;
use crate::marker::{is_folder_entry, is_marker_name};
use crate::path::VirtualPath;

/// One file to place in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source_key: String,
    /// Path inside the archive, relative to the folder being exported.
    pub archive_path: String,
}

/// Every file an archive request covers, in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub folder: VirtualPath,
    pub entries: Vec<ManifestEntry>,
    pub failed_prefixes: Vec<String>,
    pub missing: Vec<String>,
}

impl ArchiveManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Progress through the downloads of one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveProgress {
    pub completed: usize,
    pub total: usize,
    pub current_key: String,
}

/// A finished archive.
#[derive(Debug, Clone)]
pub struct ArchiveBundle {
    pub file_name: String,
    pub bytes: Bytes,
    /// Archive paths written, in order.
    pub included: Vec<String>,
    /// Source keys that could not be downloaded or written.
    pub skipped: Vec<String>,
}

impl ArchiveBundle {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// `<folder>.tar.gz`, or `<contractId>.tar.gz` at the contract root.
pub fn archive_file_name(folder: &VirtualPath) -> String {
    let stem = folder
        .name()
        .unwrap_or_else(|| folder.contract_root().contract_id());
    format!("{}.tar.gz", stem)
}

/// Plans and builds archives.
#[derive(Clone)]
pub struct ArchiveBundler {
    store: Arc<dyn ObjectStore>,
    lister: RecursiveLister,
    concurrency: usize,
    progress_threshold: usize,
}

impl ArchiveBundler {
    /// Progress is only reported for archives with more than
    /// `progress_threshold` files.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        lister: RecursiveLister,
        concurrency: usize,
        progress_threshold: usize,
    ) -> Self {
        Self {
            store,
            lister,
            concurrency: concurrency.max(1),
            progress_threshold,
        }
    }

    /// Resolve `names` in `folder` to the files they cover.
    ///
    /// An empty `names` covers everything in the folder. Folder markers are
    /// never archived.
    pub async fn plan_archive(
        &self,
        folder: &VirtualPath,
        names: &BTreeSet<String>,
        cancel: &CancelFlag,
    ) -> Result<ArchiveManifest> {
        let children: Vec<ObjectEntry> = self
            .lister
            .list_children(&folder.render())
            .await?
            .into_iter()
            .filter(|child| !is_marker_name(&child.name))
            .collect();

        let mut missing = Vec::new();
        let targets: Vec<&ObjectEntry> = if names.is_empty() {
            children.iter().collect()
        } else {
            names
                .iter()
                .filter_map(|name| {
                    let found = children.iter().find(|c| &c.name == name);
                    if found.is_none() {
                        warn!(folder = %folder, name = %name, "selected entry not found");
                        missing.push(name.clone());
                    }
                    found
                })
                .collect()
        };
        if targets.is_empty() {
            if let Some(name) = missing.first() {
                return Err(Error::NotFound {
                    name: name.clone(),
                    path: folder.render(),
                });
            }
        }

        let mut entries = Vec::new();
        let mut failed_prefixes = Vec::new();
        for target in targets {
            cancel.check()?;
            let key = folder.child_key(&target.name);
            if is_folder_entry(target) {
                let tree = self.lister.list_tree(&key, cancel).await?;
                for file in tree.files() {
                    if let Some(relative) = folder.relative_key(&file.key) {
                        entries.push(ManifestEntry {
                            source_key: file.key.clone(),
                            archive_path: relative.to_string(),
                        });
                    }
                }
                failed_prefixes.extend(tree.failed_prefixes);
                if target.size_bytes.is_some() {
                    debug!(key = %key, "untyped object listed as a folder, archiving it too");
                    entries.push(ManifestEntry {
                        source_key: key,
                        archive_path: target.name.clone(),
                    });
                }
            } else {
                entries.push(ManifestEntry {
                    source_key: key,
                    archive_path: target.name.clone(),
                });
            }
        }

        if !failed_prefixes.is_empty() {
            warn!(
                folder = %folder,
                failed = failed_prefixes.len(),
                "some folders could not be listed and are left out of the archive"
            );
        }
        debug!(folder = %folder, files = entries.len(), "planned archive");
        Ok(ArchiveManifest {
            folder: folder.clone(),
            entries,
            failed_prefixes,
            missing,
        })
    }

    /// Download every manifest entry and write the archive.
    ///
    /// Downloads run up to `concurrency` at a time but are written in
    /// manifest order. A failed download, or a path the archive format
    /// refuses, is skipped and reported in [`ArchiveBundle::skipped`]; if
    /// nothing is written the result is [`Error::EmptyArchive`]. Cancellation discards the partial archive.
    pub async fn build_archive<F>(
        &self,
        manifest: &ArchiveManifest,
        cancel: &CancelFlag,
        mut on_progress: F,
    ) -> Result<ArchiveBundle>
    where
        F: FnMut(&ArchiveProgress),
    {
        let total = manifest.entries.len();
        let report_progress = total > self.progress_threshold;
        let mut writer = ArchiveWriter::new();
        let mut included = Vec::new();
        let mut skipped = Vec::new();
        let mut completed = 0;

        for chunk in manifest.entries.chunks(self.concurrency) {
            cancel.check()?;

            let mut downloads: JoinSet<(usize, std::result::Result<Bytes, ObjectStoreError>)> =
                JoinSet::new();
            for (index, entry) in chunk.iter().enumerate() {
                let store = Arc::clone(&self.store);
                let key = entry.source_key.clone();
                downloads.spawn(async move { (index, store.download(&key).await) });
            }

            let mut slots: Vec<Option<std::result::Result<Bytes, ObjectStoreError>>> =
                chunk.iter().map(|_| None).collect();
            while let Some(joined) = downloads.join_next().await {
                let (index, result) =
                    joined.map_err(|e| Error::from(ObjectStoreError::Transport(Box::new(e))))?;
                slots[index] = Some(result);
            }
            cancel.check()?;

            for (entry, slot) in chunk.iter().zip(slots) {
                match slot {
                    Some(Ok(data)) => match writer.append(&entry.archive_path, &data) {
                        Ok(()) => included.push(entry.archive_path.clone()),
                        Err(e) => {
                            warn!(key = %entry.source_key, error = %e, "skipping file the archive refused");
                            skipped.push(entry.source_key.clone());
                        }
                    },
                    Some(Err(e)) => {
                        warn!(key = %entry.source_key, error = %e, "skipping file that failed to download");
                        skipped.push(entry.source_key.clone());
                    }
                    None => skipped.push(entry.source_key.clone()),
                }
                completed += 1;
                if report_progress {
                    on_progress(&ArchiveProgress {
                        completed,
                        total,
                        current_key: entry.source_key.clone(),
                    });
                }
            }
        }

        if included.is_empty() {
            return Err(Error::EmptyArchive { attempted: total });
        }

        let bytes = writer.finish()?;
        let file_name = archive_file_name(&manifest.folder);
        info!(
            archive = %file_name,
            included = included.len(),
            skipped = skipped.len(),
            size = bytes.len(),
            "archive built"
        );
        Ok(ArchiveBundle {
            file_name,
            bytes,
            included,
            skipped,
        })
    }
}

struct ArchiveWriter {
    builder: Builder<GzEncoder<Vec<u8>>>,
}

impl ArchiveWriter {
    fn new() -> Self {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        Self {
            builder: Builder::new(encoder),
        }
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        self.builder.append_data(&mut header, path, data)?;
        Ok(())
    }

    fn finish(self) -> Result<Bytes> {
        let mut encoder = self.builder.into_inner()?;
        encoder.flush()?;
        Ok(Bytes::from(encoder.finish()?))
    }
}
