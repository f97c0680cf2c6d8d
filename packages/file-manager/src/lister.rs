//! Folder listings, single level and recursive.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use keepfs_object_store::{ObjectEntry, ObjectStore, ObjectStoreError};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::marker::{is_folder_entry, is_marker_name, marker_key_for, MARKER_NAME};
use crate::path::VirtualPath;

/// One user-facing row of a folder listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    pub is_folder: bool,
    pub size_bytes: Option<u64>,
    pub mime_type: Option<String>,
}

impl From<ObjectEntry> for Entry {
    fn from(object: ObjectEntry) -> Self {
        Self {
            is_folder: is_folder_entry(&object),
            name: object.name,
            size_bytes: object.size_bytes,
            mime_type: object.content_type,
        }
    }
}

/// The entries directly inside one folder, markers removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderListing {
    pub path: VirtualPath,
    /// Folders first, then files, each by case-insensitive name.
    pub entries: Vec<Entry>,
    /// Set when the store was unreachable and `entries` is a stand-in.
    pub retry_available: bool,
}

impl FolderListing {
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn folders(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_folder)
    }

    pub fn files(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| !e.is_folder)
    }
}

/// What a key in a recursive listing stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TreeEntryKind {
    File,
    /// The `.keep` marker of a folder inside the walked tree.
    Marker,
}

/// One key found by a recursive listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub key: String,
    pub kind: TreeEntryKind,
}

impl TreeEntry {
    pub fn file(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: TreeEntryKind::File,
        }
    }

    pub fn marker(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: TreeEntryKind::Marker,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == TreeEntryKind::Marker
    }
}

/// Every key beneath a folder, in post-order.
///
/// Files precede the marker of every folder that contains them. The walked
/// folder's own marker is not included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeListing {
    pub entries: Vec<TreeEntry>,
    /// Folder keys whose listing failed. Their markers, and the markers of
    /// every folder above them, are withheld.
    pub failed_prefixes: Vec<String>,
}

impl TreeListing {
    /// True if some folder could not be listed.
    pub fn is_partial(&self) -> bool {
        !self.failed_prefixes.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| !e.is_folder())
    }

    pub fn markers(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.is_folder())
    }

    /// The listing as an error, if it is partial.
    pub fn partial_error(&self) -> Option<Error> {
        self.is_partial().then(|| Error::PartialListing {
            failed_prefixes: self.failed_prefixes.clone(),
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortPart<'a> {
    Name(&'a str),
    FolderEnd,
}

fn sort_parts(entry: &TreeEntry) -> impl Iterator<Item = SortPart<'_>> {
    let marker = entry.is_folder();
    let key = if marker {
        entry
            .key
            .strip_suffix(MARKER_NAME)
            .and_then(|k| k.strip_suffix('/'))
            .unwrap_or(&entry.key)
    } else {
        &entry.key
    };
    key.split('/')
        .map(SortPart::Name)
        .chain(marker.then_some(SortPart::FolderEnd))
}

/// Total post-order on tree entries.
///
/// A marker sorts after every key beneath its folder, so replaying a sorted
/// listing removes a folder's contents before the folder itself. The order
/// does not depend on the order listings completed in.
pub fn post_order_cmp(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    sort_parts(a).cmp(sort_parts(b))
}

/// True if no marker precedes a key inside its own folder.
pub fn is_post_ordered<'a>(keys: impl IntoIterator<Item = &'a str>) -> bool {
    let keys: Vec<&str> = keys.into_iter().collect();
    keys.iter().enumerate().all(|(i, key)| {
        let Some(folder) = key
            .strip_suffix(MARKER_NAME)
            .and_then(|k| k.strip_suffix('/'))
        else {
            return true;
        };
        let inside = format!("{}/", folder);
        keys[i + 1..]
            .iter()
            .all(|later| !later.starts_with(&inside))
    })
}

struct FolderNode {
    key: String,
    children: Vec<usize>,
    listed: bool,
}

/// Enumerates folders through the object store.
#[derive(Clone)]
pub struct RecursiveLister {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
}

impl RecursiveLister {
    /// `concurrency` bounds how many sibling listings are in flight; `1`
    /// walks strictly one folder at a time.
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// List one folder for display.
    ///
    /// An unreachable store degrades to an empty listing with
    /// `retry_available` set instead of failing.
    pub async fn list_folder(&self, folder: &VirtualPath) -> Result<FolderListing> {
        let prefix = folder.render();
        let objects = match self.store.list(&prefix).await {
            Ok(objects) => objects,
            Err(e) if e.is_unavailable() => {
                warn!(prefix = %prefix, error = %e, "store unavailable, showing empty listing");
                return Ok(FolderListing {
                    path: folder.clone(),
                    entries: Vec::new(),
                    retry_available: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<Entry> = objects
            .into_iter()
            .filter(|o| !is_marker_name(&o.name))
            .map(Entry::from)
            .collect();
        entries.sort_by(|a, b| {
            b.is_folder
                .cmp(&a.is_folder)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        debug!(prefix = %prefix, count = entries.len(), "listed folder");
        Ok(FolderListing {
            path: folder.clone(),
            entries,
            retry_available: false,
        })
    }

    /// Raw single-level listing of a key prefix.
    pub async fn list_children(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        Ok(self.store.list(prefix).await?)
    }

    /// Every file and nested folder marker beneath `folder_key`.
    ///
    /// A folder that fails to list does not abort the walk; it is recorded
    /// in `failed_prefixes` and the rest of the tree is still gathered.
    /// An object stored without a content type is walked as a folder and
    /// also returned as a file. Cancellation discards everything gathered
    /// so far.
    pub async fn list_tree(&self, folder_key: &str, cancel: &CancelFlag) -> Result<TreeListing> {
        let mut nodes = vec![FolderNode {
            key: folder_key.to_string(),
            children: Vec::new(),
            listed: false,
        }];
        let mut queue = VecDeque::from([0usize]);
        let mut files = Vec::new();
        let mut failed_prefixes = Vec::new();
        let mut in_flight: JoinSet<(usize, std::result::Result<Vec<ObjectEntry>, ObjectStoreError>)> =
            JoinSet::new();

        loop {
            cancel.check()?;

            while in_flight.len() < self.concurrency {
                let Some(index) = queue.pop_front() else {
                    break;
                };
                let store = Arc::clone(&self.store);
                let prefix = nodes[index].key.clone();
                in_flight.spawn(async move {
                    let result = store.list(&prefix).await;
                    (index, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (index, result) =
                joined.map_err(|e| Error::from(ObjectStoreError::Transport(Box::new(e))))?;

            match result {
                Ok(children) => {
                    nodes[index].listed = true;
                    debug!(prefix = %nodes[index].key, count = children.len(), "listed tree level");
                    for child in children {
                        if is_marker_name(&child.name) {
                            continue;
                        }
                        let key = format!("{}/{}", nodes[index].key, child.name);
                        if is_folder_entry(&child) {
                            if child.size_bytes.is_some() {
                                debug!(key = %key, "untyped object listed as a folder");
                                files.push(TreeEntry::file(key.clone()));
                            }
                            let child_index = nodes.len();
                            nodes.push(FolderNode {
                                key,
                                children: Vec::new(),
                                listed: false,
                            });
                            nodes[index].children.push(child_index);
                            queue.push_back(child_index);
                        } else {
                            files.push(TreeEntry::file(key));
                        }
                    }
                }
                Err(e) => {
                    warn!(prefix = %nodes[index].key, error = %e, "listing failed, tree will be partial");
                    failed_prefixes.push(nodes[index].key.clone());
                }
            }
        }

        // Children are always pushed after their parent, so a reverse sweep
        // sees every child before the folder containing it.
        let mut complete = vec![false; nodes.len()];
        for index in (0..nodes.len()).rev() {
            complete[index] =
                nodes[index].listed && nodes[index].children.iter().all(|&c| complete[c]);
        }

        let mut entries = files;
        entries.extend(
            nodes
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(index, _)| complete[*index])
                .map(|(_, node)| TreeEntry::marker(marker_key_for(&node.key))),
        );
        entries.sort_by(post_order_cmp);
        failed_prefixes.sort();

        info!(
            root = %folder_key,
            keys = entries.len(),
            folders = nodes.len() - 1,
            failed = failed_prefixes.len(),
            "listed tree"
        );
        Ok(TreeListing {
            entries,
            failed_prefixes,
        })
    }
}
