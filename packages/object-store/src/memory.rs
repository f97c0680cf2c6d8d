//! In-memory object store with fault injection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ObjectEntry, ObjectStore, ObjectStoreError, RemoveOutcome, Result};

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

#[derive(Default)]
struct Faults {
    list: BTreeSet<String>,
    remove: BTreeSet<String>,
    download: BTreeSet<String>,
    upload: BTreeSet<String>,
    unavailable: bool,
}

/// Counters of backend calls, for asserting batching behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub remove: usize,
    pub upload: usize,
    pub download: usize,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    faults: Faults,
    calls: CallCounts,
}

/// A `BTreeMap`-backed object store.
///
/// Listing follows flat-store conventions: objects directly under a prefix
/// come back with metadata, deeper keys come back as one bare prefix entry
/// per child name. Faults can be injected per key or prefix to exercise
/// partial-failure paths.
///
/// # Example
///
/// ```rust,ignore
/// use keepfs_object_store::{InMemoryObjectStore, ObjectStore};
/// use bytes::Bytes;
///
/// let store = InMemoryObjectStore::new();
/// store.upload("uploads/c1/a.txt", Bytes::from_static(b"hi"), Some("text/plain")).await?;
/// let entries = store.list("uploads/c1").await?;
/// assert_eq!(entries[0].name, "a.txt");
/// ```
#[derive(Default)]
pub struct InMemoryObjectStore {
    state: Mutex<State>,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ObjectStoreError::unavailable("lock poisoned"))
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an object directly, bypassing the no-overwrite rule.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, content_type: Option<&str>) {
        self.lock_or_recover().objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    /// True if an object is stored at exactly `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.lock_or_recover().objects.contains_key(key)
    }

    /// All stored keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.lock_or_recover().objects.keys().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock_or_recover().objects.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `list` fail for exactly this prefix.
    pub fn fail_list(&self, prefix: impl Into<String>) {
        self.lock_or_recover().faults.list.insert(prefix.into());
    }

    /// Make `remove` report this key as failed.
    pub fn fail_remove(&self, key: impl Into<String>) {
        self.lock_or_recover().faults.remove.insert(key.into());
    }

    /// Make `download` fail for this key.
    pub fn fail_download(&self, key: impl Into<String>) {
        self.lock_or_recover().faults.download.insert(key.into());
    }

    /// Make `upload` fail for this key.
    pub fn fail_upload(&self, key: impl Into<String>) {
        self.lock_or_recover().faults.upload.insert(key.into());
    }

    /// Make every call fail as if the backend were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock_or_recover().faults.unavailable = unavailable;
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.lock_or_recover().faults = Faults::default();
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        self.lock_or_recover().calls
    }
}

fn unavailable() -> ObjectStoreError {
    ObjectStoreError::unavailable("injected outage")
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let mut state = self.lock()?;
        state.calls.list += 1;
        if state.faults.unavailable {
            return Err(unavailable());
        }
        if state.faults.list.contains(prefix) {
            return Err(ObjectStoreError::Timeout {
                operation: format!("list {}", prefix),
            });
        }

        let scope = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };

        let mut entries = Vec::new();
        let mut seen_prefixes = BTreeSet::new();
        for (key, object) in state.objects.range(scope.clone()..) {
            let Some(rest) = key.strip_prefix(&scope) else {
                break;
            };
            match rest.split_once('/') {
                None if !rest.is_empty() => entries.push(ObjectEntry::object(
                    rest,
                    object.data.len() as u64,
                    object.content_type.clone(),
                )),
                Some((child, _)) if !child.is_empty() => {
                    if seen_prefixes.insert(child.to_string()) {
                        entries.push(ObjectEntry::prefix(child));
                    }
                }
                _ => {}
            }
        }

        Ok(entries)
    }

    async fn remove(&self, keys: &[String]) -> Result<RemoveOutcome> {
        let mut state = self.lock()?;
        state.calls.remove += 1;
        if state.faults.unavailable {
            return Err(unavailable());
        }

        let mut outcome = RemoveOutcome::default();
        for key in keys {
            if state.faults.remove.contains(key) {
                outcome.failed_keys.push(key.clone());
                continue;
            }
            state.objects.remove(key);
        }
        Ok(outcome)
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let mut state = self.lock()?;
        state.calls.upload += 1;
        if state.faults.unavailable {
            return Err(unavailable());
        }
        if state.faults.upload.contains(key) {
            return Err(ObjectStoreError::Timeout {
                operation: format!("upload {}", key),
            });
        }
        if key.is_empty() || key.split('/').any(str::is_empty) {
            return Err(ObjectStoreError::InvalidKey {
                key: key.to_string(),
                message: "empty segment".to_string(),
            });
        }
        if state.objects.contains_key(key) {
            return Err(ObjectStoreError::AlreadyExists {
                key: key.to_string(),
            });
        }

        state.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        let mut state = self.lock()?;
        state.calls.download += 1;
        if state.faults.unavailable {
            return Err(unavailable());
        }
        if state.faults.download.contains(key) {
            return Err(ObjectStoreError::Timeout {
                operation: format!("download {}", key),
            });
        }
        state
            .objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| ObjectStoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn public_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory:///{}", key))
    }
}
