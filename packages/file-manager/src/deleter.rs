//! Recursive deletion of files and folders.
//!
//! Deletion runs in two phases. `plan_delete` expands the request into a
//! flat, post-ordered [`DeletionSet`] without touching anything.
//! `execute_delete` replays it in bounded batches and reports per-key
//! failures instead of stopping at the first one.

use std::collections::BTreeSet;
use std::sync::Arc;

use keepfs_object_store::{ObjectEntry, ObjectStore};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::lister::{is_post_ordered, RecursiveLister};
use crate::marker::{is_folder_entry, is_marker_name, marker_key_for};
use crate::path::VirtualPath;

/// Explicit acknowledgement required to delete everything in a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmDeleteAll(());

impl ConfirmDeleteAll {
    /// The caller has shown its own confirmation for emptying the folder.
    pub fn confirmed() -> Self {
        ConfirmDeleteAll(())
    }
}

/// What to delete inside a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteRequest {
    /// The named entries. An empty set is refused with
    /// [`Error::NothingSelected`]; it never means "everything".
    Selected(BTreeSet<String>),
    /// Every entry directly in the folder. The folder itself stays.
    Everything(ConfirmDeleteAll),
}

/// The flattened keys one delete request expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionSet {
    pub folder: VirtualPath,
    /// File keys and folder markers, each file before the marker of every
    /// folder containing it.
    pub keys: Vec<String>,
    /// Subfolders that could not be listed; see [`TreeListing`](crate::TreeListing).
    pub failed_prefixes: Vec<String>,
    /// Selected names that were not in the folder.
    pub missing: Vec<String>,
}

impl DeletionSet {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True if part of the tree could not be enumerated.
    pub fn is_partial(&self) -> bool {
        !self.failed_prefixes.is_empty()
    }

    pub fn is_post_ordered(&self) -> bool {
        is_post_ordered(self.keys.iter().map(String::as_str))
    }
}

/// Outcome of replaying a [`DeletionSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub succeeded_count: usize,
    pub failed_keys: Vec<String>,
    /// Keys never sent because the operation was cancelled part way.
    pub skipped_keys: Vec<String>,
}

impl DeleteReport {
    /// True if every key was removed.
    pub fn is_complete(&self) -> bool {
        self.failed_keys.is_empty() && self.skipped_keys.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        !self.skipped_keys.is_empty()
    }

    /// The non-blocking [`Error::PartialDelete`] when some keys failed.
    pub fn partial_error(&self) -> Option<Error> {
        (!self.failed_keys.is_empty()).then(|| Error::PartialDelete {
            succeeded: self.succeeded_count,
            failed_keys: self.failed_keys.clone(),
        })
    }

    /// One-line summary with counts.
    pub fn summary(&self) -> String {
        let attempted = self.succeeded_count + self.failed_keys.len();
        let mut summary = format!("Deleted {} of {} item(s)", self.succeeded_count, attempted);
        if !self.failed_keys.is_empty() {
            summary.push_str(&format!("; {} failed", self.failed_keys.len()));
        }
        if !self.skipped_keys.is_empty() {
            summary.push_str(&format!(
                "; cancelled before {} item(s)",
                self.skipped_keys.len()
            ));
        }
        summary
    }
}

/// Plans and executes recursive deletes.
#[derive(Clone)]
pub struct BatchDeleter {
    store: Arc<dyn ObjectStore>,
    lister: RecursiveLister,
    batch_size: usize,
}

impl BatchDeleter {
    pub fn new(store: Arc<dyn ObjectStore>, lister: RecursiveLister, batch_size: usize) -> Self {
        Self {
            store,
            lister,
            batch_size: batch_size.max(1),
        }
    }

    /// Expand a request into every key it implies.
    ///
    /// A selected file contributes its own key. A selected folder
    /// contributes its whole tree followed by its own marker; if part of the
    /// tree could not be listed the marker is withheld and the set is
    /// flagged partial.
    pub async fn plan_delete(
        &self,
        folder: &VirtualPath,
        request: &DeleteRequest,
        cancel: &CancelFlag,
    ) -> Result<DeletionSet> {
        let children: Vec<ObjectEntry> = self
            .lister
            .list_children(&folder.render())
            .await?
            .into_iter()
            .filter(|child| !is_marker_name(&child.name))
            .collect();

        let mut missing = Vec::new();
        let targets: Vec<&ObjectEntry> = match request {
            DeleteRequest::Selected(names) if names.is_empty() => {
                return Err(Error::NothingSelected)
            }
            DeleteRequest::Selected(names) => names
                .iter()
                .filter_map(|name| {
                    let found = children.iter().find(|c| &c.name == name);
                    if found.is_none() {
                        warn!(folder = %folder, name = %name, "selected entry not found");
                        missing.push(name.clone());
                    }
                    found
                })
                .collect(),
            DeleteRequest::Everything(_) => {
                info!(folder = %folder, "planning delete of every entry");
                children.iter().collect()
            }
        };

        if targets.is_empty() {
            if let Some(name) = missing.first() {
                return Err(Error::NotFound {
                    name: name.clone(),
                    path: folder.render(),
                });
            }
        }

        let mut keys = Vec::new();
        let mut failed_prefixes = Vec::new();
        for target in targets {
            cancel.check()?;
            let key = folder.child_key(&target.name);
            if is_folder_entry(target) {
                let tree = self.lister.list_tree(&key, cancel).await?;
                if tree.entries.is_empty() && !tree.is_partial() {
                    debug!(key = %key, "folder has nothing beneath it");
                }
                let complete = !tree.is_partial();
                keys.extend(tree.entries.into_iter().map(|e| e.key));
                failed_prefixes.extend(tree.failed_prefixes);
                // An object stored at the folder's own key has no content type.
                if target.size_bytes.is_some() {
                    debug!(key = %key, "untyped object listed as a folder, removing it too");
                    keys.push(key.clone());
                }
                if complete {
                    keys.push(marker_key_for(&key));
                }
            } else {
                keys.push(key);
            }
        }

        debug!(folder = %folder, keys = keys.len(), "planned delete");
        Ok(DeletionSet {
            folder: folder.clone(),
            keys,
            failed_prefixes,
            missing,
        })
    }

    /// Remove every key in `set`, in order, `batch_size` keys per call.
    ///
    /// A failed key, or a failed batch call, is recorded and the remaining
    /// batches still run. Cancellation before the first batch removes
    /// nothing and returns [`Error::Cancelled`]; after that it stops issuing
    /// batches and lists the unsent keys in `skipped_keys`.
    pub async fn execute_delete(&self, set: &DeletionSet, cancel: &CancelFlag) -> Result<DeleteReport> {
        cancel.check()?;

        let mut report = DeleteReport::default();
        for (index, batch) in set.keys.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                let sent = index * self.batch_size;
                report.skipped_keys = set.keys[sent..].to_vec();
                warn!(folder = %set.folder, skipped = report.skipped_keys.len(), "delete cancelled");
                break;
            }

            match self.store.remove(batch).await {
                Ok(outcome) => {
                    let reported: BTreeSet<&String> = outcome.failed_keys.iter().collect();
                    let failed: Vec<String> = batch
                        .iter()
                        .filter(|key| reported.contains(key))
                        .cloned()
                        .collect();
                    if reported.len() > failed.len() {
                        debug!(reported = ?outcome.failed_keys, "ignoring failures for keys outside the batch");
                    }
                    report.succeeded_count += batch.len() - failed.len();
                    if !failed.is_empty() {
                        warn!(failed = ?failed, "some keys could not be removed");
                    }
                    report.failed_keys.extend(failed);
                }
                Err(e) => {
                    warn!(error = %e, batch = batch.len(), "remove call failed");
                    report.failed_keys.extend(batch.iter().cloned());
                }
            }
        }

        info!(folder = %set.folder, "{}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ContractRoot;
    use async_trait::async_trait;
    use bytes::Bytes;
    use keepfs_object_store::{InMemoryObjectStore, RemoveOutcome};

    /// Forwards to an in-memory store. `remove` repeats every failure and
    /// adds a key that was never requested; it can also raise a cancel
    /// flag once the call has gone through.
    struct Relay {
        inner: Arc<InMemoryObjectStore>,
        noisy_failures: bool,
        cancel_on_remove: Option<CancelFlag>,
    }

    impl Relay {
        fn noisy(inner: &Arc<InMemoryObjectStore>) -> Self {
            Self {
                inner: inner.clone(),
                noisy_failures: true,
                cancel_on_remove: None,
            }
        }

        fn cancelling(inner: &Arc<InMemoryObjectStore>, cancel: &CancelFlag) -> Self {
            Self {
                inner: inner.clone(),
                noisy_failures: false,
                cancel_on_remove: Some(cancel.clone()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for Relay {
        async fn list(&self, prefix: &str) -> keepfs_object_store::Result<Vec<ObjectEntry>> {
            self.inner.list(prefix).await
        }

        async fn remove(&self, keys: &[String]) -> keepfs_object_store::Result<RemoveOutcome> {
            let mut outcome = self.inner.remove(keys).await?;
            if self.noisy_failures {
                let repeated = outcome.failed_keys.clone();
                outcome.failed_keys.extend(repeated);
                outcome.failed_keys.push("uploads/c1/elsewhere.txt".to_string());
            }
            if let Some(cancel) = &self.cancel_on_remove {
                cancel.cancel();
            }
            Ok(outcome)
        }

        async fn upload(
            &self,
            key: &str,
            data: Bytes,
            content_type: Option<&str>,
        ) -> keepfs_object_store::Result<()> {
            self.inner.upload(key, data, content_type).await
        }

        async fn download(&self, key: &str) -> keepfs_object_store::Result<Bytes> {
            self.inner.download(key).await
        }

        fn public_url(&self, key: &str) -> keepfs_object_store::Result<String> {
            self.inner.public_url(key)
        }
    }

    fn seeded() -> Arc<InMemoryObjectStore> {
        let store = InMemoryObjectStore::new();
        store.insert("uploads/c1/.keep", Bytes::new(), None);
        store.insert("uploads/c1/x.pdf", &b"x"[..], Some("application/pdf"));
        store.insert("uploads/c1/y.pdf", &b"y"[..], Some("application/pdf"));
        store.insert("uploads/c1/F/.keep", Bytes::new(), None);
        store.insert("uploads/c1/F/1.txt", &b"1"[..], Some("text/plain"));
        store.insert("uploads/c1/F/G/.keep", Bytes::new(), None);
        store.insert("uploads/c1/F/G/2.txt", &b"2"[..], Some("text/plain"));
        Arc::new(store)
    }

    fn deleter(store: &Arc<InMemoryObjectStore>, batch_size: usize) -> BatchDeleter {
        let lister = RecursiveLister::new(store.clone(), 1);
        BatchDeleter::new(store.clone(), lister, batch_size)
    }

    fn root() -> VirtualPath {
        ContractRoot::new("uploads", "c1").unwrap().path()
    }

    fn select(names: &[&str]) -> DeleteRequest {
        DeleteRequest::Selected(names.iter().map(|n| n.to_string()).collect())
    }

    #[tokio::test]
    async fn plan_expands_folders_post_order() {
        let store = seeded();
        let set = deleter(&store, 100)
            .plan_delete(&root(), &select(&["F", "x.pdf"]), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(
            set.keys,
            vec![
                "uploads/c1/F/1.txt",
                "uploads/c1/F/G/2.txt",
                "uploads/c1/F/G/.keep",
                "uploads/c1/F/.keep",
                "uploads/c1/x.pdf",
            ]
        );
        assert!(set.is_post_ordered());
        assert!(!set.is_partial());
        // Planning removes nothing.
        assert_eq!(store.len(), 7);
    }

    #[tokio::test]
    async fn empty_selection_is_refused() {
        let store = seeded();
        let err = deleter(&store, 100)
            .plan_delete(&root(), &select(&[]), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NothingSelected));
    }

    #[tokio::test]
    async fn delete_everything_keeps_the_folder_marker() {
        let store = seeded();
        let deleter = deleter(&store, 100);
        let request = DeleteRequest::Everything(ConfirmDeleteAll::confirmed());
        let set = deleter
            .plan_delete(&root(), &request, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(set.len(), 6);

        let report = deleter.execute_delete(&set, &CancelFlag::new()).await.unwrap();
        assert_eq!(report.succeeded_count, 6);
        assert_eq!(store.keys(), vec!["uploads/c1/.keep".to_string()]);
    }

    #[tokio::test]
    async fn unknown_names_are_reported() {
        let store = seeded();
        let deleter = deleter(&store, 100);
        let set = deleter
            .plan_delete(&root(), &select(&["ghost", "y.pdf"]), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(set.keys, vec!["uploads/c1/y.pdf"]);
        assert_eq!(set.missing, vec!["ghost".to_string()]);

        let err = deleter
            .plan_delete(&root(), &select(&["ghost"]), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref name, .. } if name == "ghost"));
    }

    #[tokio::test]
    async fn execute_batches_and_reports_failures() {
        let store = seeded();
        store.fail_remove("uploads/c1/F/1.txt");
        let deleter = deleter(&store, 2);
        let set = deleter
            .plan_delete(&root(), &select(&["F", "x.pdf", "y.pdf"]), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(set.len(), 6);

        let report = deleter.execute_delete(&set, &CancelFlag::new()).await.unwrap();
        assert_eq!(store.calls().remove, 3);
        assert_eq!(report.succeeded_count, 5);
        assert_eq!(report.failed_keys, vec!["uploads/c1/F/1.txt".to_string()]);
        assert!(!report.is_complete());
        assert!(matches!(
            report.partial_error(),
            Some(Error::PartialDelete { succeeded: 5, .. })
        ));
        assert_eq!(report.summary(), "Deleted 5 of 6 item(s); 1 failed");
        assert!(store.contains("uploads/c1/F/1.txt"));
    }

    #[tokio::test]
    async fn failed_batch_call_does_not_abort_the_rest() {
        let store = seeded();
        let deleter = deleter(&store, 1);
        let set = deleter
            .plan_delete(&root(), &select(&["x.pdf", "y.pdf"]), &CancelFlag::new())
            .await
            .unwrap();
        store.set_unavailable(true);
        let report = deleter.execute_delete(&set, &CancelFlag::new()).await.unwrap();
        assert_eq!(report.succeeded_count, 0);
        assert_eq!(report.failed_keys.len(), 2);
        assert_eq!(store.calls().remove, 2);
    }

    #[tokio::test]
    async fn partial_tree_withholds_folder_marker() {
        let store = seeded();
        store.fail_list("uploads/c1/F/G");
        let set = deleter(&store, 100)
            .plan_delete(&root(), &select(&["F"]), &CancelFlag::new())
            .await
            .unwrap();
        assert!(set.is_partial());
        assert_eq!(set.keys, vec!["uploads/c1/F/1.txt"]);
    }

    #[tokio::test]
    async fn cancel_before_execute_removes_nothing() {
        let store = seeded();
        let deleter = deleter(&store, 100);
        let set = deleter
            .plan_delete(&root(), &select(&["F"]), &CancelFlag::new())
            .await
            .unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = deleter.execute_delete(&set, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(store.len(), 7);
        assert_eq!(store.calls().remove, 0);
    }

    #[tokio::test]
    async fn cancelled_plan_is_discarded() {
        let store = seeded();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = deleter(&store, 100)
            .plan_delete(&root(), &select(&["F"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn repeated_and_foreign_failures_are_counted_once() {
        let store = seeded();
        store.fail_remove("uploads/c1/x.pdf");
        let lister = RecursiveLister::new(store.clone(), 1);
        let deleter = BatchDeleter::new(Arc::new(Relay::noisy(&store)), lister, 2);
        let set = deleter
            .plan_delete(&root(), &select(&["x.pdf", "y.pdf"]), &CancelFlag::new())
            .await
            .unwrap();

        let report = deleter.execute_delete(&set, &CancelFlag::new()).await.unwrap();
        assert_eq!(report.succeeded_count, 1);
        assert_eq!(report.failed_keys, vec!["uploads/c1/x.pdf".to_string()]);
        assert_eq!(report.summary(), "Deleted 1 of 2 item(s); 1 failed");
        assert!(store.contains("uploads/c1/x.pdf"));
        assert!(!store.contains("uploads/c1/y.pdf"));
    }

    #[tokio::test]
    async fn cancel_between_batches_reports_unsent_keys() {
        let store = Arc::new(InMemoryObjectStore::new());
        for name in ["a", "b", "c", "d", "e"] {
            store.insert(format!("uploads/c1/{}.txt", name), &b"t"[..], Some("text/plain"));
        }
        let cancel = CancelFlag::new();
        let lister = RecursiveLister::new(store.clone(), 1);
        let deleter = BatchDeleter::new(Arc::new(Relay::cancelling(&store, &cancel)), lister, 2);
        let set = deleter
            .plan_delete(&root(), &select(&["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]), &cancel)
            .await
            .unwrap();

        let report = deleter.execute_delete(&set, &cancel).await.unwrap();
        assert_eq!(store.calls().remove, 1);
        assert_eq!(report.succeeded_count, 2);
        assert!(report.failed_keys.is_empty());
        assert_eq!(
            report.skipped_keys,
            vec!["uploads/c1/c.txt", "uploads/c1/d.txt", "uploads/c1/e.txt"]
        );
        assert!(report.was_cancelled());
        assert!(!report.is_complete());
        assert_eq!(report.summary(), "Deleted 2 of 2 item(s); cancelled before 3 item(s)");
        assert_eq!(
            store.keys(),
            vec!["uploads/c1/c.txt", "uploads/c1/d.txt", "uploads/c1/e.txt"]
        );
    }

    #[tokio::test]
    async fn untyped_object_is_removed_with_its_folder_entry() {
        let store = seeded();
        store.insert("uploads/c1/blob", &b"raw"[..], None);
        let deleter = deleter(&store, 100);
        let set = deleter
            .plan_delete(&root(), &select(&["blob"]), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(set.keys, vec!["uploads/c1/blob", "uploads/c1/blob/.keep"]);

        let report = deleter.execute_delete(&set, &CancelFlag::new()).await.unwrap();
        assert!(report.is_complete());
        assert!(!store.contains("uploads/c1/blob"));
    }

    #[tokio::test]
    async fn untyped_object_inside_a_folder_is_removed() {
        let store = seeded();
        store.insert("uploads/c1/F/raw", &b"raw"[..], None);
        let deleter = deleter(&store, 100);
        let set = deleter
            .plan_delete(&root(), &select(&["F"]), &CancelFlag::new())
            .await
            .unwrap();
        assert!(set.keys.contains(&"uploads/c1/F/raw".to_string()));
        assert!(set.is_post_ordered());

        deleter.execute_delete(&set, &CancelFlag::new()).await.unwrap();
        assert!(!store.contains("uploads/c1/F/raw"));
        assert_eq!(store.len(), 3);
    }
}
