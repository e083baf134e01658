// Notification feed bookkeeping and server-mirrored mutations.
//
// NotificationStore is the pure in-memory collection; NotificationService
// wraps it with optimistic server mirroring. Every mutation applies locally
// first and is reverted if the backend rejects it, so the store never
// diverges from the server for longer than one round trip.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::Notification;
use crate::backend::{BackendError, NotificationBackend};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Ordered in-memory notification collection with read/unread bookkeeping.
///
/// Newest-first: channel pushes are prepended in arrival order, and rebuilds
/// sort by timestamp descending. The unread counter is clamped at zero.
#[derive(Debug, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
    unread: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        NotificationStore::default()
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the whole collection, e.g. from the server listing on login.
    /// Sorts newest-first and recomputes the unread counter.
    pub fn rebuild(&mut self, mut items: Vec<Notification>) {
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.unread = items.iter().filter(|n| !n.read).count();
        self.items = items;
    }

    /// Prepend a pushed notification. Arrival order wins over timestamps for
    /// placement. A notification already present (by id) is ignored, which
    /// absorbs channel replays.
    pub fn ingest(&mut self, notification: Notification) {
        if self.items.iter().any(|n| n.id == notification.id) {
            debug!("ignoring duplicate notification {}", notification.id);
            return;
        }
        if !notification.read {
            self.unread += 1;
        }
        self.items.insert(0, notification);
    }

    /// Mark one notification read. Idempotent: returns false (and leaves the
    /// counter alone) if it was already read or unknown.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Revert helper for optimistic mark_read. Returns false if the
    /// notification is unknown or already unread.
    pub fn mark_unread(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if n.read => {
                n.read = false;
                self.unread += 1;
                true
            }
            _ => false,
        }
    }

    /// Mark everything read; returns the ids that actually changed so the
    /// caller can revert.
    pub fn mark_all_read(&mut self) -> Vec<String> {
        let changed: Vec<String> = self
            .items
            .iter_mut()
            .filter(|n| !n.read)
            .map(|n| {
                n.read = true;
                n.id.clone()
            })
            .collect();
        self.unread = 0;
        changed
    }

    /// Remove one notification, returning its index and value for possible
    /// restoration.
    pub fn delete(&mut self, id: &str) -> Option<(usize, Notification)> {
        let index = self.items.iter().position(|n| n.id == id)?;
        let removed = self.items.remove(index);
        if !removed.read {
            self.unread = self.unread.saturating_sub(1);
        }
        Some((index, removed))
    }

    /// Put a deleted notification back where it was.
    pub fn restore(&mut self, index: usize, notification: Notification) {
        if !notification.read {
            self.unread += 1;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, notification);
    }

    /// Drain the whole collection, returning it for possible restoration.
    pub fn clear_all(&mut self) -> Vec<Notification> {
        self.unread = 0;
        std::mem::take(&mut self.items)
    }

    pub fn restore_all(&mut self, items: Vec<Notification>) {
        self.unread = items.iter().filter(|n| !n.read).count();
        self.items = items;
    }
}

// ---------------------------------------------------------------------------
// Server-mirrored service
// ---------------------------------------------------------------------------

/// An optimistic notification mutation the server refused.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("notification change rejected by server; local change reverted: {message}")]
    SyncConflict { message: String },
}

impl From<BackendError> for SyncError {
    fn from(e: BackendError) -> Self {
        SyncError::SyncConflict {
            message: e.to_string(),
        }
    }
}

/// The store plus its server mirror.
pub struct NotificationService {
    store: NotificationStore,
    backend: Arc<dyn NotificationBackend>,
}

impl NotificationService {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        NotificationService {
            store: NotificationStore::new(),
            backend,
        }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Rebuild the collection from the server listing (sign-in).
    pub async fn rebuild_from_server(&mut self) -> Result<usize, BackendError> {
        let payloads = self.backend.list_notifications().await?;
        let items: Vec<Notification> = payloads.into_iter().map(Notification::from).collect();
        let count = items.len();
        self.store.rebuild(items);
        Ok(count)
    }

    /// Accept a channel push. Local only: the server already has it.
    pub fn ingest(&mut self, notification: Notification) {
        self.store.ingest(notification);
    }

    /// Drop all local state (sign-out). The collection is rebuilt from
    /// scratch on the next sign-in.
    pub fn discard(&mut self) {
        self.store.rebuild(Vec::new());
    }

    pub async fn mark_read(&mut self, id: &str) -> Result<(), SyncError> {
        if !self.store.mark_read(id) {
            // Already read or unknown; nothing to mirror.
            return Ok(());
        }
        if let Err(e) = self.backend.mark_read(id).await {
            warn!("mark_read({id}) rejected, reverting: {e}");
            self.store.mark_unread(id);
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn mark_all_read(&mut self) -> Result<(), SyncError> {
        let changed = self.store.mark_all_read();
        if changed.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.backend.mark_all_read().await {
            warn!("mark_all_read rejected, reverting {} items: {e}", changed.len());
            for id in &changed {
                self.store.mark_unread(id);
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), SyncError> {
        let Some((index, removed)) = self.store.delete(id) else {
            return Ok(());
        };
        if let Err(e) = self.backend.delete(id).await {
            warn!("delete({id}) rejected, restoring: {e}");
            self.store.restore(index, removed);
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn clear_all(&mut self) -> Result<(), SyncError> {
        let drained = self.store.clear_all();
        if drained.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.backend.clear_all().await {
            warn!("clear_all rejected, restoring {} items: {e}", drained.len());
            self.store.restore_all(drained);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use crate::protocol::NotificationPayload;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn notification(id: &str, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::Info,
            title: format!("title {id}"),
            message: format!("message {id}"),
            timestamp: Utc::now(),
            read,
            action_url: None,
            action_label: None,
            league_id: None,
            race_id: None,
        }
    }

    #[test]
    fn ingest_prepends_and_counts_unread() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("b", false));
        store.ingest(notification("c", true));

        let ids: Vec<&str> = store.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn ingest_ignores_duplicate_ids() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("a", false));
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn mark_read_decrements_exactly_once() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        assert_eq!(store.unread_count(), 1);

        assert!(store.mark_read("a"));
        assert_eq!(store.unread_count(), 0);

        // Second call is a no-op and must not double-decrement.
        assert!(!store.mark_read("a"));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn mark_read_unknown_id_is_noop() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        assert!(!store.mark_read("ghost"));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn mark_all_read_is_idempotent() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("b", false));
        store.ingest(notification("c", true));

        let changed = store.mark_all_read();
        assert_eq!(changed.len(), 2);
        assert_eq!(store.unread_count(), 0);

        let changed_again = store.mark_all_read();
        assert!(changed_again.is_empty());
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn delete_unread_decrements_counter() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("b", true));

        let (index, removed) = store.delete("a").unwrap();
        assert_eq!(index, 1);
        assert_eq!(removed.id, "a");
        assert_eq!(store.unread_count(), 0);

        assert!(store.delete("a").is_none());
    }

    #[test]
    fn delete_read_leaves_counter() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("b", true));
        store.delete("b").unwrap();
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn restore_puts_notification_back() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("b", false));
        let (index, removed) = store.delete("a").unwrap();

        store.restore(index, removed);
        let ids: Vec<&str> = store.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn clear_all_zeroes_counter() {
        let mut store = NotificationStore::new();
        store.ingest(notification("a", false));
        store.ingest(notification("b", true));

        let drained = store.clear_all();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn rebuild_sorts_newest_first_and_recounts() {
        let now = Utc::now();
        let mut old = notification("old", true);
        old.timestamp = now - Duration::hours(2);
        let mut mid = notification("mid", false);
        mid.timestamp = now - Duration::hours(1);
        let mut new = notification("new", false);
        new.timestamp = now;

        let mut store = NotificationStore::new();
        store.rebuild(vec![old, new, mid]);

        let ids: Vec<&str> = store.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(store.unread_count(), 2);
    }

    // -- service tests --

    /// Backend that can be told to reject mutations.
    struct FlakyNotifier {
        reject: AtomicBool,
        calls: AtomicUsize,
        listing: Vec<NotificationPayload>,
    }

    impl FlakyNotifier {
        fn new() -> Self {
            FlakyNotifier {
                reject: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                listing: Vec::new(),
            }
        }

        fn outcome(&self) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject.load(Ordering::SeqCst) {
                Err(BackendError::Api {
                    status: 409,
                    message: "conflict".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl NotificationBackend for FlakyNotifier {
        async fn list_notifications(&self) -> Result<Vec<NotificationPayload>, BackendError> {
            Ok(self.listing.clone())
        }
        async fn mark_read(&self, _id: &str) -> Result<(), BackendError> {
            self.outcome()
        }
        async fn mark_all_read(&self) -> Result<(), BackendError> {
            self.outcome()
        }
        async fn delete(&self, _id: &str) -> Result<(), BackendError> {
            self.outcome()
        }
        async fn clear_all(&self) -> Result<(), BackendError> {
            self.outcome()
        }
    }

    fn service(backend: &Arc<FlakyNotifier>) -> NotificationService {
        let mirror: Arc<dyn NotificationBackend> = backend.clone();
        NotificationService::new(mirror)
    }

    #[tokio::test]
    async fn mark_read_mirrors_to_server() {
        let backend = Arc::new(FlakyNotifier::new());
        let mut service = service(&backend);
        service.ingest(notification("a", false));

        service.mark_read("a").await.unwrap();
        assert_eq!(service.store().unread_count(), 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Second call is a local no-op: no extra round trip.
        service.mark_read("a").await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_mark_read_reverts() {
        let backend = Arc::new(FlakyNotifier::new());
        backend.reject.store(true, Ordering::SeqCst);
        let mut service = service(&backend);
        service.ingest(notification("a", false));

        let err = service.mark_read("a").await.unwrap_err();
        assert!(matches!(err, SyncError::SyncConflict { .. }));
        assert_eq!(service.store().unread_count(), 1);
        assert!(!service.store().items()[0].read);
    }

    #[tokio::test]
    async fn rejected_mark_all_read_reverts_every_item() {
        let backend = Arc::new(FlakyNotifier::new());
        backend.reject.store(true, Ordering::SeqCst);
        let mut service = service(&backend);
        service.ingest(notification("a", false));
        service.ingest(notification("b", false));
        service.ingest(notification("c", true));

        service.mark_all_read().await.unwrap_err();
        assert_eq!(service.store().unread_count(), 2);
    }

    #[tokio::test]
    async fn rejected_delete_restores_at_original_index() {
        let backend = Arc::new(FlakyNotifier::new());
        backend.reject.store(true, Ordering::SeqCst);
        let mut service = service(&backend);
        service.ingest(notification("a", false));
        service.ingest(notification("b", false));

        service.delete("a").await.unwrap_err();
        let ids: Vec<&str> = service.store().items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(service.store().unread_count(), 2);
    }

    #[tokio::test]
    async fn rejected_clear_all_restores_collection() {
        let backend = Arc::new(FlakyNotifier::new());
        backend.reject.store(true, Ordering::SeqCst);
        let mut service = service(&backend);
        service.ingest(notification("a", false));
        service.ingest(notification("b", true));

        service.clear_all().await.unwrap_err();
        assert_eq!(service.store().len(), 2);
        assert_eq!(service.store().unread_count(), 1);
    }

    #[tokio::test]
    async fn clear_all_of_empty_store_skips_server() {
        let backend = Arc::new(FlakyNotifier::new());
        let mut service = service(&backend);
        service.clear_all().await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn discard_drops_everything() {
        let backend = Arc::new(FlakyNotifier::new());
        let mut service = service(&backend);
        service.ingest(notification("a", false));
        service.discard();
        assert!(service.store().is_empty());
        assert_eq!(service.store().unread_count(), 0);
    }
}
