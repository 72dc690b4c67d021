//! Bookmark List for Smart Bookmarks.
//!
//! Mount/unmount lifecycle around a [`SharedStore`] and its
//! [`ChangeSubscription`], plus the local actions: bulk load, add, delete.
//!
//! Both local actions are optimistic. An add prepends a row with a
//! client-generated id and the feed's INSERT echo replaces it in place; a
//! delete removes the row at once. Either is rolled back if the backend
//! rejects the write.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

use crate::managers::change_subscription::ChangeSubscription;
use crate::managers::collection_store::SharedStore;
use crate::managers::mount_guard::MountGuard;
use crate::services::backend::{DataService, RealtimeService};
use crate::types::bookmark::{Bookmark, NewBookmark, SelectQuery};
use crate::types::errors::{DeleteError, FetchError, InsertError, ValidationError};
use crate::types::realtime::{ChannelStatus, SubscriptionRequest};
use crate::types::settings::RealtimeSettings;

/// Trims and checks user input for a new bookmark.
///
/// Both fields must be non-empty after trimming and the URL must be absolute
/// with a host.
pub fn validate_bookmark_input(title: &str, url: &str) -> Result<(String, String), ValidationError> {
    let title = title.trim();
    let url = url.trim();
    if title.is_empty() || url.is_empty() {
        return Err(ValidationError::MissingField);
    }
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => Ok((title.to_string(), url.to_string())),
        _ => Err(ValidationError::InvalidUrl(url.to_string())),
    }
}

/// Clears a busy flag when dropped.
struct BusyFlag<'a>(&'a AtomicBool);

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Removes an id from the deleting set when dropped.
struct DeletingRow<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for DeletingRow<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Cloneable handle to one mounted list.
///
/// Holding a clone does not keep the mount alive: once the owning
/// [`BookmarkList`] unmounts, every operation on the handle becomes a no-op
/// that reports `NotMounted`.
#[derive(Clone)]
pub struct MountedList {
    viewer_id: String,
    table: String,
    data: Arc<dyn DataService>,
    guard: MountGuard,
    store: SharedStore,
    loading: Arc<AtomicBool>,
    inserting: Arc<AtomicBool>,
    deleting: Arc<Mutex<HashSet<String>>>,
    status: watch::Receiver<ChannelStatus>,
}

impl MountedList {
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn is_mounted(&self) -> bool {
        self.guard.is_mounted()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn is_inserting(&self) -> bool {
        self.inserting.load(Ordering::SeqCst)
    }

    /// Whether the row `id` is waiting on its remote delete.
    pub fn is_deleting(&self, id: &str) -> bool {
        self.deleting
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.store.snapshot()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Fetches the viewer's bookmarks and replaces the local sequence.
    ///
    /// The result is dropped if the view unmounted while the fetch was in
    /// flight. A failed fetch leaves the current rows in place.
    pub async fn load(&self) -> Result<usize, FetchError> {
        if !self.guard.is_mounted() {
            return Err(FetchError::NotMounted);
        }
        self.loading.store(true, Ordering::SeqCst);
        let result = self
            .data
            .select(SelectQuery::owned_by(&self.table, &self.viewer_id))
            .await;

        if !self.guard.is_mounted() {
            tracing::debug!("bookmark fetch resolved after unmount, discarding");
            return Err(FetchError::NotMounted);
        }
        self.loading.store(false, Ordering::SeqCst);

        match result {
            Ok(rows) => Ok(self.store.update(|s| {
                s.replace_all(rows);
                s.len()
            })),
            Err(e) => {
                tracing::error!(error = %e, "error fetching bookmarks");
                self.store.update(|s| s.mark_loaded());
                Err(FetchError::Backend(e))
            }
        }
    }

    /// Validates and adds a bookmark.
    ///
    /// Invalid input fails before any network call. While a submission is in
    /// flight further submissions fail with `Busy`.
    pub async fn insert_local(&self, title: &str, url: &str) -> Result<Bookmark, InsertError> {
        let (title, url) = validate_bookmark_input(title, url)?;
        if !self.guard.is_mounted() {
            return Err(InsertError::NotMounted);
        }
        if self.inserting.swap(true, Ordering::SeqCst) {
            return Err(InsertError::Busy);
        }
        let _busy = BusyFlag(&self.inserting);

        let record = NewBookmark {
            id: Uuid::new_v4().to_string(),
            user_id: self.viewer_id.clone(),
            title,
            url,
        };
        let optimistic = record.to_bookmark(Utc::now());
        let ticket = self.store.update(|s| s.begin_insert(optimistic.clone()));

        let result = self.data.insert(self.table.clone(), record).await;

        if !self.guard.is_mounted() {
            return result.map(|_| optimistic).map_err(InsertError::Write);
        }
        match result {
            Ok(()) => {
                if let Some(ticket) = ticket {
                    self.store.update(|s| s.confirm(ticket));
                }
                Ok(optimistic)
            }
            Err(e) => {
                tracing::error!(error = %e, "insert error");
                if let Some(ticket) = ticket {
                    self.store.update(|s| s.rollback(ticket));
                }
                Err(InsertError::Write(e))
            }
        }
    }

    /// Removes a bookmark optimistically and deletes it remotely.
    ///
    /// On failure the list is restored to its pre-delete order.
    pub async fn delete_local(&self, id: &str) -> Result<(), DeleteError> {
        if !self.guard.is_mounted() {
            return Err(DeleteError::NotMounted);
        }
        if !self
            .deleting
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string())
        {
            return Err(DeleteError::InProgress(id.to_string()));
        }
        let _row = DeletingRow {
            set: &self.deleting,
            id: id.to_string(),
        };

        let ticket = self.store.update(|s| s.begin_delete(id))?;
        let result = self.data.delete(self.table.clone(), id.to_string()).await;

        if !self.guard.is_mounted() {
            return result.map_err(DeleteError::Backend);
        }
        match result {
            Ok(()) => {
                self.store.update(|s| s.confirm(ticket));
                Ok(())
            }
            Err(e) => {
                tracing::error!(id = %id, error = %e, "error deleting bookmark");
                self.store.update(|s| s.rollback(ticket));
                Err(DeleteError::Backend(e))
            }
        }
    }
}

struct ActiveMount {
    list: MountedList,
    subscription: Option<ChangeSubscription>,
}

impl ActiveMount {
    fn teardown(self) {
        self.list.guard.unmount();
        if let Some(subscription) = self.subscription {
            subscription.close();
        }
    }
}

/// Owner of the (at most one) mounted list.
pub struct BookmarkList {
    data: Arc<dyn DataService>,
    realtime: Arc<dyn RealtimeService>,
    table: String,
    settings: RealtimeSettings,
    revision: Arc<watch::Sender<u64>>,
    active: Option<ActiveMount>,
}

impl BookmarkList {
    pub fn new(
        data: Arc<dyn DataService>,
        realtime: Arc<dyn RealtimeService>,
        table: &str,
        settings: RealtimeSettings,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            data,
            realtime,
            table: table.to_string(),
            settings,
            revision: Arc::new(revision),
            active: None,
        }
    }

    /// Mounts the list for `viewer_id`.
    ///
    /// Mounting the viewer that is already mounted returns the existing
    /// handle. Mounting a different viewer tears the old mount down first,
    /// so two subscriptions are never open at once. Must be called from
    /// within a tokio runtime.
    pub fn mount(&mut self, viewer_id: &str) -> MountedList {
        if let Some(active) = &self.active {
            if active.list.viewer_id == viewer_id {
                return active.list.clone();
            }
        }
        self.unmount();

        let guard = MountGuard::new();
        let store = SharedStore::with_revision(viewer_id, Arc::clone(&self.revision));
        let request = SubscriptionRequest::owned_by(&self.table, viewer_id);

        tracing::info!(viewer = %viewer_id, "setting up realtime channel");
        let (subscription, status) = match ChangeSubscription::open(
            self.realtime.as_ref(),
            request,
            store.clone(),
            guard.clone(),
            &self.settings,
        ) {
            Ok(subscription) => {
                let status = subscription.watch_status();
                (Some(subscription), status)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to open realtime channel");
                let (tx, rx) = watch::channel(ChannelStatus::ChannelError);
                drop(tx);
                (None, rx)
            }
        };

        let list = MountedList {
            viewer_id: viewer_id.to_string(),
            table: self.table.clone(),
            data: Arc::clone(&self.data),
            guard,
            store,
            loading: Arc::new(AtomicBool::new(true)),
            inserting: Arc::new(AtomicBool::new(false)),
            deleting: Arc::new(Mutex::new(HashSet::new())),
            status,
        };
        self.active = Some(ActiveMount {
            list: list.clone(),
            subscription,
        });
        self.revision.send_modify(|rev| *rev += 1);
        list
    }

    /// Tears down the current mount, if any.
    pub fn unmount(&mut self) {
        if let Some(active) = self.active.take() {
            active.teardown();
            self.revision.send_modify(|rev| *rev += 1);
        }
    }

    pub fn current(&self) -> Option<&MountedList> {
        self.active.as_ref().map(|a| &a.list)
    }

    /// Receiver bumped on every store mutation and every (un)mount.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl Drop for BookmarkList {
    fn drop(&mut self) {
        self.unmount();
    }
}
