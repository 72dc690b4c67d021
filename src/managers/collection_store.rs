//! Collection Store for Smart Bookmarks.
//!
//! Holds the ordered bookmark sequence a viewer sees and reconciles three
//! inputs: the one-time bulk load, optimistic local actions, and remote
//! change events.
//!
//! Optimistic operations are tracked with a [`PendingTicket`]. While any
//! ticket is outstanding the store keeps the sequence as it was before the
//! first of them (`base`) plus a journal of every operation applied since.
//! A rollback drops one journal entry and replays the rest over `base`, so
//! remote events that arrived in the meantime survive the rollback.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::types::bookmark::Bookmark;
use crate::types::errors::DeleteError;
use crate::types::realtime::ChangeEvent;

/// Handle for an optimistic local operation awaiting its remote result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingTicket(u64);

#[derive(Debug, Clone)]
enum StoreOp {
    /// Replace in place if the id is present, otherwise prepend.
    Upsert(Bookmark),
    /// Replace in place; no-op if absent.
    Replace(Bookmark),
    Remove(String),
}

#[derive(Debug, Clone)]
struct JournalEntry {
    op: StoreOp,
    ticket: Option<PendingTicket>,
    confirmed: bool,
}

impl JournalEntry {
    fn is_pending(&self) -> bool {
        self.ticket.is_some() && !self.confirmed
    }
}

#[derive(Debug, Clone)]
struct Reconciliation {
    base: Vec<Bookmark>,
    journal: Vec<JournalEntry>,
}

/// Ordered, id-unique bookmark sequence for a single viewer.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    owner: String,
    bookmarks: Vec<Bookmark>,
    loaded: bool,
    reconciliation: Option<Reconciliation>,
    next_ticket: u64,
}

impl CollectionStore {
    /// Creates an empty store for `owner`.
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            bookmarks: Vec::new(),
            loaded: false,
            reconciliation: None,
            next_ticket: 1,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// Whether the bulk load has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.bookmarks.iter().map(|b| b.id.as_str()).collect()
    }

    /// Returns true while an optimistic operation awaits its remote result.
    pub fn has_pending(&self) -> bool {
        self.reconciliation
            .as_ref()
            .is_some_and(|r| r.journal.iter().any(JournalEntry::is_pending))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.bookmarks.iter().position(|b| b.id == id)
    }

    fn owns(&self, record: &Bookmark) -> bool {
        if record.user_id == self.owner {
            return true;
        }
        tracing::warn!(
            id = %record.id,
            owner = %record.user_id,
            "dropping bookmark that belongs to another viewer"
        );
        false
    }

    /// Replaces the whole sequence with the result of the bulk load.
    ///
    /// Foreign records are dropped, duplicate ids keep their first
    /// occurrence, and the result is ordered by `created_at` descending.
    /// Any outstanding optimistic bookkeeping is discarded.
    pub fn replace_all(&mut self, records: Vec<Bookmark>) {
        let mut seen = std::collections::HashSet::new();
        let mut next: Vec<Bookmark> = records
            .into_iter()
            .filter(|r| self.owns(r))
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        next.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        self.bookmarks = next;
        self.loaded = true;
        self.reconciliation = None;
    }

    /// Marks the initial load as done without touching the rows.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Empties the store, as on sign-out.
    pub fn clear(&mut self) {
        self.bookmarks.clear();
        self.loaded = false;
        self.reconciliation = None;
    }

    // ─── Optimistic local operations ───

    /// Prepends `record` before its remote write completes.
    ///
    /// Returns `None` if the record belongs to another viewer.
    pub fn begin_insert(&mut self, record: Bookmark) -> Option<PendingTicket> {
        if !self.owns(&record) {
            return None;
        }
        let ticket = self.issue_ticket();
        self.record(StoreOp::Upsert(record), Some(ticket));
        Some(ticket)
    }

    /// Removes `id` before its remote delete completes.
    pub fn begin_delete(&mut self, id: &str) -> Result<PendingTicket, DeleteError> {
        if !self.contains(id) {
            return Err(DeleteError::NotFound(id.to_string()));
        }
        let ticket = self.issue_ticket();
        self.record(StoreOp::Remove(id.to_string()), Some(ticket));
        Ok(ticket)
    }

    /// Marks the operation behind `ticket` as accepted by the backend.
    ///
    /// Returns false if the ticket is unknown (e.g. a reload discarded it).
    pub fn confirm(&mut self, ticket: PendingTicket) -> bool {
        let Some(rec) = self.reconciliation.as_mut() else {
            return false;
        };
        let Some(entry) = rec.journal.iter_mut().find(|e| e.ticket == Some(ticket)) else {
            return false;
        };
        entry.confirmed = true;
        self.settle();
        true
    }

    /// Undoes the operation behind `ticket`.
    ///
    /// The sequence is rebuilt from the pre-operation snapshot with every
    /// other journaled operation replayed in order. Returns false if the
    /// ticket is unknown.
    pub fn rollback(&mut self, ticket: PendingTicket) -> bool {
        let Some(rec) = self.reconciliation.as_mut() else {
            return false;
        };
        let Some(idx) = rec.journal.iter().position(|e| e.ticket == Some(ticket)) else {
            return false;
        };
        rec.journal.remove(idx);

        let mut rebuilt = rec.base.clone();
        for entry in &rec.journal {
            apply_op(&mut rebuilt, &entry.op);
        }
        self.bookmarks = rebuilt;
        self.settle();
        true
    }

    // ─── Remote change events ───

    /// Applies an INSERT from the change feed.
    ///
    /// A record whose id is already present replaces it in place, so a
    /// duplicated delivery or the echo of an optimistic insert never
    /// produces two rows.
    pub fn apply_remote_insert(&mut self, record: Bookmark) {
        if self.owns(&record) {
            self.record(StoreOp::Upsert(record), None);
        }
    }

    /// Applies an UPDATE from the change feed; no-op if the id is absent.
    pub fn apply_remote_update(&mut self, record: Bookmark) {
        if self.owns(&record) {
            self.record(StoreOp::Replace(record), None);
        }
    }

    /// Applies a DELETE from the change feed; no-op if the id is absent.
    pub fn apply_remote_delete(&mut self, id: &str) {
        self.record(StoreOp::Remove(id.to_string()), None);
    }

    /// Dispatches a change event to the matching `apply_remote_*` method.
    pub fn apply_change(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert(record) => self.apply_remote_insert(record),
            ChangeEvent::Update(record) => self.apply_remote_update(record),
            ChangeEvent::Delete { id } => self.apply_remote_delete(&id),
        }
    }

    // ─── Internals ───

    fn issue_ticket(&mut self) -> PendingTicket {
        let ticket = PendingTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    fn record(&mut self, op: StoreOp, ticket: Option<PendingTicket>) {
        if ticket.is_some() && self.reconciliation.is_none() {
            self.reconciliation = Some(Reconciliation {
                base: self.bookmarks.clone(),
                journal: Vec::new(),
            });
        }
        apply_op(&mut self.bookmarks, &op);
        if let Some(rec) = self.reconciliation.as_mut() {
            rec.journal.push(JournalEntry {
                op,
                ticket,
                confirmed: false,
            });
        }
    }

    /// Drops the journal once nothing is left to roll back.
    fn settle(&mut self) {
        if !self.has_pending() {
            self.reconciliation = None;
        }
    }
}

fn apply_op(seq: &mut Vec<Bookmark>, op: &StoreOp) {
    match op {
        StoreOp::Upsert(record) => match seq.iter().position(|b| b.id == record.id) {
            Some(idx) => seq[idx] = record.clone(),
            None => seq.insert(0, record.clone()),
        },
        StoreOp::Replace(record) => {
            if let Some(idx) = seq.iter().position(|b| b.id == record.id) {
                seq[idx] = record.clone();
            }
        }
        StoreOp::Remove(id) => {
            if let Some(idx) = seq.iter().position(|b| &b.id == id) {
                seq.remove(idx);
            }
        }
    }
}

/// A [`CollectionStore`] shared between a view and its background tasks.
///
/// Every mutation bumps a revision counter that renderers can watch. The
/// lock is never held across an `.await`.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<CollectionStore>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SharedStore {
    pub fn new(owner: &str) -> Self {
        let (revision, _) = watch::channel(0);
        Self::with_revision(owner, Arc::new(revision))
    }

    /// Creates a store that reports mutations on an existing revision
    /// channel, so watchers survive a remount.
    pub fn with_revision(owner: &str, revision: Arc<watch::Sender<u64>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CollectionStore::new(owner))),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollectionStore> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` with shared access.
    pub fn read<R>(&self, f: impl FnOnce(&CollectionStore) -> R) -> R {
        f(&self.lock())
    }

    /// Runs `f` with exclusive access and notifies watchers.
    pub fn update<R>(&self, f: impl FnOnce(&mut CollectionStore) -> R) -> R {
        let result = f(&mut self.lock());
        self.revision.send_modify(|rev| *rev += 1);
        result
    }

    pub fn snapshot(&self) -> Vec<Bookmark> {
        self.read(|s| s.bookmarks().to_vec())
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that changes whenever the store is mutated.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
