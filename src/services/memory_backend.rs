//! In-process backend implementing every collaborator trait.
//!
//! Behaves like the managed backend closely enough to drive the views:
//! rows are scoped to their owner, writes fan out to joined realtime
//! channels, and the auth side keeps one session. Tests use the
//! failure-injection and call-count helpers; the RPC binary uses it as a
//! demo backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, mpsc, watch};

use crate::services::auth_callback;
use crate::services::backend::{AuthService, ChannelHandle, DataService, RealtimeChannel, RealtimeService};
use crate::types::bookmark::{Bookmark, NewBookmark, SelectQuery, SortOrder};
use crate::types::errors::{AuthError, BackendError, SubscriptionError};
use crate::types::realtime::{ChangeEvent, ChannelMessage, ChannelStatus, SubscriptionRequest};
use crate::types::session::{AuthChange, AuthEvent, OAuthProvider, Session, User};

/// Counters for every collaborator call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub selects: usize,
    pub inserts: usize,
    pub deletes: usize,
    pub subscribes: usize,
    pub resubscribes: usize,
    pub unsubscribes: usize,
}

struct MemoryChannel {
    id: u64,
    request: SubscriptionRequest,
    sender: mpsc::UnboundedSender<ChannelMessage>,
    joined: bool,
    left: bool,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<Bookmark>,
    session: Option<Session>,
    oauth_user: Option<User>,
    channels: Vec<MemoryChannel>,
    calls: CallLog,
    fail_select: Option<BackendError>,
    fail_insert: Option<BackendError>,
    fail_delete: VecDeque<BackendError>,
    /// Join outcomes consumed by subscribe/resubscribe; empty means `Subscribed`.
    join_outcomes: VecDeque<ChannelStatus>,
    /// Whether writes echo to realtime channels.
    muted: bool,
    next_channel: u64,
    next_token: u64,
}

impl MemoryState {
    fn session_user_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.user.id.clone())
    }

    fn broadcast(&mut self, owner: &str, event: ChangeEvent) {
        if self.muted {
            return;
        }
        for channel in self.channels.iter().filter(|c| c.joined && !c.left) {
            if channel.request.filter_value == owner {
                let _ = channel.sender.send(ChannelMessage::Change(event.clone()));
            }
        }
    }

    fn next_join_outcome(&mut self) -> ChannelStatus {
        self.join_outcomes.pop_front().unwrap_or(ChannelStatus::Subscribed)
    }
}

/// Shared in-memory backend. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    auth_tx: broadcast::Sender<AuthChange>,
    /// While `true`, data calls wait before completing.
    hold: watch::Sender<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (auth_tx, _) = broadcast::channel(32);
        let (hold, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            auth_tx,
            hold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Test and demo controls ───

    /// Signs `user` in directly and notifies auth listeners.
    pub fn sign_in_as(&self, user: User) {
        let session = {
            let mut state = self.lock();
            state.next_token += 1;
            let session = Session {
                access_token: format!("mem-access-{}", state.next_token),
                refresh_token: format!("mem-refresh-{}", state.next_token),
                expires_at: Utc::now().timestamp() + 3600,
                user,
            };
            state.session = Some(session.clone());
            session
        };
        let _ = self.auth_tx.send(AuthChange {
            event: AuthEvent::SignedIn,
            session: Some(session),
        });
    }

    /// Account returned by the next OAuth round trip.
    pub fn set_oauth_user(&self, user: User) {
        self.lock().oauth_user = Some(user);
    }

    /// Seeds a row without emitting a change event.
    pub fn seed(&self, record: Bookmark) {
        self.lock().rows.push(record);
    }

    pub fn rows(&self) -> Vec<Bookmark> {
        self.lock().rows.clone()
    }

    pub fn calls(&self) -> CallLog {
        self.lock().calls.clone()
    }

    pub fn fail_next_select(&self, error: BackendError) {
        self.lock().fail_select = Some(error);
    }

    pub fn fail_next_insert(&self, error: BackendError) {
        self.lock().fail_insert = Some(error);
    }

    /// Queues a failure for the next delete call. Multiple calls queue up.
    pub fn fail_next_delete(&self, error: BackendError) {
        self.lock().fail_delete.push_back(error);
    }

    /// Queues the status reported by the next subscribe or resubscribe.
    pub fn queue_join_outcome(&self, status: ChannelStatus) {
        self.lock().join_outcomes.push_back(status);
    }

    /// Stops writes from echoing to realtime channels.
    pub fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    /// Makes data calls wait until [`MemoryBackend::release`].
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    /// Replaces a row as another session would and emits an UPDATE.
    pub fn update_row(&self, record: Bookmark) {
        let mut state = self.lock();
        if let Some(row) = state.rows.iter_mut().find(|r| r.id == record.id) {
            *row = record.clone();
            let owner = record.user_id.clone();
            state.broadcast(&owner, ChangeEvent::Update(record));
        }
    }

    /// Pushes a raw change event to every joined channel for `owner`.
    pub fn emit(&self, owner: &str, event: ChangeEvent) {
        let mut state = self.lock();
        let muted = std::mem::replace(&mut state.muted, false);
        state.broadcast(owner, event);
        state.muted = muted;
    }

    /// Pushes a status to every open channel.
    pub fn emit_status(&self, status: ChannelStatus) {
        let mut state = self.lock();
        for channel in state.channels.iter_mut().filter(|c| !c.left) {
            channel.joined = status == ChannelStatus::Subscribed;
            let _ = channel.sender.send(ChannelMessage::Status(status));
        }
    }

    /// Number of channels that have not been unsubscribed.
    pub fn open_channels(&self) -> usize {
        self.lock().channels.iter().filter(|c| !c.left).count()
    }

    async fn wait_released(&self) {
        let mut rx = self.hold.subscribe();
        let _ = rx.wait_for(|held| !*held).await;
    }

    fn require_user(&self) -> Result<String, BackendError> {
        self.lock().session_user_id().ok_or(BackendError::Unauthenticated)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DataService for MemoryBackend {
    fn select(&self, query: SelectQuery) -> BoxFuture<'_, Result<Vec<Bookmark>, BackendError>> {
        async move {
            self.lock().calls.selects += 1;
            self.wait_released().await;
            let viewer = self.require_user()?;

            let mut state = self.lock();
            if let Some(err) = state.fail_select.take() {
                return Err(err);
            }
            // Row-level security: a viewer only ever sees their own rows.
            let mut rows: Vec<Bookmark> = state
                .rows
                .iter()
                .filter(|r| r.user_id == viewer)
                .filter(|r| query.filter_column != "user_id" || r.user_id == query.filter_value)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            if query.order == SortOrder::Descending {
                rows.reverse();
            }
            Ok(rows)
        }
        .boxed()
    }

    fn insert(&self, _table: String, record: NewBookmark) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            self.lock().calls.inserts += 1;
            self.wait_released().await;
            let viewer = self.require_user()?;

            let mut state = self.lock();
            if let Some(err) = state.fail_insert.take() {
                return Err(err);
            }
            if record.user_id != viewer {
                return Err(BackendError::Rejected {
                    status: 403,
                    message: "new row violates row-level security policy".to_string(),
                });
            }
            if state.rows.iter().any(|r| r.id == record.id) {
                return Err(BackendError::Rejected {
                    status: 409,
                    message: format!("duplicate key value: {}", record.id),
                });
            }
            let row = record.to_bookmark(Utc::now());
            state.rows.push(row.clone());
            state.broadcast(&viewer, ChangeEvent::Insert(row));
            Ok(())
        }
        .boxed()
    }

    fn delete(&self, _table: String, id: String) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            self.lock().calls.deletes += 1;
            self.wait_released().await;
            let viewer = self.require_user()?;

            let mut state = self.lock();
            if let Some(err) = state.fail_delete.pop_front() {
                return Err(err);
            }
            // Deleting a row the viewer cannot see affects nothing and is not an error.
            if let Some(idx) = state.rows.iter().position(|r| r.id == id && r.user_id == viewer) {
                state.rows.remove(idx);
                state.broadcast(&viewer, ChangeEvent::Delete { id });
            }
            Ok(())
        }
        .boxed()
    }
}

impl AuthService for MemoryBackend {
    fn get_current_user(&self) -> BoxFuture<'_, Result<Option<User>, AuthError>> {
        async move { Ok(self.lock().session.as_ref().map(|s| s.user.clone())) }.boxed()
    }

    fn current_session(&self) -> BoxFuture<'_, Result<Option<Session>, AuthError>> {
        async move { Ok(self.lock().session.clone()) }.boxed()
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_tx.subscribe()
    }

    fn sign_in(&self, provider: OAuthProvider, redirect_to: String) -> BoxFuture<'_, Result<String, AuthError>> {
        async move {
            let mut state = self.lock();
            if state.oauth_user.is_none() {
                return Err(AuthError::Provider(format!(
                    "no {} account available",
                    provider.as_str()
                )));
            }
            state.next_token += 1;
            // The in-memory provider approves immediately and redirects back.
            Ok(format!(
                "{}#access_token=mem-access-{n}&refresh_token=mem-refresh-{n}&expires_in=3600&token_type=bearer",
                redirect_to,
                n = state.next_token
            ))
        }
        .boxed()
    }

    fn complete_sign_in(&self, callback_url: String) -> BoxFuture<'_, Result<User, AuthError>> {
        async move {
            let tokens = auth_callback::parse_callback(&callback_url)?;
            let session = {
                let mut state = self.lock();
                let user = state.oauth_user.clone().ok_or(AuthError::NotAuthenticated)?;
                let session = Session {
                    access_token: tokens.access_token.clone(),
                    refresh_token: tokens.refresh_token.clone(),
                    expires_at: Utc::now().timestamp() + tokens.expires_in,
                    user,
                };
                state.session = Some(session.clone());
                session
            };
            let user = session.user.clone();
            let _ = self.auth_tx.send(AuthChange {
                event: AuthEvent::SignedIn,
                session: Some(session),
            });
            Ok(user)
        }
        .boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        async move {
            self.lock().session = None;
            let _ = self.auth_tx.send(AuthChange {
                event: AuthEvent::SignedOut,
                session: None,
            });
            Ok(())
        }
        .boxed()
    }
}

struct MemoryChannelHandle {
    state: Arc<Mutex<MemoryState>>,
    id: u64,
}

impl MemoryChannelHandle {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ChannelHandle for MemoryChannelHandle {
    fn resubscribe(&self) {
        let mut state = self.lock();
        state.calls.resubscribes += 1;
        let outcome = state.next_join_outcome();
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == self.id && !c.left) {
            channel.joined = outcome == ChannelStatus::Subscribed;
            let _ = channel.sender.send(ChannelMessage::Status(outcome));
        }
    }

    fn unsubscribe(&self) {
        let mut state = self.lock();
        state.calls.unsubscribes += 1;
        if let Some(channel) = state.channels.iter_mut().find(|c| c.id == self.id && !c.left) {
            channel.joined = false;
            channel.left = true;
            let _ = channel.sender.send(ChannelMessage::Status(ChannelStatus::Closed));
        }
    }
}

impl RealtimeService for MemoryBackend {
    fn subscribe(&self, request: SubscriptionRequest) -> Result<RealtimeChannel, SubscriptionError> {
        let (sender, messages) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.calls.subscribes += 1;
        state.next_channel += 1;
        let id = state.next_channel;

        let outcome = state.next_join_outcome();
        let _ = sender.send(ChannelMessage::Status(ChannelStatus::Connecting));
        let _ = sender.send(ChannelMessage::Status(outcome));
        state.channels.push(MemoryChannel {
            id,
            request,
            sender,
            joined: outcome == ChannelStatus::Subscribed,
            left: false,
        });

        Ok(RealtimeChannel {
            messages,
            handle: Box::new(MemoryChannelHandle {
                state: Arc::clone(&self.state),
                id,
            }),
        })
    }
}
