//! Backend collaborator interfaces.
//!
//! Smart Bookmarks delegates authentication, storage and the realtime change
//! feed to a managed backend. These traits are the only surface the rest of
//! the crate sees; concrete adapters live in `rest_backend`,
//! `realtime_socket` and `memory_backend`.

use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};

use crate::types::bookmark::{Bookmark, NewBookmark, SelectQuery};
use crate::types::errors::{AuthError, BackendError, SubscriptionError};
use crate::types::realtime::{ChannelMessage, SubscriptionRequest};
use crate::types::session::{AuthChange, OAuthProvider, Session, User};

/// Authentication collaborator.
pub trait AuthService: Send + Sync {
    /// Returns the signed-in user, or `None` if there is no session.
    fn get_current_user(&self) -> BoxFuture<'_, Result<Option<User>, AuthError>>;

    /// Returns the current session, refreshing the access token if needed.
    fn current_session(&self) -> BoxFuture<'_, Result<Option<Session>, AuthError>>;

    /// Subscribes to `(event, session)` notifications.
    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange>;

    /// Starts an OAuth sign-in. Returns the URL the shell must navigate to.
    fn sign_in(&self, provider: OAuthProvider, redirect_to: String) -> BoxFuture<'_, Result<String, AuthError>>;

    /// Finishes an OAuth sign-in from the provider's callback URL.
    fn complete_sign_in(&self, callback_url: String) -> BoxFuture<'_, Result<User, AuthError>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>>;
}

/// Relational data collaborator.
pub trait DataService: Send + Sync {
    fn select(&self, query: SelectQuery) -> BoxFuture<'_, Result<Vec<Bookmark>, BackendError>>;
    fn insert(&self, table: String, record: NewBookmark) -> BoxFuture<'_, Result<(), BackendError>>;
    fn delete(&self, table: String, id: String) -> BoxFuture<'_, Result<(), BackendError>>;
}

/// Control side of an open realtime channel.
pub trait ChannelHandle: Send + Sync {
    /// Re-sends the subscription request on the same channel.
    fn resubscribe(&self);

    /// Leaves the channel. No messages are delivered afterwards except a
    /// final `Closed` status.
    fn unsubscribe(&self);
}

/// An open realtime channel: a message stream plus its control handle.
pub struct RealtimeChannel {
    pub messages: mpsc::UnboundedReceiver<ChannelMessage>,
    pub handle: Box<dyn ChannelHandle>,
}

/// Realtime change-feed collaborator.
pub trait RealtimeService: Send + Sync {
    /// Opens a channel for `request`. The channel starts in `Connecting` and
    /// reports its status through `ChannelMessage::Status`.
    fn subscribe(&self, request: SubscriptionRequest) -> Result<RealtimeChannel, SubscriptionError>;
}
