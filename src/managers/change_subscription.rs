//! Change Subscription for Smart Bookmarks.
//!
//! Keeps one realtime channel open per mounted view, scoped to the viewer's
//! rows, and applies the events it delivers to the [`SharedStore`].
//!
//! Status lifecycle: `Connecting → Subscribed → {TimedOut, Closed, ChannelError}`.
//! Each timeout schedules one resubscription after a fixed delay, and a
//! successful join refills that budget. A channel error is terminal for
//! the mount.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::managers::collection_store::SharedStore;
use crate::managers::mount_guard::MountGuard;
use crate::services::backend::{ChannelHandle, RealtimeService};
use crate::types::errors::SubscriptionError;
use crate::types::realtime::{ChannelMessage, ChannelStatus, SubscriptionRequest};
use crate::types::settings::RealtimeSettings;

/// What the driver must do after a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    None,
    /// Resubscribe after the configured delay, if still mounted.
    ScheduleRetry,
}

/// Pure status machine for one mount.
#[derive(Debug, Clone)]
pub struct SubscriptionState {
    status: ChannelStatus,
    max_timeout_retries: u32,
    retries_left: u32,
}

impl SubscriptionState {
    pub fn new(max_timeout_retries: u32) -> Self {
        Self {
            status: ChannelStatus::Connecting,
            max_timeout_retries,
            retries_left: max_timeout_retries,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    /// Applies a status reported by the channel.
    ///
    /// `Closed` absorbs everything. After `ChannelError` only `Closed` is
    /// accepted, so an error is never followed by an automatic recovery.
    /// Reaching `Subscribed` refills the retry budget, so every later
    /// timeout gets its own retry.
    pub fn on_status(&mut self, next: ChannelStatus) -> StatusAction {
        if self.status.is_terminal() {
            if self.status == ChannelStatus::ChannelError && next == ChannelStatus::Closed {
                self.status = ChannelStatus::Closed;
            }
            return StatusAction::None;
        }
        self.status = next;
        match next {
            ChannelStatus::TimedOut if self.retries_left > 0 => {
                self.retries_left -= 1;
                StatusAction::ScheduleRetry
            }
            ChannelStatus::Subscribed => {
                self.retries_left = self.max_timeout_retries;
                StatusAction::None
            }
            _ => StatusAction::None,
        }
    }
}

/// A live subscription owned by a mounted view.
///
/// Dropping it performs the same teardown as [`ChangeSubscription::close`].
pub struct ChangeSubscription {
    guard: MountGuard,
    handle: Arc<dyn ChannelHandle>,
    status: Arc<watch::Sender<ChannelStatus>>,
    pump: Option<JoinHandle<()>>,
    closed: bool,
}

impl ChangeSubscription {
    /// Opens the channel and starts applying its events to `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        realtime: &dyn RealtimeService,
        request: SubscriptionRequest,
        store: SharedStore,
        guard: MountGuard,
        settings: &RealtimeSettings,
    ) -> Result<Self, SubscriptionError> {
        tracing::info!(filter = %request.filter_expr(), topic = %request.topic(), "opening realtime channel");
        let channel = realtime.subscribe(request)?;
        let handle: Arc<dyn ChannelHandle> = Arc::from(channel.handle);
        let (status_tx, _) = watch::channel(ChannelStatus::Connecting);
        let status = Arc::new(status_tx);

        let pump = tokio::spawn(pump_messages(
            channel.messages,
            Arc::clone(&handle),
            Arc::clone(&status),
            store,
            guard.clone(),
            SubscriptionState::new(settings.max_timeout_retries),
            Duration::from_millis(settings.retry_delay_ms),
        ));

        Ok(Self {
            guard,
            handle,
            status,
            pump: Some(pump),
            closed: false,
        })
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Receiver that changes on every accepted status transition.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }

    /// Tears the subscription down.
    ///
    /// The mounted flag is cleared before the unsubscribe call so that any
    /// event or retry already in flight discards its effect.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.guard.unmount();
        tracing::info!("cleaning up realtime subscription");
        self.handle.unsubscribe();
        self.status.send_replace(ChannelStatus::Closed);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn pump_messages(
    mut messages: mpsc::UnboundedReceiver<ChannelMessage>,
    handle: Arc<dyn ChannelHandle>,
    status: Arc<watch::Sender<ChannelStatus>>,
    store: SharedStore,
    guard: MountGuard,
    mut state: SubscriptionState,
    retry_delay: Duration,
) {
    while let Some(message) = messages.recv().await {
        if !guard.is_mounted() {
            tracing::debug!("discarding realtime message after teardown");
            break;
        }
        match message {
            ChannelMessage::Status(next) => {
                let before = state.status();
                let action = state.on_status(next);
                if state.status() != before {
                    status.send_replace(state.status());
                    log_status(state.status());
                }
                if action == StatusAction::ScheduleRetry {
                    schedule_retry(Arc::clone(&handle), guard.clone(), retry_delay);
                }
            }
            ChannelMessage::Change(event) => {
                tracing::debug!(id = %event.id(), event = ?event, "change event received");
                store.update(|s| s.apply_change(event));
            }
        }
    }
    tracing::debug!("realtime message stream ended");
}

fn schedule_retry(handle: Arc<dyn ChannelHandle>, guard: MountGuard, delay: Duration) {
    let deadline = Instant::now() + delay;
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if guard.is_mounted() {
            tracing::info!("resubscribing after timeout");
            handle.resubscribe();
        } else {
            tracing::debug!("view unmounted, skipping resubscribe");
        }
    });
}

fn log_status(status: ChannelStatus) {
    match status {
        ChannelStatus::Subscribed => tracing::info!("realtime connected"),
        ChannelStatus::ChannelError => {
            tracing::error!("realtime channel error, check row-level security policies")
        }
        ChannelStatus::TimedOut => tracing::warn!("realtime connection timed out"),
        ChannelStatus::Closed => tracing::info!("realtime channel closed"),
        ChannelStatus::Connecting => tracing::debug!("realtime connecting"),
    }
}
