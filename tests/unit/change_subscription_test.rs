//! Unit tests for the change subscription driven by the in-memory backend.
//!
//! Time is paused so the resubscribe delay can be stepped through exactly.

use std::time::Duration;

use chrono::{TimeZone, Utc};

use smart_bookmarks::managers::change_subscription::ChangeSubscription;
use smart_bookmarks::managers::collection_store::SharedStore;
use smart_bookmarks::managers::mount_guard::MountGuard;
use smart_bookmarks::services::memory_backend::MemoryBackend;
use smart_bookmarks::types::bookmark::Bookmark;
use smart_bookmarks::types::realtime::{ChangeEvent, ChannelStatus, SubscriptionRequest};
use smart_bookmarks::types::session::{User, UserMetadata};
use smart_bookmarks::types::settings::RealtimeSettings;

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        user_metadata: UserMetadata::default(),
    }
}

fn bm(owner: &str, id: &str) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        user_id: owner.to_string(),
        title: id.to_string(),
        url: format!("https://{}.example.com", id),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

struct Fixture {
    backend: MemoryBackend,
    store: SharedStore,
    guard: MountGuard,
}

impl Fixture {
    fn new() -> Self {
        let backend = MemoryBackend::new();
        backend.sign_in_as(user("u1"));
        Self {
            backend,
            store: SharedStore::new("u1"),
            guard: MountGuard::new(),
        }
    }

    fn open(&self) -> ChangeSubscription {
        ChangeSubscription::open(
            &self.backend,
            SubscriptionRequest::owned_by("bookmarks", "u1"),
            self.store.clone(),
            self.guard.clone(),
            &RealtimeSettings::default(),
        )
        .unwrap()
    }
}

#[tokio::test]
async fn subscribes_and_applies_remote_changes() {
    let fx = Fixture::new();
    let sub = fx.open();
    settle().await;
    assert_eq!(sub.status(), ChannelStatus::Subscribed);

    fx.backend.emit("u1", ChangeEvent::Insert(bm("u1", "a")));
    fx.backend.emit("u1", ChangeEvent::Insert(bm("u1", "b")));
    fx.backend.emit("u1", ChangeEvent::Delete { id: "a".to_string() });
    settle().await;

    assert_eq!(fx.store.read(|s| s.ids().join(",")), "b");
}

#[tokio::test]
async fn foreign_records_never_enter_the_store() {
    let fx = Fixture::new();
    let _sub = fx.open();
    settle().await;

    fx.backend.emit("u1", ChangeEvent::Insert(bm("u2", "x")));
    settle().await;
    assert!(fx.store.read(|s| s.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn timeout_resubscribes_once_after_delay() {
    let fx = Fixture::new();
    fx.backend.queue_join_outcome(ChannelStatus::TimedOut);
    fx.backend.queue_join_outcome(ChannelStatus::TimedOut);
    let sub = fx.open();
    settle().await;
    assert_eq!(sub.status(), ChannelStatus::TimedOut);

    tokio::time::advance(Duration::from_millis(4_999)).await;
    settle().await;
    assert_eq!(fx.backend.calls().resubscribes, 0);

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(fx.backend.calls().resubscribes, 1);

    // The second timeout exhausts the budget.
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(fx.backend.calls().resubscribes, 1);
    assert_eq!(sub.status(), ChannelStatus::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn successful_retry_goes_live() {
    let fx = Fixture::new();
    fx.backend.queue_join_outcome(ChannelStatus::TimedOut);
    let sub = fx.open();
    settle().await;

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(sub.status(), ChannelStatus::Subscribed);
}

#[tokio::test(start_paused = true)]
async fn timeout_after_recovery_retries_again() {
    let fx = Fixture::new();
    fx.backend.queue_join_outcome(ChannelStatus::TimedOut);
    let sub = fx.open();
    settle().await;

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(sub.status(), ChannelStatus::Subscribed);
    assert_eq!(fx.backend.calls().resubscribes, 1);

    tokio::time::advance(Duration::from_secs(3600)).await;
    fx.backend.emit_status(ChannelStatus::TimedOut);
    settle().await;
    assert_eq!(sub.status(), ChannelStatus::TimedOut);

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(fx.backend.calls().resubscribes, 2);
    assert_eq!(sub.status(), ChannelStatus::Subscribed);
}

#[tokio::test(start_paused = true)]
async fn unmount_during_retry_delay_cancels_resubscribe() {
    let fx = Fixture::new();
    fx.backend.queue_join_outcome(ChannelStatus::TimedOut);
    let sub = fx.open();
    settle().await;

    tokio::time::advance(Duration::from_secs(2)).await;
    sub.close();
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;

    assert_eq!(fx.backend.calls().resubscribes, 0);
    assert_eq!(fx.backend.calls().unsubscribes, 1);
}

#[tokio::test(start_paused = true)]
async fn channel_error_is_terminal() {
    let fx = Fixture::new();
    let sub = fx.open();
    settle().await;

    fx.backend.emit_status(ChannelStatus::ChannelError);
    settle().await;
    assert_eq!(sub.status(), ChannelStatus::ChannelError);
    let mut status = sub.watch_status();
    status.mark_unchanged();

    fx.backend.emit_status(ChannelStatus::TimedOut);
    fx.backend.emit_status(ChannelStatus::Subscribed);
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;

    assert_eq!(sub.status(), ChannelStatus::ChannelError);
    assert!(!status.has_changed().unwrap());
    assert_eq!(fx.backend.calls().resubscribes, 0);
}

#[tokio::test]
async fn close_unsubscribes_exactly_once() {
    let fx = Fixture::new();
    let sub = fx.open();
    let status = sub.watch_status();
    settle().await;

    sub.close();
    settle().await;

    assert_eq!(*status.borrow(), ChannelStatus::Closed);
    assert_eq!(fx.backend.calls().unsubscribes, 1);
    assert_eq!(fx.backend.open_channels(), 0);
    assert!(!fx.guard.is_mounted());
}

#[tokio::test]
async fn drop_tears_down() {
    let fx = Fixture::new();
    {
        let _sub = fx.open();
        settle().await;
        assert_eq!(fx.backend.open_channels(), 1);
    }
    assert_eq!(fx.backend.calls().unsubscribes, 1);
    assert_eq!(fx.backend.open_channels(), 0);
}

#[tokio::test]
async fn events_after_unmount_are_discarded() {
    let fx = Fixture::new();
    let _sub = fx.open();
    settle().await;

    // Unmount flag flipped while the channel is still delivering.
    fx.guard.unmount();
    fx.backend.emit("u1", ChangeEvent::Insert(bm("u1", "late")));
    settle().await;

    assert!(fx.store.read(|s| s.is_empty()));
}
