//! Tests for the rendered page pieces: add form, list view, header and
//! display formatting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as Span, TimeZone, Utc};
use rstest::rstest;

use smart_bookmarks::managers::bookmark_list::{BookmarkList, MountedList};
use smart_bookmarks::services::memory_backend::MemoryBackend;
use smart_bookmarks::types::bookmark::Bookmark;
use smart_bookmarks::types::errors::{BackendError, InsertError};
use smart_bookmarks::types::session::{User, UserMetadata};
use smart_bookmarks::types::settings::RealtimeSettings;
use smart_bookmarks::views::add_bookmark::{AddBookmarkForm, ADD_FAILED};
use smart_bookmarks::views::bookmark_view::ListView;
use smart_bookmarks::views::format::{count_label, domain, favicon_url, relative_date};
use smart_bookmarks::views::header::{display_name, Header};

const SIGNAL: Duration = Duration::from_millis(3000);

fn user(id: &str, name: Option<&str>) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        user_metadata: UserMetadata {
            name: name.map(str::to_string),
            avatar_url: Some("https://avatars.example.com/1.png".to_string()),
        },
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn setup() -> (MemoryBackend, BookmarkList) {
    let backend = MemoryBackend::new();
    backend.sign_in_as(user("u1", None));
    let list = BookmarkList::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        "bookmarks",
        RealtimeSettings::default(),
    );
    (backend, list)
}

async fn loaded(list: &mut BookmarkList) -> MountedList {
    let handle = list.mount("u1");
    handle.load().await.unwrap();
    settle().await;
    handle
}

// ─── Add form ───

#[tokio::test]
async fn missing_field_shows_validation_message() {
    let (backend, mut list) = setup();
    let handle = loaded(&mut list).await;
    let mut form = AddBookmarkForm::new(SIGNAL);
    form.title = "Rust".to_string();

    let result = form.submit(&handle).await;
    assert!(matches!(result, Err(InsertError::Validation(_))));
    assert_eq!(form.error(), Some("Both title and URL are required"));
    assert_eq!(form.title, "Rust");
    assert_eq!(backend.calls().inserts, 0);
}

#[tokio::test]
async fn malformed_url_shows_url_message() {
    let (_backend, mut list) = setup();
    let handle = loaded(&mut list).await;
    let mut form = AddBookmarkForm::new(SIGNAL);
    form.title = "Rust".to_string();
    form.url = "rust-lang".to_string();

    assert!(form.submit(&handle).await.is_err());
    assert_eq!(
        form.error(),
        Some("Please enter a valid URL (include https:// or http://)")
    );
    assert_eq!(form.url, "rust-lang");
}

#[tokio::test]
async fn write_failure_keeps_inputs() {
    let (backend, mut list) = setup();
    let handle = loaded(&mut list).await;
    backend.fail_next_insert(BackendError::Network("offline".to_string()));
    let mut form = AddBookmarkForm::new(SIGNAL);
    form.title = "Rust".to_string();
    form.url = "https://rust-lang.org".to_string();

    assert!(matches!(form.submit(&handle).await, Err(InsertError::Write(_))));
    assert_eq!(form.error(), Some(ADD_FAILED));
    assert_eq!(form.title, "Rust");
    assert_eq!(form.url, "https://rust-lang.org");
    assert!(!form.success().is_visible());
    assert!(handle.bookmarks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn success_clears_inputs_and_signal_expires() {
    let (_backend, mut list) = setup();
    let handle = loaded(&mut list).await;
    let mut form = AddBookmarkForm::new(SIGNAL);
    form.title = "Rust".to_string();
    form.url = "https://rust-lang.org".to_string();

    form.submit(&handle).await.unwrap();
    let view = form.render(handle.is_inserting());
    assert!(view.title.is_empty());
    assert!(view.url.is_empty());
    assert!(view.error.is_none());
    assert!(view.success);

    tokio::time::advance(Duration::from_millis(2999)).await;
    settle().await;
    assert!(form.success().is_visible());

    tokio::time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert!(!form.success().is_visible());
}

#[tokio::test(start_paused = true)]
async fn second_success_restarts_the_signal() {
    let (_backend, mut list) = setup();
    let handle = loaded(&mut list).await;
    let mut form = AddBookmarkForm::new(SIGNAL);

    form.title = "One".to_string();
    form.url = "https://one.example.com".to_string();
    form.submit(&handle).await.unwrap();

    tokio::time::advance(Duration::from_millis(2000)).await;
    form.title = "Two".to_string();
    form.url = "https://two.example.com".to_string();
    form.submit(&handle).await.unwrap();
    assert_eq!(form.success().shown(), 2);

    // The first timer fires here but belongs to an older generation.
    tokio::time::advance(Duration::from_millis(1500)).await;
    settle().await;
    assert!(form.success().is_visible());

    tokio::time::advance(Duration::from_millis(1500)).await;
    settle().await;
    assert!(!form.success().is_visible());
}

#[tokio::test]
async fn error_clears_on_next_submit() {
    let (_backend, mut list) = setup();
    let handle = loaded(&mut list).await;
    let mut form = AddBookmarkForm::new(SIGNAL);

    assert!(form.submit(&handle).await.is_err());
    assert!(form.error().is_some());

    form.title = "Rust".to_string();
    form.url = "https://rust-lang.org".to_string();
    form.submit(&handle).await.unwrap();
    assert!(form.error().is_none());
}

// ─── List view ───

#[tokio::test]
async fn list_view_states() {
    let (backend, mut list) = setup();
    let handle = list.mount("u1");
    let now = Utc::now();
    assert_eq!(ListView::render(&handle, now), ListView::Loading);

    handle.load().await.unwrap();
    settle().await;
    assert_eq!(
        ListView::render(&handle, now),
        ListView::Empty { status: "Live".to_string() }
    );

    backend.seed(Bookmark {
        id: "b1".to_string(),
        user_id: "u1".to_string(),
        title: "Docs".to_string(),
        url: "https://www.docs.rs/serde".to_string(),
        created_at: now - Span::minutes(5),
    });
    handle.load().await.unwrap();
    let view = ListView::render(&handle, now);
    match &view {
        ListView::Items { heading, status, rows } => {
            assert_eq!(heading, "1 Bookmark");
            assert_eq!(status, "Live");
            assert_eq!(rows[0].domain, "docs.rs");
            assert_eq!(rows[0].created, "5m ago");
            assert!(!rows[0].deleting);
        }
        other => panic!("expected items, got {:?}", other),
    }

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["state"], "items");
}

// ─── Formatting ───

#[rstest]
#[case(30, "Just now")]
#[case(60, "1m ago")]
#[case(59 * 60, "59m ago")]
#[case(3600, "1h ago")]
#[case(86_400 * 2, "2d ago")]
fn relative_dates_within_a_week(#[case] age_secs: i64, #[case] expected: &str) {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    assert_eq!(relative_date(now - Span::seconds(age_secs), now), expected);
}

#[test]
fn older_dates_show_calendar_date() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    assert_eq!(relative_date(Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap(), now), "Jan 5");
    assert_eq!(
        relative_date(Utc.with_ymd_and_hms(2023, 12, 25, 9, 0, 0).unwrap(), now),
        "Dec 25, 2023"
    );
}

#[rstest]
#[case("https://www.github.com/rust-lang", "github.com")]
#[case("http://localhost:3000/x", "localhost")]
#[case("not a url", "not a url")]
fn domain_extraction(#[case] url: &str, #[case] expected: &str) {
    assert_eq!(domain(url), expected);
}

#[test]
fn favicon_and_count_labels() {
    assert_eq!(
        favicon_url("https://github.com/rust-lang").as_deref(),
        Some("https://www.google.com/s2/favicons?domain=github.com&sz=32")
    );
    assert_eq!(favicon_url("garbage"), None);
    assert_eq!(count_label(0), "0 Bookmarks");
    assert_eq!(count_label(1), "1 Bookmark");
    assert_eq!(count_label(12), "12 Bookmarks");
}

// ─── Header ───

#[test]
fn header_prefers_metadata_name() {
    assert_eq!(display_name(&user("ada", Some("Ada Lovelace"))), "Ada Lovelace");
    assert_eq!(display_name(&user("ada", None)), "ada");

    let view = Header::new(user("ada", None)).render();
    assert_eq!(view.email.as_deref(), Some("ada@example.com"));
    assert!(view.avatar_url.is_some());
    assert!(!view.signing_out);
}
