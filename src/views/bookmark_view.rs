//! Render model for the bookmark list.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::managers::bookmark_list::MountedList;
use crate::types::bookmark::Bookmark;
use crate::views::format;

pub const EMPTY_TITLE: &str = "No bookmarks yet";
pub const LOADING_TEXT: &str = "Loading your bookmarks...";
pub const DELETE_FAILED: &str = "Failed to delete bookmark. Please try again.";

/// One rendered bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkRow {
    pub id: String,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub favicon_url: Option<String>,
    pub created: String,
    /// The delete control is disabled while the row's delete is in flight.
    pub deleting: bool,
}

impl BookmarkRow {
    pub fn new(bookmark: &Bookmark, deleting: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: bookmark.id.clone(),
            title: bookmark.title.clone(),
            url: bookmark.url.clone(),
            domain: format::domain(&bookmark.url),
            favicon_url: format::favicon_url(&bookmark.url),
            created: format::relative_date(bookmark.created_at, now),
            deleting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListView {
    Loading,
    Empty {
        status: String,
    },
    Items {
        heading: String,
        status: String,
        rows: Vec<BookmarkRow>,
    },
}

impl ListView {
    pub fn render(list: &MountedList, now: DateTime<Utc>) -> Self {
        if list.is_loading() {
            return ListView::Loading;
        }
        let status = list.status().label().to_string();
        let bookmarks = list.bookmarks();
        if bookmarks.is_empty() {
            return ListView::Empty { status };
        }
        ListView::Items {
            heading: format::count_label(bookmarks.len()),
            status,
            rows: bookmarks
                .iter()
                .map(|b| BookmarkRow::new(b, list.is_deleting(&b.id), now))
                .collect(),
        }
    }

    pub fn rows(&self) -> &[BookmarkRow] {
        match self {
            ListView::Items { rows, .. } => rows,
            _ => &[],
        }
    }
}
