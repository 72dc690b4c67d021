use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved bookmark as stored in the backend `bookmarks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    /// Identifier of the owning viewer.
    pub user_id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload sent to the data collaborator.
///
/// The id is generated client-side so the optimistic row and the
/// authoritative change event can be matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub url: String,
}

impl NewBookmark {
    /// Builds the local optimistic record for this payload.
    pub fn to_bookmark(&self, created_at: DateTime<Utc>) -> Bookmark {
        Bookmark {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            created_at,
        }
    }
}

/// Sort direction for a select query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Query passed to `DataService::select`: one equality filter and one ordering column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub filter_column: String,
    pub filter_value: String,
    pub order_column: String,
    pub order: SortOrder,
}

impl SelectQuery {
    /// All bookmarks owned by `user_id`, newest first.
    pub fn owned_by(table: &str, user_id: &str) -> Self {
        Self {
            table: table.to_string(),
            filter_column: "user_id".to_string(),
            filter_value: user_id.to_string(),
            order_column: "created_at".to_string(),
            order: SortOrder::Descending,
        }
    }
}
