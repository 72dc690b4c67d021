use thiserror::Error;

// === ValidationError ===

/// Bad user input, caught before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Title or URL is empty after trimming.
    #[error("Both title and URL are required")]
    MissingField,
    /// The URL does not parse as an absolute URL with a host.
    #[error("Please enter a valid URL (include https:// or http://)")]
    InvalidUrl(String),
}

// === BackendError ===

/// Failures reported by a backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never reached the backend or the connection dropped.
    #[error("Backend network error: {0}")]
    Network(String),
    /// The backend answered with a non-success status.
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The backend response could not be decoded.
    #[error("Backend decode error: {0}")]
    Decode(String),
    /// No backend URL or key has been configured.
    #[error("Backend is not configured")]
    NotConfigured,
    /// The request needs a signed-in viewer.
    #[error("Not authenticated")]
    Unauthenticated,
}

// === FetchError ===

/// Errors from the initial bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Failed to fetch bookmarks: {0}")]
    Backend(BackendError),
    /// The view was torn down before the fetch resolved.
    #[error("Bookmark list is not mounted")]
    NotMounted,
}

// === InsertError ===

/// Errors from adding a bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The remote write failed; the optimistic row has been rolled back.
    #[error("Failed to add bookmark: {0}")]
    Write(BackendError),
    /// A submission is already in flight.
    #[error("A bookmark is already being added")]
    Busy,
    #[error("Bookmark list is not mounted")]
    NotMounted,
}

// === DeleteError ===

/// Errors from deleting a bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeleteError {
    /// The remote delete failed; the pre-delete sequence has been restored.
    #[error("Failed to delete bookmark: {0}")]
    Backend(BackendError),
    #[error("Bookmark not found: {0}")]
    NotFound(String),
    /// A delete for this id is already in flight.
    #[error("Bookmark is already being deleted: {0}")]
    InProgress(String),
    #[error("Bookmark list is not mounted")]
    NotMounted,
}

// === SubscriptionError ===

/// Errors opening or running a change-feed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The feed refused the subscription (authorization or configuration).
    #[error("Channel error: {0}")]
    Channel(String),
    /// The underlying transport failed.
    #[error("Realtime transport error: {0}")]
    Transport(String),
}

// === AuthError ===

/// Errors related to authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The OAuth provider or auth service returned an error.
    #[error("Auth provider error: {0}")]
    Provider(String),
    /// The OAuth callback URL carried no usable session.
    #[error("Invalid auth callback: {0}")]
    InvalidCallback(String),
    #[error("Auth backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Auth session error: {0}")]
    Session(String),
}

// === SettingsError ===

/// Errors related to configuration management.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    #[error("Settings I/O error: {0}")]
    IoError(String),
    /// Failed to serialize or deserialize settings.
    #[error("Settings serialization error: {0}")]
    SerializationError(String),
    /// The provided settings key is invalid.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The provided settings value is invalid.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}

// === SessionError ===

/// Errors related to persisting the auth session locally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to serialize or deserialize session data.
    #[error("Session serialization error: {0}")]
    SerializationError(String),
    /// Database operation failed.
    #[error("Session database error: {0}")]
    DatabaseError(String),
}
