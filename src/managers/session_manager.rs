//! Session Manager for Smart Bookmarks.
//!
//! Persists the signed-in auth session in the local SQLite database so the
//! viewer stays signed in across restarts.

use rusqlite::params;

use crate::database::connection::Database;
use crate::types::errors::SessionError;
use crate::types::session::Session;

const SESSION_ROW_ID: &str = "default";

/// Trait defining session persistence operations.
pub trait SessionManagerTrait {
    fn save_session(&self, session: &Session) -> Result<(), SessionError>;
    fn restore_session(&self) -> Result<Option<Session>, SessionError>;
    fn has_session(&self) -> bool;
    fn clear_session(&self) -> Result<(), SessionError>;
}

/// Session persistence backed by SQLite.
///
/// Owns its [`Database`] so it can move into the auth adapter, which shares
/// it behind a mutex.
pub struct SessionManager {
    db: Database,
}

impl SessionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SessionManagerTrait for SessionManager {
    /// Stores `session`, replacing any previously saved one.
    fn save_session(&self, session: &Session) -> Result<(), SessionError> {
        let json = serde_json::to_string(session)
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;
        let now = chrono::Utc::now().timestamp();

        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO auth_session (id, user_id, session_json, expires_at, saved_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![SESSION_ROW_ID, session.user.id, json, session.expires_at, now],
            )
            .map_err(|e| SessionError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// Returns the saved session, if any.
    fn restore_session(&self) -> Result<Option<Session>, SessionError> {
        let result = self.db.connection().query_row(
            "SELECT session_json FROM auth_session WHERE id = ?1",
            params![SESSION_ROW_ID],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(json) => {
                let session: Session = serde_json::from_str(&json)
                    .map_err(|e| SessionError::SerializationError(e.to_string()))?;
                Ok(Some(session))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::DatabaseError(e.to_string())),
        }
    }

    fn has_session(&self) -> bool {
        self.db
            .connection()
            .query_row("SELECT COUNT(*) FROM auth_session", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0)
            > 0
    }

    fn clear_session(&self) -> Result<(), SessionError> {
        self.db
            .connection()
            .execute("DELETE FROM auth_session", [])
            .map_err(|e| SessionError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
