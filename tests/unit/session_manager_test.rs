//! Tests for session persistence through `SessionManagerTrait` and its use
//! by the REST auth adapter.

use chrono::Utc;
use tempfile::TempDir;

use smart_bookmarks::database::Database;
use smart_bookmarks::managers::session_manager::{SessionManager, SessionManagerTrait};
use smart_bookmarks::types::errors::SessionError;
use smart_bookmarks::types::session::{Session, User, UserMetadata};

fn session(user_id: &str, expires_in: i64) -> Session {
    Session {
        access_token: format!("{}-access", user_id),
        refresh_token: format!("{}-refresh", user_id),
        expires_at: Utc::now().timestamp() + expires_in,
        user: User {
            id: user_id.to_string(),
            email: Some(format!("{}@example.com", user_id)),
            user_metadata: UserMetadata {
                name: Some("Ada".to_string()),
                avatar_url: None,
            },
        },
    }
}

fn roundtrip(store: &dyn SessionManagerTrait, saved: &Session) -> Session {
    store.save_session(saved).unwrap();
    store.restore_session().unwrap().unwrap()
}

#[test]
fn restored_session_matches_saved_fields() {
    let store = SessionManager::new(Database::open_in_memory().unwrap());
    let saved = session("u1", 3600);
    let restored = roundtrip(&store, &saved);

    assert_eq!(restored.access_token, saved.access_token);
    assert_eq!(restored.refresh_token, saved.refresh_token);
    assert_eq!(restored.expires_at, saved.expires_at);
    assert_eq!(restored.user, saved.user);
}

#[test]
fn clearing_twice_is_harmless() {
    let store = SessionManager::new(Database::open_in_memory().unwrap());
    store.clear_session().unwrap();
    store.save_session(&session("u1", 3600)).unwrap();
    store.clear_session().unwrap();
    store.clear_session().unwrap();
    assert!(!store.has_session());
}

#[test]
fn corrupt_row_is_a_serialization_error() {
    let tmp = TempDir::new().unwrap();
    {
        let db = Database::open_in_dir(tmp.path()).unwrap();
        db.connection()
            .execute(
                "INSERT INTO auth_session (id, user_id, session_json, expires_at, saved_at) \
                 VALUES ('default', 'u1', '{not json', 0, 0)",
                [],
            )
            .unwrap();
    }
    let store = SessionManager::new(Database::open_in_dir(tmp.path()).unwrap());
    assert!(store.has_session());
    assert!(matches!(
        store.restore_session(),
        Err(SessionError::SerializationError(_))
    ));
}

#[cfg(feature = "network")]
mod rest_auth {
    use super::*;
    use smart_bookmarks::services::backend::AuthService;
    use smart_bookmarks::services::rest_backend::RestAuth;
    use smart_bookmarks::types::settings::AppConfig;

    fn config(auto_refresh: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.backend.url = "http://127.0.0.1:9".to_string();
        config.backend.anon_key = "anon".to_string();
        config.auth.auto_refresh_token = auto_refresh;
        config
    }

    fn seeded_store(tmp: &TempDir, saved: &Session) -> SessionManager {
        let store = SessionManager::new(Database::open_in_dir(tmp.path()).unwrap());
        store.save_session(saved).unwrap();
        store
    }

    #[tokio::test]
    async fn adapter_restores_saved_session() {
        let tmp = TempDir::new().unwrap();
        let saved = session("u1", 3600);
        let auth = RestAuth::new(reqwest::Client::new(), config(true), Some(seeded_store(&tmp, &saved)));

        let current = auth.current_session().await.unwrap().unwrap();
        assert_eq!(current.access_token, saved.access_token);
        assert_eq!(current.user.id, "u1");
    }

    #[tokio::test]
    async fn expired_session_is_kept_without_auto_refresh() {
        let tmp = TempDir::new().unwrap();
        let saved = session("u1", -10);
        let auth = RestAuth::new(reqwest::Client::new(), config(false), Some(seeded_store(&tmp, &saved)));

        let current = auth.current_session().await.unwrap().unwrap();
        assert_eq!(current.expires_at, saved.expires_at);
    }

    #[tokio::test]
    async fn adapter_without_store_starts_signed_out() {
        let auth = RestAuth::new(reqwest::Client::new(), config(true), None);
        assert!(auth.current_session().await.unwrap().is_none());
        assert_eq!(auth.get_current_user().await.unwrap(), None);
    }
}
