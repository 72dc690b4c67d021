//! Tests for the process-wide backend client.
//!
//! The shared slot is global to this test binary, so every step that
//! touches it lives in one test.

use std::sync::Arc;

use smart_bookmarks::services::client::{self, BackendClient, ENV_BACKEND};
use smart_bookmarks::services::memory_backend::MemoryBackend;
use smart_bookmarks::types::bookmark::SelectQuery;
use smart_bookmarks::types::errors::BackendError;
use smart_bookmarks::types::session::User;
use smart_bookmarks::types::settings::AppConfig;

#[test]
fn shared_client_lifecycle() {
    client::reset();
    assert!(client::current().is_none());

    // A failed build leaves the slot empty.
    let failed = client::shared_client(|| Err(BackendError::NotConfigured));
    assert!(matches!(failed, Err(BackendError::NotConfigured)));
    assert!(client::current().is_none());

    let first = client::shared_client(|| Ok(BackendClient::in_memory(AppConfig::default(), MemoryBackend::new())))
        .unwrap();
    let second = client::shared_client(|| panic!("must reuse the existing client")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let mut config = AppConfig::default();
    config.table = "saved_links".to_string();
    let installed = client::install(BackendClient::in_memory(config, MemoryBackend::new()));
    let current = client::current().unwrap();
    assert!(Arc::ptr_eq(&installed, &current));
    assert_eq!(current.config().table, "saved_links");

    client::reset();
    assert!(client::current().is_none());
}

#[test]
fn from_config_selects_backend() {
    std::env::remove_var(ENV_BACKEND);
    assert!(matches!(
        BackendClient::from_config(AppConfig::default()),
        Err(BackendError::NotConfigured)
    ));

    std::env::set_var(ENV_BACKEND, "memory");
    let memory = BackendClient::from_config(AppConfig::default()).unwrap();
    assert_eq!(memory.config().table, "bookmarks");
    std::env::remove_var(ENV_BACKEND);
}

#[tokio::test]
async fn in_memory_collaborators_share_state() {
    let backend = MemoryBackend::new();
    let client = BackendClient::in_memory(AppConfig::default(), backend.clone());

    backend.sign_in_as(User {
        id: "u1".to_string(),
        email: None,
        user_metadata: Default::default(),
    });
    let user = client.auth().get_current_user().await.unwrap();
    assert_eq!(user.map(|u| u.id), Some("u1".to_string()));

    client
        .data()
        .select(SelectQuery::owned_by("bookmarks", "u1"))
        .await
        .unwrap();
    assert_eq!(backend.calls().selects, 1);
}
