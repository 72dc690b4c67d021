//! Unit tests for the session gate and the app's page transitions.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::broadcast;

use smart_bookmarks::app::App;
use smart_bookmarks::managers::session_gate::{GateDecision, Route, SessionGate};
use smart_bookmarks::services::backend::AuthService;
use smart_bookmarks::services::client::BackendClient;
use smart_bookmarks::services::memory_backend::MemoryBackend;
use smart_bookmarks::types::errors::{AuthError, BackendError};
use smart_bookmarks::types::session::{AuthChange, AuthEvent, OAuthProvider, Session, User, UserMetadata};
use smart_bookmarks::types::settings::AppConfig;
use smart_bookmarks::views::bookmark_view::ListView;

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        user_metadata: UserMetadata::default(),
    }
}

fn change(event: AuthEvent, user: Option<User>) -> AuthChange {
    AuthChange {
        event,
        session: user.map(|user| Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 0,
            user,
        }),
    }
}

/// Auth service whose user lookup always fails.
struct BrokenAuth {
    changes: broadcast::Sender<AuthChange>,
}

impl BrokenAuth {
    fn new() -> Self {
        Self { changes: broadcast::channel(4).0 }
    }
}

impl AuthService for BrokenAuth {
    fn get_current_user(&self) -> BoxFuture<'_, Result<Option<User>, AuthError>> {
        async { Err(AuthError::Session("lookup failed".to_string())) }.boxed()
    }

    fn current_session(&self) -> BoxFuture<'_, Result<Option<Session>, AuthError>> {
        async { Err(AuthError::Session("lookup failed".to_string())) }.boxed()
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    fn sign_in(&self, _provider: OAuthProvider, _redirect_to: String) -> BoxFuture<'_, Result<String, AuthError>> {
        async { Err(AuthError::Provider("provider down".to_string())) }.boxed()
    }

    fn complete_sign_in(&self, _callback_url: String) -> BoxFuture<'_, Result<User, AuthError>> {
        async { Err(AuthError::NotAuthenticated) }.boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        async { Err(AuthError::Session("sign-out failed".to_string())) }.boxed()
    }
}

fn gate(backend: &MemoryBackend) -> SessionGate {
    SessionGate::new(Arc::new(backend.clone()))
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.backend.site_url = "https://bookmarks.example.com/".to_string();
    config
}

// ─── Gate decisions ───

#[test]
fn pure_decisions_for_each_route() {
    let u = user("u1");
    assert_eq!(GateDecision::for_route(Route::Home, None), GateDecision::Render(None));
    assert_eq!(
        GateDecision::for_route(Route::Home, Some(&u)),
        GateDecision::Redirect(Route::Bookmarks)
    );
    assert_eq!(
        GateDecision::for_route(Route::Bookmarks, None),
        GateDecision::Redirect(Route::Home)
    );
    assert_eq!(
        GateDecision::for_route(Route::Bookmarks, Some(&u)),
        GateDecision::Render(Some(u.clone()))
    );
    assert_eq!(Route::Home.path(), "/");
    assert_eq!(Route::Bookmarks.path(), "/bookmarks");
}

#[tokio::test]
async fn resolve_follows_current_user() {
    let backend = MemoryBackend::new();
    let gate = gate(&backend);
    assert_eq!(gate.resolve(Route::Bookmarks).await, GateDecision::Redirect(Route::Home));

    backend.sign_in_as(user("u1"));
    assert_eq!(gate.resolve(Route::Home).await, GateDecision::Redirect(Route::Bookmarks));
    assert_eq!(gate.resolve(Route::Bookmarks).await.viewer().map(|u| u.id.as_str()), Some("u1"));
}

#[tokio::test]
async fn lookup_error_counts_as_signed_out() {
    let gate = SessionGate::new(Arc::new(BrokenAuth::new()));
    assert_eq!(gate.resolve(Route::Home).await, GateDecision::Render(None));
    assert_eq!(gate.resolve(Route::Bookmarks).await, GateDecision::Redirect(Route::Home));
}

#[test]
fn auth_change_decisions() {
    let gate = SessionGate::new(Arc::new(MemoryBackend::new()));
    assert_eq!(
        gate.on_auth_change(Route::Bookmarks, &change(AuthEvent::SignedOut, None)),
        GateDecision::Redirect(Route::Home)
    );
    assert_eq!(
        gate.on_auth_change(Route::Home, &change(AuthEvent::SignedIn, Some(user("u1")))),
        GateDecision::Redirect(Route::Bookmarks)
    );
    assert!(matches!(
        gate.on_auth_change(Route::Bookmarks, &change(AuthEvent::TokenRefreshed, Some(user("u1")))),
        GateDecision::Render(Some(_))
    ));
}

// ─── Sign in / out ───

#[tokio::test]
async fn sign_in_redirects_through_callback() {
    let backend = MemoryBackend::new();
    backend.set_oauth_user(user("u1"));
    let gate = gate(&backend);

    let url = gate
        .sign_in(OAuthProvider::Google, "https://bookmarks.example.com/")
        .await
        .unwrap();
    assert!(url.starts_with("https://bookmarks.example.com/auth/callback#access_token="));

    let signed_in = gate.complete_sign_in(&url).await.unwrap();
    assert_eq!(signed_in.id, "u1");
    assert_eq!(gate.resolve(Route::Home).await, GateDecision::Redirect(Route::Bookmarks));
}

#[tokio::test]
async fn callback_error_is_reported() {
    let backend = MemoryBackend::new();
    backend.set_oauth_user(user("u1"));
    let gate = gate(&backend);

    let result = gate
        .complete_sign_in("https://bookmarks.example.com/auth/callback?error=access_denied&error_description=denied")
        .await;
    assert_eq!(result, Err(AuthError::Provider("access_denied: denied".to_string())));
    assert_eq!(gate.resolve(Route::Bookmarks).await, GateDecision::Redirect(Route::Home));
}

#[tokio::test]
async fn provider_failure_surfaces() {
    let gate = SessionGate::new(Arc::new(BrokenAuth::new()));
    assert!(matches!(
        gate.sign_in(OAuthProvider::GitHub, "https://x.example.com").await,
        Err(AuthError::Provider(_))
    ));
}

#[tokio::test]
async fn sign_out_redirects_home() {
    let backend = MemoryBackend::new();
    backend.sign_in_as(user("u1"));
    let gate = gate(&backend);
    let mut changes = gate.watch();

    assert_eq!(gate.sign_out().await, Ok(GateDecision::Redirect(Route::Home)));
    assert_eq!(changes.recv().await.unwrap().event, AuthEvent::SignedOut);
    assert_eq!(gate.resolve(Route::Bookmarks).await, GateDecision::Redirect(Route::Home));
}

// ─── App transitions ───

#[tokio::test]
async fn app_full_sign_in_flow() {
    let backend = MemoryBackend::new();
    backend.set_oauth_user(user("u1"));
    let mut app = App::new(Arc::new(BackendClient::in_memory(config(), backend.clone())));

    assert_eq!(app.open(Route::Bookmarks).await, GateDecision::Render(None));
    assert_eq!(app.route(), Route::Home);
    assert!(app.list().is_none());

    let url = app.sign_in(None).await.unwrap();
    let decision = app.complete_sign_in(&url).await.unwrap();
    assert!(matches!(decision, GateDecision::Render(Some(_))));
    assert_eq!(app.route(), Route::Bookmarks);
    assert_eq!(app.viewer().map(|u| u.id.as_str()), Some("u1"));
    assert_eq!(backend.open_channels(), 1);

    app.sign_out().await.unwrap();
    assert_eq!(app.route(), Route::Home);
    assert!(app.list().is_none());
    assert_eq!(backend.open_channels(), 0);
}

#[tokio::test]
async fn app_leaves_bookmarks_on_remote_sign_out() {
    let backend = MemoryBackend::new();
    backend.sign_in_as(user("u1"));
    let mut app = App::new(Arc::new(BackendClient::in_memory(config(), backend.clone())));
    app.open(Route::Home).await;
    assert_eq!(app.route(), Route::Bookmarks);

    let decision = app.handle_auth_change(&change(AuthEvent::SignedOut, None)).await;
    assert_eq!(decision, GateDecision::Redirect(Route::Home));
    assert_eq!(app.route(), Route::Home);
    assert!(app.view().list.is_none());
    assert_eq!(backend.open_channels(), 0);
}

#[tokio::test]
async fn app_shows_page_when_initial_load_fails() {
    let backend = MemoryBackend::new();
    backend.sign_in_as(user("u1"));
    backend.fail_next_select(BackendError::Network("offline".to_string()));
    let mut app = App::new(Arc::new(BackendClient::in_memory(config(), backend.clone())));

    assert!(matches!(app.open(Route::Bookmarks).await, GateDecision::Render(Some(_))));
    assert_eq!(app.route(), Route::Bookmarks);
    let list = app.view().list.expect("list is mounted");
    assert!(matches!(list, ListView::Empty { .. }));
}

#[tokio::test]
async fn failed_sign_out_keeps_the_page() {
    let backend = MemoryBackend::new();
    let client = BackendClient::new(
        config(),
        Arc::new(BrokenAuth::new()),
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
    );
    let mut app = App::new(Arc::new(client));
    assert!(app.sign_out().await.is_err());
    assert_eq!(app.route(), Route::Home);
}
