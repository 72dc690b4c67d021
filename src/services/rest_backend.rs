//! HTTP adapters for the managed backend.
//!
//! [`RestAuth`] talks to the auth API (`/auth/v1`), [`RestData`] to the
//! row API (`/rest/v1`). Every request carries the anonymous project key in
//! `apikey`; row requests add the viewer's access token as a bearer so the
//! backend's row-level security sees who is asking.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use url::Url;

use crate::managers::session_manager::{SessionManager, SessionManagerTrait};
use crate::services::auth_callback;
use crate::services::backend::{AuthService, DataService};
use crate::types::bookmark::{Bookmark, NewBookmark, SelectQuery, SortOrder};
use crate::types::errors::{AuthError, BackendError};
use crate::types::session::{AuthChange, AuthEvent, OAuthProvider, Session, User};
use crate::types::settings::AppConfig;

/// Seconds before expiry at which the access token is refreshed.
const REFRESH_MARGIN_SECS: i64 = 60;

fn network(e: reqwest::Error) -> BackendError {
    BackendError::Network(e.to_string())
}

/// Turns a non-success response into `Rejected`, keeping the backend message.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or(body);
    Err(BackendError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in.unwrap_or(3600));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Auth adapter holding the current session in memory and, when enabled,
/// in the local session store.
pub struct RestAuth {
    http: Client,
    config: AppConfig,
    session: RwLock<Option<Session>>,
    store: Option<Mutex<SessionManager>>,
    changes: broadcast::Sender<AuthChange>,
}

impl RestAuth {
    /// Restores a persisted session from `store` if one exists.
    pub fn new(http: Client, config: AppConfig, store: Option<SessionManager>) -> Self {
        let restored = store.as_ref().and_then(|s| match s.restore_session() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "could not restore saved session");
                None
            }
        });
        if restored.is_some() {
            tracing::info!("restored saved session");
        }
        let (changes, _) = broadcast::channel(32);
        Self {
            http,
            config,
            session: RwLock::new(restored),
            store: store.map(Mutex::new),
            changes,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        if !self.config.backend.is_configured() {
            return Err(BackendError::NotConfigured);
        }
        let base = self.config.backend.url.trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path)).map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.config.backend.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.config.backend.anon_key)
            .bearer_auth(bearer)
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(store) = &self.store else {
            return;
        };
        let store = store.lock().unwrap_or_else(|e| e.into_inner());
        let result = match session {
            Some(session) => store.save_session(session),
            None => store.clear_session(),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist session");
        }
    }

    fn notify(&self, event: AuthEvent, session: Option<Session>) {
        let _ = self.changes.send(AuthChange { event, session });
    }

    async fn set_session(&self, session: Option<Session>, event: AuthEvent) {
        self.persist(session.as_ref());
        *self.session.write().await = session.clone();
        self.notify(event, session);
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<User>, BackendError> {
        let url = self.endpoint("/auth/v1/user")?;
        let response = self
            .request(Method::GET, url, Some(access_token))
            .send()
            .await
            .map_err(network)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let user = check(response)
            .await?
            .json::<User>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(Some(user))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Option<Session>, AuthError> {
        let mut url = self.endpoint("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");
        let response = self
            .request(Method::POST, url, None)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(network)?;

        match check(response).await {
            Ok(response) => {
                let tokens = response
                    .json::<TokenResponse>()
                    .await
                    .map_err(|e| BackendError::Decode(e.to_string()))?;
                let session = tokens.into_session();
                tracing::debug!("access token refreshed");
                self.set_session(Some(session.clone()), AuthEvent::TokenRefreshed).await;
                Ok(Some(session))
            }
            Err(BackendError::Rejected { status, message }) if (400..500).contains(&status) => {
                tracing::warn!(status, message = %message, "refresh token rejected, signing out");
                self.set_session(None, AuthEvent::SignedOut).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl AuthService for RestAuth {
    fn get_current_user(&self) -> BoxFuture<'_, Result<Option<User>, AuthError>> {
        async move {
            let Some(session) = self.current_session().await? else {
                return Ok(None);
            };
            match self.fetch_user(&session.access_token).await? {
                Some(user) => Ok(Some(user)),
                None => {
                    tracing::info!("stored session no longer valid");
                    self.set_session(None, AuthEvent::SignedOut).await;
                    Ok(None)
                }
            }
        }
        .boxed()
    }

    fn current_session(&self) -> BoxFuture<'_, Result<Option<Session>, AuthError>> {
        async move {
            let session = self.session.read().await.clone();
            match session {
                Some(s)
                    if self.config.auth.auto_refresh_token
                        && s.expires_within(Utc::now().timestamp(), REFRESH_MARGIN_SECS) =>
                {
                    self.refresh(&s.refresh_token).await
                }
                other => Ok(other),
            }
        }
        .boxed()
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    fn sign_in(&self, provider: OAuthProvider, redirect_to: String) -> BoxFuture<'_, Result<String, AuthError>> {
        async move {
            let mut url = self.endpoint("/auth/v1/authorize")?;
            url.query_pairs_mut()
                .append_pair("provider", provider.as_str())
                .append_pair("redirect_to", &redirect_to);
            Ok(url.to_string())
        }
        .boxed()
    }

    fn complete_sign_in(&self, callback_url: String) -> BoxFuture<'_, Result<User, AuthError>> {
        async move {
            let tokens = auth_callback::parse_callback(&callback_url)?;
            let user = self
                .fetch_user(&tokens.access_token)
                .await?
                .ok_or_else(|| AuthError::Provider("access token was not accepted".to_string()))?;
            let session = Session {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                expires_at: Utc::now().timestamp() + tokens.expires_in,
                user: user.clone(),
            };
            tracing::info!(user = %user.id, "signed in");
            self.set_session(Some(session), AuthEvent::SignedIn).await;
            Ok(user)
        }
        .boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        async move {
            let session = self.session.read().await.clone();
            if let Some(session) = session {
                let url = self.endpoint("/auth/v1/logout")?;
                let result = self
                    .request(Method::POST, url, Some(&session.access_token))
                    .send()
                    .await
                    .map_err(network);
                match result {
                    Ok(response) => {
                        if let Err(e) = check(response).await {
                            tracing::warn!(error = %e, "remote sign-out failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "remote sign-out failed"),
                }
            }
            self.set_session(None, AuthEvent::SignedOut).await;
            Ok(())
        }
        .boxed()
    }
}

/// Row adapter for the bookmarks table.
pub struct RestData {
    http: Client,
    config: AppConfig,
    auth: Arc<RestAuth>,
}

impl RestData {
    pub fn new(http: Client, config: AppConfig, auth: Arc<RestAuth>) -> Self {
        Self { http, config, auth }
    }

    async fn authorized(&self, method: Method, url: Url) -> Result<RequestBuilder, BackendError> {
        let session = self
            .auth
            .current_session()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?
            .ok_or(BackendError::Unauthenticated)?;
        Ok(self.auth.request(method, url, Some(&session.access_token)))
    }

    fn table_url(&self, table: &str) -> Result<Url, BackendError> {
        self.auth.endpoint(&format!("/rest/v1/{}", table))
    }
}

impl DataService for RestData {
    fn select(&self, query: SelectQuery) -> BoxFuture<'_, Result<Vec<Bookmark>, BackendError>> {
        async move {
            let mut url = self.table_url(&query.table)?;
            let direction = match query.order {
                SortOrder::Ascending => "asc",
                SortOrder::Descending => "desc",
            };
            url.query_pairs_mut()
                .append_pair("select", "*")
                .append_pair(&query.filter_column, &format!("eq.{}", query.filter_value))
                .append_pair("order", &format!("{}.{}", query.order_column, direction));

            let response = self
                .authorized(Method::GET, url)
                .await?
                .send()
                .await
                .map_err(network)?;
            check(response)
                .await?
                .json::<Vec<Bookmark>>()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()))
        }
        .boxed()
    }

    fn insert(&self, table: String, record: NewBookmark) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            let url = self.table_url(&table)?;
            let response = self
                .authorized(Method::POST, url)
                .await?
                .header("Prefer", "return=minimal")
                .json(&[record])
                .send()
                .await
                .map_err(network)?;
            check(response).await.map(|_| ())
        }
        .boxed()
    }

    fn delete(&self, table: String, id: String) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            let mut url = self.table_url(&table)?;
            url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
            let response = self
                .authorized(Method::DELETE, url)
                .await?
                .send()
                .await
                .map_err(network)?;
            check(response).await.map(|_| ())
        }
        .boxed()
    }
}
