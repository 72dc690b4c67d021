//! Session Gate for Smart Bookmarks.
//!
//! Decides whether a page renders or redirects based on the auth state:
//! the home page sends signed-in viewers to `/bookmarks`, the bookmarks
//! page sends anonymous visitors back to `/`.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::services::auth_callback;
use crate::services::backend::AuthService;
use crate::types::errors::AuthError;
use crate::types::session::{AuthChange, OAuthProvider, User};

/// Pages guarded by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Bookmarks,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Bookmarks => "/bookmarks",
        }
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Render the page for this (possibly absent) viewer.
    Render(Option<User>),
    /// Navigate elsewhere.
    Redirect(Route),
}

impl GateDecision {
    /// Pure decision for `route` given the current viewer.
    pub fn for_route(route: Route, user: Option<&User>) -> Self {
        match (route, user) {
            (Route::Bookmarks, None) => GateDecision::Redirect(Route::Home),
            (Route::Home, Some(_)) => GateDecision::Redirect(Route::Bookmarks),
            (_, user) => GateDecision::Render(user.cloned()),
        }
    }

    pub fn viewer(&self) -> Option<&User> {
        match self {
            GateDecision::Render(user) => user.as_ref(),
            GateDecision::Redirect(_) => None,
        }
    }
}

/// Auth-backed gate shared by the pages.
#[derive(Clone)]
pub struct SessionGate {
    auth: Arc<dyn AuthService>,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }

    /// Checks the current user for `route`.
    ///
    /// A failing user lookup is treated as "not signed in".
    pub async fn resolve(&self, route: Route) -> GateDecision {
        let user = match self.auth.get_current_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "user lookup failed, treating viewer as signed out");
                None
            }
        };
        GateDecision::for_route(route, user.as_ref())
    }

    /// Decision for `route` after an auth change notification.
    pub fn on_auth_change(&self, route: Route, change: &AuthChange) -> GateDecision {
        tracing::debug!(event = ?change.event, "auth state changed");
        GateDecision::for_route(route, change.user())
    }

    /// Subscribes to auth change notifications.
    pub fn watch(&self) -> broadcast::Receiver<AuthChange> {
        self.auth.on_auth_change()
    }

    /// Starts an OAuth sign-in; returns the authorize URL to navigate to.
    pub async fn sign_in(&self, provider: OAuthProvider, site_url: &str) -> Result<String, AuthError> {
        let redirect_to = auth_callback::callback_url(site_url);
        self.auth.sign_in(provider, redirect_to).await.map_err(|e| {
            tracing::error!(error = %e, "error signing in");
            e
        })
    }

    /// Finishes the OAuth flow from the callback URL.
    pub async fn complete_sign_in(&self, callback_url: &str) -> Result<User, AuthError> {
        self.auth.complete_sign_in(callback_url.to_string()).await
    }

    /// Signs out and returns the redirect to the home page.
    pub async fn sign_out(&self) -> Result<GateDecision, AuthError> {
        self.auth.sign_out().await?;
        Ok(GateDecision::Redirect(Route::Home))
    }
}
