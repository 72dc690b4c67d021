//! App Core for Smart Bookmarks.
//!
//! Holds the gate, the bookmark list and the page widgets, and moves between
//! the home page and the bookmarks page as the auth state changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::managers::bookmark_list::{BookmarkList, MountedList};
use crate::managers::session_gate::{GateDecision, Route, SessionGate};
use crate::services::client::BackendClient;
use crate::types::bookmark::Bookmark;
use crate::types::errors::{AuthError, DeleteError, InsertError};
use crate::types::session::{AuthChange, OAuthProvider, User};
use crate::views::add_bookmark::{AddBookmarkForm, FormView};
use crate::views::bookmark_view::ListView;
use crate::views::header::{Header, HeaderView};

/// Snapshot of everything the shell renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub route: &'static str,
    pub header: Option<HeaderView>,
    pub form: Option<FormView>,
    pub list: Option<ListView>,
}

pub struct App {
    client: Arc<BackendClient>,
    gate: SessionGate,
    list: BookmarkList,
    form: AddBookmarkForm,
    header: Option<Header>,
    route: Route,
}

impl App {
    pub fn new(client: Arc<BackendClient>) -> Self {
        let config = client.config();
        let list = BookmarkList::new(
            client.data(),
            client.realtime(),
            &config.table,
            config.realtime.clone(),
        );
        let form = AddBookmarkForm::new(Duration::from_millis(config.ui.success_signal_ms));
        Self {
            gate: SessionGate::new(client.auth()),
            client,
            list,
            form,
            header: None,
            route: Route::Home,
        }
    }

    pub fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn viewer(&self) -> Option<&User> {
        self.header.as_ref().map(Header::user)
    }

    /// Handle to the mounted list, if the bookmarks page is showing.
    pub fn list(&self) -> Option<MountedList> {
        self.list.current().cloned()
    }

    pub fn form(&self) -> &AddBookmarkForm {
        &self.form
    }

    /// Receiver bumped whenever the rendered list may have changed.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.list.watch()
    }

    pub fn auth_changes(&self) -> broadcast::Receiver<AuthChange> {
        self.gate.watch()
    }

    /// Navigates to `route`, following at most one gate redirect.
    pub async fn open(&mut self, route: Route) -> GateDecision {
        let mut target = route;
        let mut decision = self.gate.resolve(target).await;
        if let GateDecision::Redirect(next) = decision {
            target = next;
            decision = self.gate.resolve(target).await;
        }
        self.apply(target, &decision).await;
        decision
    }

    /// Reacts to an auth change notification for the current page.
    pub async fn handle_auth_change(&mut self, change: &AuthChange) -> GateDecision {
        let decision = self.gate.on_auth_change(self.route, change);
        match &decision {
            GateDecision::Redirect(next) => {
                let follow = GateDecision::for_route(*next, change.user());
                self.apply(*next, &follow).await;
            }
            render => self.apply(self.route, render).await,
        }
        decision
    }

    async fn apply(&mut self, route: Route, decision: &GateDecision) {
        match (route, decision) {
            (Route::Bookmarks, GateDecision::Render(Some(user))) => {
                self.route = Route::Bookmarks;
                self.show_bookmarks(user.clone()).await;
            }
            (_, GateDecision::Redirect(_)) => {
                // Still bouncing between pages; render nothing until the next check.
                self.leave_bookmarks();
            }
            (route, _) => {
                self.route = route;
                self.leave_bookmarks();
            }
        }
    }

    async fn show_bookmarks(&mut self, user: User) {
        let switching = self.viewer().map(|v| v.id != user.id).unwrap_or(true);
        if switching {
            self.form.reset();
        }
        let list = self.list.mount(&user.id);
        self.header = Some(Header::new(user));
        if !list.store().read(|s| s.is_loaded()) {
            if let Err(e) = list.load().await {
                tracing::debug!(error = %e, viewer = %list.viewer_id(), "bookmarks page shown without a fresh load");
            }
        }
    }

    fn leave_bookmarks(&mut self) {
        self.list.unmount();
        self.header = None;
        self.form.reset();
    }

    /// Starts the OAuth flow. Uses the configured provider when `provider` is `None`.
    pub async fn sign_in(&self, provider: Option<OAuthProvider>) -> Result<String, AuthError> {
        let config = self.client.config();
        let provider = provider.unwrap_or(config.auth.provider);
        self.gate.sign_in(provider, &config.backend.site_url).await
    }

    /// Finishes the OAuth flow and lands on the bookmarks page.
    pub async fn complete_sign_in(&mut self, callback_url: &str) -> Result<GateDecision, AuthError> {
        self.gate.complete_sign_in(callback_url).await?;
        Ok(self.open(Route::Bookmarks).await)
    }

    pub async fn sign_out(&mut self) -> Result<GateDecision, AuthError> {
        let decision = match self.header.as_mut() {
            Some(header) => header.sign_out(&self.gate).await?,
            None => self.gate.sign_out().await?,
        };
        self.route = Route::Home;
        self.leave_bookmarks();
        Ok(decision)
    }

    /// Fills the form with `title` and `url` and submits it.
    pub async fn add_bookmark(&mut self, title: &str, url: &str) -> Result<Bookmark, InsertError> {
        let list = self.list().ok_or(InsertError::NotMounted)?;
        self.form.title = title.to_string();
        self.form.url = url.to_string();
        self.form.submit(&list).await
    }

    pub async fn delete_bookmark(&self, id: &str) -> Result<(), DeleteError> {
        let list = self.list().ok_or(DeleteError::NotMounted)?;
        list.delete_local(id).await
    }

    pub fn view(&self) -> PageView {
        let list = self.list.current();
        PageView {
            route: self.route.path(),
            header: self.header.as_ref().map(Header::render),
            form: list.map(|l| self.form.render(l.is_inserting())),
            list: list.map(|l| ListView::render(l, Utc::now())),
        }
    }

    /// Tears down any mounted view.
    pub fn shutdown(&mut self) {
        self.leave_bookmarks();
    }
}
