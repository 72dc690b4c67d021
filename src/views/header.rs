//! Page header: who is signed in, plus the sign-out control.

use serde::Serialize;

use crate::managers::session_gate::{GateDecision, SessionGate};
use crate::types::errors::AuthError;
use crate::types::session::User;

/// Name shown for `user`: the profile name, else the email's local part.
pub fn display_name(user: &User) -> String {
    if let Some(name) = user.user_metadata.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    user.email
        .as_deref()
        .and_then(|e| e.split('@').next())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderView {
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub signing_out: bool,
}

#[derive(Debug, Clone)]
pub struct Header {
    user: User,
    signing_out: bool,
}

impl Header {
    pub fn new(user: User) -> Self {
        Self {
            user,
            signing_out: false,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn render(&self) -> HeaderView {
        HeaderView {
            display_name: display_name(&self.user),
            email: self.user.email.clone(),
            avatar_url: self.user.user_metadata.avatar_url.clone(),
            signing_out: self.signing_out,
        }
    }

    /// Signs out through `gate`. The busy flag stays set on success since
    /// the page is navigated away.
    pub async fn sign_out(&mut self, gate: &SessionGate) -> Result<GateDecision, AuthError> {
        self.signing_out = true;
        let result = gate.sign_out().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "sign-out failed");
            self.signing_out = false;
        }
        result
    }
}
