//! OAuth callback parsing.
//!
//! After the provider flow completes the auth service redirects back to
//! `{site_url}/auth/callback` with the session tokens in the URL fragment
//! (or, on failure, `error` / `error_description` parameters).

use url::Url;

use crate::types::errors::AuthError;

/// Tokens carried by a successful callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Builds the redirect target handed to the auth service.
pub fn callback_url(site_url: &str) -> String {
    format!("{}/auth/callback", site_url.trim_end_matches('/'))
}

/// Extracts session tokens from an OAuth callback URL.
pub fn parse_callback(callback_url: &str) -> Result<CallbackTokens, AuthError> {
    let url = Url::parse(callback_url)
        .map_err(|e| AuthError::InvalidCallback(format!("{}: {}", callback_url, e)))?;

    // Tokens normally arrive in the fragment; errors may arrive in either part.
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(fragment) = url.fragment() {
        pairs.extend(
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
    let get = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    if let Some(error) = get("error") {
        let description = get("error_description").unwrap_or_default();
        return Err(AuthError::Provider(if description.is_empty() {
            error
        } else {
            format!("{}: {}", error, description)
        }));
    }

    let access_token = get("access_token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidCallback("missing access_token".to_string()))?;
    let refresh_token = get("refresh_token")
        .ok_or_else(|| AuthError::InvalidCallback("missing refresh_token".to_string()))?;
    let expires_in = get("expires_in")
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600);

    Ok(CallbackTokens {
        access_token,
        refresh_token,
        expires_in,
    })
}
