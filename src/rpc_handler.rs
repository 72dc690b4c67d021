//! RPC method handler for the Smart Bookmarks JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be unit-tested independently.
//! `handle_method` dispatches one call to the [`App`].

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::app::App;
use crate::managers::session_gate::{GateDecision, Route};
use crate::types::errors::{DeleteError, InsertError};
use crate::types::session::OAuthProvider;
use crate::views::bookmark_view::DELETE_FAILED;

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

fn decision_json(decision: &GateDecision) -> Value {
    match decision {
        GateDecision::Render(user) => json!({"render": true, "user": user}),
        GateDecision::Redirect(route) => json!({"redirect": route.path()}),
    }
}

fn parse_route(path: &str) -> Result<Route, String> {
    match path {
        "/" => Ok(Route::Home),
        "/bookmarks" => Ok(Route::Bookmarks),
        other => Err(format!("unknown route: {}", other)),
    }
}

/// Dispatch a JSON-RPC method call.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
/// Deletes release the app lock while the remote call is in flight so that
/// several rows can be deleted concurrently.
pub async fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true, "version": env!("CARGO_PKG_VERSION")})),

        // ─── Session ───
        "session.open" => {
            let route = parse_route(params.get("route").and_then(|v| v.as_str()).unwrap_or("/bookmarks"))?;
            let mut a = app.lock().await;
            let decision = a.open(route).await;
            Ok(decision_json(&decision))
        }
        "session.status" => {
            let a = app.lock().await;
            Ok(json!({"route": a.route().path(), "user": a.viewer()}))
        }
        "session.sign_in" => {
            let provider = match params.get("provider").and_then(|v| v.as_str()) {
                Some(name) => Some(OAuthProvider::parse(name).ok_or_else(|| format!("unknown provider: {}", name))?),
                None => None,
            };
            let a = app.lock().await;
            let url = a.sign_in(provider).await.map_err(|e| e.to_string())?;
            Ok(json!({"url": url}))
        }
        "session.complete" => {
            let url = str_param(params, "url")?;
            let mut a = app.lock().await;
            let decision = a.complete_sign_in(url).await.map_err(|e| e.to_string())?;
            Ok(decision_json(&decision))
        }
        "session.sign_out" => {
            let mut a = app.lock().await;
            let decision = a.sign_out().await.map_err(|e| e.to_string())?;
            Ok(decision_json(&decision))
        }

        // ─── Bookmarks ───
        "bookmark.list" => {
            let a = app.lock().await;
            serde_json::to_value(a.view()).map_err(|e| e.to_string())
        }
        "bookmark.add" => {
            let title = params.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = params.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let mut a = app.lock().await;
            match a.add_bookmark(title, url).await {
                Ok(bookmark) => Ok(json!(bookmark)),
                Err(InsertError::Busy) => Err("add already in progress".to_string()),
                Err(InsertError::NotMounted) => Err("bookmarks page is not open".to_string()),
                Err(_) => Err(a.form().error().unwrap_or("add failed").to_string()),
            }
        }
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            let list = app.lock().await.list().ok_or("bookmarks page is not open")?;
            match list.delete_local(id).await {
                Ok(()) => Ok(json!({"ok": true})),
                Err(DeleteError::Backend(_)) => Err(DELETE_FAILED.to_string()),
                Err(e) => Err(e.to_string()),
            }
        }

        // ─── Realtime ───
        "realtime.status" => {
            let a = app.lock().await;
            match a.list() {
                Some(list) => {
                    let status = list.status();
                    Ok(json!({"status": status, "label": status.label()}))
                }
                None => Ok(json!({"status": null})),
            }
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
