//! Smart Bookmarks RPC Server: JSON-RPC over stdin/stdout for a UI shell.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"bookmark.add", "params":{"url":"...","title":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Push:     {"event":"bookmarks.changed", "view":{...}} whenever the page changes.
//!
//! Logs go to stderr; `RUST_LOG` controls the filter.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing_subscriber::EnvFilter;

use smart_bookmarks::app::App;
use smart_bookmarks::rpc_handler::handle_method;
use smart_bookmarks::services::client::{self, BackendClient};
use smart_bookmarks::services::settings_engine::{SettingsEngine, SettingsEngineTrait};

/// Simple rate limiter: max requests per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut settings = SettingsEngine::new(None);
    if let Err(e) = settings.load() {
        tracing::warn!(error = %e, "settings file unreadable, using defaults");
    }
    settings.apply_env_overrides();
    let config = settings.get_settings().clone();

    let backend = match client::shared_client(|| BackendClient::from_config(config)) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "cannot start without a backend");
            std::process::exit(1);
        }
    };
    let app = Arc::new(Mutex::new(App::new(backend)));

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            let mut text = line.to_string();
            text.push('\n');
            if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    spawn_change_notifier(Arc::clone(&app), out_tx.clone()).await;
    spawn_auth_listener(Arc::clone(&app)).await;

    let _ = out_tx.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));

    // Max 200 RPC requests per second.
    let mut rate_limiter = RateLimiter::new(200);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out_tx.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                continue;
            }
        };
        let id = req.get("id").cloned().unwrap_or(Value::Null);

        if !rate_limiter.check() {
            let _ = out_tx.send(json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let params = req.get("params").cloned().unwrap_or(json!({}));
        let app = Arc::clone(&app);
        let out = out_tx.clone();
        tokio::spawn(async move {
            let response = match handle_method(&app, &method, &params).await {
                Ok(val) => json!({"id": id, "result": val}),
                Err(err) => json!({"id": id, "error": err}),
            };
            let _ = out.send(response);
        });
    }

    tracing::info!("stdin closed, shutting down");
    app.lock().await.shutdown();
    drop(out_tx);
    let _ = writer.await;
}

/// Pushes the rendered page whenever the list changes.
async fn spawn_change_notifier(app: Arc<Mutex<App>>, out: mpsc::UnboundedSender<Value>) {
    let mut changes = app.lock().await.watch();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let view = app.lock().await.view();
            let _ = out.send(json!({"event": "bookmarks.changed", "view": view}));
        }
    });
}

/// Follows auth changes made elsewhere (token expiry, another tab signing out).
async fn spawn_auth_listener(app: Arc<Mutex<App>>) {
    let mut auth = app.lock().await.auth_changes();
    tokio::spawn(async move {
        loop {
            match auth.recv().await {
                Ok(change) => {
                    app.lock().await.handle_auth_change(&change).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "auth notifications lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
