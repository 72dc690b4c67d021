//! Process-wide backend client.
//!
//! One [`BackendClient`] bundles the three collaborators plus the config
//! they were built from. [`shared_client`] builds it lazily on first use and
//! then hands out the same instance; tests swap it with [`install`] and
//! [`reset`].

use std::sync::{Arc, Mutex};

use crate::services::backend::{AuthService, DataService, RealtimeService};
use crate::services::memory_backend::MemoryBackend;
use crate::types::errors::BackendError;
use crate::types::settings::AppConfig;

/// Selects the in-memory backend when set to `memory`.
pub const ENV_BACKEND: &str = "SMART_BOOKMARKS_BACKEND";

static CLIENT: Mutex<Option<Arc<BackendClient>>> = Mutex::new(None);

pub struct BackendClient {
    auth: Arc<dyn AuthService>,
    data: Arc<dyn DataService>,
    realtime: Arc<dyn RealtimeService>,
    config: AppConfig,
}

impl BackendClient {
    pub fn new(
        config: AppConfig,
        auth: Arc<dyn AuthService>,
        data: Arc<dyn DataService>,
        realtime: Arc<dyn RealtimeService>,
    ) -> Self {
        Self {
            auth,
            data,
            realtime,
            config,
        }
    }

    /// Client whose collaborators all share `backend`.
    pub fn in_memory(config: AppConfig, backend: MemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self::new(
            config,
            backend.clone(),
            backend.clone(),
            backend,
        )
    }

    /// Client talking to the configured managed backend.
    ///
    /// When `persist_session` is on, the session is kept in the database
    /// under the platform data directory. A store that cannot be opened only
    /// disables persistence.
    #[cfg(feature = "network")]
    pub fn remote(config: AppConfig) -> Result<Self, BackendError> {
        use crate::database::Database;
        use crate::managers::session_manager::SessionManager;
        use crate::services::realtime_socket::RealtimeSocket;
        use crate::services::rest_backend::{RestAuth, RestData};

        if !config.backend.is_configured() {
            return Err(BackendError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("smart-bookmarks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let store = if config.auth.persist_session {
            match Database::open_in_dir(&crate::platform::get_data_dir()) {
                Ok(db) => Some(SessionManager::new(db)),
                Err(e) => {
                    tracing::warn!(error = %e, "session persistence disabled");
                    None
                }
            }
        } else {
            None
        };

        let auth = Arc::new(RestAuth::new(http.clone(), config.clone(), store));
        let data = Arc::new(RestData::new(http, config.clone(), Arc::clone(&auth)));
        let realtime = Arc::new(RealtimeSocket::new(config.clone(), auth.clone()));
        Ok(Self::new(config, auth, data, realtime))
    }

    /// Picks the backend from `SMART_BOOKMARKS_BACKEND` and the config.
    pub fn from_config(config: AppConfig) -> Result<Self, BackendError> {
        if std::env::var(ENV_BACKEND).map(|v| v == "memory").unwrap_or(false) {
            tracing::info!("using in-memory backend");
            return Ok(Self::in_memory(config, MemoryBackend::new()));
        }
        #[cfg(feature = "network")]
        {
            Self::remote(config)
        }
        #[cfg(not(feature = "network"))]
        {
            let _ = config;
            Err(BackendError::NotConfigured)
        }
    }

    pub fn auth(&self) -> Arc<dyn AuthService> {
        Arc::clone(&self.auth)
    }

    pub fn data(&self) -> Arc<dyn DataService> {
        Arc::clone(&self.data)
    }

    pub fn realtime(&self) -> Arc<dyn RealtimeService> {
        Arc::clone(&self.realtime)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Returns the shared client, building it with `init` on first use.
///
/// If `init` fails nothing is stored and the next call tries again.
pub fn shared_client<F>(init: F) -> Result<Arc<BackendClient>, BackendError>
where
    F: FnOnce() -> Result<BackendClient, BackendError>,
{
    let mut slot = CLIENT.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(client) = slot.as_ref() {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(init()?);
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

/// Replaces the shared client.
pub fn install(client: BackendClient) -> Arc<BackendClient> {
    let client = Arc::new(client);
    *CLIENT.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&client));
    client
}

pub fn current() -> Option<Arc<BackendClient>> {
    CLIENT.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Drops the shared client; the next [`shared_client`] call rebuilds it.
pub fn reset() {
    CLIENT.lock().unwrap_or_else(|e| e.into_inner()).take();
}
