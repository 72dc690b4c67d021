// Smart Bookmarks services
// Backend collaborators and their adapters, the shared client, and settings.

pub mod auth_callback;
pub mod backend;
pub mod client;
pub mod memory_backend;
pub mod realtime_protocol;
pub mod settings_engine;

#[cfg(feature = "network")]
pub mod realtime_socket;
#[cfg(feature = "network")]
pub mod rest_backend;
