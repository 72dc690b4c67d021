// Smart Bookmarks state managers
// Managers own the stateful pieces: the bookmark collection, its change feed, mounts, the session gate and session persistence.

pub mod bookmark_list;
pub mod change_subscription;
pub mod collection_store;
pub mod mount_guard;
pub mod session_gate;
pub mod session_manager;
