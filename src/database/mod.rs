//! Local persistence for Smart Bookmarks.
//!
//! Bookmarks themselves live in the managed backend; the only thing kept on
//! disk is the signed-in auth session, so a restart does not force a new
//! OAuth round trip.
//!
//! ```no_run
//! use smart_bookmarks::database::Database;
//!
//! let db = Database::open_in_dir("/tmp/smart-bookmarks").expect("failed to open database");
//! let conn = db.connection();
//! ```

pub mod connection;
pub mod migrations;

pub use connection::Database;
