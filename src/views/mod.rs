// Smart Bookmarks view models
// Plain render state for the bookmarks page; no I/O beyond the actions they delegate.

pub mod add_bookmark;
pub mod bookmark_view;
pub mod format;
pub mod header;
