//! Add-bookmark form state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::managers::bookmark_list::MountedList;
use crate::types::bookmark::Bookmark;
use crate::types::errors::InsertError;

pub const ADD_FAILED: &str = "Failed to add bookmark. Please try again.";

/// Transient "bookmark added" flag that hides itself after a delay.
///
/// Each show starts a fresh timer; an older timer firing late does not hide
/// a newer signal.
#[derive(Debug, Clone, Default)]
pub struct SuccessSignal {
    generation: Arc<AtomicU64>,
    visible: Arc<AtomicBool>,
}

impl SuccessSignal {
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Number of times the signal has been shown.
    pub fn shown(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }

    /// Shows the signal for `duration`. Must be called inside a tokio runtime.
    pub fn show(&self, duration: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.visible.store(true, Ordering::SeqCst);

        let current = Arc::clone(&self.generation);
        let visible = Arc::clone(&self.visible);
        let deadline = Instant::now() + duration;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if current.load(Ordering::SeqCst) == generation {
                visible.store(false, Ordering::SeqCst);
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub title: String,
    pub url: String,
    pub error: Option<String>,
    pub success: bool,
    pub submitting: bool,
}

#[derive(Debug)]
pub struct AddBookmarkForm {
    pub title: String,
    pub url: String,
    error: Option<String>,
    success: SuccessSignal,
    signal_duration: Duration,
}

impl AddBookmarkForm {
    pub fn new(signal_duration: Duration) -> Self {
        Self {
            title: String::new(),
            url: String::new(),
            error: None,
            success: SuccessSignal::default(),
            signal_duration,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn success(&self) -> &SuccessSignal {
        &self.success
    }

    /// Clears inputs and messages.
    pub fn reset(&mut self) {
        self.title.clear();
        self.url.clear();
        self.error = None;
        self.success.hide();
    }

    pub fn render(&self, submitting: bool) -> FormView {
        FormView {
            title: self.title.clone(),
            url: self.url.clone(),
            error: self.error.clone(),
            success: self.success.is_visible(),
            submitting,
        }
    }

    /// Submits the current inputs to `list`.
    ///
    /// On success the inputs are cleared and the success signal is shown.
    /// On any other outcome the inputs are kept; validation and write
    /// failures set the error text.
    pub async fn submit(&mut self, list: &MountedList) -> Result<Bookmark, InsertError> {
        self.error = None;
        self.success.hide();

        match list.insert_local(&self.title, &self.url).await {
            Ok(bookmark) => {
                self.title.clear();
                self.url.clear();
                self.success.show(self.signal_duration);
                Ok(bookmark)
            }
            Err(e) => {
                match &e {
                    InsertError::Validation(v) => self.error = Some(v.to_string()),
                    InsertError::Write(_) => self.error = Some(ADD_FAILED.to_string()),
                    InsertError::Busy | InsertError::NotMounted => {}
                }
                Err(e)
            }
        }
    }
}
