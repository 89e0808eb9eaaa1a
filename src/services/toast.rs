//! Transient user-facing messages ("toasts").
//!
//! The session store reports every outcome through a [`Toaster`]. Page code
//! never sees structured errors, only these messages.

use std::sync::Mutex;

use crate::error::{AuthError, ErrorCode};
use crate::models::NotificationKind;

#[cfg(test)]
#[path = "toast_test.rs"]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: NotificationKind,
    pub message: String,
    /// Grepable error code for failures, e.g. `E_INVALID_CREDENTIALS`.
    pub code: Option<&'static str>,
}

impl Toast {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: NotificationKind::Success, message: message.into(), code: None }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self { kind: NotificationKind::Info, message: message.into(), code: None }
    }

    #[must_use]
    pub fn from_error(err: &AuthError) -> Self {
        Self { kind: NotificationKind::Error, message: err.user_message(), code: Some(err.error_code()) }
    }
}

pub trait Toaster: Send + Sync {
    fn show(&self, toast: Toast);
}

/// Writes toasts to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingToaster;

impl Toaster for TracingToaster {
    fn show(&self, toast: Toast) {
        match toast.kind {
            NotificationKind::Error => tracing::warn!(code = toast.code, "{}", toast.message),
            NotificationKind::Warning => tracing::warn!("{}", toast.message),
            NotificationKind::Info | NotificationKind::Success => tracing::info!("{}", toast.message),
        }
    }
}

/// Records toasts in memory. Used by tests and by callers that render toasts
/// themselves.
#[derive(Debug, Default)]
pub struct ToastLog {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every recorded toast, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last(&self) -> Option<Toast> {
        self.toasts.lock().ok().and_then(|t| t.last().cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.toasts.lock().map(|t| t.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Toaster for ToastLog {
    fn show(&self, toast: Toast) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(toast);
        }
    }
}
