//! Presentation callbacks.
//!
//! The client reports outcomes through this narrow contract so that it never
//! depends on a particular UI toolkit.

use crate::ApiError;

/// Receives user-facing outcomes of logical requests.
pub trait Notifier: Send + Sync {
    /// Called once per failed logical request, after retries are exhausted.
    fn error(&self, error: &ApiError);

    /// Called when a request that asked for a success message completes.
    fn success(&self, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn error(&self, error: &ApiError) {
        (**self).error(error)
    }

    fn success(&self, message: &str) {
        (**self).success(message)
    }
}
