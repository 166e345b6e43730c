//! Cooperative cancellation.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// A shared, write-once cancellation flag.
///
/// Clones observe the same flag. The flag goes from unset to set at most
/// once and is never reset; the first reason wins. Nothing is interrupted
/// when the token is set: pipelines poll it between steps, and step bodies
/// may poll a clone of it to stop early.
///
/// # Examples
///
/// ```
/// use stepline_core::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
///
/// assert!(token.cancel("shutting down"));
/// assert!(!token.cancel("again"));
///
/// assert!(observer.is_cancelled());
/// assert_eq!(observer.reason(), Some("shutting down"));
/// ```
#[derive(Clone, Default)]
pub struct CancellationToken {
    reason: Arc<OnceLock<String>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Returns `true` if this call set the flag, `false` if it was already
    /// set.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.reason.set(reason.into()).is_ok()
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Returns the reason given by the first `cancel` call.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
