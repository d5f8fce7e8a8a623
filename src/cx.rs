//! The cancellation context type.
//!
//! `Cx` is the handle through which callers observe and request cancellation
//! of waiting lock operations. The lock has no timeout of its own; calling
//! code layers timeouts by cancelling a pending acquisition through its `Cx`.
//!
//! # Cloning
//!
//! `Cx` is cheaply clonable and shares its state across clones: a
//! cancellation request made through one clone is visible to all of them.
//! Give each unit of work its own `Cx`; cancelling one must not disturb the
//! others.
//!
//! # Masking
//!
//! [`Cx::masked`] defers cancellation across a short critical section, for
//! code that must not be interrupted between two steps (e.g. finishing a
//! rename before honouring a shutdown request). Use it sparingly; long
//! masked sections defeat responsive cancellation.

use std::sync::{Arc, RwLock};

use crate::error::{Error, ErrorKind};

/// Internal state shared between all clones of a `Cx`.
#[derive(Debug)]
struct CxInner {
    /// Whether cancellation has been requested.
    cancel_requested: bool,
    /// Current mask depth.
    mask_depth: u32,
}

/// A cancellation context for one unit of work.
///
/// Waiting operations poll their `Cx` at every suspension point; a pending
/// cancellation makes them withdraw from the wait queue and resolve with a
/// cancellation error.
///
/// # Example
///
/// ```
/// use drainlock::Cx;
///
/// let cx = Cx::new();
/// assert!(cx.checkpoint().is_ok());
///
/// cx.set_cancel_requested(true);
/// assert!(cx.checkpoint().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Cx {
    inner: Arc<RwLock<CxInner>>,
}

impl Cx {
    /// Creates a fresh context with no cancellation pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(CxInner {
                cancel_requested: false,
                mask_depth: 0,
            })),
        }
    }

    /// Returns true if cancellation has been requested.
    ///
    /// Non-blocking query of the current state. Unlike [`Cx::checkpoint`]
    /// this never returns an error; it just reports.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.read().expect("lock poisoned").cancel_requested
    }

    /// Checks for cancellation, returning an error if it is pending.
    ///
    /// This is the checkpoint where waiting operations observe cancellation;
    /// combining the check with an error return makes it convenient with the
    /// `?` operator. While the context is masked (see [`Cx::masked`]) this
    /// returns `Ok(())` even when cancellation is pending.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::Cancelled`] if cancellation is
    /// pending and the context is not masked.
    pub fn checkpoint(&self) -> Result<(), Error> {
        let inner = self.inner.read().expect("lock poisoned");
        if inner.cancel_requested && inner.mask_depth == 0 {
            Err(Error::new(ErrorKind::Cancelled))
        } else {
            Ok(())
        }
    }

    /// Executes a closure with cancellation masked.
    ///
    /// While masked, [`Cx::checkpoint`] reports `Ok(())` even if cancellation
    /// has been requested; the cancellation becomes observable again once the
    /// mask depth returns to zero. Masking nests.
    pub fn masked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        {
            let mut inner = self.inner.write().expect("lock poisoned");
            inner.mask_depth += 1;
        }

        let result = f();

        {
            let mut inner = self.inner.write().expect("lock poisoned");
            inner.mask_depth = inner.mask_depth.saturating_sub(1);
        }

        result
    }

    /// Sets or clears the cancellation flag.
    ///
    /// Cancellation is cooperative: setting the flag does not interrupt
    /// anything by itself, it makes the next checkpoint of every waiting
    /// operation sharing this context resolve to a cancellation error.
    pub fn set_cancel_requested(&self, value: bool) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.cancel_requested = value;
    }
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_without_cancel() {
        let cx = Cx::new();
        assert!(cx.checkpoint().is_ok());
    }

    #[test]
    fn checkpoint_with_cancel() {
        let cx = Cx::new();
        cx.set_cancel_requested(true);
        let err = cx.checkpoint().expect_err("checkpoint should fail");
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancel_visible_across_clones() {
        let cx = Cx::new();
        let clone = cx.clone();
        clone.set_cancel_requested(true);
        assert!(cx.is_cancel_requested());
        assert!(cx.checkpoint().is_err());
    }

    #[test]
    fn independent_contexts_do_not_share_cancel() {
        let a = Cx::new();
        let b = Cx::new();
        a.set_cancel_requested(true);
        assert!(b.checkpoint().is_ok());
    }

    #[test]
    fn masked_defers_cancel() {
        let cx = Cx::new();
        cx.set_cancel_requested(true);

        cx.masked(|| {
            assert!(
                cx.checkpoint().is_ok(),
                "checkpoint should succeed when masked"
            );
        });

        assert!(
            cx.checkpoint().is_err(),
            "checkpoint should fail after unmasking"
        );
    }

    #[test]
    fn masked_nests() {
        let cx = Cx::new();
        cx.set_cancel_requested(true);

        cx.masked(|| {
            cx.masked(|| {
                assert!(cx.checkpoint().is_ok());
            });
            assert!(cx.checkpoint().is_ok(), "still masked at depth 1");
        });

        assert!(cx.checkpoint().is_err());
    }

    #[test]
    fn cancel_can_be_cleared() {
        let cx = Cx::new();
        cx.set_cancel_requested(true);
        assert!(cx.checkpoint().is_err());
        cx.set_cancel_requested(false);
        assert!(cx.checkpoint().is_ok());
    }
}
