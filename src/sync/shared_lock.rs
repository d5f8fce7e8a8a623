//! Shared/exclusive lock over a fixed pool of tokens.
//!
//! A [`SharedLock`] admits up to `capacity` concurrent shared holders, or a
//! single exclusive holder that owns every token. It composes the two other
//! primitives in this module: a [`Semaphore`] holding the token pool and a
//! [`Gate`] serializing exclusive-acquisition attempts.
//!
//! # Fairness
//!
//! Shared requests and the exclusive drain go through one FIFO queue, so no
//! class of request can starve the other:
//!
//! | Scenario                           | Behavior                                    |
//! |------------------------------------|---------------------------------------------|
//! | Tokens free, no waiters            | Shared acquirers proceed immediately        |
//! | Pool exhausted                     | Shared acquirers queue in arrival order     |
//! | Exclusive requested                | Drain queues behind earlier shared requests |
//! | Drain at head of queue             | Freed tokens are reserved for it            |
//! | Shared requested behind a drain    | Waits until the exclusive holder releases   |
//! | Multiple exclusive attempts        | Enter the gate in arrival order             |
//!
//! # Cancel Safety
//!
//! Cancelling (or dropping) a pending acquisition of either mode leaves no
//! trace: queue entries are removed, tokens reserved by a partial drain
//! return to general availability, and the gate reopens for the next
//! exclusive attempt. Completed acquisitions are unaffected; their guards
//! release on drop.
//!
//! # Example
//!
//! ```ignore
//! use drainlock::{Cx, SharedLock};
//!
//! let lock = SharedLock::new(3);
//!
//! // Three of these can run at once.
//! let guard = lock.acquire_shared(&cx).await?;
//! scan_directory(&path)?;
//! drop(guard);
//!
//! // Runs alone; every shared holder has finished, none can start.
//! let all = lock.acquire_exclusive(&cx).await?;
//! rebuild_working_area()?;
//! drop(all);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use crate::cx::Cx;
use crate::sync::gate::{EnterError, Gate, GatePermit};
use crate::sync::semaphore::{
    AcquireError, AcquireFuture, Semaphore, SemaphorePermit, TryAcquireError,
};

/// A lock admitting `capacity` shared holders or one exclusive holder.
#[derive(Debug)]
pub struct SharedLock {
    /// The token pool; one token per shared holder.
    semaphore: Semaphore,
    /// Serializes exclusive attempts against each other.
    gate: Gate,
    /// Diagnostic flag: true while an exclusive holder exists.
    exclusive_active: AtomicBool,
}

impl SharedLock {
    /// Creates a lock with room for `capacity` concurrent shared holders.
    ///
    /// An exclusive holder consumes all `capacity` tokens.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "lock capacity must admit at least one holder");
        Self {
            semaphore: Semaphore::new(capacity),
            gate: Gate::new(),
            exclusive_active: AtomicBool::new(false),
        }
    }

    /// Returns the maximum number of concurrent shared holders.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.semaphore.capacity()
    }

    /// Returns the number of currently unclaimed tokens.
    ///
    /// Diagnostic only; see [`Semaphore::available_permits`] for the caveat
    /// about tokens reserved for the head of the queue.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the number of requests waiting in the token queue.
    ///
    /// A queued exclusive drain counts as one entry.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.semaphore.waiters()
    }

    /// Returns true while an exclusive holder exists.
    ///
    /// Advisory: an exclusive attempt that is still assembling tokens does
    /// not count, and the flag clears at the start of exclusive release.
    #[must_use]
    pub fn is_exclusive_locked(&self) -> bool {
        self.exclusive_active.load(Ordering::Acquire)
    }

    /// Acquires one shared token, waiting in FIFO order if necessary.
    ///
    /// Resolves immediately when a token is free and no earlier request is
    /// queued. The token returns to the pool when the guard drops.
    pub fn acquire_shared<'a, 'b>(&'a self, cx: &'b Cx) -> SharedAcquireFuture<'a, 'b> {
        SharedAcquireFuture {
            inner: self.semaphore.acquire(cx, 1),
        }
    }

    /// Tries to acquire one shared token without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError`] when no token is free or any request is
    /// queued ahead.
    pub fn try_acquire_shared(&self) -> Result<SharedGuard<'_>, TryAcquireError> {
        let permit = self.semaphore.try_acquire(1)?;
        Ok(SharedGuard { permit })
    }

    /// Acquires exclusive ownership of the whole token pool.
    ///
    /// Enters the gate (FIFO among exclusive attempts), then issues one
    /// request for the full capacity through the same queue shared
    /// acquirers use. The request waits behind earlier shared requests;
    /// once at the head, freed tokens accumulate for it until the pool is
    /// drained. Cancellation at any point returns reserved tokens and
    /// reopens the gate.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Cancelled`] if `cx` is cancelled while
    /// waiting for the gate or the tokens.
    pub async fn acquire_exclusive(&self, cx: &Cx) -> Result<ExclusiveGuard<'_>, AcquireError> {
        let gate = match self.gate.enter(cx).await {
            Ok(permit) => permit,
            Err(EnterError::Cancelled) => return Err(AcquireError::Cancelled),
        };
        tracing::trace!(capacity = self.capacity(), "exclusive drain started");
        let permits = self.semaphore.acquire(cx, self.capacity()).await?;
        self.exclusive_active.store(true, Ordering::Release);
        tracing::trace!("exclusive ownership granted");
        Ok(ExclusiveGuard {
            lock: self,
            permits,
            gate,
        })
    }

    /// Tries to acquire exclusive ownership without waiting.
    ///
    /// All or nothing: succeeds only when the gate is free and every token
    /// is unclaimed with no queued waiters. A failed attempt leaves the
    /// gate free.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError`] when exclusive ownership cannot be taken
    /// immediately.
    pub fn try_acquire_exclusive(&self) -> Result<ExclusiveGuard<'_>, TryAcquireError> {
        let gate = self.gate.try_enter().map_err(|_| TryAcquireError)?;
        // On failure the gate permit drops here and the gate reopens.
        let permits = self.semaphore.try_acquire(self.capacity())?;
        self.exclusive_active.store(true, Ordering::Release);
        Ok(ExclusiveGuard {
            lock: self,
            permits,
            gate,
        })
    }

    /// Runs `op` under shared access, releasing on every exit path.
    ///
    /// The token is released when `op` returns, when it panics, and when
    /// the returned future is dropped mid-operation.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Cancelled`] if the acquisition is cancelled;
    /// `op`'s own output is returned unchanged.
    pub async fn run_shared<F, Fut>(&self, cx: &Cx, op: F) -> Result<Fut::Output, AcquireError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let guard = self.acquire_shared(cx).await?;
        let output = op().await;
        drop(guard);
        Ok(output)
    }

    /// Runs `op` under exclusive access, releasing on every exit path.
    ///
    /// Exclusive ownership is released when `op` returns, when it panics,
    /// and when the returned future is dropped mid-operation; `op`'s output
    /// (a value or its own error) is propagated unchanged after release.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Cancelled`] if the acquisition is cancelled
    /// before `op` starts; `op` itself is then never invoked.
    pub async fn run_exclusive<F, Fut>(&self, cx: &Cx, op: F) -> Result<Fut::Output, AcquireError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let guard = self.acquire_exclusive(cx).await?;
        let output = op().await;
        drop(guard);
        Ok(output)
    }
}

/// Future returned by [`SharedLock::acquire_shared`].
pub struct SharedAcquireFuture<'a, 'b> {
    inner: AcquireFuture<'a, 'b>,
}

impl<'a> Future for SharedAcquireFuture<'a, '_> {
    type Output = Result<SharedGuard<'a>, AcquireError>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(context) {
            Poll::Ready(Ok(permit)) => Poll::Ready(Ok(SharedGuard { permit })),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One shared token, returned to the pool on drop.
#[must_use = "the token is returned immediately if the guard is not held"]
#[derive(Debug)]
pub struct SharedGuard<'a> {
    #[allow(dead_code)]
    permit: SemaphorePermit<'a>,
}

/// Exclusive ownership of the whole pool, released on drop.
///
/// Dropping the guard first returns all tokens (waking the head of the
/// token queue), then reopens the gate for the next exclusive attempt.
#[must_use = "exclusive ownership is released immediately if the guard is not held"]
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    lock: &'a SharedLock,
    // Field order is load-bearing: tokens must return to the pool before
    // the gate reopens for the next exclusive attempt.
    #[allow(dead_code)]
    permits: SemaphorePermit<'a>,
    #[allow(dead_code)]
    gate: GatePermit<'a>,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.exclusive_active.store(false, Ordering::Release);
        tracing::trace!("exclusive ownership released");
    }
}
