//! Strictly FIFO counting semaphore holding the lock's token pool.
//!
//! The semaphore hands out up to `capacity` tokens. Requests that cannot be
//! satisfied immediately register in a single FIFO queue; a request for
//! several tokens occupies one queue slot and is granted only once the full
//! count is available to it.
//!
//! # Fairness
//!
//! Grants happen strictly in arrival order. A freed token is reserved for
//! the head of the queue: neither [`Semaphore::try_acquire`] nor a
//! later-queued waiter can claim it first, so a multi-token request at the
//! head accumulates freed tokens until it is whole. This is what lets an
//! exclusive drain wait behind earlier shared requests without ever being
//! postponed by later ones.
//!
//! # Cancel Safety
//!
//! Cancellation (or drop) of a pending acquisition removes its queue entry.
//! If the departing waiter was at the head with tokens free, the next waiter
//! is woken so the signal is not lost. A grant that has already completed is
//! never revoked by cancellation; the holder releases through its
//! [`SemaphorePermit`] as usual.
//!
//! # Example
//!
//! ```ignore
//! use drainlock::{Cx, Semaphore};
//!
//! let sem = Semaphore::new(4);
//!
//! // Waits until one token is free.
//! let permit = sem.acquire(&cx, 1).await?;
//!
//! // The token returns to the pool when the permit drops.
//! drop(permit);
//! ```

use parking_lot::Mutex as ParkingMutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::cx::Cx;

/// Error returned when a waiting acquisition is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// Cancelled while waiting for tokens.
    Cancelled,
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "token acquisition cancelled"),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Error returned when a non-waiting acquisition cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryAcquireError;

impl std::fmt::Display for TryAcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no tokens available")
    }
}

impl std::error::Error for TryAcquireError {}

/// A strictly FIFO counting semaphore with a fixed token capacity.
#[derive(Debug)]
pub struct Semaphore {
    /// Token pool and wait queue.
    state: ParkingMutex<SemaphoreState>,
    /// Total tokens; fixed at construction.
    capacity: usize,
}

#[derive(Debug)]
struct SemaphoreState {
    /// Tokens currently unclaimed. Tokens counted here may be reserved for
    /// the head of the wait queue; see module docs.
    permits: usize,
    /// FIFO queue of registered waiters.
    waiters: VecDeque<Waiter>,
    /// Monotonic counter for waiter identity.
    next_waiter_id: u64,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Waker,
}

fn front_waiter_waker(state: &SemaphoreState) -> Option<Waker> {
    state.waiters.front().map(|waiter| waiter.waker.clone())
}

/// Removes `waiter_id` from the queue. Returns the new head's waker when the
/// removed waiter was at the front, so the caller can pass the baton.
fn remove_waiter_and_take_next_waker(state: &mut SemaphoreState, waiter_id: u64) -> Option<Waker> {
    if state
        .waiters
        .front()
        .is_some_and(|waiter| waiter.id == waiter_id)
    {
        state.waiters.pop_front();
        front_waiter_waker(state)
    } else {
        if let Some(pos) = state.waiters.iter().position(|w| w.id == waiter_id) {
            state.waiters.remove(pos);
        }
        None
    }
}

impl Semaphore {
    /// Creates a semaphore holding `capacity` tokens.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "semaphore capacity must be at least 1");
        Self {
            state: ParkingMutex::new(SemaphoreState {
                permits: capacity,
                waiters: VecDeque::with_capacity(4),
                next_waiter_id: 0,
            }),
            capacity,
        }
    }

    /// Returns the total token capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently unclaimed tokens.
    ///
    /// Tokens counted here may already be reserved for the head of the wait
    /// queue; this is a diagnostic, not a promise that `try_acquire` will
    /// succeed.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Returns the number of requests currently waiting in the queue.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Acquires `count` tokens, waiting in FIFO order if necessary.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or exceeds the capacity (such a request
    /// could never be granted).
    pub fn acquire<'a, 'b>(&'a self, cx: &'b Cx, count: usize) -> AcquireFuture<'a, 'b> {
        assert!(count > 0, "cannot acquire 0 tokens");
        assert!(
            count <= self.capacity,
            "cannot acquire more tokens than the semaphore capacity"
        );
        AcquireFuture {
            semaphore: self,
            cx,
            count,
            waiter_id: None,
        }
    }

    /// Tries to acquire `count` tokens without waiting.
    ///
    /// Fails when not enough tokens are unclaimed, and also whenever any
    /// waiter is queued: tokens are never granted out of arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError`] if the request cannot be satisfied
    /// immediately.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or exceeds the capacity.
    pub fn try_acquire(&self, count: usize) -> Result<SemaphorePermit<'_>, TryAcquireError> {
        assert!(count > 0, "cannot acquire 0 tokens");
        assert!(
            count <= self.capacity,
            "cannot acquire more tokens than the semaphore capacity"
        );

        let mut state = self.state.lock();
        if !state.waiters.is_empty() {
            // Strict FIFO: queued waiters have first claim.
            return Err(TryAcquireError);
        }
        if state.permits < count {
            return Err(TryAcquireError);
        }
        state.permits -= count;
        tracing::trace!(count, remaining = state.permits, "tokens granted");
        drop(state);
        Ok(SemaphorePermit {
            semaphore: self,
            count,
        })
    }

    /// Returns `count` tokens to the pool and wakes the head waiter.
    ///
    /// Only the head is woken: FIFO ordering means only it can make
    /// progress, and once it acquires it wakes its successor in turn.
    fn release(&self, count: usize) {
        let waiter_to_wake = {
            let mut state = self.state.lock();
            state.permits += count;
            assert!(
                state.permits <= self.capacity,
                "semaphore released more tokens than were acquired"
            );
            tracing::trace!(count, available = state.permits, "tokens released");
            front_waiter_waker(&state)
        };
        if let Some(waiter) = waiter_to_wake {
            waiter.wake();
        }
    }
}

/// Future returned by [`Semaphore::acquire`].
pub struct AcquireFuture<'a, 'b> {
    semaphore: &'a Semaphore,
    cx: &'b Cx,
    count: usize,
    waiter_id: Option<u64>,
}

impl Drop for AcquireFuture<'_, '_> {
    fn drop(&mut self) {
        if let Some(waiter_id) = self.waiter_id {
            let next_waker = {
                let mut state = self.semaphore.state.lock();
                // A departing head must pass the baton, otherwise the
                // tokens-available signal is lost.
                let waker = remove_waiter_and_take_next_waker(&mut state, waiter_id);
                if state.permits > 0 { waker } else { None }
            };
            if let Some(next) = next_waker {
                next.wake();
            }
        }
    }
}

impl<'a> Future for AcquireFuture<'a, '_> {
    type Output = Result<SemaphorePermit<'a>, AcquireError>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cx.checkpoint().is_err() {
            if let Some(waiter_id) = self.waiter_id {
                let next_waker = {
                    let mut state = self.semaphore.state.lock();
                    let waker = remove_waiter_and_take_next_waker(&mut state, waiter_id);
                    if state.permits > 0 { waker } else { None }
                };
                // Clear waiter_id so Drop doesn't try to remove it again.
                self.waiter_id = None;
                tracing::trace!(count = self.count, "waiting acquisition cancelled");
                if let Some(next) = next_waker {
                    next.wake();
                }
            }
            return Poll::Ready(Err(AcquireError::Cancelled));
        }

        let mut state = self.semaphore.state.lock();

        let waiter_id = if let Some(id) = self.waiter_id {
            id
        } else {
            let id = state.next_waiter_id;
            state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
            self.waiter_id = Some(id);
            id
        };

        // Only the head of the queue (or a newcomer to an empty queue) may
        // take tokens; everyone else waits regardless of the pool level.
        let is_next_in_line = state.waiters.front().is_none_or(|w| w.id == waiter_id);

        if is_next_in_line && state.permits >= self.count {
            state.permits -= self.count;
            if !state.waiters.is_empty() {
                state.waiters.pop_front();
            }

            // If tokens remain, the new head may also be satisfiable. Wake
            // it, or a release that granted several waiters' worth of tokens
            // would only ever unblock the first.
            let next_waker = if state.permits > 0 {
                front_waiter_waker(&state)
            } else {
                None
            };
            tracing::trace!(
                count = self.count,
                remaining = state.permits,
                "tokens granted"
            );
            drop(state);
            self.waiter_id = None;
            if let Some(next) = next_waker {
                next.wake();
            }
            return Poll::Ready(Ok(SemaphorePermit {
                semaphore: self.semaphore,
                count: self.count,
            }));
        }

        if let Some(existing) = state
            .waiters
            .iter_mut()
            .find(|waiter| waiter.id == waiter_id)
        {
            // Executors may hand out a different waker on each poll; a stale
            // one would never fire.
            if !existing.waker.will_wake(context.waker()) {
                existing.waker.clone_from(context.waker());
            }
        } else {
            tracing::trace!(count = self.count, "waiter enqueued");
            state.waiters.push_back(Waiter {
                id: waiter_id,
                waker: context.waker().clone(),
            });
        }
        Poll::Pending
    }
}

/// Tokens held out of the pool; returned on drop.
#[must_use = "tokens are returned immediately if the permit is not held"]
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
    count: usize,
}

impl SemaphorePermit<'_> {
    /// Returns the number of tokens held.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release(self.count);
    }
}
