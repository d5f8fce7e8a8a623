//! Cancel-safe shared/exclusive coordination for concurrent units of work.
//!
//! Drainlock provides a single concurrency primitive: [`SharedLock`], a lock
//! that admits up to `capacity` concurrent *shared* holders, or exactly one
//! *exclusive* holder that drains the entire capacity. It is built from two
//! cooperating pieces:
//!
//! - [`Semaphore`]: a strictly FIFO counting semaphore holding the lock's
//!   token pool
//! - [`Gate`]: a data-less FIFO mutex that serializes exclusive-acquisition
//!   attempts against each other
//!
//! Independent units of work (e.g. filesystem commands operating on a shared
//! working area) acquire shared tokens to run concurrently, or exclusive
//! ownership to run in full isolation. The lock knows nothing about its
//! callers.
//!
//! # Cancellation
//!
//! Every waiting operation takes a [`Cx`], the crate's cancellation context.
//! Cancellation while waiting is clean: the waiter leaves the queue, no token
//! or gate ownership is retained, and the next waiter in line is woken if it
//! can make progress. Dropping a pending acquisition future has the same
//! effect. Once an acquisition has completed, cancellation no longer touches
//! it; the holder releases through its guard as usual.
//!
//! # Fairness
//!
//! Shared acquirers and the exclusive drain share one FIFO queue. An
//! exclusive attempt queued behind earlier shared requests waits its turn;
//! once it reaches the head, freed tokens are reserved for it until the full
//! capacity is assembled, so it cannot be postponed indefinitely by a stream
//! of later shared acquirers.
//!
//! # Example
//!
//! ```ignore
//! use drainlock::{Cx, SharedLock};
//!
//! let cx = Cx::new();
//! let lock = SharedLock::new(4);
//!
//! // Up to four of these run concurrently.
//! let token = lock.acquire_shared(&cx).await?;
//! copy_tree(&src, &dst)?;
//! drop(token);
//!
//! // Runs in full isolation from all shared holders.
//! lock.run_exclusive(&cx, || async { prune_working_area() }).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cx;
pub mod error;
pub mod sync;
pub mod test_logging;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cx::Cx;
pub use sync::{
    AcquireError, ExclusiveGuard, Gate, Semaphore, SharedGuard, SharedLock, TryAcquireError,
};
