//! The shared/exclusive lock and the primitives it is built from.
//!
//! # Primitives
//!
//! - [`SharedLock`]: up to `capacity` shared holders, or one exclusive
//!   holder owning every token
//! - [`Semaphore`]: strictly FIFO counting semaphore (the token pool)
//! - [`Gate`]: data-less FIFO mutex (serializes exclusive attempts)
//!
//! # Two-Phase Pattern
//!
//! Every acquisition splits into two phases:
//!
//! - **Phase 1 (Wait)**: Wait in FIFO order for the resource. This phase is
//!   cancel-safe: cancellation or drop removes the waiter cleanly.
//! - **Phase 2 (Hold)**: Hold a guard. The guard is an obligation that is
//!   released exactly once, by dropping it.
//!
//! # Cancel Safety
//!
//! - Cancellation during wait: clean abort, nothing held, queue intact
//! - Cancellation while holding: guard dropped, resource released
//! - Panic while holding: guard dropped via unwind

mod gate;
mod semaphore;
mod shared_lock;

pub use gate::{EnterError, EnterFuture, Gate, GatePermit, TryEnterError};
pub use semaphore::{AcquireError, AcquireFuture, Semaphore, SemaphorePermit, TryAcquireError};
pub use shared_lock::{ExclusiveGuard, SharedAcquireFuture, SharedGuard, SharedLock};
