//! Data-less FIFO mutex serializing exclusive-acquisition attempts.
//!
//! The gate guards no data; holding it only means "this exclusive attempt is
//! the one currently assembling (or holding) the full token pool". Entry is
//! strictly FIFO among attempts: the gate is never handed to a newcomer
//! while an earlier attempt waits, so queued exclusive acquirers proceed in
//! arrival order.
//!
//! # Cancel Safety
//!
//! Cancellation (or drop) of a pending entry removes its queue entry; if the
//! departing waiter was at the head while the gate is free, the next waiter
//! is woken. A granted [`GatePermit`] releases on drop, waking the head of
//! the queue.

use parking_lot::Mutex as ParkingMutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::cx::Cx;

/// Error returned when a waiting gate entry is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterError {
    /// Cancelled while waiting for the gate.
    Cancelled,
}

impl std::fmt::Display for EnterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "gate entry cancelled"),
        }
    }
}

impl std::error::Error for EnterError {}

/// Error returned when the gate cannot be entered without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryEnterError;

impl std::fmt::Display for TryEnterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gate is held")
    }
}

impl std::error::Error for TryEnterError {}

/// A data-less FIFO async mutex.
#[derive(Debug)]
pub struct Gate {
    state: ParkingMutex<GateState>,
}

#[derive(Debug)]
struct GateState {
    /// Whether the gate is currently held.
    held: bool,
    /// FIFO queue of waiters.
    waiters: VecDeque<Waiter>,
    /// Monotonic counter for waiter identity.
    next_waiter_id: u64,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Waker,
}

impl Gate {
    /// Creates a gate in the free state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ParkingMutex::new(GateState {
                held: false,
                waiters: VecDeque::with_capacity(2),
                next_waiter_id: 0,
            }),
        }
    }

    /// Returns true if the gate is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Returns the number of attempts currently waiting to enter.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Enters the gate, waiting in FIFO order if it is held.
    pub fn enter<'a, 'b>(&'a self, cx: &'b Cx) -> EnterFuture<'a, 'b> {
        EnterFuture {
            gate: self,
            cx,
            waiter_id: None,
        }
    }

    /// Tries to enter the gate without waiting.
    ///
    /// Fails when the gate is held, and also whenever any attempt is queued:
    /// the gate is never handed out of arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`TryEnterError`] if the gate cannot be entered immediately.
    pub fn try_enter(&self) -> Result<GatePermit<'_>, TryEnterError> {
        let mut state = self.state.lock();
        if state.held || !state.waiters.is_empty() {
            return Err(TryEnterError);
        }
        state.held = true;
        tracing::trace!("gate entered");
        drop(state);
        Ok(GatePermit { gate: self })
    }

    /// Frees the gate and wakes the head waiter.
    ///
    /// The waiter stays queued until its own poll takes the gate, so no
    /// newcomer can barge in between release and re-poll.
    fn release(&self) {
        let waiter_to_wake = {
            let mut state = self.state.lock();
            state.held = false;
            tracing::trace!("gate released");
            state.waiters.front().map(|w| w.waker.clone())
        };
        if let Some(waker) = waiter_to_wake {
            waker.wake();
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Gate::enter`].
pub struct EnterFuture<'a, 'b> {
    gate: &'a Gate,
    cx: &'b Cx,
    waiter_id: Option<u64>,
}

impl Drop for EnterFuture<'_, '_> {
    fn drop(&mut self) {
        if let Some(waiter_id) = self.waiter_id {
            let next_waker = {
                let mut state = self.gate.state.lock();
                let was_front = state
                    .waiters
                    .front()
                    .is_some_and(|w| w.id == waiter_id);
                if was_front {
                    state.waiters.pop_front();
                } else if let Some(pos) = state.waiters.iter().position(|w| w.id == waiter_id) {
                    state.waiters.remove(pos);
                }
                // A departing head passes the baton when the gate is free.
                if was_front && !state.held {
                    state.waiters.front().map(|w| w.waker.clone())
                } else {
                    None
                }
            };
            if let Some(next) = next_waker {
                next.wake();
            }
        }
    }
}

impl<'a> Future for EnterFuture<'a, '_> {
    type Output = Result<GatePermit<'a>, EnterError>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        if self.cx.checkpoint().is_err() {
            if let Some(waiter_id) = self.waiter_id {
                let next_waker = {
                    let mut state = self.gate.state.lock();
                    let was_front = state
                        .waiters
                        .front()
                        .is_some_and(|w| w.id == waiter_id);
                    if was_front {
                        state.waiters.pop_front();
                    } else if let Some(pos) = state.waiters.iter().position(|w| w.id == waiter_id)
                    {
                        state.waiters.remove(pos);
                    }
                    if was_front && !state.held {
                        state.waiters.front().map(|w| w.waker.clone())
                    } else {
                        None
                    }
                };
                self.waiter_id = None;
                tracing::trace!("waiting gate entry cancelled");
                if let Some(next) = next_waker {
                    next.wake();
                }
            }
            return Poll::Ready(Err(EnterError::Cancelled));
        }

        let mut state = self.gate.state.lock();

        let waiter_id = if let Some(id) = self.waiter_id {
            id
        } else {
            let id = state.next_waiter_id;
            state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
            self.waiter_id = Some(id);
            id
        };

        let is_next_in_line = state.waiters.front().is_none_or(|w| w.id == waiter_id);

        if !state.held && is_next_in_line {
            state.held = true;
            if !state.waiters.is_empty() {
                state.waiters.pop_front();
            }
            tracing::trace!("gate entered");
            drop(state);
            self.waiter_id = None;
            return Poll::Ready(Ok(GatePermit { gate: self.gate }));
        }

        if let Some(existing) = state
            .waiters
            .iter_mut()
            .find(|waiter| waiter.id == waiter_id)
        {
            if !existing.waker.will_wake(context.waker()) {
                existing.waker.clone_from(context.waker());
            }
        } else {
            state.waiters.push_back(Waiter {
                id: waiter_id,
                waker: context.waker().clone(),
            });
        }
        Poll::Pending
    }
}

/// Exclusive occupancy of the gate; released on drop.
#[must_use = "the gate is released immediately if the permit is not held"]
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a Gate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingWaker, init_test_logging, poll_once, poll_once_with_waker};
    use std::sync::Arc;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn enter_when_free_is_immediate() {
        init_test("enter_when_free_is_immediate");
        let cx = Cx::new();
        let gate = Gate::new();

        let mut fut = gate.enter(&cx);
        let permit = poll_once(&mut fut).expect("immediate").expect("no error");
        crate::assert_with_log!(gate.is_held(), "gate held", true, gate.is_held());

        drop(permit);
        crate::assert_with_log!(!gate.is_held(), "gate free", false, gate.is_held());
        crate::test_complete!("enter_when_free_is_immediate");
    }

    #[test]
    fn try_enter_fails_while_held() {
        init_test("try_enter_fails_while_held");
        let gate = Gate::new();

        let permit = gate.try_enter().expect("first entry");
        let blocked = gate.try_enter().is_err();
        crate::assert_with_log!(blocked, "second entry blocked", true, blocked);

        drop(permit);
        let reentered = gate.try_enter().is_ok();
        crate::assert_with_log!(reentered, "entry after release", true, reentered);
        crate::test_complete!("try_enter_fails_while_held");
    }

    #[test]
    fn queued_entrants_proceed_in_order() {
        init_test("queued_entrants_proceed_in_order");
        let cx1 = Cx::new();
        let cx2 = Cx::new();
        let gate = Gate::new();

        let held = gate.try_enter().expect("initial entry");

        let mut fut1 = gate.enter(&cx1);
        let pending1 = poll_once(&mut fut1).is_none();
        crate::assert_with_log!(pending1, "first pending", true, pending1);

        let mut fut2 = gate.enter(&cx2);
        let pending2 = poll_once(&mut fut2).is_none();
        crate::assert_with_log!(pending2, "second pending", true, pending2);

        drop(held);

        // Second in line cannot take the gate even when polled first.
        let still_pending = poll_once(&mut fut2).is_none();
        crate::assert_with_log!(still_pending, "second cannot overtake", true, still_pending);

        let permit1 = poll_once(&mut fut1)
            .expect("first enters")
            .expect("no error");
        let second_waits = poll_once(&mut fut2).is_none();
        crate::assert_with_log!(second_waits, "second still waits", true, second_waits);

        drop(permit1);
        let permit2 = poll_once(&mut fut2)
            .expect("second enters after release")
            .expect("no error");
        drop(permit2);
        crate::test_complete!("queued_entrants_proceed_in_order");
    }

    #[test]
    fn try_enter_respects_queue() {
        init_test("try_enter_respects_queue");
        let cx = Cx::new();
        let gate = Gate::new();

        let held = gate.try_enter().expect("initial entry");
        let mut fut = gate.enter(&cx);
        let _ = poll_once(&mut fut);

        drop(held);

        // Gate is free but a waiter is queued; no barging.
        let blocked = gate.try_enter().is_err();
        crate::assert_with_log!(blocked, "try_enter blocked by queue", true, blocked);

        let permit = poll_once(&mut fut)
            .expect("queued waiter enters")
            .expect("no error");
        drop(permit);
        crate::test_complete!("try_enter_respects_queue");
    }

    #[test]
    fn cancel_removes_waiter_and_wakes_next() {
        init_test("cancel_removes_waiter_and_wakes_next");
        let cx1 = Cx::new();
        let cx2 = Cx::new();
        let gate = Gate::new();
        let held = gate.try_enter().expect("initial entry");

        let w2 = CountingWaker::new();
        let waker2 = Waker::from(Arc::clone(&w2));

        let mut fut1 = gate.enter(&cx1);
        let mut fut2 = gate.enter(&cx2);
        let _ = poll_once(&mut fut1);
        let _ = poll_once_with_waker(&mut fut2, &waker2);

        drop(held);
        cx1.set_cancel_requested(true);
        let result1 = poll_once(&mut fut1);
        let cancelled = matches!(result1, Some(Err(EnterError::Cancelled)));
        crate::assert_with_log!(cancelled, "head cancelled", true, cancelled);

        let w2_woken = w2.count() > 0;
        crate::assert_with_log!(w2_woken, "second woken", true, w2_woken);

        let permit = poll_once_with_waker(&mut fut2, &waker2)
            .expect("second enters")
            .expect("no error");
        drop(permit);
        crate::test_complete!("cancel_removes_waiter_and_wakes_next");
    }

    #[test]
    fn drop_pending_entry_wakes_next() {
        init_test("drop_pending_entry_wakes_next");
        let cx1 = Cx::new();
        let cx2 = Cx::new();
        let gate = Gate::new();
        let held = gate.try_enter().expect("initial entry");

        let w2 = CountingWaker::new();
        let waker2 = Waker::from(Arc::clone(&w2));

        let mut fut1 = gate.enter(&cx1);
        let mut fut2 = gate.enter(&cx2);
        let _ = poll_once(&mut fut1);
        let _ = poll_once_with_waker(&mut fut2, &waker2);

        drop(held);
        drop(fut1);
        let w2_woken = w2.count() > 0;
        crate::assert_with_log!(w2_woken, "second woken on drop", true, w2_woken);
        crate::assert_with_log!(gate.waiters() == 1, "one waiter left", 1usize, gate.waiters());
        crate::test_complete!("drop_pending_entry_wakes_next");
    }

    #[test]
    fn enter_error_display() {
        assert!(EnterError::Cancelled.to_string().contains("cancelled"));
        assert!(TryEnterError.to_string().contains("held"));
    }
}
