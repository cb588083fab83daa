use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::DrainBudget;
use crate::error::PipeError;
use crate::item::{Item, ReplySlot};
use crate::token::CallToken;

/// How long a pump may block waiting for its first item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
	/// Do not block.
	Never,
	/// Block for at most this long.
	For(Duration),
	/// Block until an item arrives.
	Forever,
}

impl Wait {
	fn deadline(self) -> Deadline {
		match self {
			Self::Never => Deadline::Now,
			// Overflowing timeouts behave as infinite.
			Self::For(timeout) => Instant::now().checked_add(timeout).map_or(Deadline::Never, Deadline::At),
			Self::Forever => Deadline::Never,
		}
	}
}

#[derive(Debug, Clone, Copy)]
enum Deadline {
	Now,
	At(Instant),
	Never,
}

/// Result of one pump over a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
	/// Ran this many tasks. Zero when nothing was queued.
	Processed(usize),
	/// The wait expired before anything arrived.
	TimedOut,
	/// The shutdown sentinel was observed; the mailbox is closed. Carries the
	/// tasks run ahead of the sentinel by this pump.
	Shutdown { processed: usize },
}

impl PumpOutcome {
	/// Returns true if the pump observed the shutdown sentinel.
	pub fn is_shutdown(self) -> bool {
		matches!(self, Self::Shutdown { .. })
	}
}

/// Summary of one [`Mailbox::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
	/// Tasks run by this drain.
	pub processed: usize,
	/// Items still queued when the drain returned.
	pub pending: usize,
	/// The drain stopped at a shutdown sentinel (left in place).
	pub shutdown: bool,
	/// The drain stopped because its budget ran out with work remaining.
	pub budget_exhausted: bool,
}

struct MailboxState {
	queue: VecDeque<Item>,
	closing: bool,
	closed: bool,
}

struct MailboxInner {
	label: String,
	state: Mutex<MailboxState>,
	ready: Condvar,
}

/// Thread-safe FIFO of work items for one consuming thread.
///
/// Any number of threads may enqueue; the owning thread pumps it. Clones share
/// the same queue, which lives as long as any clone does. Items still queued
/// when the last clone drops are discarded (post cleanups run, waiting callers
/// see [`PipeError::Closed`]).
#[derive(Clone)]
pub struct Mailbox {
	inner: Arc<MailboxInner>,
}

/// Non-owning handle to a [`Mailbox`].
///
/// Queued items use it to reach the mailbox they came from, so two mailboxes
/// holding each other's work do not keep each other alive.
#[derive(Clone)]
pub(crate) struct WeakMailbox {
	inner: Weak<MailboxInner>,
}

impl WeakMailbox {
	/// Returns the mailbox if any strong handle still exists.
	pub(crate) fn upgrade(&self) -> Option<Mailbox> {
		self.inner.upgrade().map(|inner| Mailbox { inner })
	}
}

impl Default for Mailbox {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Mailbox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("Mailbox")
			.field("label", &self.inner.label)
			.field("len", &state.queue.len())
			.field("closing", &state.closing)
			.field("closed", &state.closed)
			.finish()
	}
}

impl Mailbox {
	/// Creates an anonymous mailbox.
	pub fn new() -> Self {
		Self::labelled("anonymous")
	}

	/// Creates a mailbox whose label appears in logs.
	pub fn labelled(label: impl Into<String>) -> Self {
		Self {
			inner: Arc::new(MailboxInner {
				label: label.into(),
				state: Mutex::new(MailboxState {
					queue: VecDeque::new(),
					closing: false,
					closed: false,
				}),
				ready: Condvar::new(),
			}),
		}
	}

	/// Returns the name shown in log events.
	pub fn label(&self) -> &str {
		&self.inner.label
	}

	pub(crate) fn downgrade(&self) -> WeakMailbox {
		WeakMailbox {
			inner: Arc::downgrade(&self.inner),
		}
	}

	/// Returns true when both handles refer to the same queue.
	pub fn same_mailbox(&self, other: &Mailbox) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Returns current queue length, sentinels included.
	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	/// Returns true when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.inner.state.lock().queue.is_empty()
	}

	/// Returns true once a shutdown sentinel has been queued.
	pub fn is_closing(&self) -> bool {
		self.inner.state.lock().closing
	}

	/// Returns true once the mailbox rejects new work.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}

	/// Appends an item and wakes one waiting pump.
	///
	/// A closed mailbox rejects the item; it is dropped after the lock is
	/// released, which runs any cleanup it carries.
	pub(crate) fn enqueue(&self, item: Item) -> Result<(), PipeError> {
		self.offer(item).map_err(|rejected| {
			drop(rejected);
			PipeError::Closed
		})
	}

	/// Like [`enqueue`](Self::enqueue), but hands a rejected item back.
	pub(crate) fn offer(&self, item: Item) -> Result<(), Item> {
		let mut state = self.inner.state.lock();
		if state.closed {
			drop(state);
			tracing::trace!(mailbox = self.label(), kind = item.kind(), "pipe.enqueue.rejected");
			return Err(item);
		}
		tracing::trace!(mailbox = self.label(), kind = item.kind(), depth = state.queue.len() + 1, "pipe.enqueue");
		state.queue.push_back(item);
		drop(state);
		self.inner.ready.notify_one();
		Ok(())
	}

	/// Queues the shutdown sentinel.
	///
	/// Work queued ahead of the sentinel still runs; the pump that reaches it
	/// closes the mailbox and discards everything behind it. Closing a mailbox
	/// that already has a sentinel queued does nothing.
	pub fn close(&self) -> Result<(), PipeError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(PipeError::Closed);
		}
		if state.closing {
			return Ok(());
		}
		state.closing = true;
		state.queue.push_back(Item::Shutdown);
		drop(state);
		self.inner.ready.notify_one();
		tracing::debug!(mailbox = self.label(), "pipe.mailbox.close");
		Ok(())
	}

	/// Closes the mailbox immediately, discarding everything queued.
	///
	/// Returns the number of discarded items.
	pub fn abort(&self) -> usize {
		let mut state = self.inner.state.lock();
		let discarded = shut(&mut state);
		drop(state);
		self.inner.ready.notify_all();
		let count = discarded.len();
		drop(discarded);
		tracing::debug!(mailbox = self.label(), discarded = count, "pipe.mailbox.abort");
		count
	}

	/// Runs the batch of items queued when the pump woke.
	///
	/// Waits per `wait` if the queue is empty. The lock is released around
	/// each task, so tasks may enqueue to this mailbox; such items wait for
	/// the next pump. A failing task stops the pump and leaves the rest queued.
	pub fn dequeue(&self, wait: Wait) -> Result<PumpOutcome, PipeError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Ok(PumpOutcome::Shutdown { processed: 0 });
		}
		if !self.wait_for_item(&mut state, wait.deadline()) {
			return Ok(match (state.closed, wait) {
				(true, _) => PumpOutcome::Shutdown { processed: 0 },
				(false, Wait::Never) => PumpOutcome::Processed(0),
				(false, _) => PumpOutcome::TimedOut,
			});
		}

		let batch = state.queue.len();
		let mut processed = 0;
		for _ in 0..batch {
			let Some(item) = state.queue.pop_front() else {
				break;
			};
			match item {
				Item::Task(thunk) => {
					let result = MutexGuard::unlocked(&mut state, || thunk.run());
					processed += 1;
					if let Err(err) = result {
						tracing::warn!(mailbox = self.label(), error = %err, "pipe.task.failed");
						return Err(PipeError::Task(err));
					}
				}
				Item::Reply(token) => {
					tracing::trace!(mailbox = self.label(), %token, "pipe.reply.stale");
				}
				Item::Shutdown => {
					let discarded = shut(&mut state);
					drop(state);
					self.inner.ready.notify_all();
					tracing::debug!(mailbox = self.label(), processed, discarded = discarded.len(), "pipe.mailbox.shutdown");
					drop(discarded);
					return Ok(PumpOutcome::Shutdown { processed });
				}
			}
		}
		tracing::trace!(mailbox = self.label(), processed, "pipe.pump");
		Ok(PumpOutcome::Processed(processed))
	}

	/// Runs queued tasks without blocking.
	///
	/// Stops when the queue is empty, when `budget` is spent, or at a
	/// shutdown sentinel, which is left queued for the next
	/// [`dequeue`](Self::dequeue) to observe.
	pub fn drain(&self, budget: DrainBudget) -> Result<DrainReport, PipeError> {
		let deadline = Instant::now().checked_add(budget.duration);
		let mut report = DrainReport::default();
		let mut state = self.inner.state.lock();
		if state.closed {
			report.shutdown = true;
			return Ok(report);
		}

		loop {
			if state.queue.is_empty() {
				break;
			}
			if report.processed >= budget.max_items || deadline.is_some_and(|d| Instant::now() >= d) {
				report.budget_exhausted = true;
				break;
			}
			let Some(item) = state.queue.pop_front() else {
				break;
			};
			match item {
				Item::Task(thunk) => {
					let result = MutexGuard::unlocked(&mut state, || thunk.run());
					report.processed += 1;
					if let Err(err) = result {
						tracing::warn!(mailbox = self.label(), error = %err, "pipe.task.failed");
						return Err(PipeError::Task(err));
					}
				}
				Item::Reply(token) => {
					tracing::trace!(mailbox = self.label(), %token, "pipe.reply.stale");
				}
				Item::Shutdown => {
					state.queue.push_front(Item::Shutdown);
					report.shutdown = true;
					break;
				}
			}
		}

		report.pending = state.queue.len();
		drop(state);
		tracing::trace!(mailbox = self.label(), ?report, "pipe.drain");
		Ok(report)
	}

	/// Pumps this mailbox until the reply for `token` arrives.
	///
	/// Unrelated tasks met on the way are run, replies for other calls are
	/// discarded. The slot is the source of truth: the reply item only wakes
	/// the waiter, so a reply consumed by a nested pump is not lost.
	pub(crate) fn wait_reply<R>(&self, token: CallToken, slot: &ReplySlot<R>, wait: Wait) -> Result<R, PipeError> {
		let deadline = wait.deadline();
		loop {
			if let Some(reply) = slot.take() {
				return reply;
			}

			let mut state = self.inner.state.lock();
			if state.closed {
				drop(state);
				return slot.take().unwrap_or(Err(PipeError::Closed));
			}
			if !self.wait_for_item(&mut state, deadline) {
				let closed = state.closed;
				drop(state);
				tracing::debug!(mailbox = self.label(), %token, closed, "pipe.call.gave_up");
				let fallback = if closed { PipeError::Closed } else { PipeError::TimedOut };
				return slot.take().unwrap_or(Err(fallback));
			}

			let Some(item) = state.queue.pop_front() else {
				continue;
			};
			match item {
				Item::Reply(other) if other == token => {}
				Item::Reply(other) => {
					tracing::trace!(mailbox = self.label(), token = %other, "pipe.reply.stale");
				}
				Item::Shutdown => {
					state.queue.push_front(Item::Shutdown);
					tracing::debug!(mailbox = self.label(), %token, "pipe.call.shutdown");
					return Err(PipeError::Closed);
				}
				Item::Task(thunk) => {
					drop(state);
					if let Err(err) = thunk.run() {
						tracing::warn!(mailbox = self.label(), %token, error = %err, "pipe.call.interrupted");
						return Err(PipeError::Interrupted(err));
					}
				}
			}
		}
	}

	/// Blocks until the queue has an item, the mailbox closes, or `deadline`
	/// passes. Returns whether an item is available.
	fn wait_for_item(&self, state: &mut MutexGuard<'_, MailboxState>, deadline: Deadline) -> bool {
		while state.queue.is_empty() && !state.closed {
			match deadline {
				Deadline::Now => break,
				Deadline::At(at) => {
					if self.inner.ready.wait_until(state, at).timed_out() {
						break;
					}
				}
				Deadline::Never => self.inner.ready.wait(state),
			}
		}
		!state.queue.is_empty() && !state.closed
	}
}

/// Marks the mailbox closed and hands back its queue so the caller can drop
/// it outside the lock.
fn shut(state: &mut MailboxState) -> VecDeque<Item> {
	state.closing = true;
	state.closed = true;
	std::mem::take(&mut state.queue)
}

#[cfg(test)]
mod tests;
