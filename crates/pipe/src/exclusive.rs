use parking_lot::{Mutex, MutexGuard};

use crate::endpoint::Endpoint;
use crate::error::{PipeError, Result};
use crate::mailbox::PumpOutcome;

/// Mutex for state shared between endpoint threads.
///
/// A thread that blocks on a plain lock stops servicing its inbox; if the
/// holder is waiting on a call into that inbox, both threads stall.
/// [`lock_pumping`](Self::lock_pumping) waits in short slices and pumps in
/// between, so the holder's call can complete.
#[derive(Debug, Default)]
pub struct Exclusive<T> {
	inner: Mutex<T>,
}

impl<T> Exclusive<T> {
	/// Wraps `value`.
	pub fn new(value: T) -> Self {
		Self { inner: Mutex::new(value) }
	}

	/// Blocks without pumping. Only safe when the holder never calls into
	/// this thread.
	pub fn lock(&self) -> MutexGuard<'_, T> {
		self.inner.lock()
	}

	/// Acquires the lock only if it is free.
	pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
		self.inner.try_lock()
	}

	/// Acquires the lock while pumping `endpoint` between attempts.
	///
	/// Each attempt waits for the endpoint's configured lock slice. Fails with
	/// [`PipeError::Closed`] if the inbox shuts down first, or with
	/// [`PipeError::Interrupted`] if a pumped task fails.
	pub fn lock_pumping(&self, endpoint: &Endpoint) -> Result<MutexGuard<'_, T>> {
		let slice = endpoint.config().lock_slice();
		let mut slices = 0usize;
		loop {
			if let Some(guard) = self.inner.try_lock_for(slice) {
				if slices > 0 {
					tracing::trace!(mailbox = endpoint.inbox().label(), slices, "pipe.exclusive.acquired");
				}
				return Ok(guard);
			}
			slices += 1;
			match endpoint.poll() {
				Ok(PumpOutcome::Shutdown { .. }) => {
					tracing::debug!(mailbox = endpoint.inbox().label(), slices, "pipe.exclusive.closed");
					return Err(PipeError::Closed);
				}
				Ok(_) => {}
				Err(PipeError::Task(err)) => return Err(PipeError::Interrupted(err)),
				Err(err) => return Err(err),
			}
		}
	}

	/// Borrows the value without locking.
	pub fn get_mut(&mut self) -> &mut T {
		self.inner.get_mut()
	}

	/// Consumes the wrapper, returning the value.
	pub fn into_inner(self) -> T {
		self.inner.into_inner()
	}
}
