//! Per-thread default endpoint.
//!
//! Each thread lazily gets an unbound [`Endpoint`] whose inbox it pumps
//! itself. Posting to it schedules work for later on the same thread. The
//! inbox is aborted when the thread exits, so pending posts run their cleanups
//! and any handle held elsewhere starts seeing [`PipeError::Closed`].

use crate::endpoint::Endpoint;
use crate::error::{PipeError, Result};
use crate::mailbox::{DrainReport, Mailbox, PumpOutcome, Wait};

struct ThreadEndpoint {
	endpoint: Endpoint,
}

impl ThreadEndpoint {
	fn new() -> Self {
		let current = std::thread::current();
		let label = current.name().map_or_else(|| format!("{:?}", current.id()), str::to_owned);
		Self {
			endpoint: Endpoint::with_inbox(Mailbox::labelled(label)),
		}
	}
}

impl Drop for ThreadEndpoint {
	fn drop(&mut self) {
		let discarded = self.endpoint.abort();
		if discarded > 0 {
			tracing::warn!(mailbox = self.endpoint.inbox().label(), discarded, "pipe.local.discarded");
		}
	}
}

thread_local! {
	static CURRENT: ThreadEndpoint = ThreadEndpoint::new();
}

/// Runs `f` with this thread's default endpoint.
///
/// Fails with [`PipeError::Closed`] while the thread is being torn down.
pub fn with<R>(f: impl FnOnce(&Endpoint) -> R) -> Result<R> {
	CURRENT.try_with(|current| f(&current.endpoint)).map_err(|_| PipeError::Closed)
}

/// Returns a handle to this thread's default endpoint.
pub fn endpoint() -> Result<Endpoint> {
	with(Endpoint::clone)
}

/// Returns this thread's default inbox, for other threads to bind to.
pub fn mailbox() -> Result<Mailbox> {
	with(|endpoint| endpoint.inbox().clone())
}

/// Queues `work` to run on this thread at its next pump.
pub fn post<F>(work: F) -> Result<()>
where
	F: FnOnce() + Send + 'static,
{
	with(|endpoint| endpoint.post(work))?
}

/// Runs whatever is queued for this thread right now.
pub fn poll() -> Result<PumpOutcome> {
	with(Endpoint::poll)?
}

/// Waits per `wait`, then runs the batch queued for this thread.
pub fn get(wait: Wait) -> Result<PumpOutcome> {
	with(|endpoint| endpoint.get(wait))?
}

/// Flushes this thread's queue within the default drain budget.
pub fn drain() -> Result<DrainReport> {
	with(Endpoint::drain)?
}
