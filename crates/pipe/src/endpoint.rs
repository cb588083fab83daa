//! The user-facing pipe: "my inbox" paired with "their inbox".

use std::sync::Arc;

use crate::config::{DrainBudget, PipeConfig};
use crate::error::{PipeError, Result, TaskError};
use crate::item::{CallThunk, Item, PostThunk, ReplySlot};
use crate::mailbox::{DrainReport, Mailbox, PumpOutcome, Wait};
use crate::token::CallToken;

/// Lifecycle of an [`Endpoint`], derived from its inbox and peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
	/// No peer; posts land in the endpoint's own inbox.
	Unbound,
	/// Has a peer to call and post to.
	Bound,
	/// A shutdown sentinel is queued but no pump has reached it yet.
	Closing,
	/// Terminal: the inbox rejects all work.
	Closed,
}

/// Handle pairing the inbox this thread pumps with an optional peer inbox.
///
/// Cloning is cheap and yields a handle to the same mailboxes. An endpoint is
/// usually held by the thread that pumps its inbox; other threads reach that
/// thread by binding their own endpoint to [`Endpoint::inbox`].
#[derive(Debug, Clone)]
pub struct Endpoint {
	inbox: Mailbox,
	peer: Option<Mailbox>,
	config: PipeConfig,
}

impl Default for Endpoint {
	fn default() -> Self {
		Self::new()
	}
}

impl Endpoint {
	/// Creates an unbound endpoint with a fresh inbox.
	pub fn new() -> Self {
		Self::with_inbox(Mailbox::new())
	}

	/// Creates an unbound endpoint around an existing inbox.
	pub fn with_inbox(inbox: Mailbox) -> Self {
		Self {
			inbox,
			peer: None,
			config: PipeConfig::default(),
		}
	}

	/// Creates an endpoint bound to `peer`.
	pub fn bound(inbox: Mailbox, peer: Mailbox) -> Self {
		Self {
			inbox,
			peer: Some(peer),
			config: PipeConfig::default(),
		}
	}

	/// Replaces the endpoint's config.
	#[must_use]
	pub fn with_config(mut self, config: PipeConfig) -> Self {
		self.config = config;
		self
	}

	/// Returns a new endpoint sharing this inbox and config, bound to `peer`.
	pub fn bind(&self, peer: Mailbox) -> Self {
		Self {
			inbox: self.inbox.clone(),
			peer: Some(peer),
			config: self.config,
		}
	}

	/// Returns the inbox this endpoint's thread pumps.
	pub fn inbox(&self) -> &Mailbox {
		&self.inbox
	}

	/// Returns the inbox calls and posts go to, if bound.
	pub fn peer(&self) -> Option<&Mailbox> {
		self.peer.as_ref()
	}

	/// Returns the config used for call timeouts, drains and lock slices.
	pub fn config(&self) -> &PipeConfig {
		&self.config
	}

	/// Returns the lifecycle state derived from the inbox and peer.
	pub fn state(&self) -> EndpointState {
		if self.inbox.is_closed() {
			EndpointState::Closed
		} else if self.inbox.is_closing() {
			EndpointState::Closing
		} else if self.peer.is_some() {
			EndpointState::Bound
		} else {
			EndpointState::Unbound
		}
	}

	/// Runs `work` on the peer's thread and blocks until it has run.
	///
	/// While waiting, this thread keeps pumping its own inbox, so work other
	/// threads send here (including nested calls back from the peer) still
	/// runs. Uses the configured call timeout.
	pub fn call<R, F>(&self, work: F) -> Result<R>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		self.try_call(move || Ok(work()))
	}

	/// Like [`call`](Self::call) for fallible work. A failure is returned as
	/// [`PipeError::Task`] and also aborts the peer's current pump.
	pub fn try_call<R, F>(&self, work: F) -> Result<R>
	where
		F: FnOnce() -> Result<R, TaskError> + Send + 'static,
		R: Send + 'static,
	{
		self.call_within(self.config.call_timeout(), work)
	}

	/// Like [`try_call`](Self::try_call) with an explicit wait.
	///
	/// On [`PipeError::TimedOut`] the work may still run later; its reply is
	/// then discarded.
	pub fn call_within<R, F>(&self, wait: Wait, work: F) -> Result<R>
	where
		F: FnOnce() -> Result<R, TaskError> + Send + 'static,
		R: Send + 'static,
	{
		let Some(peer) = &self.peer else {
			return Err(PipeError::Unbound);
		};
		if self.inbox.is_closed() {
			return Err(PipeError::Closed);
		}

		let token = CallToken::next();
		let slot = ReplySlot::new();
		let thunk = CallThunk::new(work, Arc::clone(&slot), self.inbox.clone(), token);
		if let Err(rejected) = peer.offer(Item::task(thunk)) {
			slot.abandon();
			drop(rejected);
			return Err(PipeError::Closed);
		}
		tracing::trace!(from = self.inbox.label(), to = peer.label(), %token, "pipe.call");

		let result = self.inbox.wait_reply(token, &slot, wait);
		slot.abandon();
		result
	}

	/// Runs `work` on the peer's thread without waiting.
	///
	/// Without a peer, the work is queued on this endpoint's own inbox.
	pub fn post<F>(&self, work: F) -> Result<()>
	where
		F: FnOnce() + Send + 'static,
	{
		self.try_post(move || {
			work();
			Ok(())
		})
	}

	/// Like [`post`](Self::post) for fallible work. A failure aborts the pump
	/// that runs it.
	pub fn try_post<F>(&self, work: F) -> Result<()>
	where
		F: FnOnce() -> Result<(), TaskError> + Send + 'static,
	{
		self.submit((), move |_: &mut ()| work(), None::<fn(())>)
	}

	/// Posts `work` over an owned `param`, then hands `param` to `cleanup`.
	///
	/// With a peer, `cleanup` runs on this endpoint's thread the next time it
	/// pumps; without one, or once every handle to this inbox is gone, it runs
	/// right after `work`. If the work is discarded
	/// instead (rejected, aborted, or dropped at shutdown), `cleanup` runs
	/// wherever the discard happens. Either way it runs exactly once.
	pub fn post_with<P, W, C>(&self, param: P, work: W, cleanup: C) -> Result<()>
	where
		P: Send + 'static,
		W: FnOnce(&mut P) + Send + 'static,
		C: FnOnce(P) + Send + 'static,
	{
		self.submit(
			param,
			move |param: &mut P| {
				work(param);
				Ok(())
			},
			Some(cleanup),
		)
	}

	/// Fallible form of [`post_with`](Self::post_with). The cleanup runs even
	/// when the work fails.
	pub fn try_post_with<P, W, C>(&self, param: P, work: W, cleanup: C) -> Result<()>
	where
		P: Send + 'static,
		W: FnOnce(&mut P) -> Result<(), TaskError> + Send + 'static,
		C: FnOnce(P) + Send + 'static,
	{
		self.submit(param, work, Some(cleanup))
	}

	fn submit<P, W, C>(&self, param: P, work: W, cleanup: Option<C>) -> Result<()>
	where
		P: Send + 'static,
		W: FnOnce(&mut P) -> Result<(), TaskError> + Send + 'static,
		C: FnOnce(P) + Send + 'static,
	{
		let (target, home) = match &self.peer {
			Some(peer) if !peer.same_mailbox(&self.inbox) => (peer, Some(self.inbox.clone())),
			_ => (&self.inbox, None),
		};
		let item = Item::task(PostThunk::new(param, work, cleanup, home));
		if self.inbox.is_closed() {
			drop(item);
			return Err(PipeError::Closed);
		}
		tracing::trace!(from = self.inbox.label(), to = target.label(), "pipe.post");
		target.enqueue(item)
	}

	/// Runs whatever is queued right now without blocking.
	pub fn poll(&self) -> Result<PumpOutcome> {
		self.inbox.dequeue(Wait::Never)
	}

	/// Waits for work per `wait`, then runs the batch available at wake.
	pub fn get(&self, wait: Wait) -> Result<PumpOutcome> {
		self.inbox.dequeue(wait)
	}

	/// Flushes queued work without blocking, within the configured budget.
	pub fn drain(&self) -> Result<DrainReport> {
		self.inbox.drain(self.config.drain_budget())
	}

	/// Like [`drain`](Self::drain) with an explicit budget.
	pub fn drain_with(&self, budget: DrainBudget) -> Result<DrainReport> {
		self.inbox.drain(budget)
	}

	/// Pumps the inbox until the shutdown sentinel is observed.
	///
	/// Returns the number of tasks run. A failing task ends the loop with its
	/// error; the caller may resume pumping.
	pub fn run_until_shutdown(&self) -> Result<usize> {
		let mut total = 0usize;
		loop {
			match self.get(Wait::Forever)? {
				PumpOutcome::Processed(n) => total = total.saturating_add(n),
				PumpOutcome::TimedOut => {}
				PumpOutcome::Shutdown { processed } => {
					total = total.saturating_add(processed);
					tracing::debug!(mailbox = self.inbox.label(), total, "pipe.endpoint.stopped");
					return Ok(total);
				}
			}
		}
	}

	/// Queues a shutdown sentinel on this endpoint's own inbox.
	///
	/// The owning thread sees it on its next pump; the peer is not signalled.
	pub fn close(&self) -> Result<()> {
		self.inbox.close()
	}

	/// Closes the inbox immediately, discarding queued work.
	pub fn abort(&self) -> usize {
		self.inbox.abort()
	}
}
