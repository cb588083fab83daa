//! Queue items and the thunks that carry closures across threads.
//!
//! A thunk owns everything its work needs, so it can outlive the stack frame
//! that created it. Thunks that are dropped without running (discarded at
//! shutdown, rejected by a closed mailbox, freed together with their mailbox)
//! still release what they own: post cleanups run in place and waiting
//! callers are woken with [`PipeError::Closed`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{PipeError, TaskError};
use crate::mailbox::{Mailbox, WeakMailbox};
use crate::token::CallToken;

/// One mailbox entry.
pub(crate) enum Item {
	/// Work to run on the thread that pumps the mailbox.
	Task(Box<dyn Thunk>),
	/// Wake-up marker for the call identified by the token.
	Reply(CallToken),
	/// Stops the pump; nothing queued behind it runs.
	Shutdown,
}

impl Item {
	pub(crate) fn task(thunk: impl Thunk + 'static) -> Self {
		Self::Task(Box::new(thunk))
	}

	pub(crate) const fn kind(&self) -> &'static str {
		match self {
			Self::Task(_) => "task",
			Self::Reply(_) => "reply",
			Self::Shutdown => "shutdown",
		}
	}
}

impl fmt::Debug for Item {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Reply(token) => f.debug_tuple("Reply").field(token).finish(),
			other => f.write_str(other.kind()),
		}
	}
}

/// Type-erased unit of work.
pub(crate) trait Thunk: Send {
	fn run(self: Box<Self>) -> Result<(), TaskError>;
}

/// Fire-and-forget work over an owned parameter.
///
/// After `work` has run, `cleanup` receives the parameter back: on the
/// posting thread when `home` is set and still alive, in place otherwise.
pub(crate) struct PostThunk<P, W, C>
where
	P: Send + 'static,
	W: FnOnce(&mut P) -> Result<(), TaskError> + Send,
	C: FnOnce(P) + Send + 'static,
{
	param: Option<P>,
	work: Option<W>,
	cleanup: Option<C>,
	home: Option<WeakMailbox>,
}

impl<P, W, C> PostThunk<P, W, C>
where
	P: Send + 'static,
	W: FnOnce(&mut P) -> Result<(), TaskError> + Send,
	C: FnOnce(P) + Send + 'static,
{
	pub(crate) fn new(param: P, work: W, cleanup: Option<C>, home: Option<Mailbox>) -> Self {
		Self {
			param: Some(param),
			work: Some(work),
			cleanup,
			home: home.as_ref().map(Mailbox::downgrade),
		}
	}

	fn finish(&mut self, param: P) {
		let Some(cleanup) = self.cleanup.take() else {
			return;
		};
		match self.home.take().and_then(|home| home.upgrade()) {
			Some(home) => {
				// A closed home rejects the item, whose drop runs the cleanup here instead.
				if home.enqueue(Item::task(CleanupThunk::new(param, cleanup))).is_err() {
					tracing::trace!(mailbox = home.label(), "pipe.cleanup.home_closed");
				}
			}
			None => cleanup(param),
		}
	}
}

impl<P, W, C> Thunk for PostThunk<P, W, C>
where
	P: Send + 'static,
	W: FnOnce(&mut P) -> Result<(), TaskError> + Send,
	C: FnOnce(P) + Send + 'static,
{
	fn run(mut self: Box<Self>) -> Result<(), TaskError> {
		let (Some(mut param), Some(work)) = (self.param.take(), self.work.take()) else {
			return Ok(());
		};
		let result = work(&mut param);
		self.finish(param);
		result
	}
}

impl<P, W, C> Drop for PostThunk<P, W, C>
where
	P: Send + 'static,
	W: FnOnce(&mut P) -> Result<(), TaskError> + Send,
	C: FnOnce(P) + Send + 'static,
{
	fn drop(&mut self) {
		let Some(param) = self.param.take() else {
			return;
		};
		if self.work.is_some() {
			tracing::trace!("pipe.post.discarded");
		}
		if let Some(cleanup) = self.cleanup.take() {
			cleanup(param);
		}
	}
}

/// Carries a posted parameter back to its cleanup on the posting thread.
pub(crate) struct CleanupThunk<P, C>
where
	P: Send + 'static,
	C: FnOnce(P) + Send + 'static,
{
	pending: Option<(P, C)>,
}

impl<P, C> CleanupThunk<P, C>
where
	P: Send + 'static,
	C: FnOnce(P) + Send + 'static,
{
	fn new(param: P, cleanup: C) -> Self {
		Self {
			pending: Some((param, cleanup)),
		}
	}
}

impl<P, C> Thunk for CleanupThunk<P, C>
where
	P: Send + 'static,
	C: FnOnce(P) + Send + 'static,
{
	fn run(mut self: Box<Self>) -> Result<(), TaskError> {
		if let Some((param, cleanup)) = self.pending.take() {
			cleanup(param);
		}
		Ok(())
	}
}

impl<P, C> Drop for CleanupThunk<P, C>
where
	P: Send + 'static,
	C: FnOnce(P) + Send + 'static,
{
	fn drop(&mut self) {
		if let Some((param, cleanup)) = self.pending.take() {
			cleanup(param);
		}
	}
}

/// Result cell shared between a blocked caller and the thunk running its work.
pub(crate) struct ReplySlot<R> {
	value: Mutex<Option<Result<R, PipeError>>>,
	abandoned: AtomicBool,
}

impl<R> ReplySlot<R> {
	pub(crate) fn new() -> Arc<Self> {
		Arc::new(Self {
			value: Mutex::new(None),
			abandoned: AtomicBool::new(false),
		})
	}

	/// Marks the caller as no longer waiting; later replies skip the wake-up.
	pub(crate) fn abandon(&self) {
		self.abandoned.store(true, Ordering::Release);
	}

	fn is_abandoned(&self) -> bool {
		self.abandoned.load(Ordering::Acquire)
	}

	fn fill(&self, value: Result<R, PipeError>) {
		*self.value.lock() = Some(value);
	}

	pub(crate) fn take(&self) -> Option<Result<R, PipeError>> {
		self.value.lock().take()
	}
}

/// Work submitted by a blocking `call`.
///
/// The result is stored in the shared slot before the reply marker is queued
/// on the caller's inbox, so the caller always sees the effects of the work.
pub(crate) struct CallThunk<F, R>
where
	F: FnOnce() -> Result<R, TaskError> + Send,
	R: Send,
{
	work: Option<F>,
	slot: Arc<ReplySlot<R>>,
	reply_to: WeakMailbox,
	token: CallToken,
}

impl<F, R> CallThunk<F, R>
where
	F: FnOnce() -> Result<R, TaskError> + Send,
	R: Send,
{
	pub(crate) fn new(work: F, slot: Arc<ReplySlot<R>>, reply_to: Mailbox, token: CallToken) -> Self {
		Self {
			work: Some(work),
			slot,
			reply_to: reply_to.downgrade(),
			token,
		}
	}

	fn reply(&self, value: Result<R, PipeError>) {
		if self.slot.is_abandoned() {
			tracing::trace!(token = %self.token, "pipe.call.abandoned");
			return;
		}
		self.slot.fill(value);
		let woken = self.reply_to.upgrade().is_some_and(|caller| caller.enqueue(Item::Reply(self.token)).is_ok());
		if !woken {
			tracing::trace!(token = %self.token, "pipe.call.caller_closed");
		}
	}
}

impl<F, R> Thunk for CallThunk<F, R>
where
	F: FnOnce() -> Result<R, TaskError> + Send,
	R: Send,
{
	fn run(mut self: Box<Self>) -> Result<(), TaskError> {
		let Some(work) = self.work.take() else {
			return Ok(());
		};
		match work() {
			Ok(value) => {
				self.reply(Ok(value));
				Ok(())
			}
			Err(err) => {
				self.reply(Err(PipeError::Task(err.clone())));
				Err(err)
			}
		}
	}
}

impl<F, R> Drop for CallThunk<F, R>
where
	F: FnOnce() -> Result<R, TaskError> + Send,
	R: Send,
{
	fn drop(&mut self) {
		if self.work.take().is_some() {
			tracing::trace!(token = %self.token, "pipe.call.discarded");
			self.reply(Err(PipeError::Closed));
		}
	}
}
