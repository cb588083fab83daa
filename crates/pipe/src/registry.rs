//! Named inboxes, so threads can find each other without sharing handles up
//! front.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::endpoint::Endpoint;
use crate::error::{PipeError, Result};
use crate::mailbox::Mailbox;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Returns the process-wide registry.
pub fn global() -> &'static Registry {
	&GLOBAL
}

/// Name to inbox map.
///
/// Cloning yields another handle to the same map. Registered inboxes live
/// until removed by [`clear`](Self::clear) or until the registry itself drops.
#[derive(Debug, Default, Clone)]
pub struct Registry {
	inner: Arc<RwLock<HashMap<String, Mailbox>>>,
}

impl Registry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the inbox registered under `name`, creating it if absent.
	pub fn register(&self, name: &str) -> Mailbox {
		if let Some(existing) = self.inner.read().get(name) {
			return existing.clone();
		}
		let mut guard = self.inner.write();
		guard
			.entry(name.to_owned())
			.or_insert_with(|| {
				tracing::debug!(name, "pipe.registry.register");
				Mailbox::labelled(name)
			})
			.clone()
	}

	/// Returns the inbox registered under `name`, if any.
	pub fn lookup(&self, name: &str) -> Option<Mailbox> {
		self.inner.read().get(name).cloned()
	}

	/// Returns an unbound endpoint owning the inbox registered under `name`.
	///
	/// Registers the name if needed. The caller is expected to pump it.
	pub fn endpoint(&self, name: &str) -> Endpoint {
		Endpoint::with_inbox(self.register(name))
	}

	/// Binds `local`'s inbox to the inbox registered under `remote`.
	pub fn open(&self, local: &Endpoint, remote: &str) -> Result<Endpoint> {
		let Some(peer) = self.lookup(remote) else {
			tracing::debug!(from = local.inbox().label(), remote, "pipe.registry.unknown_peer");
			return Err(PipeError::UnknownPeer(remote.to_owned()));
		};
		tracing::debug!(from = local.inbox().label(), remote, "pipe.registry.open");
		Ok(local.bind(peer))
	}

	/// Returns registered names, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.inner.read().keys().cloned().collect();
		names.sort();
		names
	}

	/// Forgets every registered name.
	///
	/// Existing handles keep working; only discovery by name is affected.
	pub fn clear(&self) {
		let removed = std::mem::take(&mut *self.inner.write());
		tracing::debug!(count = removed.len(), "pipe.registry.clear");
	}
}
