//! Cross-thread message pipes.
//!
//! Two cooperating threads (conventionally a "logic" thread and a "render"
//! thread) exchange work without touching each other's state. Each thread owns
//! a [`Mailbox`] it pumps from its own loop; an [`Endpoint`] pairs that inbox
//! with a peer's inbox and offers:
//!
//! * [`Endpoint::call`]: run a closure on the peer and block until it has run.
//! * [`Endpoint::post`]: run a closure on the peer without waiting, optionally
//!   routing a cleanup back to the posting thread afterwards.
//!
//! Named inboxes are discovered through a [`Registry`]. Every thread also has
//! a lazily created default endpoint in [`local`] for self-scheduling.
//!
//! A thread that owns an inbox must keep pumping it ([`Endpoint::poll`],
//! [`Endpoint::get`], [`Endpoint::drain`]); work addressed to a thread that
//! never pumps never runs.

mod config;
mod endpoint;
mod error;
mod exclusive;
mod item;
pub mod local;
mod mailbox;
pub mod registry;
mod role;
mod spawn;
mod token;

pub use config::{DrainBudget, PipeConfig};
pub use endpoint::{Endpoint, EndpointState};
pub use error::{ConfigError, PipeError, Result, TaskError};
pub use exclusive::Exclusive;
pub use mailbox::{DrainReport, Mailbox, PumpOutcome, Wait};
pub use registry::Registry;
pub use role::Role;
pub use spawn::spawn_endpoint_thread;
pub use token::CallToken;

#[cfg(test)]
use pretty_assertions as _;
#[cfg(test)]
use proptest as _;
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tracing_subscriber as _;
