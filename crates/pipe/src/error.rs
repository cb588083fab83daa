//! Error types for pipes and their configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a queued task.
///
/// Returning this from a task aborts the pump that ran it; the items queued
/// behind it stay in the mailbox for the next pump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
	message: String,
}

impl TaskError {
	/// Creates a task failure with a human readable message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}

	/// Returns the failure description.
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Errors surfaced by mailboxes, endpoints and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipeError {
	/// `call` on an endpoint with no peer.
	#[error("endpoint has no peer")]
	Unbound,

	/// The target mailbox no longer accepts work, or shut down while a call
	/// was waiting.
	#[error("mailbox is closed")]
	Closed,

	/// A blocking wait reached its deadline.
	#[error("timed out")]
	TimedOut,

	/// `open` named an endpoint nobody registered.
	#[error("no endpoint registered as '{0}'")]
	UnknownPeer(String),

	/// The task itself failed. For `call`, this is the remote closure's error.
	#[error("task failed: {0}")]
	Task(#[from] TaskError),

	/// An unrelated task pumped while a call was waiting failed, ending the
	/// wait before the reply arrived.
	#[error("call interrupted by a failing task: {0}")]
	Interrupted(TaskError),
}

/// Result type for pipe operations.
pub type Result<T, E = PipeError> = std::result::Result<T, E>;

/// Errors that can occur when loading a [`PipeConfig`](crate::PipeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or field types.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}
