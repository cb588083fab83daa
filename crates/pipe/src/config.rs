//! Pipe tuning loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mailbox::Wait;

/// Limits for one non-blocking [`drain`](crate::Endpoint::drain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainBudget {
	/// Maximum number of tasks to run before returning.
	pub max_items: usize,
	/// Maximum wall time to spend before returning.
	pub duration: Duration,
}

impl DrainBudget {
	/// A budget that never stops a drain early.
	pub const UNLIMITED: Self = Self {
		max_items: usize::MAX,
		duration: Duration::MAX,
	};
}

impl Default for DrainBudget {
	fn default() -> Self {
		Self {
			max_items: default_drain_max_items(),
			duration: Duration::from_millis(default_drain_time_ms()),
		}
	}
}

/// Per-endpoint tuning.
///
/// ```toml
/// call_timeout_ms = 2000
/// drain_max_items = 512
/// drain_time_ms = 8
/// lock_slice_ms = 1
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeConfig {
	/// Default deadline for `call`. Absent means wait forever.
	#[serde(default)]
	pub call_timeout_ms: Option<u64>,
	/// Task limit for `drain`.
	#[serde(default = "default_drain_max_items")]
	pub drain_max_items: usize,
	/// Wall time limit for `drain`, in milliseconds.
	#[serde(default = "default_drain_time_ms")]
	pub drain_time_ms: u64,
	/// Wait slice between pumps in [`Exclusive::lock_pumping`](crate::Exclusive::lock_pumping).
	#[serde(default = "default_lock_slice_ms")]
	pub lock_slice_ms: u64,
}

fn default_drain_max_items() -> usize {
	1024
}

fn default_drain_time_ms() -> u64 {
	16
}

fn default_lock_slice_ms() -> u64 {
	1
}

impl Default for PipeConfig {
	fn default() -> Self {
		Self {
			call_timeout_ms: None,
			drain_max_items: default_drain_max_items(),
			drain_time_ms: default_drain_time_ms(),
			lock_slice_ms: default_lock_slice_ms(),
		}
	}
}

impl PipeConfig {
	/// Parses a configuration from TOML text. Missing keys take their defaults.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a TOML configuration file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&text)?;
		tracing::debug!(path = %path.display(), ?config, "pipe.config.loaded");
		Ok(config)
	}

	/// Default wait applied by [`Endpoint::call`](crate::Endpoint::call).
	pub fn call_timeout(&self) -> Wait {
		match self.call_timeout_ms {
			Some(ms) => Wait::For(Duration::from_millis(ms)),
			None => Wait::Forever,
		}
	}

	/// Budget applied by [`Endpoint::drain`](crate::Endpoint::drain).
	pub fn drain_budget(&self) -> DrainBudget {
		DrainBudget {
			max_items: self.drain_max_items,
			duration: Duration::from_millis(self.drain_time_ms),
		}
	}

	/// Wait per attempt in [`Exclusive::lock_pumping`](crate::Exclusive::lock_pumping), at least 1 ms.
	pub fn lock_slice(&self) -> Duration {
		Duration::from_millis(self.lock_slice_ms.max(1))
	}
}
