use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlates one `call` with its reply.
///
/// Tokens are unique for the lifetime of the process, so a late reply to a
/// timed-out call can never be mistaken for the reply to a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallToken(u64);

/// Monotonic source of call tokens.
#[derive(Debug)]
struct CallClock {
	next: AtomicU64,
}

impl CallClock {
	const fn new() -> Self {
		Self { next: AtomicU64::new(0) }
	}

	/// Returns the next token, starting at 1.
	fn next(&self) -> CallToken {
		CallToken(self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
	}
}

static CLOCK: CallClock = CallClock::new();

impl CallToken {
	pub(crate) fn next() -> Self {
		CLOCK.next()
	}

	/// Returns the raw token value.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for CallToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "call#{}", self.0)
	}
}
