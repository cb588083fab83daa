use std::fmt;

/// Conventional names for the two cooperating threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	/// Owns presentation state and runs the frame loop.
	Render,
	/// Owns simulation and application state.
	Logic,
}

impl Role {
	/// Returns the name used for the role's thread and registry entry.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Render => "render",
			Self::Logic => "logic",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
