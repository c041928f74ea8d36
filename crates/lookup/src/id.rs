use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOOKUP: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Stable identity token of a [`Lookup`](crate::Lookup).
///
/// Assigned once at construction from a process-wide counter and never reused,
/// so it stays a valid map key after the context itself has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupId(u64);

impl LookupId {
	pub(crate) fn next() -> Self {
		Self(NEXT_LOOKUP.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the raw token.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for LookupId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "lookup#{}", self.0)
	}
}

/// Handle returned by listener registration, used to unregister.
///
/// Unique across every observable in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
	/// Allocates a fresh id.
	pub fn next() -> Self {
		Self(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
	}
}
