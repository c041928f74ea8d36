//! Weakly-held subscriber sets.
//!
//! Managers never own the actions bound to them. Each subscription keeps
//! `Weak` handles only; an action is "unsubscribed" by its owner dropping the
//! last strong handle, and the dead entry is swept on the next registration or
//! change pass.

use std::sync::{Arc, Weak};

/// Something a manager re-evaluates when its inputs change.
pub(crate) trait Refresh: Send + Sync {
	/// Recomputes the enabled state and notifies listeners on a transition.
	fn refresh(&self);
}

/// Weak set of [`Refresh`] members, identity-keyed.
#[derive(Default)]
pub(crate) struct Members {
	entries: Vec<Weak<dyn Refresh>>,
}

impl Members {
	/// Adds `member` unless the same instance is already present.
	pub(crate) fn insert(&mut self, member: Weak<dyn Refresh>) {
		if !self.entries.iter().any(|existing| existing.ptr_eq(&member)) {
			self.entries.push(member);
		}
	}

	/// Removes `member` and every dead entry.
	pub(crate) fn remove(&mut self, member: &Weak<dyn Refresh>) {
		self.entries.retain(|existing| !existing.ptr_eq(member) && existing.strong_count() > 0);
	}

	/// Drops dead entries. Returns how many were removed.
	pub(crate) fn sweep(&mut self) -> usize {
		let before = self.entries.len();
		self.entries.retain(|existing| existing.strong_count() > 0);
		before - self.entries.len()
	}

	/// Upgrades the live members.
	pub(crate) fn live(&self) -> Vec<Arc<dyn Refresh>> {
		self.entries.iter().filter_map(Weak::upgrade).collect()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}
