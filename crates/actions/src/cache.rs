//! Identity-keyed weak manager cache.
//!
//! # Role
//!
//! Maps a context identity and survive flag to at most one live manager per
//! family. Slots hold managers weakly; a manager is kept alive by its context
//! (via [`Lookup::retain`](selkit_lookup::Lookup::retain)) and by the actions
//! bound to it, and evicts its own slot from `Drop`.
//!
//! # Invariants
//!
//! - Plain and survive managers live in separate tables and are never confused.
//! - Eviction removes a slot only if it still addresses the dropping manager; a
//!   slot already refilled for the same context is left alone.
//! - No manager is created, upgraded or dropped in a way that runs user code
//!   while the table lock is held.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use selkit_lookup::{LookupId, WeakLookup};

/// Cache key: context identity plus survive flag.
///
/// The identity token is fixed when the context is created, so the key keeps
/// hashing consistently after the context is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub context: LookupId,
	pub survive: bool,
}

impl CacheKey {
	pub const fn new(context: LookupId, survive: bool) -> Self {
		Self { context, survive }
	}
}

pub(crate) struct Slot<M> {
	pub(crate) context: WeakLookup,
	pub(crate) manager: Weak<M>,
}

/// The plain and survive tables of one manager family.
pub(crate) struct Tables<M> {
	plain: HashMap<LookupId, Slot<M>>,
	survive: HashMap<LookupId, Slot<M>>,
}

impl<M> Default for Tables<M> {
	fn default() -> Self {
		Self {
			plain: HashMap::new(),
			survive: HashMap::new(),
		}
	}
}

impl<M> Tables<M> {
	fn table(&self, survive: bool) -> &HashMap<LookupId, Slot<M>> {
		if survive { &self.survive } else { &self.plain }
	}

	fn table_mut(&mut self, survive: bool) -> &mut HashMap<LookupId, Slot<M>> {
		if survive { &mut self.survive } else { &mut self.plain }
	}

	/// Returns the live manager cached under `key`.
	pub(crate) fn get(&self, key: CacheKey) -> Option<Arc<M>> {
		self.table(key.survive).get(&key.context)?.manager.upgrade()
	}

	/// Installs `manager` under `key`, replacing any stale slot.
	pub(crate) fn insert(&mut self, key: CacheKey, context: WeakLookup, manager: &Arc<M>) {
		self.table_mut(key.survive).insert(
			key.context,
			Slot {
				context,
				manager: Arc::downgrade(manager),
			},
		);
	}

	/// Removes the slot under `key` if it still addresses `manager`.
	pub(crate) fn evict_if_current(&mut self, key: CacheKey, manager: *const M) -> bool {
		let table = self.table_mut(key.survive);
		let current = table.get(&key.context).is_some_and(|slot| std::ptr::eq(slot.manager.as_ptr(), manager));
		if current {
			table.remove(&key.context);
		}
		current
	}

	pub(crate) fn len(&self, survive: bool) -> usize {
		self.table(survive).len()
	}

	/// Number of slots whose context is still alive.
	pub(crate) fn live_contexts(&self) -> usize {
		self.plain.values().chain(self.survive.values()).filter(|slot| slot.context.is_alive()).count()
	}
}

/// Snapshot of cache occupancy, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
	pub context_plain: usize,
	pub context_survive: usize,
	pub keyed_plain: usize,
	pub keyed_survive: usize,
	/// Slots across all tables whose context is still alive.
	pub live_contexts: usize,
}

impl CacheStats {
	/// Total number of slots.
	pub fn total(&self) -> usize {
		self.context_plain + self.context_survive + self.keyed_plain + self.keyed_survive
	}
}

#[cfg(test)]
mod tests;
