use std::sync::Arc;

use pretty_assertions::assert_eq;
use selkit_lookup::Lookup;

use super::*;

struct Dummy;

#[test]
fn plain_and_survive_are_separate() {
	let context = Lookup::new();
	let mut tables = Tables::<Dummy>::default();
	let plain = Arc::new(Dummy);
	let survive = Arc::new(Dummy);

	tables.insert(CacheKey::new(context.id(), false), context.downgrade(), &plain);
	tables.insert(CacheKey::new(context.id(), true), context.downgrade(), &survive);

	let found = tables.get(CacheKey::new(context.id(), false)).unwrap();
	assert!(Arc::ptr_eq(&found, &plain));
	let found = tables.get(CacheKey::new(context.id(), true)).unwrap();
	assert!(Arc::ptr_eq(&found, &survive));
	assert_eq!((tables.len(false), tables.len(true)), (1, 1));
}

#[test]
fn dead_manager_is_not_returned() {
	let context = Lookup::new();
	let key = CacheKey::new(context.id(), false);
	let mut tables = Tables::<Dummy>::default();
	let manager = Arc::new(Dummy);
	tables.insert(key, context.downgrade(), &manager);

	drop(manager);

	assert!(tables.get(key).is_none());
	assert_eq!(tables.len(false), 1);
}

#[test]
fn stale_eviction_keeps_newer_slot() {
	let context = Lookup::new();
	let key = CacheKey::new(context.id(), false);
	let mut tables = Tables::<Dummy>::default();

	let old = Arc::new(Dummy);
	tables.insert(key, context.downgrade(), &old);
	let old_ptr = Arc::as_ptr(&old);
	let fresh = Arc::new(Dummy);
	tables.insert(key, context.downgrade(), &fresh);

	assert!(!tables.evict_if_current(key, old_ptr));
	assert!(Arc::ptr_eq(&tables.get(key).unwrap(), &fresh));

	assert!(tables.evict_if_current(key, Arc::as_ptr(&fresh)));
	assert_eq!(tables.len(false), 0);
	drop(old);
}

#[test]
fn live_contexts_counts_alive_slots() {
	let alive = Lookup::new();
	let gone = Lookup::new();
	let mut tables = Tables::<Dummy>::default();
	let a = Arc::new(Dummy);
	let b = Arc::new(Dummy);
	tables.insert(CacheKey::new(alive.id(), false), alive.downgrade(), &a);
	tables.insert(CacheKey::new(gone.id(), true), gone.downgrade(), &b);

	drop(gone);

	assert_eq!(tables.live_contexts(), 1);
}

#[test]
fn stats_total() {
	let stats = CacheStats {
		context_plain: 2,
		context_survive: 1,
		keyed_plain: 1,
		keyed_survive: 0,
		live_contexts: 3,
	};
	assert_eq!(stats.total(), 4);
}
