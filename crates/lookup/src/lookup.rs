//! Mutable instance container with per-type change notification.
//!
//! # Role
//!
//! [`Lookup`] is the observable selection context. It stores type-erased
//! instances in insertion order and answers "all instances of `T`" queries.
//! Every mutation computes which capability types actually changed and fires
//! only the listeners registered for those types.
//!
//! # Invariants
//!
//! - Listeners are invoked after the internal lock is released, so a listener
//!   may query or mutate the same lookup.
//! - The listeners of one mutation are collected before the first of them
//!   runs. A listener unsubscribed by an earlier one in the same batch still
//!   fires once for that mutation; listeners must tolerate a late call.
//! - A mutation that leaves the instance list of a type untouched (same
//!   instances by identity, same order) fires nothing for that type.
//! - Identity is the [`LookupId`] assigned at construction, never structure.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::id::{ListenerId, LookupId};
use crate::node::Node;
use crate::result::LookupResult;

/// Type-erased shared instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Callback fired when the instances of one type change.
pub type Listener = Arc<dyn Fn(&LookupEvent) + Send + Sync>;

/// Change notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupEvent {
	/// Context that changed.
	pub lookup: LookupId,
	/// Capability type whose instances changed.
	pub type_id: TypeId,
	/// Readable name of that type, for diagnostics.
	pub type_name: &'static str,
}

#[derive(Clone)]
pub(crate) struct Entry {
	type_id: TypeId,
	type_name: &'static str,
	instance: Instance,
}

impl Entry {
	fn new<T: Any + Send + Sync>(instance: Arc<T>) -> Self {
		Self {
			type_id: TypeId::of::<T>(),
			type_name: type_name::<T>(),
			instance,
		}
	}

	fn addr(&self) -> usize {
		Arc::as_ptr(&self.instance) as *const () as usize
	}

	fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
		if self.type_id != TypeId::of::<T>() {
			return None;
		}
		Arc::clone(&self.instance).downcast::<T>().ok()
	}
}

struct Registration {
	id: ListenerId,
	type_id: TypeId,
	type_name: &'static str,
	listener: Listener,
}

#[derive(Default)]
struct State {
	entries: Vec<Entry>,
	listeners: Vec<Registration>,
	/// Values kept alive for as long as the context lives.
	retained: Vec<Instance>,
}

struct Inner {
	id: LookupId,
	state: Mutex<State>,
}

/// Shared handle to an observable selection context.
///
/// Cloning yields another handle to the same context. Equality and hashing use
/// the context identity only.
#[derive(Clone)]
pub struct Lookup {
	inner: Arc<Inner>,
}

/// Non-owning handle to a [`Lookup`].
#[derive(Clone)]
pub struct WeakLookup {
	id: LookupId,
	inner: Weak<Inner>,
}

impl Default for Lookup {
	fn default() -> Self {
		Self::new()
	}
}

impl Lookup {
	/// Creates an empty context with a fresh identity.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				id: LookupId::next(),
				state: Mutex::new(State::default()),
			}),
		}
	}

	/// Creates a context holding the selected `nodes`, see [`Lookup::select`].
	pub fn from_nodes(nodes: impl IntoIterator<Item = Arc<Node>>) -> Self {
		let lookup = Self::new();
		lookup.select(nodes);
		lookup
	}

	/// Returns the identity token.
	pub fn id(&self) -> LookupId {
		self.inner.id
	}

	/// Creates a non-owning handle.
	pub fn downgrade(&self) -> WeakLookup {
		WeakLookup {
			id: self.inner.id,
			inner: Arc::downgrade(&self.inner),
		}
	}

	/// Adds one instance.
	pub fn add<T: Any + Send + Sync>(&self, instance: Arc<T>) {
		self.update(|entries| entries.push(Entry::new(instance)));
	}

	/// Removes `instance` (by identity). Returns whether it was present.
	pub fn remove<T: Any + Send + Sync>(&self, instance: &Arc<T>) -> bool {
		let addr = Arc::as_ptr(instance) as *const () as usize;
		let mut removed = false;
		self.update(|entries| {
			if let Some(pos) = entries.iter().position(|e| e.type_id == TypeId::of::<T>() && e.addr() == addr) {
				entries.remove(pos);
				removed = true;
			}
		});
		removed
	}

	/// Replaces every instance of `T` with `instances`, leaving other types alone.
	pub fn replace<T: Any + Send + Sync>(&self, instances: impl IntoIterator<Item = Arc<T>>) {
		let fresh: Vec<Entry> = instances.into_iter().map(Entry::new).collect();
		self.update(|entries| {
			entries.retain(|e| e.type_id != TypeId::of::<T>());
			entries.extend(fresh);
		});
	}

	/// Replaces the whole content with the given selection.
	///
	/// Each node is stored as an instance of [`Node`], followed by a snapshot of
	/// the capabilities in its own lookup. Later changes to a node's lookup are
	/// not mirrored; select again to pick them up.
	pub fn select(&self, nodes: impl IntoIterator<Item = Arc<Node>>) {
		let mut fresh = Vec::new();
		for node in nodes {
			let capabilities = node.lookup().entries();
			fresh.push(Entry::new(node));
			fresh.extend(capabilities);
		}
		self.update(|entries| *entries = fresh);
	}

	/// Removes every instance.
	pub fn clear(&self) {
		self.update(Vec::clear);
	}

	/// Returns the first instance of `T`.
	pub fn lookup<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
		let state = self.inner.state.lock();
		state.entries.iter().find_map(Entry::downcast::<T>)
	}

	/// Returns every instance of `T` in insertion order.
	pub fn lookup_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
		let state = self.inner.state.lock();
		state.entries.iter().filter_map(Entry::downcast::<T>).collect()
	}

	/// Returns whether at least one instance of `T` is present.
	pub fn contains<T: Any + Send + Sync>(&self) -> bool {
		let state = self.inner.state.lock();
		state.entries.iter().any(|e| e.type_id == TypeId::of::<T>())
	}

	/// Number of stored instances across all types.
	pub fn len(&self) -> usize {
		self.inner.state.lock().entries.len()
	}

	/// Returns true if the context holds no instances.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns a live result view over the instances of `T`.
	pub fn result<T: Any + Send + Sync>(&self) -> LookupResult<T> {
		LookupResult::new(self.downgrade())
	}

	/// Returns a detached snapshot holding everything except instances of `T`.
	pub fn excluding<T: Any + Send + Sync>(&self) -> Lookup {
		let rest: Vec<Entry> = {
			let state = self.inner.state.lock();
			state.entries.iter().filter(|e| e.type_id != TypeId::of::<T>()).cloned().collect()
		};
		let snapshot = Lookup::new();
		snapshot.inner.state.lock().entries = rest;
		snapshot
	}

	/// Keeps `value` alive until this context is dropped.
	pub fn retain(&self, value: Instance) {
		self.inner.state.lock().retained.push(value);
	}

	/// Number of registered change listeners.
	pub fn listener_count(&self) -> usize {
		self.inner.state.lock().listeners.len()
	}

	pub(crate) fn subscribe(&self, type_id: TypeId, type_name: &'static str, listener: Listener) -> ListenerId {
		let id = ListenerId::next();
		self.inner.state.lock().listeners.push(Registration {
			id,
			type_id,
			type_name,
			listener,
		});
		id
	}

	pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
		let mut state = self.inner.state.lock();
		let before = state.listeners.len();
		state.listeners.retain(|r| r.id != id);
		state.listeners.len() != before
	}

	pub(crate) fn entries(&self) -> Vec<Entry> {
		self.inner.state.lock().entries.clone()
	}

	fn update(&self, edit: impl FnOnce(&mut Vec<Entry>)) {
		// Instances removed by `edit` are released here, after the lock.
		let retired: Vec<Entry>;
		let fired: Vec<(LookupEvent, Listener)> = {
			let mut state = self.inner.state.lock();
			retired = state.entries.clone();
			let before = fingerprint(&state.entries);
			edit(&mut state.entries);
			let after = fingerprint(&state.entries);

			let mut changed: Vec<(TypeId, &'static str)> = Vec::new();
			for (type_id, (name, addrs)) in &before {
				if after.get(type_id).map(|(_, a)| a) != Some(addrs) {
					changed.push((*type_id, *name));
				}
			}
			for (type_id, (name, _)) in &after {
				if !before.contains_key(type_id) {
					changed.push((*type_id, *name));
				}
			}
			if changed.is_empty() {
				return;
			}

			state
				.listeners
				.iter()
				.filter(|r| changed.iter().any(|(t, _)| *t == r.type_id))
				.map(|r| {
					let event = LookupEvent {
						lookup: self.inner.id,
						type_id: r.type_id,
						type_name: r.type_name,
					};
					(event, Arc::clone(&r.listener))
				})
				.collect()
		};

		drop(retired);
		for (event, listener) in fired {
			trace!(lookup = %event.lookup, ty = event.type_name, "lookup changed");
			listener(&event);
		}
	}
}

type Fingerprint = HashMap<TypeId, (&'static str, Vec<usize>)>;

fn fingerprint(entries: &[Entry]) -> Fingerprint {
	let mut map: Fingerprint = HashMap::new();
	for entry in entries {
		map.entry(entry.type_id)
			.or_insert_with(|| (entry.type_name, Vec::new()))
			.1
			.push(entry.addr());
	}
	map
}

impl PartialEq for Lookup {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for Lookup {}

impl Hash for Lookup {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.id.hash(state);
	}
}

impl fmt::Debug for Lookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		let types: Vec<&'static str> = state.entries.iter().map(|e| e.type_name).collect();
		f.debug_struct("Lookup").field("id", &self.inner.id).field("instances", &types).finish()
	}
}

impl WeakLookup {
	/// Returns the identity token of the referenced context.
	pub fn id(&self) -> LookupId {
		self.id
	}

	/// Upgrades to a strong handle if the context is still alive.
	pub fn upgrade(&self) -> Option<Lookup> {
		self.inner.upgrade().map(|inner| Lookup { inner })
	}

	/// Returns true while the context is alive.
	pub fn is_alive(&self) -> bool {
		self.inner.strong_count() > 0
	}

	/// Returns a live result view without keeping the context alive.
	pub fn result<T: Any + Send + Sync>(&self) -> LookupResult<T> {
		LookupResult::new(self.clone())
	}
}

impl fmt::Debug for WeakLookup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakLookup").field("id", &self.id).field("alive", &self.is_alive()).finish()
	}
}
