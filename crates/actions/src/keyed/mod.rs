//! Key-addressed actions resolved against an [`ActionMap`] in the context.
//!
//! # Role
//!
//! A [`KeyedGlobalManager`] serves every callback action bound to one context.
//! It resolves keys against the first [`ActionMap`] published in the context,
//! keeps a weak member set per key, and listens both to map changes and to the
//! enabled state of each key's current delegate.
//!
//! # Invariants
//!
//! - Plain managers attach the map listener exactly while some key has
//!   members. Survive managers keep it attached for their whole lifetime and
//!   merge every published map as it is published, read or not.
//! - Each key with members listens to its current delegate only; a delegate
//!   replaced by a map change is unsubscribed before the members refresh.
//! - Survive managers never forget a binding because a newer map omits it;
//!   they merge each new map over the previous merged one.
//! - Listener registrations on delegate actions are removed on the
//!   coordination thread, whichever thread releases them.

mod action;

pub use action::KeyedBoundAction;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use selkit_lookup::{Listener, ListenerId, Lookup, LookupEvent, LookupId, LookupResult, Observe, ResultView, WeakLookup};
use tracing::{debug, trace, warn};

use crate::action::{Action, ActionEvent, ActionMap, ChangeListener, EnabledChange, addr_of};
use crate::cache::CacheKey;
use crate::error::PerformError;
use crate::hub::HubShared;
use crate::members::{Members, Refresh};

type Binding = (Arc<dyn Action>, ListenerId);

#[derive(Default)]
struct KeySubscription {
	members: Members,
	delegate: Option<Binding>,
}

#[derive(Default)]
struct State {
	map_listener: Option<ListenerId>,
	/// Last merged map; survive managers only.
	merged: ActionMap,
	keys: HashMap<String, KeySubscription>,
}

/// Listener registrations taken out under the lock, released after it.
#[derive(Default)]
struct Detached {
	delegates: Vec<Binding>,
	map_listener: Option<ListenerId>,
}

impl State {
	/// Drops dead members and emptied keys. The map listener is taken out with
	/// the last key unless `keep_map_listener` is set.
	fn sweep(&mut self, keep_map_listener: bool) -> (usize, Detached) {
		let removed = self.keys.values_mut().map(|sub| sub.members.sweep()).sum();
		let empty: Vec<String> = self
			.keys
			.iter()
			.filter(|(_, sub)| sub.members.is_empty())
			.map(|(key, _)| key.clone())
			.collect();
		let mut detached = Detached::default();
		for key in empty {
			if let Some(binding) = self.keys.remove(&key).and_then(|sub| sub.delegate) {
				detached.delegates.push(binding);
			}
		}
		if self.keys.is_empty() && !keep_map_listener {
			detached.map_listener = self.map_listener.take();
		}
		(removed, detached)
	}
}

/// Key-resolution engine for one context and survive flag.
pub struct KeyedGlobalManager {
	key: CacheKey,
	context: WeakLookup,
	maps: LookupResult<ActionMap>,
	hub: Arc<HubShared>,
	state: Mutex<State>,
}

impl KeyedGlobalManager {
	pub(crate) fn new(key: CacheKey, context: WeakLookup, hub: Arc<HubShared>) -> Self {
		Self {
			key,
			maps: context.result::<ActionMap>(),
			context,
			hub,
			state: Mutex::new(State::default()),
		}
	}

	pub fn context_id(&self) -> LookupId {
		self.key.context
	}

	/// Returns the served context if it is still alive.
	pub fn context(&self) -> Option<Lookup> {
		self.context.upgrade()
	}

	pub fn is_survive(&self) -> bool {
		self.key.survive
	}

	pub(crate) fn hub(&self) -> &Arc<HubShared> {
		&self.hub
	}

	/// Starts the lifetime map listener of a survive manager and absorbs the
	/// map currently published. Plain managers attach lazily instead.
	pub(crate) fn attach(self: &Arc<Self>) {
		if !self.key.survive {
			return;
		}
		let id = self.maps.subscribe(self.map_listener());
		let displaced = self.state.lock().map_listener.replace(id);
		if let Some(displaced) = displaced {
			self.maps.unsubscribe(displaced);
		}
		self.absorb();
	}

	/// Folds the published map into the merged one. No-op for plain managers.
	fn absorb(&self) {
		if self.key.survive {
			drop(self.current_map());
		}
	}

	/// The map keys currently resolve against.
	///
	/// Plain managers return the first map in the context. Survive managers
	/// return that map merged over the previous result, or the previous result
	/// when the context holds no map.
	pub fn current_map(&self) -> ActionMap {
		let live = self.maps.items().into_iter().next();
		if !self.key.survive {
			return live.map(|map| (*map).clone()).unwrap_or_default();
		}
		let mut state = self.state.lock();
		let merged = match live {
			Some(map) => map.merged_over(&state.merged),
			None => return state.merged.clone(),
		};
		let previous = mem::replace(&mut state.merged, merged.clone());
		drop(state);
		drop(previous);
		merged
	}

	/// Resolves `key` to its current delegate.
	pub fn delegate(&self, key: &str) -> Option<Arc<dyn Action>> {
		self.current_map().get(key).cloned()
	}

	/// Returns whether `key` resolves to an enabled delegate.
	pub fn is_enabled(&self, key: &str) -> bool {
		self.delegate(key).is_some_and(|delegate| delegate.is_enabled())
	}

	/// Performs the delegate bound to `key`. An unbound key does nothing.
	pub fn perform(&self, key: &str, event: &ActionEvent) -> Result<(), PerformError> {
		match self.delegate(key) {
			Some(delegate) => delegate.perform(event),
			None => {
				debug!(context = %self.key.context, key, "perform on unbound key ignored");
				Ok(())
			}
		}
	}

	/// Adds `member` under `key`, attaching the map and delegate listeners as needed.
	pub(crate) fn register(self: &Arc<Self>, key: &str, member: Weak<dyn Refresh>) {
		let (new_key, needs_map, detached) = {
			let mut state = self.state.lock();
			let new_key = match state.keys.entry(key.to_owned()) {
				Entry::Occupied(mut occupied) => {
					occupied.get_mut().members.insert(member);
					false
				}
				Entry::Vacant(vacant) => {
					vacant.insert(KeySubscription::default()).members.insert(member);
					true
				}
			};
			let (_, detached) = state.sweep(self.key.survive);
			(new_key, state.map_listener.is_none(), detached)
		};
		self.release(detached);

		if needs_map {
			let id = self.maps.subscribe(self.map_listener());
			let raced = {
				let mut state = self.state.lock();
				if state.map_listener.is_none() {
					state.map_listener = Some(id);
					false
				} else {
					true
				}
			};
			if raced {
				self.maps.unsubscribe(id);
			}
		}
		if new_key && let Some(delegate) = self.delegate(key) {
			self.bind(key, delegate);
		}
	}

	/// Removes `member` from `key`, detaching listeners the key no longer needs.
	pub(crate) fn unregister(&self, key: &str, member: &Weak<dyn Refresh>) {
		let detached = {
			let mut state = self.state.lock();
			if let Some(sub) = state.keys.get_mut(key) {
				sub.members.remove(member);
			}
			state.sweep(self.key.survive).1
		};
		self.release(detached);
	}

	/// Drops dead members and keys without members. Returns the number of
	/// dead members removed.
	pub fn sweep(&self) -> usize {
		let (removed, detached) = self.state.lock().sweep(self.key.survive);
		self.release(detached);
		removed
	}

	/// Number of keys with at least one member.
	pub fn key_count(&self) -> usize {
		self.state.lock().keys.len()
	}

	/// Number of members registered under `key`, dead ones included until swept.
	pub fn member_count(&self, key: &str) -> usize {
		self.state.lock().keys.get(key).map_or(0, |sub| sub.members.len())
	}

	fn release(&self, detached: Detached) {
		if let Some(id) = detached.map_listener {
			self.maps.unsubscribe(id);
		}
		if detached.delegates.is_empty() {
			return;
		}
		let delegates = detached.delegates;
		self.hub.coordinator.dispatch(move || {
			for (delegate, id) in delegates {
				delegate.remove_listener(id);
			}
		});
	}

	/// Starts listening to `delegate` on behalf of `key`.
	fn bind(self: &Arc<Self>, key: &str, delegate: Arc<dyn Action>) {
		let id = delegate.add_listener(self.delegate_listener(key));
		let displaced = {
			let mut state = self.state.lock();
			match state.keys.get_mut(key) {
				Some(sub) => sub.delegate.replace((Arc::clone(&delegate), id)),
				None => Some((Arc::clone(&delegate), id)),
			}
		};
		if let Some((previous, id)) = displaced {
			previous.remove_listener(id);
		}
	}

	fn map_listener(self: &Arc<Self>) -> Listener {
		let hub = Arc::clone(&self.hub);
		let weak = Arc::downgrade(self);
		Arc::new(move |event: &LookupEvent| {
			// Merge now: a later map may replace this one before the queue drains.
			if let Some(manager) = weak.upgrade() {
				manager.absorb();
			}
			trace!(context = %event.lookup, "action map change queued");
			let weak = weak.clone();
			hub.coordinator.dispatch(move || {
				if let Some(manager) = weak.upgrade() {
					manager.refresh_all();
				}
			});
		})
	}

	fn delegate_listener(self: &Arc<Self>, key: &str) -> ChangeListener {
		let hub = Arc::clone(&self.hub);
		let weak = Arc::downgrade(self);
		let key = key.to_owned();
		Arc::new(move |_: &EnabledChange| {
			let weak = weak.clone();
			let key = key.clone();
			hub.coordinator.dispatch(move || {
				if let Some(manager) = weak.upgrade() {
					manager.refresh_key(&key);
				}
			});
		})
	}

	/// Rebinds every key to the current map, then refreshes all members.
	fn refresh_all(self: &Arc<Self>) {
		let started = Instant::now();
		let map = self.current_map();
		let (rebinds, members, detached) = {
			let mut state = self.state.lock();
			let (_, detached) = state.sweep(self.key.survive);
			let mut rebinds = Vec::new();
			let mut members = Vec::new();
			for (key, sub) in &mut state.keys {
				let next = map.get(key);
				let unchanged = match (&sub.delegate, next) {
					(Some((current, _)), Some(next)) => addr_of(current) == addr_of(next),
					(None, None) => true,
					_ => false,
				};
				if !unchanged {
					rebinds.push((key.clone(), sub.delegate.take(), next.cloned()));
				}
				members.extend(sub.members.live());
			}
			(rebinds, members, detached)
		};
		self.release(detached);
		if rebinds.is_empty() && members.is_empty() {
			return;
		}

		for (key, previous, next) in rebinds {
			if let Some((previous, id)) = previous {
				previous.remove_listener(id);
			}
			if let Some(next) = next {
				self.bind(&key, next);
			}
		}
		self.run(members, started);
	}

	fn refresh_key(&self, key: &str) {
		let started = Instant::now();
		let members = self.state.lock().keys.get(key).map(|sub| sub.members.live()).unwrap_or_default();
		self.run(members, started);
	}

	fn run(&self, members: Vec<Arc<dyn Refresh>>, started: Instant) {
		for member in &members {
			member.refresh();
		}
		let elapsed = started.elapsed();
		trace!(context = %self.key.context, members = members.len(), ?elapsed, "keyed refresh pass");
		let threshold = self.hub.config.slow_refresh_threshold();
		if elapsed >= threshold {
			warn!(
				context = %self.key.context,
				survive = self.key.survive,
				members = members.len(),
				?elapsed,
				?threshold,
				"slow keyed refresh"
			);
		}
	}
}

impl Drop for KeyedGlobalManager {
	fn drop(&mut self) {
		let evicted = self.hub.cache.lock().keyed.evict_if_current(self.key, self as *const Self);
		if evicted {
			debug!(context = %self.key.context, survive = self.key.survive, "keyed manager evicted");
		}
		let state = self.state.get_mut();
		let detached = Detached {
			delegates: state.keys.drain().filter_map(|(_, sub)| sub.delegate).collect(),
			map_listener: state.map_listener.take(),
		};
		self.release(detached);
	}
}

impl fmt::Debug for KeyedGlobalManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeyedGlobalManager")
			.field("context", &self.key.context)
			.field("survive", &self.key.survive)
			.field("keys", &self.key_count())
			.finish()
	}
}
