//! Per-context enablement and dispatch.
//!
//! # Role
//!
//! A [`ContextManager`] serves every context action bound to one context. Per
//! capability type it keeps a live result view and a weak set of the actions
//! interested in that type. It evaluates quantifiers against the view, invokes
//! performers, and on change notifications re-evaluates the subscribed actions.
//!
//! # Invariants
//!
//! - A subscription exists for a type exactly while its member set is non-empty;
//!   its listeners are detached with the last member.
//! - A subscription listens to the capability view and to the selected nodes,
//!   since population quantifiers depend on both.
//! - The manager state lock is never held while calling into result views,
//!   performers or members, and nothing that can run user `Drop` code is
//!   released under it.
//! - Survive managers hand out [`NeverEmptyResult`] views; plain managers hand
//!   out the context's own views.

mod survive;

use std::any::{Any, TypeId, type_name};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use selkit_lookup::{Listener, ListenerId, Lookup, LookupEvent, LookupId, Node, Observe, ResultView, WeakLookup};
use tracing::{debug, trace, warn};

use self::survive::NeverEmptyResult;
use crate::action::{ActionEvent, addr_of};
use crate::cache::CacheKey;
use crate::error::PerformError;
use crate::hub::HubShared;
use crate::members::{Members, Refresh};
use crate::performer::Performer;
use crate::quantifier::Quantifier;

/// Typed result view stored behind `dyn Any`.
struct TypedView<T> {
	view: Arc<dyn ResultView<T>>,
}

type Registration = (Arc<dyn Observe>, ListenerId);

struct Subscription {
	registrations: Vec<Registration>,
	members: Members,
}

impl Subscription {
	fn detach(self) {
		release(self.registrations);
	}
}

fn release(registrations: Vec<Registration>) {
	for (observer, id) in registrations {
		observer.unsubscribe(id);
	}
}

#[derive(Default)]
struct State {
	views: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
	subscriptions: HashMap<TypeId, Subscription>,
}

impl State {
	/// Drops dead members and takes out emptied subscriptions.
	fn sweep(&mut self) -> (usize, Vec<Subscription>) {
		let removed = self.subscriptions.values_mut().map(|sub| sub.members.sweep()).sum();
		let empty: Vec<TypeId> = self
			.subscriptions
			.iter()
			.filter(|(_, sub)| sub.members.is_empty())
			.map(|(type_id, _)| *type_id)
			.collect();
		let detached = empty.iter().filter_map(|type_id| self.subscriptions.remove(type_id)).collect();
		(removed, detached)
	}
}

/// Enablement engine for one context and survive flag.
pub struct ContextManager {
	key: CacheKey,
	context: WeakLookup,
	hub: Arc<HubShared>,
	state: Mutex<State>,
}

impl ContextManager {
	pub(crate) fn new(key: CacheKey, context: WeakLookup, hub: Arc<HubShared>) -> Self {
		Self {
			key,
			context,
			hub,
			state: Mutex::new(State::default()),
		}
	}

	/// Identity of the served context.
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

	/// The view of capability `T`, created on first use and kept for the
	/// manager's lifetime.
	pub fn result<T: Any + Send + Sync>(&self) -> Arc<dyn ResultView<T>> {
		let type_id = TypeId::of::<T>();
		let existing = self.state.lock().views.get(&type_id).cloned();
		if let Some(typed) = existing.and_then(|view| view.downcast::<TypedView<T>>().ok()) {
			return Arc::clone(&typed.view);
		}

		let fresh: Arc<dyn ResultView<T>> = if self.key.survive {
			Arc::new(NeverEmptyResult::new(self.context.result::<T>(), self.context.result::<Node>()))
		} else {
			Arc::new(self.context.result::<T>())
		};
		let existing = {
			let mut state = self.state.lock();
			match state.views.entry(type_id) {
				Entry::Occupied(occupied) => Some(Arc::clone(occupied.get())),
				Entry::Vacant(vacant) => {
					vacant.insert(Arc::new(TypedView {
						view: Arc::clone(&fresh),
					}));
					None
				}
			}
		};
		existing
			.and_then(|view| view.downcast::<TypedView<T>>().ok())
			.map_or(fresh, |typed| Arc::clone(&typed.view))
	}

	/// Current instances of `T`, de-duplicated by identity.
	fn matched<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
		let mut seen = HashSet::new();
		self.result::<T>()
			.items()
			.into_iter()
			.filter(|instance| seen.insert(addr_of(instance)))
			.collect()
	}

	/// Evaluates `quantifier` for capability `T`, then the performer's own predicate.
	pub fn is_enabled<T: Any + Send + Sync>(&self, quantifier: Quantifier, performer: &dyn Performer<T>) -> bool {
		let matched = self.matched::<T>();
		let population = if quantifier.needs_population() {
			self.result::<Node>().items()
		} else {
			Vec::new()
		};
		quantifier.evaluate(matched.len(), &population, |node| node.has::<T>()) && performer.enabled(&matched)
	}

	/// Invokes `performer` on the current instances of `T`.
	///
	/// The performer sees the rest of the context as a detached snapshot without
	/// any instance of `T`. Its error is returned unchanged.
	pub fn perform<T: Any + Send + Sync>(
		&self,
		event: &ActionEvent,
		performer: &dyn Performer<T>,
	) -> Result<(), PerformError> {
		let matched = self.matched::<T>();
		let residual = self.context.upgrade().map(|context| context.excluding::<T>()).unwrap_or_default();
		performer.invoke(event, &matched, &residual)
	}

	/// Adds `member` to the subscription for `T`, subscribing to the view first if needed.
	pub(crate) fn register<T: Any + Send + Sync>(self: &Arc<Self>, member: Weak<dyn Refresh>) {
		let type_id = TypeId::of::<T>();
		let (pending, detached) = {
			let mut state = self.state.lock();
			let (_, detached) = state.sweep();
			let pending = match state.subscriptions.get_mut(&type_id) {
				Some(subscription) => {
					subscription.members.insert(member);
					None
				}
				None => Some(member),
			};
			(pending, detached)
		};
		detached.into_iter().for_each(Subscription::detach);

		let Some(member) = pending else {
			return;
		};
		let view: Arc<dyn Observe> = self.result::<T>();
		let mut observers = vec![view];
		if !self.key.survive && type_id != TypeId::of::<Node>() {
			observers.push(Arc::new(self.context.result::<Node>()));
		}
		let listener = self.change_listener(type_id);
		let registrations: Vec<Registration> = observers
			.into_iter()
			.map(|observer| {
				let id = observer.subscribe(Arc::clone(&listener));
				(observer, id)
			})
			.collect();

		let raced = {
			let mut state = self.state.lock();
			match state.subscriptions.entry(type_id) {
				Entry::Occupied(mut occupied) => {
					occupied.get_mut().members.insert(member);
					Some(registrations)
				}
				Entry::Vacant(vacant) => {
					let mut members = Members::default();
					members.insert(member);
					vacant.insert(Subscription { registrations, members });
					None
				}
			}
		};
		if let Some(registrations) = raced {
			release(registrations);
		}
		trace!(context = %self.key.context, ty = type_name::<T>(), "subscribed");
	}

	/// Removes `member` from the subscription for `T`, detaching it when emptied.
	pub(crate) fn unregister<T: Any + Send + Sync>(&self, member: &Weak<dyn Refresh>) {
		let type_id = TypeId::of::<T>();
		let detached = {
			let mut state = self.state.lock();
			let emptied = state.subscriptions.get_mut(&type_id).is_some_and(|subscription| {
				subscription.members.remove(member);
				subscription.members.is_empty()
			});
			if emptied { state.subscriptions.remove(&type_id) } else { None }
		};
		if let Some(subscription) = detached {
			subscription.detach();
			trace!(context = %self.key.context, ty = type_name::<T>(), "unsubscribed");
		}
	}

	/// Drops dead members and empty subscriptions. Returns the number of dead
	/// members removed.
	pub fn sweep(&self) -> usize {
		let (removed, detached) = self.state.lock().sweep();
		detached.into_iter().for_each(Subscription::detach);
		removed
	}

	/// Number of capability types with at least one member.
	pub fn subscription_count(&self) -> usize {
		self.state.lock().subscriptions.len()
	}

	/// Number of members registered for `T`, dead ones included until swept.
	pub fn member_count<T: Any + Send + Sync>(&self) -> usize {
		self.state.lock().subscriptions.get(&TypeId::of::<T>()).map_or(0, |sub| sub.members.len())
	}

	fn change_listener(self: &Arc<Self>, type_id: TypeId) -> Listener {
		let hub = Arc::clone(&self.hub);
		let manager = self.key;
		let weak = Arc::downgrade(self);
		Arc::new(move |event: &LookupEvent| {
			trace!(context = %manager.context, ty = event.type_name, "change queued");
			let weak = weak.clone();
			hub.coordinator.dispatch(move || {
				if let Some(manager) = weak.upgrade() {
					manager.refresh(type_id);
				}
			});
		})
	}

	/// Recomputes every live member subscribed to `type_id`.
	fn refresh(&self, type_id: TypeId) {
		let started = Instant::now();
		let (members, detached) = {
			let mut state = self.state.lock();
			let (_, detached) = state.sweep();
			let members = state.subscriptions.get(&type_id).map(|sub| sub.members.live()).unwrap_or_default();
			(members, detached)
		};
		detached.into_iter().for_each(Subscription::detach);

		for member in &members {
			member.refresh();
		}

		let elapsed = started.elapsed();
		trace!(context = %self.key.context, members = members.len(), ?elapsed, "refresh pass");
		let threshold = self.hub.config.slow_refresh_threshold();
		if elapsed >= threshold {
			warn!(
				context = %self.key.context,
				survive = self.key.survive,
				members = members.len(),
				?elapsed,
				?threshold,
				"slow enablement refresh"
			);
		}
	}
}

impl Drop for ContextManager {
	fn drop(&mut self) {
		let evicted = self.hub.cache.lock().context.evict_if_current(self.key, self as *const Self);
		if evicted {
			debug!(context = %self.key.context, survive = self.key.survive, "context manager evicted");
		}
		let subscriptions: Vec<Subscription> = self.state.get_mut().subscriptions.drain().map(|(_, sub)| sub).collect();
		subscriptions.into_iter().for_each(Subscription::detach);
	}
}

impl fmt::Debug for ContextManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ContextManager")
			.field("context", &self.key.context)
			.field("survive", &self.key.survive)
			.field("subscriptions", &self.subscription_count())
			.finish()
	}
}

#[cfg(test)]
mod tests;
