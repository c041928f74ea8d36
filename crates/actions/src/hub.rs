//! Manager cache owner and action factories.
//!
//! # Role
//!
//! [`ActionHub`] owns the identity cache shared by both manager families, the
//! coordinator that confines enablement work to one thread, and the engine
//! configuration. Bound actions are created through its builders.
//!
//! # Invariants
//!
//! - One cache lock per hub covers both families; it is held only for table
//!   access and never while a manager, context or user callback could run.
//! - `find_manager` returns the same instance for the same context and survive
//!   flag for as long as either is alive.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::Mutex;
use selkit_lookup::Lookup;
use tracing::debug;

use crate::action::{Action, ActionValues};
use crate::bound::BoundAction;
use crate::cache::{CacheKey, CacheStats, Tables};
use crate::config::EngineConfig;
use crate::coordinator::Coordinator;
use crate::keyed::{KeyedBoundAction, KeyedGlobalManager};
use crate::manager::ContextManager;
use crate::performer::Performer;
use crate::quantifier::Quantifier;

/// Both manager families' tables.
#[derive(Default)]
pub(crate) struct CacheTables {
	pub(crate) context: Tables<ContextManager>,
	pub(crate) keyed: Tables<KeyedGlobalManager>,
}

/// State shared by a hub and every manager it creates.
pub(crate) struct HubShared {
	pub(crate) cache: Mutex<CacheTables>,
	pub(crate) coordinator: Coordinator,
	pub(crate) config: EngineConfig,
}

/// Entry point of the engine.
///
/// Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct ActionHub {
	shared: Arc<HubShared>,
}

static GLOBAL: OnceLock<ActionHub> = OnceLock::new();

impl ActionHub {
	/// Creates a hub whose coordination thread is the calling thread.
	pub fn new(config: EngineConfig) -> Self {
		Self {
			shared: Arc::new(HubShared {
				cache: Mutex::new(CacheTables::default()),
				coordinator: Coordinator::for_current_thread(),
				config,
			}),
		}
	}

	pub(crate) fn from_shared(shared: Arc<HubShared>) -> Self {
		Self { shared }
	}

	/// Installs the process-wide hub, owned by the calling thread.
	///
	/// Call this from the UI thread during startup. Returns false, leaving the
	/// installed hub untouched, if the global hub already exists.
	pub fn init_global(config: EngineConfig) -> bool {
		let installed = GLOBAL.set(ActionHub::new(config)).is_ok();
		if installed {
			debug!(owner = ?thread::current().id(), "global action hub installed");
		}
		installed
	}

	/// The process-wide hub.
	///
	/// Without a prior [`ActionHub::init_global`], the hub is created with the
	/// default configuration and its coordinator is owned by whichever thread
	/// calls this first. Every later owner-thread operation from another thread
	/// then fails its assertion, so a worker thread must never be the first to
	/// touch it.
	pub fn global() -> &'static ActionHub {
		GLOBAL.get_or_init(|| ActionHub::new(EngineConfig::default()))
	}

	pub fn coordinator(&self) -> &Coordinator {
		&self.shared.coordinator
	}

	pub fn config(&self) -> &EngineConfig {
		&self.shared.config
	}

	/// Returns the manager for `context`, creating it on first use.
	///
	/// The context keeps a created manager alive until it is dropped itself.
	pub fn find_manager(&self, context: &Lookup, survive: bool) -> Arc<ContextManager> {
		let key = CacheKey::new(context.id(), survive);
		let (manager, created) = {
			let mut cache = self.shared.cache.lock();
			match cache.context.get(key) {
				Some(manager) => (manager, false),
				None => {
					let manager = Arc::new(ContextManager::new(key, context.downgrade(), Arc::clone(&self.shared)));
					cache.context.insert(key, context.downgrade(), &manager);
					(manager, true)
				}
			}
		};
		if created {
			debug!(context = %key.context, survive, "context manager created");
			context.retain(Arc::clone(&manager) as Arc<dyn Any + Send + Sync>);
		}
		manager
	}

	/// Returns the keyed manager for `context`, creating it on first use.
	pub fn find_keyed_manager(&self, context: &Lookup, survive: bool) -> Arc<KeyedGlobalManager> {
		let key = CacheKey::new(context.id(), survive);
		let (manager, created) = {
			let mut cache = self.shared.cache.lock();
			match cache.keyed.get(key) {
				Some(manager) => (manager, false),
				None => {
					let manager = Arc::new(KeyedGlobalManager::new(key, context.downgrade(), Arc::clone(&self.shared)));
					cache.keyed.insert(key, context.downgrade(), &manager);
					(manager, true)
				}
			}
		};
		if created {
			debug!(context = %key.context, survive, "keyed manager created");
			context.retain(Arc::clone(&manager) as Arc<dyn Any + Send + Sync>);
			manager.attach();
		}
		manager
	}

	/// Current cache occupancy.
	pub fn cached_managers(&self) -> CacheStats {
		let cache = self.shared.cache.lock();
		CacheStats {
			context_plain: cache.context.len(false),
			context_survive: cache.context.len(true),
			keyed_plain: cache.keyed.len(false),
			keyed_survive: cache.keyed.len(true),
			live_contexts: cache.context.live_contexts() + cache.keyed.live_contexts(),
		}
	}

	/// Runs change notifications queued from other threads.
	pub fn run_pending(&self) -> usize {
		self.shared.coordinator.run_pending()
	}

	/// Starts a context action over capability `T`.
	pub fn context_action<T: Any + Send + Sync>(
		&self,
		context: &Lookup,
		performer: Arc<dyn Performer<T>>,
	) -> ContextActionBuilder<'_, T> {
		ContextActionBuilder {
			hub: self,
			context: context.clone(),
			performer,
			quantifier: Quantifier::default(),
			survive: false,
			values: ActionValues::default(),
		}
	}

	/// Starts a callback action resolving `key` against the context's action map.
	pub fn callback_action(&self, context: &Lookup, key: impl Into<String>) -> CallbackActionBuilder<'_> {
		CallbackActionBuilder {
			hub: self,
			context: context.clone(),
			key: key.into(),
			fallback: None,
			survive: false,
			values: ActionValues::default(),
		}
	}
}

impl fmt::Debug for ActionHub {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActionHub")
			.field("coordinator", &self.shared.coordinator)
			.field("config", &self.shared.config)
			.finish()
	}
}

/// Builder returned by [`ActionHub::context_action`].
#[must_use]
pub struct ContextActionBuilder<'a, T> {
	hub: &'a ActionHub,
	context: Lookup,
	performer: Arc<dyn Performer<T>>,
	quantifier: Quantifier,
	survive: bool,
	values: ActionValues,
}

impl<'a, T: Any + Send + Sync> ContextActionBuilder<'a, T> {
	pub fn quantifier(mut self, quantifier: Quantifier) -> Self {
		self.quantifier = quantifier;
		self
	}

	/// Keeps the last non-empty selection across transient empty states.
	pub fn survive(mut self, survive: bool) -> Self {
		self.survive = survive;
		self
	}

	pub fn values(mut self, values: ActionValues) -> Self {
		self.values = values;
		self
	}

	pub fn display_name(mut self, name: impl Into<String>) -> Self {
		self.values.display_name = Some(name.into());
		self
	}

	pub fn icon_base(mut self, icon_base: impl Into<String>) -> Self {
		self.values.icon_base = Some(icon_base.into());
		self
	}

	/// Looks `key` up in the context's action map first.
	///
	/// The resulting callback action performs the delegate bound to `key` and
	/// falls back to this context action while the key is unbound. Survive
	/// flag and values carry over to both.
	pub fn key(self, key: impl Into<String>) -> CallbackActionBuilder<'a> {
		let hub = self.hub;
		let context = self.context.clone();
		let survive = self.survive;
		let values = self.values.clone();
		let fallback: Arc<dyn Action> = Arc::new(self.build());
		hub.callback_action(&context, key)
			.fallback(fallback)
			.survive(survive)
			.values(values)
	}

	pub fn build(self) -> BoundAction<T> {
		let manager = self.hub.find_manager(&self.context, self.survive);
		BoundAction::new(manager, self.quantifier, self.performer, self.values)
	}
}

/// Builder returned by [`ActionHub::callback_action`].
#[must_use]
pub struct CallbackActionBuilder<'a> {
	hub: &'a ActionHub,
	context: Lookup,
	key: String,
	fallback: Option<Arc<dyn Action>>,
	survive: bool,
	values: ActionValues,
}

impl CallbackActionBuilder<'_> {
	/// Action used while no delegate is bound to the key.
	pub fn fallback(mut self, fallback: Arc<dyn Action>) -> Self {
		self.fallback = Some(fallback);
		self
	}

	/// Carries unbound keys forward from the previous action map.
	pub fn survive(mut self, survive: bool) -> Self {
		self.survive = survive;
		self
	}

	pub fn values(mut self, values: ActionValues) -> Self {
		self.values = values;
		self
	}

	pub fn display_name(mut self, name: impl Into<String>) -> Self {
		self.values.display_name = Some(name.into());
		self
	}

	pub fn build(self) -> KeyedBoundAction {
		let manager = self.hub.find_keyed_manager(&self.context, self.survive);
		KeyedBoundAction::new(manager, self.key, self.fallback, self.values)
	}
}
