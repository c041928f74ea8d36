use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use selkit_lookup::{ListenerId, Lookup};
use tracing::debug;

use super::KeyedGlobalManager;
use crate::action::{Action, ActionEvent, ActionValues, ChangeListener, EnabledChange, ListenerSet, addr_of};
use crate::error::PerformError;
use crate::hub::ActionHub;
use crate::members::Refresh;

struct KeyedInner {
	manager: Arc<KeyedGlobalManager>,
	key: String,
	fallback: Option<Arc<dyn Action>>,
	/// Our registration on the fallback, present while we have listeners.
	fallback_listener: Mutex<Option<ListenerId>>,
	enabled: AtomicBool,
	listeners: ListenerSet,
	values: ActionValues,
}

impl KeyedInner {
	/// The delegate bound to the key, else the fallback.
	fn target(&self) -> Option<Arc<dyn Action>> {
		self.manager.delegate(&self.key).or_else(|| self.fallback.clone())
	}

	fn evaluate(&self) -> bool {
		self.target().is_some_and(|target| target.is_enabled())
	}
}

impl Refresh for KeyedInner {
	fn refresh(&self) {
		let new = self.evaluate();
		let old = self.enabled.swap(new, Ordering::AcqRel);
		if old != new {
			self.listeners.fire(EnabledChange { old, new });
		}
	}
}

impl Drop for KeyedInner {
	/// The last clone may be dropped on any thread; the fallback registration
	/// is removed on the coordination thread.
	fn drop(&mut self) {
		if let (Some(fallback), Some(id)) = (&self.fallback, self.fallback_listener.get_mut().take()) {
			let fallback = Arc::clone(fallback);
			self.manager.hub().coordinator.dispatch(move || fallback.remove_listener(id));
		}
	}
}

/// A callback action: performs whatever the context's [`ActionMap`](crate::ActionMap)
/// binds to its key, or its fallback when the key is unbound.
///
/// Clones share listeners and state.
#[derive(Clone)]
pub struct KeyedBoundAction {
	inner: Arc<KeyedInner>,
}

impl KeyedBoundAction {
	pub(crate) fn new(
		manager: Arc<KeyedGlobalManager>,
		key: String,
		fallback: Option<Arc<dyn Action>>,
		values: ActionValues,
	) -> Self {
		Self {
			inner: Arc::new(KeyedInner {
				manager,
				key,
				fallback,
				fallback_listener: Mutex::new(None),
				enabled: AtomicBool::new(false),
				listeners: ListenerSet::default(),
				values,
			}),
		}
	}

	pub fn key(&self) -> &str {
		&self.inner.key
	}

	pub fn fallback(&self) -> Option<&Arc<dyn Action>> {
		self.inner.fallback.as_ref()
	}

	pub fn manager(&self) -> &Arc<KeyedGlobalManager> {
		&self.inner.manager
	}

	/// Returns an equal action bound to `context`, with the same survive flag.
	pub fn with_context(&self, context: &Lookup) -> Self {
		let hub = ActionHub::from_shared(Arc::clone(self.inner.manager.hub()));
		let manager = hub.find_keyed_manager(context, self.inner.manager.is_survive());
		Self::new(
			manager,
			self.inner.key.clone(),
			self.inner.fallback.clone(),
			self.inner.values.clone(),
		)
	}

	fn member(&self) -> Weak<dyn Refresh> {
		let weak: Weak<dyn Refresh> = Arc::downgrade(&self.inner) as Weak<dyn Refresh>;
		weak
	}

	fn assert_owner(&self, operation: &str) {
		self.inner.manager.hub().coordinator.assert_owner(operation);
	}

	fn fallback_listener(&self) -> ChangeListener {
		let hub = Arc::clone(self.inner.manager.hub());
		let weak = Arc::downgrade(&self.inner);
		Arc::new(move |_: &EnabledChange| {
			let weak = weak.clone();
			hub.coordinator.dispatch(move || {
				if let Some(inner) = weak.upgrade() {
					inner.refresh();
				}
			});
		})
	}
}

impl Action for KeyedBoundAction {
	fn is_enabled(&self) -> bool {
		self.assert_owner("KeyedBoundAction::is_enabled");
		let enabled = self.inner.evaluate();
		self.inner.enabled.store(enabled, Ordering::Release);
		enabled
	}

	fn perform(&self, event: &ActionEvent) -> Result<(), PerformError> {
		self.assert_owner("KeyedBoundAction::perform");
		match self.inner.target() {
			Some(target) if target.is_enabled() => target.perform(event),
			Some(_) => {
				debug!(key = %self.inner.key, "perform on disabled callback ignored");
				Ok(())
			}
			None => {
				debug!(key = %self.inner.key, "perform on unbound callback ignored");
				Ok(())
			}
		}
	}

	fn add_listener(&self, listener: ChangeListener) -> ListenerId {
		self.assert_owner("KeyedBoundAction::add_listener");
		let (id, first) = self.inner.listeners.add(listener);
		if first {
			self.inner.manager.register(&self.inner.key, self.member());
			if let Some(fallback) = &self.inner.fallback {
				let registration = fallback.add_listener(self.fallback_listener());
				let displaced = self.inner.fallback_listener.lock().replace(registration);
				if let Some(displaced) = displaced {
					fallback.remove_listener(displaced);
				}
			}
			self.inner.enabled.store(self.inner.evaluate(), Ordering::Release);
		}
		id
	}

	fn remove_listener(&self, id: ListenerId) {
		self.assert_owner("KeyedBoundAction::remove_listener");
		if !self.inner.listeners.remove(id) {
			return;
		}
		self.inner.manager.unregister(&self.inner.key, &self.member());
		let registration = self.inner.fallback_listener.lock().take();
		if let (Some(fallback), Some(registration)) = (&self.inner.fallback, registration) {
			fallback.remove_listener(registration);
		}
	}

	fn values(&self) -> &ActionValues {
		&self.inner.values
	}
}

impl PartialEq for KeyedBoundAction {
	fn eq(&self, other: &Self) -> bool {
		self.inner.key == other.inner.key
			&& self.inner.fallback.as_ref().map(addr_of) == other.inner.fallback.as_ref().map(addr_of)
	}
}

impl Eq for KeyedBoundAction {}

impl Hash for KeyedBoundAction {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.key.hash(state);
		self.inner.fallback.as_ref().map(addr_of).hash(state);
	}
}

impl fmt::Debug for KeyedBoundAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeyedBoundAction")
			.field("key", &self.inner.key)
			.field("has_fallback", &self.inner.fallback.is_some())
			.field("context", &self.inner.manager.context_id())
			.field("survive", &self.inner.manager.is_survive())
			.finish()
	}
}
