//! Context actions: a performer bound to a context manager.
//!
//! # Role
//!
//! [`BoundAction`] is the outward face of one registered context action. It
//! asks its [`ContextManager`] whether the quantifier holds for the current
//! selection, and remembers the last answer so listeners hear about
//! transitions only.
//!
//! # Invariants
//!
//! - The action is subscribed with its manager exactly while it has listeners.
//! - The manager keeps only a weak handle; dropping every clone of the action
//!   unsubscribes it on the next sweep.
//! - Equality ignores the bound context.

use std::any::{Any, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use selkit_lookup::{ListenerId, Lookup};
use tracing::debug;

use crate::action::{Action, ActionEvent, ActionValues, ChangeListener, EnabledChange, ListenerSet, addr_of};
use crate::error::PerformError;
use crate::hub::ActionHub;
use crate::manager::ContextManager;
use crate::members::Refresh;
use crate::performer::Performer;
use crate::quantifier::Quantifier;

struct BoundInner<T> {
	manager: Arc<ContextManager>,
	quantifier: Quantifier,
	performer: Arc<dyn Performer<T>>,
	/// Last answer given to a caller or listener.
	enabled: AtomicBool,
	listeners: ListenerSet,
	values: ActionValues,
}

impl<T: Any + Send + Sync> BoundInner<T> {
	fn evaluate(&self) -> bool {
		self.manager.is_enabled(self.quantifier, &*self.performer)
	}
}

impl<T: Any + Send + Sync> Refresh for BoundInner<T> {
	fn refresh(&self) {
		let new = self.evaluate();
		let old = self.enabled.swap(new, Ordering::AcqRel);
		if old != new {
			self.listeners.fire(EnabledChange { old, new });
		}
	}
}

/// A context action bound to one context.
///
/// Clones share listeners and state.
pub struct BoundAction<T> {
	inner: Arc<BoundInner<T>>,
}

impl<T: Any + Send + Sync> BoundAction<T> {
	pub(crate) fn new(
		manager: Arc<ContextManager>,
		quantifier: Quantifier,
		performer: Arc<dyn Performer<T>>,
		values: ActionValues,
	) -> Self {
		Self {
			inner: Arc::new(BoundInner {
				manager,
				quantifier,
				performer,
				enabled: AtomicBool::new(false),
				listeners: ListenerSet::default(),
				values,
			}),
		}
	}

	pub fn quantifier(&self) -> Quantifier {
		self.inner.quantifier
	}

	pub fn manager(&self) -> &Arc<ContextManager> {
		&self.inner.manager
	}

	/// Returns an equal action bound to `context`, with the same survive flag.
	pub fn with_context(&self, context: &Lookup) -> Self {
		let hub = ActionHub::from_shared(Arc::clone(self.inner.manager.hub()));
		let manager = hub.find_manager(context, self.inner.manager.is_survive());
		Self::new(
			manager,
			self.inner.quantifier,
			Arc::clone(&self.inner.performer),
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
}

impl<T: Any + Send + Sync> Action for BoundAction<T> {
	fn is_enabled(&self) -> bool {
		self.assert_owner("BoundAction::is_enabled");
		let enabled = self.inner.evaluate();
		self.inner.enabled.store(enabled, Ordering::Release);
		enabled
	}

	fn perform(&self, event: &ActionEvent) -> Result<(), PerformError> {
		self.assert_owner("BoundAction::perform");
		if !self.is_enabled() {
			debug!(ty = type_name::<T>(), quantifier = %self.inner.quantifier, "perform on disabled action ignored");
			return Ok(());
		}
		self.inner.manager.perform(event, &*self.inner.performer)
	}

	fn add_listener(&self, listener: ChangeListener) -> ListenerId {
		self.assert_owner("BoundAction::add_listener");
		let (id, first) = self.inner.listeners.add(listener);
		if first {
			self.inner.manager.register::<T>(self.member());
			self.inner.enabled.store(self.inner.evaluate(), Ordering::Release);
		}
		id
	}

	fn remove_listener(&self, id: ListenerId) {
		self.assert_owner("BoundAction::remove_listener");
		if self.inner.listeners.remove(id) {
			self.inner.manager.unregister::<T>(&self.member());
		}
	}

	fn values(&self) -> &ActionValues {
		&self.inner.values
	}
}

impl<T> Clone for BoundAction<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> PartialEq for BoundAction<T> {
	fn eq(&self, other: &Self) -> bool {
		self.inner.quantifier == other.inner.quantifier
			&& addr_of(&self.inner.performer) == addr_of(&other.inner.performer)
	}
}

impl<T> Eq for BoundAction<T> {}

impl<T> Hash for BoundAction<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.inner.quantifier.hash(state);
		addr_of(&self.inner.performer).hash(state);
	}
}

impl<T> fmt::Debug for BoundAction<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BoundAction")
			.field("type", &type_name::<T>())
			.field("quantifier", &self.inner.quantifier)
			.field("context", &self.inner.manager.context_id())
			.field("survive", &self.inner.manager.is_survive())
			.field("listeners", &self.inner.listeners.len())
			.finish()
	}
}

#[cfg(test)]
mod tests;
