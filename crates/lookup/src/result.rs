//! Live per-type views over a [`Lookup`](crate::Lookup).

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::id::ListenerId;
use crate::lookup::{Listener, WeakLookup};

/// Change subscription surface shared by every result view.
pub trait Observe: Send + Sync {
	/// Registers `listener` for changes of this view.
	fn subscribe(&self, listener: Listener) -> ListenerId;

	/// Removes a listener registered with [`Observe::subscribe`].
	fn unsubscribe(&self, id: ListenerId);
}

/// A live, snapshot-producing view of the instances of `T`.
pub trait ResultView<T>: Observe {
	/// Current instances.
	fn items(&self) -> Vec<Arc<T>>;
}

/// Plain result view backed directly by a lookup.
///
/// Holds its context weakly: once the context is dropped the view is empty and
/// subscriptions become no-ops.
pub struct LookupResult<T> {
	lookup: WeakLookup,
	_marker: PhantomData<fn() -> T>,
}

impl<T> LookupResult<T> {
	pub(crate) fn new(lookup: WeakLookup) -> Self {
		Self {
			lookup,
			_marker: PhantomData,
		}
	}
}

impl<T> Clone for LookupResult<T> {
	fn clone(&self) -> Self {
		Self::new(self.lookup.clone())
	}
}

impl<T: Any + Send + Sync> Observe for LookupResult<T> {
	fn subscribe(&self, listener: Listener) -> ListenerId {
		match self.lookup.upgrade() {
			Some(lookup) => lookup.subscribe(TypeId::of::<T>(), type_name::<T>(), listener),
			None => ListenerId::next(),
		}
	}

	fn unsubscribe(&self, id: ListenerId) {
		if let Some(lookup) = self.lookup.upgrade() {
			lookup.unsubscribe(id);
		}
	}
}

impl<T: Any + Send + Sync> ResultView<T> for LookupResult<T> {
	fn items(&self) -> Vec<Arc<T>> {
		self.lookup.upgrade().map(|lookup| lookup.lookup_all::<T>()).unwrap_or_default()
	}
}

impl<T> fmt::Debug for LookupResult<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LookupResult")
			.field("type", &type_name::<T>())
			.field("lookup", &self.lookup)
			.finish()
	}
}
