//! Result view that keeps the last non-empty selection.

use std::any::Any;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use selkit_lookup::{Listener, ListenerId, LookupResult, Node, Observe, ResultView};

use crate::action::addr_of;

/// Wraps the plain result for `T` and the selected-node result.
///
/// Reads return the live instances when there are any. When the live view is
/// empty, the previous snapshot is kept unless the selected nodes changed to a
/// different non-empty set, which counts as a structural change and adopts the
/// (empty) live view. The decision is taken on read, so it does not depend on
/// the order in which per-type change events arrive.
pub(crate) struct NeverEmptyResult<T> {
	delegate: LookupResult<T>,
	nodes: LookupResult<Node>,
	state: Mutex<Snapshot<T>>,
}

struct Snapshot<T> {
	items: Vec<Arc<T>>,
	/// Node identities seen when `items` was taken.
	nodes: Vec<usize>,
	/// Outer listener id to the pair registered on the delegate and node views.
	forwarded: HashMap<ListenerId, (ListenerId, ListenerId)>,
}

impl<T> NeverEmptyResult<T> {
	pub(crate) fn new(delegate: LookupResult<T>, nodes: LookupResult<Node>) -> Self {
		Self {
			delegate,
			nodes,
			state: Mutex::new(Snapshot {
				items: Vec::new(),
				nodes: Vec::new(),
				forwarded: HashMap::new(),
			}),
		}
	}
}

impl<T: Any + Send + Sync> Observe for NeverEmptyResult<T> {
	fn subscribe(&self, listener: Listener) -> ListenerId {
		let on_items = self.delegate.subscribe(Arc::clone(&listener));
		let on_nodes = self.nodes.subscribe(listener);
		let id = ListenerId::next();
		self.state.lock().forwarded.insert(id, (on_items, on_nodes));
		id
	}

	fn unsubscribe(&self, id: ListenerId) {
		let pair = self.state.lock().forwarded.remove(&id);
		if let Some((on_items, on_nodes)) = pair {
			self.delegate.unsubscribe(on_items);
			self.nodes.unsubscribe(on_nodes);
		}
	}
}

impl<T: Any + Send + Sync> ResultView<T> for NeverEmptyResult<T> {
	fn items(&self) -> Vec<Arc<T>> {
		let current = self.delegate.items();
		let nodes: Vec<usize> = self.nodes.items().iter().map(addr_of).collect();

		let mut state = self.state.lock();
		if !current.is_empty() {
			state.nodes = nodes;
			let stale = mem::replace(&mut state.items, current.clone());
			drop(state);
			drop(stale);
			return current;
		}
		if !nodes.is_empty() && nodes != state.nodes {
			state.nodes = nodes;
			let stale = mem::take(&mut state.items);
			drop(state);
			drop(stale);
			return current;
		}
		state.items.clone()
	}
}
