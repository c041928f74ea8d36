use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Lookup;

/// A selectable object exposing its own capabilities.
///
/// Selecting nodes into a context (see [`Lookup::select`]) publishes both the
/// nodes themselves and their capabilities. Quantifiers that reason about the
/// whole selection (`Each`, `All`) count nodes and ask each node's lookup
/// whether it offers the capability.
pub struct Node {
	name: String,
	lookup: Lookup,
}

impl Node {
	/// Creates a node with an empty capability lookup.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			lookup: Lookup::new(),
		}
	}

	/// Adds a capability instance and returns the node.
	pub fn with<T: Any + Send + Sync>(self, capability: T) -> Self {
		self.lookup.add(Arc::new(capability));
		self
	}

	/// Adds an already shared capability instance and returns the node.
	pub fn with_shared<T: Any + Send + Sync>(self, capability: Arc<T>) -> Self {
		self.lookup.add(capability);
		self
	}

	/// Wraps the node for selection.
	pub fn into_shared(self) -> Arc<Self> {
		Arc::new(self)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The node's own capability lookup.
	pub fn lookup(&self) -> &Lookup {
		&self.lookup
	}

	/// Returns whether this node offers capability `T`.
	pub fn has<T: Any + Send + Sync>(&self) -> bool {
		self.lookup.contains::<T>()
	}
}

impl fmt::Debug for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Node").field("name", &self.name).field("lookup", &self.lookup).finish()
	}
}
