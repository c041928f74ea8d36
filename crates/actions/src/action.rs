//! The outward action surface consumed by menus, toolbars and key bindings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use selkit_lookup::ListenerId;

use crate::error::PerformError;

/// Payload passed to an action when it is invoked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionEvent {
	/// Command string of the invoking control, if any.
	pub command: Option<String>,
}

impl ActionEvent {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an event carrying a command string.
	pub fn with_command(command: impl Into<String>) -> Self {
		Self {
			command: Some(command.into()),
		}
	}
}

/// Enabled-state transition reported to action listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledChange {
	pub old: bool,
	pub new: bool,
}

/// Callback registered on an [`Action`].
pub type ChangeListener = Arc<dyn Fn(&EnabledChange) + Send + Sync>;

/// Presentation values carried by an action. Rendering is up to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionValues {
	/// Localized name, possibly containing a mnemonic ampersand.
	pub display_name: Option<String>,
	/// Resource location of the icon.
	pub icon_base: Option<String>,
	/// Hide the icon when presented in a menu.
	pub no_icon_in_menu: bool,
}

/// An invocable, observable UI action.
pub trait Action: Send + Sync {
	/// Returns whether the action can currently be invoked.
	fn is_enabled(&self) -> bool;

	/// Invokes the action.
	fn perform(&self, event: &ActionEvent) -> Result<(), PerformError>;

	/// Registers a listener for enabled-state transitions.
	fn add_listener(&self, listener: ChangeListener) -> ListenerId;

	/// Removes a listener registered with [`Action::add_listener`].
	fn remove_listener(&self, id: ListenerId);

	/// Presentation values.
	fn values(&self) -> &ActionValues;
}

/// Listener registry shared by the action implementations.
#[derive(Default)]
pub(crate) struct ListenerSet {
	entries: Mutex<Vec<(ListenerId, ChangeListener)>>,
}

impl ListenerSet {
	/// Adds a listener. Returns its id and whether it was the first one.
	pub(crate) fn add(&self, listener: ChangeListener) -> (ListenerId, bool) {
		let id = ListenerId::next();
		let mut entries = self.entries.lock();
		entries.push((id, listener));
		(id, entries.len() == 1)
	}

	/// Removes a listener. Returns true if it was present and the set is now empty.
	pub(crate) fn remove(&self, id: ListenerId) -> bool {
		let mut entries = self.entries.lock();
		let before = entries.len();
		entries.retain(|(existing, _)| *existing != id);
		entries.len() != before && entries.is_empty()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Notifies every listener, outside the lock.
	pub(crate) fn fire(&self, change: EnabledChange) {
		let snapshot: Vec<ChangeListener> = self.entries.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
		for listener in snapshot {
			listener(&change);
		}
	}
}

type Handler = Arc<dyn Fn(&ActionEvent) -> Result<(), PerformError> + Send + Sync>;

/// A self-contained action with a settable enabled flag.
///
/// The usual delegate stored in an [`ActionMap`], and the usual fallback of a
/// callback action.
pub struct SimpleAction {
	enabled: AtomicBool,
	handler: Handler,
	listeners: ListenerSet,
	values: ActionValues,
}

impl SimpleAction {
	/// Creates an enabled action running `handler`.
	pub fn new(handler: impl Fn(&ActionEvent) -> Result<(), PerformError> + Send + Sync + 'static) -> Self {
		Self {
			enabled: AtomicBool::new(true),
			handler: Arc::new(handler),
			listeners: ListenerSet::default(),
			values: ActionValues::default(),
		}
	}

	/// Creates an action that is always enabled and never fails.
	pub fn always_enabled(handler: impl Fn(&ActionEvent) + Send + Sync + 'static, values: ActionValues) -> Self {
		Self::new(move |event| {
			handler(event);
			Ok(())
		})
		.with_values(values)
	}

	pub fn with_values(mut self, values: ActionValues) -> Self {
		self.values = values;
		self
	}

	/// Sets the enabled flag, notifying listeners on a transition.
	pub fn set_enabled(&self, enabled: bool) {
		let old = self.enabled.swap(enabled, Ordering::AcqRel);
		if old != enabled {
			self.listeners.fire(EnabledChange { old, new: enabled });
		}
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}
}

impl Action for SimpleAction {
	fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::Acquire)
	}

	fn perform(&self, event: &ActionEvent) -> Result<(), PerformError> {
		(self.handler)(event)
	}

	fn add_listener(&self, listener: ChangeListener) -> ListenerId {
		self.listeners.add(listener).0
	}

	fn remove_listener(&self, id: ListenerId) {
		self.listeners.remove(id);
	}

	fn values(&self) -> &ActionValues {
		&self.values
	}
}

impl fmt::Debug for SimpleAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SimpleAction")
			.field("enabled", &self.is_enabled())
			.field("values", &self.values)
			.finish()
	}
}

/// Immutable `key → action` table published in a context.
///
/// Callback actions resolve their key against the first map found in their
/// context. To change the bindings, publish a new map.
#[derive(Clone, Default)]
pub struct ActionMap {
	entries: HashMap<String, Arc<dyn Action>>,
}

impl ActionMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds `key` to `action` and returns the map.
	pub fn with(mut self, key: impl Into<String>, action: Arc<dyn Action>) -> Self {
		self.entries.insert(key.into(), action);
		self
	}

	pub fn get(&self, key: &str) -> Option<&Arc<dyn Action>> {
		self.entries.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	/// Bound keys, sorted.
	pub fn keys(&self) -> Vec<&str> {
		let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
		keys.sort_unstable();
		keys
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns `self` extended with every entry of `previous` whose key `self`
	/// does not bind.
	pub fn merged_over(&self, previous: &ActionMap) -> ActionMap {
		let mut entries = self.entries.clone();
		for (key, action) in &previous.entries {
			entries.entry(key.clone()).or_insert_with(|| Arc::clone(action));
		}
		ActionMap { entries }
	}
}

impl fmt::Debug for ActionMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActionMap").field("keys", &self.keys()).finish()
	}
}

/// Identity address of a shared trait object, ignoring its vtable.
pub(crate) fn addr_of<T: ?Sized>(value: &Arc<T>) -> usize {
	Arc::as_ptr(value) as *const () as usize
}
