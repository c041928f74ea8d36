use std::fmt;
use std::sync::Arc;

use selkit_lookup::Lookup;

use crate::action::ActionEvent;
use crate::error::PerformError;

/// The work behind a context action.
///
/// Implementations are supplied by registration code and should be free of
/// hidden state: one performer instance may back many bound actions, and
/// actions compare equal when they share a performer.
pub trait Performer<T>: Send + Sync {
	/// Runs the action on the matched instances.
	///
	/// `residual` is the surrounding context without the instances of `T`.
	fn invoke(&self, event: &ActionEvent, matched: &[Arc<T>], residual: &Lookup) -> Result<(), PerformError>;

	/// Extra enablement predicate, evaluated after the quantifier passed.
	fn enabled(&self, _matched: &[Arc<T>]) -> bool {
		true
	}
}

type Invoke<T> = Box<dyn Fn(&ActionEvent, &[Arc<T>], &Lookup) -> Result<(), PerformError> + Send + Sync>;
type Predicate<T> = Box<dyn Fn(&[Arc<T>]) -> bool + Send + Sync>;

/// Closure-backed [`Performer`].
pub struct FnPerformer<T> {
	invoke: Invoke<T>,
	enabled: Option<Predicate<T>>,
}

impl<T> FnPerformer<T> {
	pub fn new(
		invoke: impl Fn(&ActionEvent, &[Arc<T>], &Lookup) -> Result<(), PerformError> + Send + Sync + 'static,
	) -> Self {
		Self {
			invoke: Box::new(invoke),
			enabled: None,
		}
	}

	/// Adds an enablement predicate over the matched instances.
	pub fn with_enabled(mut self, enabled: impl Fn(&[Arc<T>]) -> bool + Send + Sync + 'static) -> Self {
		self.enabled = Some(Box::new(enabled));
		self
	}

	/// Shares the performer for binding.
	pub fn shared(self) -> Arc<dyn Performer<T>>
	where
		T: 'static,
	{
		Arc::new(self)
	}
}

impl<T> Performer<T> for FnPerformer<T> {
	fn invoke(&self, event: &ActionEvent, matched: &[Arc<T>], residual: &Lookup) -> Result<(), PerformError> {
		(self.invoke)(event, matched, residual)
	}

	fn enabled(&self, matched: &[Arc<T>]) -> bool {
		self.enabled.as_ref().is_none_or(|predicate| predicate(matched))
	}
}

impl<T> fmt::Debug for FnPerformer<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnPerformer").field("has_predicate", &self.enabled.is_some()).finish()
	}
}
