//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use selkit_actions::{ChangeListener, EnabledChange, FnPerformer, Performer};
use selkit_lookup::Node;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Capability offered by "openable" nodes.
pub struct Openable;

/// Capability offered by "printable" nodes.
pub struct Printable;

pub fn openable(name: &str) -> Arc<Node> {
	Node::new(name).with(Openable).into_shared()
}

pub fn printable(name: &str) -> Arc<Node> {
	Node::new(name).with(Printable).into_shared()
}

pub fn accept<T: Send + Sync + 'static>() -> Arc<dyn Performer<T>> {
	FnPerformer::<T>::new(|_, _, _| Ok(())).shared()
}

/// Listener recording every transition it sees.
pub fn recorder() -> (ChangeListener, Arc<Mutex<Vec<EnabledChange>>>) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	(Arc::new(move |change: &EnabledChange| sink.lock().push(*change)), seen)
}

/// One captured log event.
#[derive(Debug, Clone)]
pub struct Captured {
	pub level: Level,
	pub message: String,
}

/// Layer collecting events into a shared buffer.
#[derive(Clone, Default)]
pub struct CaptureLayer {
	events: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureLayer {
	pub fn events(&self) -> Vec<Captured> {
		self.events.lock().clone()
	}

	pub fn count(&self, level: Level, message: &str) -> usize {
		self.events
			.lock()
			.iter()
			.filter(|event| event.level == level && event.message == message)
			.count()
	}
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		if field.name() == "message" {
			self.0 = format!("{value:?}");
		}
	}

	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.0 = value.to_string();
		}
	}
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let mut visitor = MessageVisitor(String::new());
		event.record(&mut visitor);
		self.events.lock().push(Captured {
			level: *event.metadata().level(),
			message: visitor.0,
		});
	}
}
