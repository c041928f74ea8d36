use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use selkit_lookup::{Lookup, Node};

use super::*;
use crate::config::EngineConfig;
use crate::performer::FnPerformer;

struct Openable;

fn hub() -> ActionHub {
	ActionHub::new(EngineConfig::default())
}

fn capable(name: &str) -> Arc<Node> {
	Node::new(name).with(Openable).into_shared()
}

fn counting_performer() -> (Arc<dyn Performer<Openable>>, Arc<AtomicUsize>) {
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&calls);
	let performer = FnPerformer::<Openable>::new(move |_, _, _| {
		counter.fetch_add(1, Ordering::SeqCst);
		Ok(())
	})
	.shared();
	(performer, calls)
}

fn recorder() -> (ChangeListener, Arc<Mutex<Vec<EnabledChange>>>) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	(Arc::new(move |change: &EnabledChange| sink.lock().push(*change)), seen)
}

#[test]
fn equal_actions_are_notified_on_transitions_only() {
	let hub = hub();
	let context = Lookup::from_nodes([capable("a")]);
	let (performer, _) = counting_performer();
	let first = hub.context_action(&context, Arc::clone(&performer)).build();
	let second = hub.context_action(&context, performer).build();
	assert_eq!(first, second);

	let (one, seen_one) = recorder();
	let (two, seen_two) = recorder();
	first.add_listener(one);
	second.add_listener(two);
	assert_eq!(first.manager().member_count::<Openable>(), 2);

	context.select([capable("b")]);
	assert!(seen_one.lock().is_empty());
	assert!(seen_two.lock().is_empty());

	context.select([Node::new("plain").into_shared()]);
	let expected = vec![EnabledChange { old: true, new: false }];
	assert_eq!(*seen_one.lock(), expected);
	assert_eq!(*seen_two.lock(), expected);
}

#[test]
fn dropped_action_leaves_no_subscription() {
	let hub = hub();
	let context = Lookup::from_nodes([capable("a")]);
	let (performer, _) = counting_performer();
	let action = hub.context_action(&context, performer).build();
	let manager = Arc::clone(action.manager());
	let (listener, _) = recorder();
	action.add_listener(listener);
	assert_eq!(context.listener_count(), 2);

	drop(action);
	context.clear();

	assert_eq!(manager.subscription_count(), 0);
	assert_eq!(context.listener_count(), 0);
}

#[test]
fn removing_last_listener_unregisters() {
	let hub = hub();
	let context = Lookup::new();
	let (performer, _) = counting_performer();
	let action = hub.context_action(&context, performer).build();
	let (a, _) = recorder();
	let (b, _) = recorder();
	let first = action.add_listener(a);
	let second = action.add_listener(b);

	action.remove_listener(first);
	assert_eq!(action.manager().subscription_count(), 1);
	action.remove_listener(second);
	assert_eq!(action.manager().subscription_count(), 0);
}

#[test]
fn with_context_is_equal_but_rebound() {
	let hub = hub();
	let enabled = Lookup::from_nodes([capable("a")]);
	let empty = Lookup::new();
	let (performer, _) = counting_performer();
	let action = hub
		.context_action(&enabled, performer)
		.quantifier(Quantifier::Each)
		.display_name("&Open")
		.build();

	let moved = action.with_context(&empty);

	assert_eq!(moved, action);
	assert_eq!(moved.values(), action.values());
	assert_eq!(moved.quantifier(), Quantifier::Each);
	assert_eq!(moved.manager().context_id(), empty.id());
	assert!(action.is_enabled());
	assert!(!moved.is_enabled());

	let set: HashSet<BoundAction<Openable>> = [action, moved].into_iter().collect();
	assert_eq!(set.len(), 1);
}

#[test]
fn with_context_keeps_survive_flag() {
	let hub = hub();
	let context = Lookup::new();
	let (performer, _) = counting_performer();
	let action = hub.context_action(&context, performer).survive(true).build();

	let moved = action.with_context(&Lookup::new());

	assert!(moved.manager().is_survive());
}

#[test]
fn different_quantifier_or_performer_is_not_equal() {
	let hub = hub();
	let context = Lookup::new();
	let (performer, _) = counting_performer();
	let (other, _) = counting_performer();

	let any = hub.context_action(&context, Arc::clone(&performer)).build();
	let each = hub
		.context_action(&context, Arc::clone(&performer))
		.quantifier(Quantifier::Each)
		.build();
	let foreign = hub.context_action(&context, other).build();

	assert_ne!(any, each);
	assert_ne!(any, foreign);
}

#[test]
fn perform_invokes_performer_when_enabled() {
	let hub = hub();
	let context = Lookup::from_nodes([capable("a")]);
	let (performer, calls) = counting_performer();
	let action = hub.context_action(&context, performer).build();

	action.perform(&ActionEvent::new()).unwrap();

	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn perform_on_disabled_action_does_nothing() {
	let hub = hub();
	let context = Lookup::new();
	let (performer, calls) = counting_performer();
	let action = hub.context_action(&context, performer).build();

	action.perform(&ActionEvent::new()).unwrap();

	assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn perform_error_propagates() {
	let hub = hub();
	let context = Lookup::from_nodes([capable("a")]);
	let performer = FnPerformer::<Openable>::new(|_, _, _| Err("read-only".into())).shared();
	let action = hub.context_action(&context, performer).build();

	let err = action.perform(&ActionEvent::new()).unwrap_err();

	assert_eq!(err.to_string(), "read-only");
}

#[test]
fn survive_action_stays_enabled_across_focus_loss() {
	let hub = hub();
	let context = Lookup::from_nodes([capable("a")]);
	let (performer, calls) = counting_performer();
	let action = hub.context_action(&context, performer).survive(true).build();
	let (listener, seen) = recorder();
	action.add_listener(listener);
	assert!(action.is_enabled());

	context.clear();

	assert!(seen.lock().is_empty());
	assert!(action.is_enabled());
	action.perform(&ActionEvent::new()).unwrap();
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}
