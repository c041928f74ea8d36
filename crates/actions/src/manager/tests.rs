use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use selkit_lookup::{Lookup, Node};

use super::*;
use crate::config::EngineConfig;
use crate::hub::ActionHub;
use crate::performer::FnPerformer;

struct Openable;
struct Printable;

#[derive(Default)]
struct Probe {
	refreshed: AtomicUsize,
}

impl Refresh for Probe {
	fn refresh(&self) {
		self.refreshed.fetch_add(1, Ordering::SeqCst);
	}
}

impl Probe {
	fn count(&self) -> usize {
		self.refreshed.load(Ordering::SeqCst)
	}
}

fn member(probe: &Arc<Probe>) -> Weak<dyn Refresh> {
	let weak: Weak<dyn Refresh> = Arc::downgrade(probe) as Weak<dyn Refresh>;
	weak
}

fn hub() -> ActionHub {
	ActionHub::new(EngineConfig::default())
}

fn accept_all<T>() -> FnPerformer<T> {
	FnPerformer::new(|_, _, _| Ok(()))
}

#[test]
fn same_context_same_manager() {
	let hub = hub();
	let context = Lookup::new();

	let first = hub.find_manager(&context, false);
	let second = hub.find_manager(&context, false);
	let survive = hub.find_manager(&context, true);

	assert!(Arc::ptr_eq(&first, &second));
	assert!(!Arc::ptr_eq(&first, &survive));
	assert!(survive.is_survive());
	assert_eq!(first.context_id(), context.id());
}

#[test]
fn distinct_contexts_get_distinct_managers() {
	let hub = hub();
	let a = Lookup::new();
	let b = Lookup::new();
	assert!(!Arc::ptr_eq(&hub.find_manager(&a, false), &hub.find_manager(&b, false)));
}

#[test]
fn manager_is_evicted_when_context_and_clients_are_gone() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	assert_eq!(hub.cached_managers().context_plain, 1);

	drop(context);
	assert_eq!(hub.cached_managers().context_plain, 1);
	assert_eq!(hub.cached_managers().live_contexts, 0);

	drop(manager);
	assert_eq!(hub.cached_managers().total(), 0);
}

#[test]
fn context_keeps_manager_alive() {
	let hub = hub();
	let context = Lookup::new();
	let weak = Arc::downgrade(&hub.find_manager(&context, false));

	assert!(weak.upgrade().is_some());
	drop(context);
	assert!(weak.upgrade().is_none());
}

#[test]
fn quantifiers_over_selected_nodes() {
	let hub = hub();
	let a = Node::new("a").with(Openable).into_shared();
	let b = Node::new("b").into_shared();
	let context = Lookup::from_nodes([a.clone(), b]);
	let manager = hub.find_manager(&context, false);
	let performer = accept_all::<Openable>();

	assert!(manager.is_enabled(Quantifier::Any, &performer));
	assert!(!manager.is_enabled(Quantifier::ExactlyOne, &performer));
	assert!(!manager.is_enabled(Quantifier::Each, &performer));
	assert!(!manager.is_enabled(Quantifier::All, &performer));

	context.select([a]);
	assert!(manager.is_enabled(Quantifier::ExactlyOne, &performer));
	assert!(manager.is_enabled(Quantifier::Each, &performer));
}

#[test]
fn duplicate_instances_count_once() {
	let hub = hub();
	let context = Lookup::new();
	let shared = Arc::new(Openable);
	context.add(Arc::clone(&shared));
	context.add(shared);
	let manager = hub.find_manager(&context, false);

	assert!(manager.is_enabled(Quantifier::ExactlyOne, &accept_all::<Openable>()));
}

#[test]
fn performer_predicate_is_applied_last() {
	let hub = hub();
	let context = Lookup::new();
	context.add(Arc::new(Openable));
	let manager = hub.find_manager(&context, false);
	let never = FnPerformer::<Openable>::new(|_, _, _| Ok(())).with_enabled(|_| false);

	assert!(!manager.is_enabled(Quantifier::Any, &never));
}

#[test]
fn dead_context_is_disabled() {
	let hub = hub();
	let context = Lookup::new();
	context.add(Arc::new(Openable));
	let manager = hub.find_manager(&context, false);
	drop(context);

	assert!(!manager.is_enabled(Quantifier::Any, &accept_all::<Openable>()));
}

#[test]
fn perform_passes_residual_without_matched_type() {
	let hub = hub();
	let context = Lookup::new();
	context.add(Arc::new(Openable));
	context.add(Arc::new(Printable));
	let manager = hub.find_manager(&context, false);
	let seen = Arc::new(Mutex::new(None));
	let sink = Arc::clone(&seen);
	let performer = FnPerformer::<Openable>::new(move |_, matched, residual| {
		*sink.lock() = Some((matched.len(), residual.contains::<Openable>(), residual.contains::<Printable>()));
		Ok(())
	});

	manager.perform(&ActionEvent::new(), &performer).unwrap();

	assert_eq!(*seen.lock(), Some((1, false, true)));
	assert!(context.contains::<Openable>());
}

#[test]
fn perform_error_is_returned_unchanged() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	let failing = FnPerformer::<Openable>::new(|_, _, _| Err("disk full".into()));

	let err = manager.perform(&ActionEvent::new(), &failing).unwrap_err();
	assert_eq!(err.to_string(), "disk full");
}

#[test]
fn change_refreshes_members_of_that_type_only() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	let open = Arc::new(Probe::default());
	let print = Arc::new(Probe::default());
	manager.register::<Openable>(member(&open));
	manager.register::<Printable>(member(&print));

	context.add(Arc::new(Openable));

	assert_eq!(open.count(), 1);
	assert_eq!(print.count(), 0);
	assert_eq!(manager.subscription_count(), 2);
}

#[test]
fn node_change_refreshes_members() {
	let hub = hub();
	let shared = Arc::new(Openable);
	let a = Node::new("a").with_shared(Arc::clone(&shared)).into_shared();
	let context = Lookup::from_nodes([a.clone()]);
	let manager = hub.find_manager(&context, false);
	let probe = Arc::new(Probe::default());
	manager.register::<Openable>(member(&probe));
	let performer = accept_all::<Openable>();
	assert!(manager.is_enabled(Quantifier::Each, &performer));

	context.select([a, Node::new("b").into_shared()]);

	assert_eq!(probe.count(), 1);
	assert!(!manager.is_enabled(Quantifier::Each, &performer));
}

#[test]
fn registering_twice_keeps_one_subscription() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	let probe = Arc::new(Probe::default());

	manager.register::<Openable>(member(&probe));
	manager.register::<Openable>(member(&probe));

	assert_eq!(manager.member_count::<Openable>(), 1);
	assert_eq!(context.listener_count(), 2);
}

#[test]
fn dropped_member_is_swept_and_listener_detached() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	let probe = Arc::new(Probe::default());
	manager.register::<Openable>(member(&probe));
	assert_eq!(context.listener_count(), 2);

	drop(probe);
	context.add(Arc::new(Openable));

	assert_eq!(manager.subscription_count(), 0);
	assert_eq!(context.listener_count(), 0);
}

#[test]
fn explicit_sweep_reports_dead_members() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	let kept = Arc::new(Probe::default());
	let dropped = Arc::new(Probe::default());
	manager.register::<Openable>(member(&kept));
	manager.register::<Openable>(member(&dropped));

	drop(dropped);

	assert_eq!(manager.sweep(), 1);
	assert_eq!(manager.member_count::<Openable>(), 1);
	assert_eq!(manager.sweep(), 0);
}

#[test]
fn last_unregister_detaches() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, false);
	let probe = Arc::new(Probe::default());
	let weak = member(&probe);
	manager.register::<Openable>(weak.clone());

	manager.unregister::<Openable>(&weak);

	assert_eq!(manager.subscription_count(), 0);
	assert_eq!(context.listener_count(), 0);
	context.add(Arc::new(Openable));
	assert_eq!(probe.count(), 0);
}

#[test]
fn survive_view_keeps_last_selection() {
	let hub = hub();
	let a = Node::new("a").with(Openable).into_shared();
	let b = Node::new("b").with(Openable).into_shared();
	let context = Lookup::from_nodes([a.clone()]);
	let manager = hub.find_manager(&context, true);
	let view = manager.result::<Openable>();

	let first = view.items();
	assert_eq!(first.len(), 1);

	context.clear();
	let sticky = view.items();
	assert_eq!(sticky.len(), 1);
	assert!(Arc::ptr_eq(&sticky[0], &first[0]));

	context.select([a]);
	assert!(Arc::ptr_eq(&view.items()[0], &first[0]));

	context.select([b.clone()]);
	let fresh = view.items();
	assert_eq!(fresh.len(), 1);
	assert!(!Arc::ptr_eq(&fresh[0], &first[0]));
	assert!(Arc::ptr_eq(&fresh[0], &b.lookup().lookup::<Openable>().unwrap()));
}

#[test]
fn survive_view_clears_on_structural_change() {
	let hub = hub();
	let a = Node::new("a").with(Openable).into_shared();
	let c = Node::new("c").with(Printable).into_shared();
	let context = Lookup::from_nodes([a]);
	let manager = hub.find_manager(&context, true);
	let view = manager.result::<Openable>();
	assert_eq!(view.items().len(), 1);

	context.select([c]);

	assert!(view.items().is_empty());
}

#[test]
fn survive_manager_stays_enabled_across_focus_loss() {
	let hub = hub();
	let context = Lookup::from_nodes([Node::new("a").with(Openable).into_shared()]);
	let plain = hub.find_manager(&context, false);
	let survive = hub.find_manager(&context, true);
	let performer = accept_all::<Openable>();
	assert!(survive.is_enabled(Quantifier::Each, &performer));

	context.clear();

	assert!(!plain.is_enabled(Quantifier::Each, &performer));
	assert!(survive.is_enabled(Quantifier::Each, &performer));
}

#[test]
fn survive_subscription_follows_node_changes() {
	let hub = hub();
	let context = Lookup::new();
	let manager = hub.find_manager(&context, true);
	let probe = Arc::new(Probe::default());
	manager.register::<Openable>(member(&probe));
	assert_eq!(context.listener_count(), 2);

	context.select([Node::new("plain").into_shared()]);
	assert_eq!(probe.count(), 1);

	manager.unregister::<Openable>(&member(&probe));
	assert_eq!(context.listener_count(), 0);
}
