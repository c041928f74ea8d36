//! Coordination-thread confinement and hand-off.
//!
//! # Role
//!
//! Enablement queries, invocations and listener (un)registration belong to a
//! single owner thread, typically the UI event thread. Context changes may be
//! published from anywhere; [`Coordinator::dispatch`] runs them inline on the
//! owner thread and queues them otherwise, to be drained by
//! [`Coordinator::run_pending`] from the owner's event loop.
//!
//! # Invariants
//!
//! - Tasks run in the order they were queued.
//! - The queue lock is never held while a task runs, so tasks may dispatch
//!   further tasks.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

/// Callback used to wake the owner thread when work is queued.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Owner-thread guard and cross-thread task queue.
pub struct Coordinator {
	owner: ThreadId,
	queue: Mutex<VecDeque<Task>>,
	waker: Mutex<Option<Waker>>,
}

impl Coordinator {
	/// Creates a coordinator owned by the calling thread.
	pub fn for_current_thread() -> Self {
		Self {
			owner: thread::current().id(),
			queue: Mutex::new(VecDeque::new()),
			waker: Mutex::new(None),
		}
	}

	/// The owner thread.
	pub fn owner(&self) -> ThreadId {
		self.owner
	}

	/// Returns true on the owner thread.
	pub fn is_owner(&self) -> bool {
		thread::current().id() == self.owner
	}

	/// Asserts that the caller runs on the owner thread.
	///
	/// Fatal in debug builds, ignored in release builds.
	#[track_caller]
	pub fn assert_owner(&self, operation: &str) {
		debug_assert!(
			self.is_owner(),
			"{operation} must run on the coordination thread {:?}, called from {:?}",
			self.owner,
			thread::current().id()
		);
	}

	/// Installs the callback invoked whenever a task is queued from another thread.
	pub fn set_waker(&self, waker: Waker) {
		*self.waker.lock() = Some(waker);
	}

	/// Runs `task` now on the owner thread, or queues it for [`Coordinator::run_pending`].
	pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
		if self.is_owner() {
			task();
			return;
		}
		self.queue.lock().push_back(Box::new(task));
		let waker = self.waker.lock().clone();
		if let Some(waker) = waker {
			waker();
		}
	}

	/// Drains queued tasks on the owner thread. Returns how many ran.
	pub fn run_pending(&self) -> usize {
		self.assert_owner("Coordinator::run_pending");
		let mut ran = 0;
		loop {
			let next = self.queue.lock().pop_front();
			let Some(task) = next else {
				return ran;
			};
			task();
			ran += 1;
		}
	}

	/// Number of queued tasks.
	pub fn pending(&self) -> usize {
		self.queue.lock().len()
	}
}

impl fmt::Debug for Coordinator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Coordinator")
			.field("owner", &self.owner)
			.field("pending", &self.pending())
			.finish()
	}
}
