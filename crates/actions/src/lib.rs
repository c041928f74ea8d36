//! Context-sensitive action binding and enablement.
//!
//! Actions are bound to a [`Lookup`](selkit_lookup::Lookup), the observable
//! "current selection", and stay enabled or disabled as it changes without any
//! explicit wiring by the caller.
//!
//! * [`ActionHub`] owns the identity-keyed manager cache and the
//!   [`Coordinator`] that confines enablement work to one thread.
//! * [`ContextManager`] evaluates a [`Quantifier`] for a capability type and
//!   re-evaluates subscribed [`BoundAction`]s when the context changes.
//! * [`KeyedGlobalManager`] resolves [`KeyedBoundAction`]s by key against an
//!   [`ActionMap`] published in the context.
//!
//! Survive managers keep the last non-empty selection (or action map) across
//! transient empty states such as focus loss.

mod action;
mod bound;
mod cache;
mod config;
mod coordinator;
mod error;
mod hub;
mod keyed;
mod manager;
mod members;
mod performer;
mod quantifier;

pub use action::{Action, ActionEvent, ActionMap, ActionValues, ChangeListener, EnabledChange, SimpleAction};
pub use bound::BoundAction;
pub use cache::{CacheKey, CacheStats};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, Waker};
pub use error::{ConfigError, PerformError};
pub use hub::{ActionHub, CallbackActionBuilder, ContextActionBuilder};
pub use keyed::{KeyedBoundAction, KeyedGlobalManager};
pub use manager::ContextManager;
pub use performer::{FnPerformer, Performer};
pub use quantifier::Quantifier;
