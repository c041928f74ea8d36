//! Observable selection contexts.
//!
//! A [`Lookup`] holds the "current objects" of some part of the UI (the active
//! window, a submenu's target, a test fixture) and answers capability queries
//! by type. [`LookupResult`] is the live view for one capability type, and
//! [`Node`] is a selectable object carrying its own capability lookup.
//!
//! Action enablement in `selkit-actions` is computed purely against this
//! surface: [`ResultView::items`] plus [`Observe`] change notification.

mod id;
mod lookup;
mod node;
mod result;

pub use id::{ListenerId, LookupId};
pub use lookup::{Instance, Listener, Lookup, LookupEvent, WeakLookup};
pub use node::Node;
pub use result::{LookupResult, Observe, ResultView};
