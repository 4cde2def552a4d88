//! Change notifications for the local replica
//!
//! Every committed store mutation and every sync cycle publishes an event
//! that live readers can subscribe to.

mod events;
mod notifier;

pub use events::{ChangeEvent, ChangeFilter, EventType};
pub use notifier::{ChangeNotifier, FilteredReceiver};
