//! EventSync - local replica and two-way sync engine
//!
//! Keeps guests, volunteers, jobs, job types, venues and the people counter
//! in a local SQLite replica, and reconciles it with a remote system of
//! record through incremental, crash-safe push and pull cycles.

/// Run `$body` with `$ty` bound to the entity type of a [`Collection`]
///
/// [`Collection`]: crate::types::Collection
macro_rules! with_entity {
    ($collection:expr, $ty:ident => $body:expr) => {
        match $collection {
            $crate::types::Collection::Guests => {
                type $ty = $crate::types::Guest;
                $body
            }
            $crate::types::Collection::Volunteers => {
                type $ty = $crate::types::Volunteer;
                $body
            }
            $crate::types::Collection::Jobs => {
                type $ty = $crate::types::Job;
                $body
            }
            $crate::types::Collection::JobTypeConfigs => {
                type $ty = $crate::types::JobTypeConfig;
                $body
            }
            $crate::types::Collection::Venues => {
                type $ty = $crate::types::Venue;
                $body
            }
            $crate::types::Collection::Counter => {
                type $ty = $crate::types::Counter;
                $body
            }
        }
    };
}

pub mod clock;
pub mod error;
pub mod realtime;
pub mod storage;
pub mod sync;
pub mod types;

pub use clock::{Clock, HybridClock, ManualClock, SystemClock};
pub use error::{EventSyncError, Result};
pub use storage::{EntityStore, Storage};
pub use sync::{RemoteStore, SyncCoordinator, SyncReport};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
