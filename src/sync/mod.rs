//! Two-way sync between the local replica and the remote system of record
//!
//! Each collection syncs independently: the [`ChangeTracker`] persists its
//! cursors and retry set, the [`ConflictResolver`] decides last-writer-wins
//! outcomes, and the [`SyncCoordinator`] runs push-then-pull cycles against
//! a [`RemoteStore`].

mod coordinator;
pub mod conflict;
pub mod memory;
pub mod remote;
pub mod retry;
mod tracker;
mod worker;

pub use conflict::{ConflictResolver, LocalMatch, Resolution};
pub use coordinator::{RecordFailure, SyncCoordinator, SyncPhase, SyncReport};
pub use memory::InMemoryRemote;
pub use remote::{OutgoingRecord, RemoteRecord, RemoteStore, UpsertAck};
pub use retry::{backoff_delay, with_retry};
pub use tracker::{ChangeTracker, CollectionCursors, CursorKind, SyncStatus};
pub use worker::{SyncCommand, SyncWorker};
