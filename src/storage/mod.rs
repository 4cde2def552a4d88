//! Local replica storage
//!
//! SQLite tables per entity collection, the deletion log and the sync
//! bookkeeping tables, behind the transactional `EntityStore`.

mod connection;
pub mod deletions;
pub mod entity_queries;
mod migrations;
pub mod queries;
mod records;
mod store;

pub use connection::Storage;
pub use deletions::DeletedRecord;
pub use migrations::SCHEMA_VERSION;
pub use queries::Acknowledgement;
pub use records::StoredEntity;
pub use store::EntityStore;
