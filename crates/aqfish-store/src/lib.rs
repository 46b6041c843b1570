pub mod audit;
pub mod error;
pub mod memory;
pub mod redb_store;
pub mod store;

pub use audit::{compute_desired_hash, AuditEvent};
pub use error::StoreError;
pub use memory::InMemoryStore;
pub use redb_store::RedbStore;
pub use store::StateStore;
