pub mod database;
pub mod memory;
pub mod traits;

pub use database::{AssociationOps, DelegationOps, DirectoryOps, InvitationOps, RelationStore};
pub use memory::MemoryRelationStore;

#[cfg(feature = "sqlx-postgres")]
pub use database::sqlx_adapter::{PoolConfig, PoolStats, SCHEMA, SqlxRelationStore};
