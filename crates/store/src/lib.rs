//! Execution ledger: entity models, the [`Ledger`] trait, and its two
//! implementations.
//!
//! [`PgLedger`] is the production store (PostgreSQL via sqlx); every claim
//! is a conditional `UPDATE ... RETURNING` so concurrent processes cannot
//! double-own a work item. [`MemLedger`] provides the same guarantees
//! in-process behind a single mutex and is what the engine's tests run
//! against.

pub mod ledger;
pub mod mem;
pub mod models;
pub mod pg;
pub mod pool;

pub use ledger::{Ledger, StoreError, StoreResult};
pub use mem::MemLedger;
pub use pg::PgLedger;
pub use pool::{create_pool, health_check, run_migrations, DbPool};
