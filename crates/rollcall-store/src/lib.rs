//! rollcall-store: SQLite persistence for the attendance ledger and the
//! profile registry.
//!
//! Several terminals may share one database file; the ledger's conditional
//! append is enforced inside SQLite, not by any process-local lock.

pub mod ledger;
pub mod profiles;
pub mod schema;

pub use ledger::SqliteLedger;
pub use profiles::SqliteProfiles;
pub use schema::StoreError;
