// Claims Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod schema;       // Collections, column layouts, Record trait
pub mod entities;     // Account / Claim / Policy models
pub mod db;           // EntityStore trait + SQLite / in-memory stores
pub mod csv_store;    // EntityStore over a directory of CSV files
pub mod join;         // Merged customer view
pub mod cache;        // Leased view cache
pub mod audit;        // Per-entity change log
pub mod coordinator;  // Validated writes + invalidation + audit
pub mod config;
pub mod ledger;       // Service-facing facade

#[cfg(feature = "server")]
pub mod api;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditLog, CsvAuditLog, MemoryAuditLog, SqliteAuditLog};
pub use cache::{CacheConfig, CacheStats, Invalidation, ViewCache};
pub use config::{ConfigError, LedgerConfig, StoreKind};
pub use coordinator::{MutationCoordinator, MutationOutcome};
pub use csv_store::CsvStore;
pub use db::{copy_collections, read_records, write_records, EntityStore, MemoryStore, SqliteStore};
pub use entities::{
    Account, AccountUpdate, Claim, ClaimStatus, ClaimUpdate, NewAccount, NewClaim, NewPolicy,
    Policy, PolicyUpdate,
};
pub use error::{AuditError, LedgerError, LedgerResult, StorageError};
pub use join::{join, CustomerRow, JoinEngine, MergedView, POLICY_NOT_AVAILABLE, VIEW_COLUMNS};
pub use ledger::Ledger;
pub use schema::{Collection, Record, Table};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
