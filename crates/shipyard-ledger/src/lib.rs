//! shipyard-ledger: durable record of per-resource install state.
//!
//! Every idempotent operation in Shipyard consults the ledger before it
//! acts and writes a terminal record back before it returns. A later run
//! re-reads the ledger and skips whatever already succeeded, which is the
//! only retry mechanism the installer has.
//!
//! # Architecture
//!
//! Records are JSON-serialized into a single redb table keyed by
//! `{namespace}/{kind}/{name}`. [`LedgerStore`] is `Clone` + `Send` + `Sync`
//! (backed by `Arc<Database>`) and implements the [`Ledger`] trait, which is
//! the seam for other backends. [`TaskGuard`] wraps a pending record and
//! guarantees a terminal write on every exit path.

pub mod configmap;
pub mod error;
pub mod guard;
pub mod store;
pub mod tables;
pub mod types;

pub use configmap::{ConfigData, ConfigMapClient, ConfigMapLedger, DEFAULT_CONFIG_MAP};
pub use error::{LedgerError, LedgerResult};
pub use guard::TaskGuard;
pub use store::LedgerStore;
pub use types::*;

/// Durable key-value store of [`TaskRecord`]s.
pub trait Ledger: Send + Sync {
    /// Fetch the record for a resource, if one was ever written.
    fn get(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<Option<TaskRecord>>;

    /// Insert or replace a record.
    fn put(&self, record: &TaskRecord) -> LedgerResult<()>;

    /// All records in a namespace, ordered by key.
    fn list(&self, namespace: &str) -> LedgerResult<Vec<TaskRecord>>;

    /// Remove a record. Returns true if it existed.
    fn delete(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<bool>;

    /// Whether the resource is recorded as succeeded.
    fn succeeded(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<bool> {
        Ok(self
            .get(namespace, kind, name)?
            .is_some_and(|r| r.status == TaskStatus::Succeeded))
    }
}
