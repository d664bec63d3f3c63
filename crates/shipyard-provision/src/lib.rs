//! shipyard-provision: volumes and claims, created at most once.
//!
//! [`Provisioner`] runs the same check-or-create flow for every storage
//! kind: validate, consult the ledger, find a free cluster name, submit,
//! record. The kind-specific parts (object shape, probe, submit) come from
//! a [`StorageKind`] implementation.

pub mod error;
pub mod kinds;
pub mod provisioner;
pub mod suffix;

pub use error::{ProvisionError, ProvisionResult};
pub use kinds::{ClaimKind, StorageKind, VolumeKind};
pub use provisioner::{provision_persistence, PersistenceRefs, Provisioner};
pub use suffix::{random_suffix, SuffixFn};
