//! redb table definitions for the ledger.

use redb::TableDefinition;

/// Task records keyed by `{namespace}/{kind}/{name}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
