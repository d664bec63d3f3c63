//! Scoped task records with a guaranteed terminal write.
//!
//! [`TaskGuard::begin`] persists a Pending record. The caller finishes it
//! with [`TaskGuard::succeed`] or [`TaskGuard::fail`]. A guard dropped
//! without either (early `?` return, panic unwind) writes Failed, so the
//! ledger never keeps a stale Pending record behind a dead run.

use tracing::{error, warn};

use crate::error::LedgerResult;
use crate::types::{TaskRecord, TaskStatus};
use crate::Ledger;

const INTERRUPTED: &str = "interrupted before completion";

pub struct TaskGuard<'a> {
    ledger: &'a dyn Ledger,
    record: TaskRecord,
    finished: bool,
}

impl<'a> TaskGuard<'a> {
    /// Persist `record` as Pending and take responsibility for finishing it.
    pub fn begin(ledger: &'a dyn Ledger, mut record: TaskRecord) -> LedgerResult<Self> {
        record.status = TaskStatus::Pending;
        record.reason = None;
        ledger.put(&record)?;
        Ok(Self {
            ledger,
            record,
            finished: false,
        })
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    pub fn set_ref_name(&mut self, ref_name: &str) {
        self.record.ref_name = ref_name.to_string();
    }

    pub fn set_digest(&mut self, digest: String) {
        self.record.digest = Some(digest);
    }

    /// Write Succeeded and return the stored record.
    pub fn succeed(mut self) -> LedgerResult<TaskRecord> {
        self.record.status = TaskStatus::Succeeded;
        self.record.reason = None;
        self.finish()
    }

    /// Write Failed with `reason` and return the stored record.
    pub fn fail(mut self, reason: impl Into<String>) -> LedgerResult<TaskRecord> {
        self.record.status = TaskStatus::Failed;
        self.record.reason = Some(reason.into());
        self.finish()
    }

    fn finish(&mut self) -> LedgerResult<TaskRecord> {
        self.ledger.put(&self.record)?;
        self.finished = true;
        Ok(self.record.clone())
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.record.status = TaskStatus::Failed;
        if self.record.reason.is_none() {
            self.record.reason = Some(INTERRUPTED.to_string());
        }
        warn!(
            kind = %self.record.kind,
            name = %self.record.name,
            "task abandoned without a terminal status, recording failure"
        );
        if let Err(e) = self.ledger.put(&self.record) {
            error!(
                kind = %self.record.kind,
                name = %self.record.name,
                error = %e,
                "failed to record abandoned task"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerStore;
    use crate::types::TaskKind;

    fn status(store: &LedgerStore, name: &str) -> TaskRecord {
        store.get("ns", TaskKind::Release, name).unwrap().unwrap()
    }

    #[test]
    fn begin_writes_pending() {
        let store = LedgerStore::open_in_memory().unwrap();
        let guard =
            TaskGuard::begin(&store, TaskRecord::pending("ns", TaskKind::Release, "api")).unwrap();
        assert_eq!(status(&store, "api").status, TaskStatus::Pending);
        guard.succeed().unwrap();
        assert_eq!(status(&store, "api").status, TaskStatus::Succeeded);
    }

    #[test]
    fn fail_keeps_reason() {
        let store = LedgerStore::open_in_memory().unwrap();
        let guard =
            TaskGuard::begin(&store, TaskRecord::pending("ns", TaskKind::Release, "api")).unwrap();
        guard.fail("exit status 2: no such file").unwrap();

        let rec = status(&store, "api");
        assert_eq!(rec.status, TaskStatus::Failed);
        assert_eq!(rec.reason.as_deref(), Some("exit status 2: no such file"));
    }

    #[test]
    fn dropped_guard_records_failure() {
        let store = LedgerStore::open_in_memory().unwrap();
        {
            let _guard =
                TaskGuard::begin(&store, TaskRecord::pending("ns", TaskKind::Release, "api"))
                    .unwrap();
        }
        let rec = status(&store, "api");
        assert_eq!(rec.status, TaskStatus::Failed);
        assert_eq!(rec.reason.as_deref(), Some(INTERRUPTED));
    }

    #[test]
    fn panic_unwind_records_failure() {
        let store = LedgerStore::open_in_memory().unwrap();
        let inner = store.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard =
                TaskGuard::begin(&inner, TaskRecord::pending("ns", TaskKind::Release, "api"))
                    .unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(status(&store, "api").status, TaskStatus::Failed);
    }

    #[test]
    fn ref_name_and_digest_carried_to_terminal_record() {
        let store = LedgerStore::open_in_memory().unwrap();
        let mut guard =
            TaskGuard::begin(&store, TaskRecord::pending("ns", TaskKind::Release, "api")).unwrap();
        guard.set_ref_name("prod-api");
        guard.set_digest("abc123".to_string());
        let rec = guard.succeed().unwrap();
        assert_eq!(rec.ref_name, "prod-api");
        assert_eq!(status(&store, "api").digest.as_deref(), Some("abc123"));
    }
}
