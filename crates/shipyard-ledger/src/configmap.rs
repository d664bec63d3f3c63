//! Ledger kept in a namespaced cluster config object.
//!
//! Records for namespace `ns` live in one config object in `ns`, one
//! data entry per task keyed `{kind}.{name}`, each value the record as
//! JSON. Any host that can reach the cluster sees the same ledger.
//!
//! Every write is a read-modify-write of the whole object. A mutex
//! serializes those within the process; concurrent installers against
//! the same namespace are not supported.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{epoch_secs, TaskKind, TaskRecord};
use crate::Ledger;

/// Name of the config object holding the records.
pub const DEFAULT_CONFIG_MAP: &str = "shipyard-ledger";

/// String data of a config object.
pub type ConfigData = BTreeMap<String, String>;

/// Reads and replaces the data of one namespaced config object.
///
/// `read` returns `Ok(None)` only when the object (or its namespace) does
/// not exist; every other failure is an error.
pub trait ConfigMapClient: Send + Sync {
    fn read_config_map(&self, namespace: &str, name: &str) -> LedgerResult<Option<ConfigData>>;

    fn write_config_map(&self, namespace: &str, name: &str, data: &ConfigData) -> LedgerResult<()>;
}

impl<C: ConfigMapClient + ?Sized> ConfigMapClient for std::sync::Arc<C> {
    fn read_config_map(&self, namespace: &str, name: &str) -> LedgerResult<Option<ConfigData>> {
        (**self).read_config_map(namespace, name)
    }

    fn write_config_map(&self, namespace: &str, name: &str, data: &ConfigData) -> LedgerResult<()> {
        (**self).write_config_map(namespace, name, data)
    }
}

pub struct ConfigMapLedger<C> {
    client: C,
    name: String,
    write_lock: Mutex<()>,
}

impl<C: ConfigMapClient> ConfigMapLedger<C> {
    pub fn new(client: C) -> Self {
        Self::with_name(client, DEFAULT_CONFIG_MAP)
    }

    pub fn with_name(client: C, name: &str) -> Self {
        Self {
            client,
            name: name.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn data(&self, namespace: &str) -> LedgerResult<ConfigData> {
        Ok(self
            .client
            .read_config_map(namespace, &self.name)?
            .unwrap_or_default())
    }
}

/// Data key of a record; config object keys allow `[-._a-zA-Z0-9]`.
pub fn config_key(kind: TaskKind, name: &str) -> String {
    format!("{kind}.{name}")
}

fn decode(raw: &str) -> LedgerResult<TaskRecord> {
    serde_json::from_str(raw).map_err(|e| LedgerError::Deserialize(e.to_string()))
}

impl<C: ConfigMapClient> Ledger for ConfigMapLedger<C> {
    fn get(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<Option<TaskRecord>> {
        self.data(namespace)?
            .get(&config_key(kind, name))
            .map(|raw| decode(raw))
            .transpose()
    }

    fn put(&self, record: &TaskRecord) -> LedgerResult<()> {
        let key = config_key(record.kind, &record.name);
        let mut record = record.clone();
        record.updated_at = epoch_secs();
        let value =
            serde_json::to_string(&record).map_err(|e| LedgerError::Serialize(e.to_string()))?;

        let _held = self.lock();
        let mut data = self.data(&record.namespace)?;
        data.insert(key.clone(), value);
        self.client
            .write_config_map(&record.namespace, &self.name, &data)?;
        debug!(config_map = %self.name, namespace = %record.namespace, %key, status = %record.status, "task record stored");
        Ok(())
    }

    fn list(&self, namespace: &str) -> LedgerResult<Vec<TaskRecord>> {
        self.data(namespace)?.values().map(|raw| decode(raw)).collect()
    }

    fn delete(&self, namespace: &str, kind: TaskKind, name: &str) -> LedgerResult<bool> {
        let key = config_key(kind, name);
        let _held = self.lock();
        let mut data = self.data(namespace)?;
        let existed = data.remove(&key).is_some();
        if existed {
            self.client.write_config_map(namespace, &self.name, &data)?;
        }
        debug!(config_map = %self.name, %namespace, %key, existed, "task record deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::guard::TaskGuard;

    /// Config objects in a map. `unreachable` makes reads fail the way a
    /// lost cluster connection would.
    #[derive(Default)]
    struct Objects {
        maps: Mutex<BTreeMap<(String, String), ConfigData>>,
        unreachable: Mutex<bool>,
        writes: Mutex<usize>,
    }

    impl ConfigMapClient for Objects {
        fn read_config_map(&self, namespace: &str, name: &str) -> LedgerResult<Option<ConfigData>> {
            if *self.unreachable.lock().unwrap() {
                return Err(LedgerError::Read("connection refused".to_string()));
            }
            Ok(self
                .maps
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        }

        fn write_config_map(&self, namespace: &str, name: &str, data: &ConfigData) -> LedgerResult<()> {
            *self.writes.lock().unwrap() += 1;
            self.maps
                .lock()
                .unwrap()
                .insert((namespace.to_string(), name.to_string()), data.clone());
            Ok(())
        }
    }

    fn ledger() -> (Arc<Objects>, ConfigMapLedger<Arc<Objects>>) {
        let objects = Arc::new(Objects::default());
        (objects.clone(), ConfigMapLedger::new(objects))
    }

    #[test]
    fn missing_object_reads_as_empty() {
        let (_, ledger) = ledger();
        assert!(ledger.get("ns", TaskKind::Release, "api").unwrap().is_none());
        assert!(ledger.list("ns").unwrap().is_empty());
    }

    #[test]
    fn records_stored_under_kind_and_name() {
        let (objects, ledger) = ledger();
        ledger
            .put(&TaskRecord::pending("ns", TaskKind::Volume, "data").with_ref_name("data-k2j9x"))
            .unwrap();
        ledger
            .put(&TaskRecord::pending("ns", TaskKind::VolumeClaim, "data"))
            .unwrap();

        let maps = objects.maps.lock().unwrap();
        let data = &maps[&("ns".to_string(), DEFAULT_CONFIG_MAP.to_string())];
        assert_eq!(
            data.keys().collect::<Vec<_>>(),
            vec!["volume-claim.data", "volume.data"]
        );
        assert!(data["volume.data"].contains("data-k2j9x"));
    }

    #[test]
    fn guard_round_trip_and_namespace_isolation() {
        let (_, ledger) = ledger();
        let guard =
            TaskGuard::begin(&ledger, TaskRecord::pending("ns1", TaskKind::Release, "api")).unwrap();
        guard.succeed().unwrap();

        assert!(ledger.succeeded("ns1", TaskKind::Release, "api").unwrap());
        assert!(!ledger.succeeded("ns2", TaskKind::Release, "api").unwrap());
        assert_eq!(ledger.list("ns1").unwrap().len(), 1);
    }

    #[test]
    fn delete_rewrites_only_when_present() {
        let (objects, ledger) = ledger();
        ledger
            .put(&TaskRecord::pending("ns", TaskKind::Release, "api"))
            .unwrap();
        assert_eq!(*objects.writes.lock().unwrap(), 1);

        assert!(ledger.delete("ns", TaskKind::Release, "api").unwrap());
        assert!(!ledger.delete("ns", TaskKind::Release, "api").unwrap());
        assert_eq!(*objects.writes.lock().unwrap(), 2);
    }

    #[test]
    fn unreachable_cluster_is_an_error_not_an_empty_ledger() {
        let (objects, ledger) = ledger();
        *objects.unreachable.lock().unwrap() = true;
        assert!(matches!(
            ledger.get("ns", TaskKind::Release, "api"),
            Err(LedgerError::Read(_))
        ));
    }

    #[test]
    fn corrupt_entry_surfaces_as_deserialize_error() {
        let (objects, ledger) = ledger();
        let mut data = ConfigData::new();
        data.insert(config_key(TaskKind::Release, "api"), "{not json".to_string());
        objects.write_config_map("ns", DEFAULT_CONFIG_MAP, &data).unwrap();

        let err = ledger.get("ns", TaskKind::Release, "api").unwrap_err();
        assert!(matches!(err, LedgerError::Deserialize(_)));
        assert!(ledger.list("ns").is_err());
    }
}
