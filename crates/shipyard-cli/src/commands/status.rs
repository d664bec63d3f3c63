use anyhow::Context;
use clap::ValueEnum;

use shipyard_ledger::{Ledger, TaskKind, TaskRecord};

use super::ClusterArgs;
use crate::OutputFormat;

/// Record kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Release,
    Volume,
    #[value(alias = "claim")]
    VolumeClaim,
    Background,
}

impl From<KindArg> for TaskKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Release => TaskKind::Release,
            KindArg::Volume => TaskKind::Volume,
            KindArg::VolumeClaim => TaskKind::VolumeClaim,
            KindArg::Background => TaskKind::Background,
        }
    }
}

pub fn status(cluster: &ClusterArgs, namespace: &str, format: OutputFormat) -> anyhow::Result<()> {
    let store = cluster.open_existing()?;
    let records = store
        .list(namespace)
        .with_context(|| format!("listing records in {namespace}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => print!("{}", render_table(&records)),
    }
    Ok(())
}

pub fn forget(cluster: &ClusterArgs, namespace: &str, kind: KindArg, name: &str) -> anyhow::Result<()> {
    let kind = TaskKind::from(kind);
    let store = cluster.open_existing()?;
    if store
        .delete(namespace, kind, name)
        .with_context(|| format!("deleting {kind} {name} in {namespace}"))?
    {
        println!("forgot {kind} {name} in {namespace}");
    } else {
        println!("no {kind} record named {name} in {namespace}");
    }
    Ok(())
}

fn render_table(records: &[TaskRecord]) -> String {
    if records.is_empty() {
        return "no records\n".to_string();
    }
    let mut out = format!(
        "{:<13} {:<24} {:<28} {:<10} {}\n",
        "KIND", "NAME", "REF", "STATUS", "REASON"
    );
    for r in records {
        out.push_str(&format!(
            "{:<13} {:<24} {:<28} {:<10} {}\n",
            r.kind.as_str(),
            r.name,
            r.ref_name,
            r.status.to_string(),
            r.reason.as_deref().unwrap_or("")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use shipyard_ledger::{LedgerStore, TaskStatus};

    use super::*;
    use crate::commands::file_ledger;

    fn kind(raw: &str) -> Result<TaskKind, String> {
        KindArg::from_str(raw, false).map(TaskKind::from)
    }

    #[test]
    fn kinds_parse() {
        assert_eq!(kind("release").unwrap(), TaskKind::Release);
        assert_eq!(kind("volume-claim").unwrap(), TaskKind::VolumeClaim);
        assert_eq!(kind("claim").unwrap(), TaskKind::VolumeClaim);
        assert_eq!(kind("background").unwrap(), TaskKind::Background);
        assert!(kind("pod").is_err());
    }

    #[test]
    fn table_lists_reasons() {
        let mut failed = TaskRecord::pending("ns", TaskKind::Release, "api");
        failed.status = TaskStatus::Failed;
        failed.reason = Some("chart: helm exited 1".to_string());
        let table = render_table(&[failed]);
        assert!(table.starts_with("KIND"));
        assert!(table.contains("failed"));
        assert!(table.contains("chart: helm exited 1"));
        assert_eq!(render_table(&[]), "no records\n");
    }

    #[test]
    fn forget_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("ledger.redb");
        {
            let store = super::super::open_ledger(&path).unwrap();
            store
                .put(&TaskRecord::pending("ns", TaskKind::Volume, "data"))
                .unwrap();
        }
        forget(&file_ledger(&path), "ns", KindArg::Volume, "data").unwrap();

        let store = LedgerStore::open(&path).unwrap();
        assert!(store.get("ns", TaskKind::Volume, "data").unwrap().is_none());
    }

    #[test]
    fn status_requires_existing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let missing = file_ledger(&dir.path().join("missing.redb"));
        let err = status(&missing, "ns", OutputFormat::Text).unwrap_err();
        assert!(err.to_string().contains("no ledger"));
        let err = forget(&missing, "ns", KindArg::Release, "api").unwrap_err();
        assert!(err.to_string().contains("no ledger"));
    }
}
