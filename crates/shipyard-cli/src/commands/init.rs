use std::path::Path;

use anyhow::{Context, bail};

use shipyard_core::InstallDefinition;

/// Write a starter definition, refusing to clobber one unless forced.
pub fn init(name: &str, output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let content = InstallDefinition::scaffold(name)
        .to_toml_string()
        .context("serializing scaffold")?;
    std::fs::write(output, content).with_context(|| format!("writing {}", output.display()))?;
    println!("wrote {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("install.toml");
        init("platform", &path, false).unwrap();

        let def = InstallDefinition::from_file(&path).unwrap();
        assert_eq!(def.install.name, "platform");
        assert_eq!(def.releases.len(), 1);
    }

    #[test]
    fn refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("install.toml");
        std::fs::write(&path, "keep me").unwrap();

        assert!(init("platform", &path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");

        init("platform", &path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("platform"));
    }
}
