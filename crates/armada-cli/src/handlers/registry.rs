//! Registry inspection and maintenance commands.

use anyhow::{anyhow, Result};
use armada_core::{ArmadaConfig, SystemClock, Version, VersionKind};
use armada_registry::VersionRegistry;
use std::sync::Arc;

/// Connect to the configured registry with the system clock.
pub fn connect(config: &ArmadaConfig) -> Result<VersionRegistry> {
    Ok(VersionRegistry::connect(
        &config.registry,
        Arc::new(SystemClock::new()),
    )?)
}

async fn resolve(registry: &VersionRegistry, version: Option<String>) -> Result<Version> {
    match version {
        Some(version) => Ok(Version::new(version)),
        None => Ok(registry.get_check_latest_version().await?),
    }
}

fn show_version(version: Option<Version>) -> String {
    version.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub async fn status(registry: &VersionRegistry) -> Result<()> {
    println!("Registry: {}", registry.store().backend_name());
    println!("  TEMP:     {}", show_version(registry.get_temp_version().await?));
    println!("  DEPLOYED: {}", show_version(registry.get_deployed_version().await?));

    match registry.pending_transition().await? {
        Some(marker) => println!(
            "  Interrupted promotion of {} (previous DEPLOYED {}) - run `armada recover`",
            marker.target_version,
            show_version(marker.previous_deployed)
        ),
        None => println!("  No interrupted promotion"),
    }
    Ok(())
}

pub async fn versions(registry: &VersionRegistry) -> Result<()> {
    let rows = registry.list_versions().await?;
    if rows.is_empty() {
        println!("No versions recorded");
        return Ok(());
    }
    for row in rows {
        println!(
            "{:<9} {}{}",
            row.kind.as_str(),
            row.version,
            row.contracts_version
                .map(|cv| format!(" (contracts {cv})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn contracts(registry: &VersionRegistry, version: Option<String>) -> Result<()> {
    let version = resolve(registry, version).await?;
    let records = registry.get_contracts(&version).await?;
    println!("Version {version}: {} contract(s)", records.len());
    for record in records {
        match &record.implementation {
            Some(implementation) => println!(
                "  {:<18} {} -> {}",
                record.name, record.address, implementation
            ),
            None => println!("  {:<18} {}", record.name, record.address),
        }
    }
    Ok(())
}

pub async fn show(registry: &VersionRegistry, name: &str, version: Option<String>) -> Result<()> {
    let version = resolve(registry, version).await?;
    let record = registry
        .get_contract(name, Some(&version))
        .await?
        .ok_or_else(|| anyhow!("{name} is not recorded under version {version}"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn configure(registry: &VersionRegistry, version: Option<String>) -> Result<()> {
    let explicit = version.map(Version::new);
    let resolved = registry.configure_versioning(explicit.as_ref()).await?;
    let kind = if registry.get_temp_version().await?.as_ref() == Some(&resolved) {
        VersionKind::Temp
    } else {
        VersionKind::Deployed
    };
    println!("Working version: {resolved} ({kind})");
    Ok(())
}

pub async fn finalize(registry: &VersionRegistry, version: Option<String>) -> Result<()> {
    let explicit = version.map(Version::new);
    registry.finalize_deployed_version(explicit.as_ref()).await?;
    println!(
        "DEPLOYED: {}",
        show_version(registry.get_deployed_version().await?)
    );
    Ok(())
}

pub async fn clear(registry: &VersionRegistry, version: String) -> Result<()> {
    let version = Version::new(version);
    if registry.get_deployed_version().await?.as_ref() == Some(&version) {
        return Err(anyhow!("refusing to clear the DEPLOYED version {version}"));
    }
    registry.clear_db_for_version(&version).await?;
    println!("Cleared version {version}");
    Ok(())
}

pub async fn recover(registry: &VersionRegistry) -> Result<()> {
    match registry.recover_interrupted_transition().await? {
        Some(version) => println!("Finished promotion of {version}"),
        None => println!("Nothing to recover"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_core::RegistryConfig;

    fn redb_config(dir: &std::path::Path) -> ArmadaConfig {
        ArmadaConfig {
            registry: RegistryConfig::redb(dir, "cli-test"),
            ..ArmadaConfig::default()
        }
    }

    #[tokio::test]
    async fn test_configure_and_finalize_persist_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let config = redb_config(dir.path());

        let registry = connect(&config).unwrap();
        configure(&registry, Some("100".to_string())).await.unwrap();
        finalize(&registry, None).await.unwrap();
        registry.close().await.unwrap();

        let registry = connect(&config).unwrap();
        assert_eq!(
            registry.get_deployed_version().await.unwrap(),
            Some(Version::new("100"))
        );
        status(&registry).await.unwrap();
        versions(&registry).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_refuses_deployed_version() {
        let dir = tempfile::tempdir().unwrap();
        let registry = connect(&redb_config(dir.path())).unwrap();
        configure(&registry, Some("100".to_string())).await.unwrap();
        finalize(&registry, None).await.unwrap();

        assert!(clear(&registry, "100".to_string()).await.is_err());
        configure(&registry, Some("200".to_string())).await.unwrap();
        clear(&registry, "200".to_string()).await.unwrap();
        assert_eq!(registry.get_temp_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_show_missing_contract_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = connect(&redb_config(dir.path())).unwrap();
        assert!(show(&registry, "Registry", None).await.is_err());
        configure(&registry, None).await.unwrap();
        assert!(show(&registry, "Registry", None).await.is_err());
        contracts(&registry, None).await.unwrap();
    }
}
