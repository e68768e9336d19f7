use std::path::Path;

use dockhand_core::ServiceDefinition;
use dockhand_deploy::Deployer;

use super::read_document;

pub async fn deploy(deployer: &Deployer, file: &Path, title: &str) -> anyhow::Result<()> {
    let def: ServiceDefinition = read_document(file)?;
    match deployer.deploy(&def, title).await {
        Ok(record) => {
            println!("✓ Deployed {} ({})", record.app_name, record.id);
            if let Some(image) = &record.image {
                println!("  Image: {image}");
            }
            if let Some(version) = record.rollback_version {
                println!("  Rollback version: v{version}");
            }
            println!("  Log: {}", record.log_path);
            Ok(())
        }
        Err(e) => {
            eprintln!("Deploy failed: {e}");
            Err(e.into())
        }
    }
}

/// Print the routing labels `file` would be deployed with, as JSON.
pub fn labels(deployer: &Deployer, file: &Path) -> anyhow::Result<()> {
    let def: ServiceDefinition = read_document(file)?;
    let renderer = deployer.renderer();
    let networks = renderer.custom_networks(&def)?;
    let generated = renderer.routing_labels(&def, &networks)?;
    let merged = dockhand_proxy::merge_labels(&def.labels, &generated);
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}
