use std::path::Path;

use dockhand_core::Network;
use dockhand_deploy::Deployer;

use super::read_document;

pub async fn create(deployer: &Deployer, file: &Path) -> anyhow::Result<()> {
    let network: Network = read_document(file)?;
    let ctx = deployer.context(network.server_id.as_deref())?;
    let created = deployer.networks().create(&ctx, network).await?;
    println!("✓ Created network {} ({})", created.network_name, created.id);
    Ok(())
}

pub async fn delete(deployer: &Deployer, id: &str, server: Option<&str>) -> anyhow::Result<()> {
    let ctx = deployer.context(server)?;
    deployer.networks().delete(&ctx, id).await?;
    println!("✓ Deleted network {id}");
    Ok(())
}

pub async fn assign(
    deployer: &Deployer,
    resource: &str,
    network: &str,
    server: Option<&str>,
) -> anyhow::Result<()> {
    let ctx = deployer.context(server)?;
    let summary = deployer.networks().assign(&ctx, resource, network).await?;
    println!(
        "✓ {} now uses {}",
        summary.id,
        summary.custom_network_ids.join(", ")
    );
    println!("  Redeploy {} to attach the running service.", summary.id);
    Ok(())
}

pub async fn unassign(
    deployer: &Deployer,
    resource: &str,
    network: &str,
    server: Option<&str>,
) -> anyhow::Result<()> {
    let ctx = deployer.context(server)?;
    deployer.networks().unassign(&ctx, resource, network).await?;
    println!("✓ Removed {network} from {resource}");
    Ok(())
}

pub async fn reconcile(deployer: &Deployer, server: Option<&str>) -> anyhow::Result<()> {
    let ctx = deployer.context(server)?;
    let stats = deployer.connectivity().reconcile(&ctx).await?;
    println!(
        "✓ Proxy on {ctx}: {} required, {} attached, {} detached",
        stats.networks_required, stats.attached, stats.detached
    );
    Ok(())
}
