use dockhand_deploy::Deployer;

pub async fn run(deployer: &Deployer, app: &str, version: u32) -> anyhow::Result<()> {
    let record = deployer.rollback(app, version).await?;
    println!("✓ Rolled back {app} to v{version} ({})", record.id);
    Ok(())
}

pub fn list(deployer: &Deployer, app: &str, format: &str) -> anyhow::Result<()> {
    let versions = deployer.list_rollbacks(app)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&versions)?),
        _ => {
            if versions.is_empty() {
                println!("No rollback versions for {app}");
            }
            for record in &versions {
                println!(
                    "v{:<4} {:<30} deployment {} ({} env vars)",
                    record.version,
                    record.image,
                    record.deployment_id,
                    record.env.len()
                );
            }
        }
    }
    Ok(())
}

pub async fn delete(deployer: &Deployer, app: &str, version: u32) -> anyhow::Result<()> {
    deployer.delete_rollback(app, version).await?;
    println!("✓ Deleted {app} v{version}");
    Ok(())
}
