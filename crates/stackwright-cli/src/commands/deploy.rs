//! Deploy commands - Skaffold, kubectl or Fleet

use console::style;
use stackwright_manifests::{
    ExternalTools, fleet_deploy_commands, kubectl_deploy_commands, load_fleet_graph,
    run_commands, skaffold_deploy_command,
};

use super::{Context, generate_manifests, generate_skaffolds, step};
use crate::error::Result;

/// Build and deploy everything through the main Skaffold config
pub async fn using_skaffold(ctx: &Context, tools: &dyn ExternalTools) -> Result<()> {
    generate_skaffolds::run(ctx)?;

    step("Deploying with skaffold");
    run_commands(tools, &[skaffold_deploy_command(&ctx.settings)]).await?;
    println!("{} Deployed {}", style("✓").green().bold(), ctx.environment);
    Ok(())
}

/// Apply the sealed manifests component by component
pub async fn using_kubectl(ctx: &Context, tools: &dyn ExternalTools, verbose: bool) -> Result<()> {
    generate_manifests::run(ctx, tools, verbose).await?;

    let graph = load_fleet_graph(&ctx.settings.generated_skaffold_dir)?;
    let commands = kubectl_deploy_commands(&ctx.settings, &graph)?;
    step(&format!("Applying {} component(s) with kubectl", commands.len()));
    run_commands(tools, &commands).await?;
    println!("{} Applied {}", style("✓").green().bold(), ctx.environment);
    Ok(())
}

/// Hand the sealed manifests to Fleet as one bundle per component
pub async fn using_fleet(ctx: &Context, tools: &dyn ExternalTools, verbose: bool) -> Result<()> {
    generate_manifests::run(ctx, tools, verbose).await?;

    let graph = load_fleet_graph(&ctx.settings.generated_skaffold_dir)?;
    let commands = fleet_deploy_commands(&ctx.settings, &graph);
    step(&format!("Applying {} Fleet bundle(s)", commands.len()));
    run_commands(tools, &commands).await?;
    println!("{} Bundles applied for {}", style("✓").green().bold(), ctx.environment);
    Ok(())
}
