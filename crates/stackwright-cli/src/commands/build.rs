//! Build-all-docker-images command - build every image of the main config

use console::style;
use stackwright_manifests::{ExternalTools, build_images_command, run_commands};

use super::{Context, generate_skaffolds, step};
use crate::error::Result;

pub async fn run(ctx: &Context, tools: &dyn ExternalTools) -> Result<()> {
    generate_skaffolds::run(ctx)?;

    step(&format!("Building images with tag {}", ctx.settings.images_tag));
    run_commands(tools, &[build_images_command(&ctx.settings)]).await?;
    println!("{} Images built", style("✓").green().bold());
    Ok(())
}
