//! Generate-manifests command - render, split and seal every component

use console::style;
use stackwright_manifests::{
    ExternalTools, ManifestPipeline, PipelineOptions, PipelineReport, ProgressReporter,
};

use super::{Context, generate_skaffolds, step};
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(
    ctx: &Context,
    tools: &dyn ExternalTools,
    verbose: bool,
) -> Result<PipelineReport> {
    generate_skaffolds::run(ctx)?;

    step(&format!(
        "Rendering manifests into {}",
        ctx.settings.generated_manifests_dir.display()
    ));
    let progress = if verbose {
        ProgressReporter::new().verbose()
    } else {
        ProgressReporter::new()
    };
    let options = PipelineOptions::from_settings(&ctx.settings);
    let report = ManifestPipeline::new(tools, &progress, options).run().await?;

    display::print_pipeline_failures(&report);
    progress.print_summary();
    match report.primary_error() {
        None => {
            println!(
                "{} Sealed {} secret(s)",
                style("✓").green(),
                report.sealed_count()
            );
            Ok(report)
        }
        Some(error) => Err(CliError::from(error)),
    }
}
