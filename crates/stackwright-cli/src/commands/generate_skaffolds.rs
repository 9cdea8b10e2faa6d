//! Generate-skaffolds command - compose an environment into Skaffold and Fleet fragments

use stackwright_core::{GenerateReport, generate_skaffolds};

use super::{Context, step};
use crate::display;
use crate::error::Result;

pub fn run(ctx: &Context) -> Result<GenerateReport> {
    step(&format!(
        "Generating skaffolds for {} into {}",
        ctx.environment,
        ctx.settings.generated_skaffold_dir.display()
    ));
    let report = generate_skaffolds(ctx.environment, &ctx.doc, &ctx.settings)?;
    display::print_generate_report(&report);
    Ok(report)
}
