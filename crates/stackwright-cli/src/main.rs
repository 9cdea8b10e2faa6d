//! Stackwright CLI - compose, render, seal and deploy Kubernetes environments

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stackwright_manifests::CliTools;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::{Context, GlobalArgs};
use error::Result;

#[derive(Parser)]
#[command(name = "stackwright")]
#[command(author = "Stackwright Contributors")]
#[command(version)]
#[command(about = "Compose Kubernetes components into Skaffold and Fleet trees, then render, seal and deploy them", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration document (default: environments/<env>/secrets/config_env.yaml)
    #[arg(short, long, global = true, env = "CONFIG_YAML_PATH")]
    config: Option<PathBuf>,

    /// Environment to compose
    #[arg(short, long, global = true, default_value = "sample")]
    environment: String,

    /// Image tag passed to skaffold (overrides IMAGES_TAG in the config document)
    #[arg(long, global = true, env = "IMAGES_TAG")]
    images_tag: Option<String>,

    /// Component directories rendered concurrently
    #[arg(long, global = true)]
    parallelism: Option<usize>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the environment into Skaffold and Fleet fragments
    GenerateSkaffolds,

    /// Render, split and seal the manifests of every component
    GenerateManifests,

    /// Build every image referenced by the main Skaffold config
    BuildAllDockerImages,

    /// Build and deploy with skaffold run
    DeployUsingSkaffold,

    /// Apply the sealed manifests with kubectl in dependency order
    DeployManifestsUsingKubectl,

    /// Apply the sealed manifests as Fleet bundles in dependency order
    DeployUsingFleetManifests,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let args = GlobalArgs {
        config: cli.config,
        environment: cli.environment,
        images_tag: cli.images_tag,
        parallelism: cli.parallelism,
    };
    let ctx = Context::load(&args)?;
    let tools = CliTools::new().with_kubeconfig(ctx.settings.kubeconfig.clone());
    let verbose = cli.debug;

    match cli.command {
        Commands::GenerateSkaffolds => commands::generate_skaffolds::run(&ctx).map(|_| ()),
        Commands::GenerateManifests => commands::generate_manifests::run(&ctx, &tools, verbose)
            .await
            .map(|_| ()),
        Commands::BuildAllDockerImages => commands::build::run(&ctx, &tools).await,
        Commands::DeployUsingSkaffold => commands::deploy::using_skaffold(&ctx, &tools).await,
        Commands::DeployManifestsUsingKubectl => {
            commands::deploy::using_kubectl(&ctx, &tools, verbose).await
        }
        Commands::DeployUsingFleetManifests => {
            commands::deploy::using_fleet(&ctx, &tools, verbose).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(exit_codes::USAGE_ERROR);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        let report: miette::Report = err.into();
        eprintln!("{:?}", report);
        std::process::exit(code);
    }
}
