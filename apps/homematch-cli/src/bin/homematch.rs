use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use homematch_cli::app::{build_pipeline, evaluation_json, load_criteria, records_json};
use homematch_cli::{Cli, Commands};
use homematch_core::config::{Config, Settings};
use homematch_core::traits::{IndexOrigin, SimilarityIndex};
use homematch_pipeline::Cancellation;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// First Ctrl-C stops the run at the next stage boundary, a second one exits.
fn watch_ctrl_c(cancel: Cancellation) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() { return; }
        warn!("interrupt received; stopping after the current stage (Ctrl-C again to abort)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn emit(output: Option<&Path>, body: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{body}")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let env_name = cli.env.clone().unwrap_or_else(|| std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string()));
    let config = Config::load_from(&cli.config_dir, &env_name).context("loading configuration")?;
    let mut settings: Settings = config.settings()?;

    let cancel = Cancellation::new();
    watch_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Index(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            let pipeline = build_pipeline(&config, &settings, false)?;
            let handle = pipeline.index(&cancel).await?;
            let fragments = handle.index.fragment_count().await?;
            let origin = match handle.origin { IndexOrigin::Built => "built", IndexOrigin::Loaded => "reused" };
            info!(origin, fragments, dir = %settings.index.dir, "index ready");
        }
        Commands::Match(args) => {
            args.apply(&mut settings);
            settings.validate()?;
            let criteria = load_criteria(&settings.criteria, &cli.config_dir)?;
            let pipeline = build_pipeline(&config, &settings, false)?;
            let eval = pipeline.evaluate(&criteria, &cancel).await?;
            emit(None, &evaluation_json(&eval, &criteria)?)?;
        }
        Commands::Run(args) => {
            args.matching.apply(&mut settings);
            settings.validate()?;
            let criteria = load_criteria(&settings.criteria, &cli.config_dir)?;
            info!(criteria = criteria.len(), "loaded criteria");
            let pipeline = build_pipeline(&config, &settings, true)?;
            let records = pipeline.run(&criteria, &cancel).await?;
            emit(args.output.as_deref(), &records_json(&records)?)?;
        }
    }
    Ok(())
}
