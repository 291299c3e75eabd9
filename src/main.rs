mod anthropic;
mod cli;
mod config;
mod coordinator;
mod error;
mod executor;
mod generation;
mod input;
mod logging;
mod pipeline;
mod router;
mod sink;
mod state_machine;
mod ui;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Style;
use tracing::{error, info};

use anthropic::AnthropicClient;
use cli::{Cli, Command};
use config::LotsawaConfig;
use coordinator::BatchCoordinator;
use executor::StageGraphExecutor;
use sink::JsonlSink;
use state_machine::WorkItem;
use ui::RunProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LotsawaConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    logging::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Command::Plan { input } => plan(&config, input),
        Command::Run { input, output } => run(&config, input, output).await,
    }
}

fn plan(config: &LotsawaConfig, input: &Path) -> Result<()> {
    let records =
        input::load_records(input).with_context(|| format!("loading {}", input.display()))?;
    let issues = input::validate_all(&records);
    let resumable = records.iter().filter(|r| r.aggregate_input.is_some()).count();
    let spec = config.pipeline_spec();

    println!("Pipeline:        {} ({:?} format loop)", spec.kind, spec.format_loop);
    println!("Target language: {}", config.target_language);
    println!("Items:           {}", records.len());
    println!(
        "Batches:         {} of up to {}",
        records.len().div_ceil(config.batch_size),
        config.batch_size
    );
    println!("Resuming:        {resumable}");

    if issues.is_empty() {
        println!("{}", Style::new().green().apply_to("Input is valid."));
    } else {
        let red = Style::new().red();
        for issue in &issues {
            println!("  {} {issue}", red.apply_to("✗"));
        }
    }
    Ok(())
}

async fn run(config: &LotsawaConfig, input: &Path, output: &str) -> Result<()> {
    let records =
        input::load_records(input).with_context(|| format!("loading {}", input.display()))?;
    let issues = input::validate_all(&records);
    if !issues.is_empty() {
        for issue in &issues {
            error!(%issue, "invalid input record");
        }
        bail!("{} invalid input record(s); run `lotsawa plan` for details", issues.len());
    }
    if config.api_key.is_empty() {
        bail!("no API key: set ANTHROPIC_API_KEY or `api_key` in lotsawa.toml");
    }

    let client = AnthropicClient::new(config).context("building HTTP client")?;
    let spec = config.pipeline_spec();
    let executor = StageGraphExecutor::new(
        &client,
        &spec,
        config.iteration_limits(),
        config.request_timeout(),
    );

    let items: Vec<WorkItem> = records
        .into_iter()
        .map(|record| record.into_work_item(&config.target_language))
        .collect();
    info!(
        pipeline = %spec.kind,
        items = items.len(),
        model = %config.model,
        "starting lotsawa run"
    );

    let (mut successes, mut failures) = JsonlSink::pair(output)?;
    let progress = RunProgress::start(items.len());
    let summary = BatchCoordinator::new(&executor, config.retry_policy(), &mut successes, &mut failures)
        .with_progress(&progress)
        .run(items)
        .await?;
    progress.finish(&summary);
    Ok(())
}
