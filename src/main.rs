// Entry point and high-level CLI flow.
//
// - `run` fetches the window from the Find a Tender API, transforms it and
//   writes the report, advancing the run metadata on success.
// - `transform` does the same from saved release-package files.
// - `status` prints the run metadata and the next fetch window.
mod checkpoint;
mod classify;
mod config;
mod error;
mod fetch;
mod job;
mod loader;
mod mappers;
mod output;
mod reports;
mod sanitize;
mod types;
mod util;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use checkpoint::MetadataStore;
use clap::Parser;
use config::{Cli, Command, ReportArgs};
use fetch::{ApiClient, FetchWindow, ReleaseSource};
use job::{JobRequest, JobRunner, RunOutcome, RunState, Trigger};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run one job to completion, then write and preview the published report.
fn execute<S>(runner: JobRunner<S>, request: JobRequest, report: &ReportArgs) -> Result<()>
where
    S: ReleaseSource + Send + Sync + 'static,
{
    let handle = match runner.trigger(request) {
        Trigger::Started(handle) => handle,
        Trigger::InProgress => bail!(error::ReportError::Busy),
    };
    let outcome = handle
        .join()
        .map_err(|_| anyhow::anyhow!("job thread terminated unexpectedly"))?;

    match &outcome {
        RunOutcome::Succeeded(message) => println!("{}\n", message),
        RunOutcome::Failed(message) => bail!("run failed: {}", message),
    }

    let Some(latest) = runner.state().latest_report() else {
        bail!("run succeeded without publishing a report");
    };
    let files = output::write_report(&report.out_dir, &latest)
        .with_context(|| format!("writing report to {}", report.out_dir.display()))?;

    output::preview_report(&latest, report.preview_rows);
    println!("(Full report exported to {} files in {})\n", files.len(), report.out_dir.display());
    println!("{}", serde_json::to_string_pretty(&runner.state().status())?);
    Ok(())
}

fn handle_run(
    api: config::ApiArgs,
    report: ReportArgs,
    metadata: std::path::PathBuf,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let store = MetadataStore::open(metadata);
    let meta = store
        .load()
        .with_context(|| format!("reading run metadata from {}", store.path().display()))?;
    let window = meta.window(from, to, Utc::now());

    let client = ApiClient::new(api.settings())?;
    let runner = JobRunner::new(client, Arc::new(RunState::new()), Some(store));
    let request = JobRequest { window, filter: report.filter() };
    execute(runner, request, &report)
}

fn handle_transform(inputs: Vec<std::path::PathBuf>, report: ReportArgs) -> Result<()> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let runner = JobRunner::new(loader::FileSource::new(inputs), Arc::new(RunState::new()), None);
    let request = JobRequest {
        window: FetchWindow { from: now.clone(), to: now },
        filter: report.filter(),
    };
    execute(runner, request, &report)
}

fn handle_status(metadata: std::path::PathBuf) -> Result<()> {
    let store = MetadataStore::open(metadata);
    let meta = store.load()?;
    let next = meta.window(None, None, Utc::now());
    let status = json!({
        "metadata": meta,
        "next_window": { "updatedFrom": next.from, "updatedTo": next.to },
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run { api, report, metadata, from, to } => handle_run(api, report, metadata, from, to),
        Command::Transform { inputs, report } => handle_transform(inputs, report),
        Command::Status { metadata } => handle_status(metadata),
    }
}
