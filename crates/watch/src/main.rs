// crates/watch/src/main.rs
//! flashdeck-watch binary.
//!
//! Manages the tracked job collection on disk and follows live progress of
//! tracked jobs. Logs go to stderr, filtered by `RUST_LOG`.

mod cli;
mod follow;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use flashdeck_client::TrackerConfig;
use flashdeck_core::{paths, FileStore, JobKind, JobRegistry, NewJob, PageOrigin};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

const DEFAULT_LOG_FILTER: &str = "warn,flashdeck_core=info,flashdeck_client=info,flashdeck_watch=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    // reqwest and tokio-tungstenite can each bring a rustls provider; pick one.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let registry = open_registry(cli.data_dir.as_deref())?;

    match cli.command {
        Command::List { project, json } => {
            let jobs = match project.as_deref() {
                Some(project) => registry.list_by_project(project),
                None => registry.list(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                eprintln!("No tracked jobs");
            } else {
                for job in jobs {
                    println!(
                        "{:<12} {:<14} {:<12} {}",
                        job.id,
                        job.kind.as_str(),
                        job.project_id.as_deref().unwrap_or("-"),
                        format_created(job.created_at),
                    );
                }
            }
        }
        Command::Track { id, kind, project, doc } => {
            let mut job = NewJob::new(id.as_str(), JobKind::from(kind.as_str()));
            if let Some(project) = project {
                job = job.with_project(project);
            }
            if let Some(doc) = doc {
                job = job.with_doc(doc);
            }
            if registry.register(job) {
                eprintln!("Tracking job {id}");
            } else {
                eprintln!("Job {id:?} not added: already tracked or not a valid id");
            }
        }
        Command::Remove { id } => {
            if registry.remove(&id) {
                eprintln!("Stopped tracking job {id}");
            } else {
                eprintln!("Job {id} is not tracked");
            }
        }
        Command::Clear => {
            let count = registry.len();
            registry.clear();
            eprintln!("Stopped tracking {count} job(s)");
        }
        Command::Watch(args) => {
            let config = tracker_config(&cli.api_base, cli.token, cli.origin.as_deref())?;
            follow::run(&registry, &config, args).await?;
        }
    }

    Ok(())
}

fn open_registry(data_dir: Option<&Path>) -> Result<JobRegistry<FileStore>> {
    let path = match data_dir {
        Some(dir) => paths::job_store_file(dir),
        None => paths::default_job_store_path().context("No data directory on this platform; pass --data-dir")?,
    };
    debug!(path = %path.display(), "Opening job registry");
    Ok(JobRegistry::recover(FileStore::new(path)))
}

fn tracker_config(api_base: &str, token: Option<String>, origin: Option<&str>) -> Result<TrackerConfig> {
    let page = match origin {
        Some(origin) => PageOrigin::parse(origin).with_context(|| format!("Invalid page origin {origin:?}"))?,
        None => PageOrigin::default(),
    };
    let config = TrackerConfig::new(api_base).with_page(page);
    Ok(match token {
        Some(token) => config.with_auth_token(token),
        None => config,
    })
}

fn format_created(created_at: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(created_at)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| created_at.to_string())
}
