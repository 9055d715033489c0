//! `watch` command: one progress controller per tracked job, rendered as
//! terminal progress bars.

use std::collections::HashMap;

use anyhow::Result;
use flashdeck_client::{ConnectionState, JobProgressController, JobProgressView, TrackerConfig};
use flashdeck_core::{FileStore, JobRecord, JobRegistry};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cli::WatchArgs;

const BAR_TEMPLATE: &str = "{prefix:>14} [{bar:30.cyan/blue}] {pos:>3}% {msg}";

pub async fn run(registry: &JobRegistry<FileStore>, config: &TrackerConfig, args: WatchArgs) -> Result<()> {
    let jobs = match args.project.as_deref() {
        Some(project) => registry.list_by_project(project),
        None => registry.list(),
    };
    if jobs.is_empty() {
        eprintln!("No tracked jobs");
        return Ok(());
    }

    let sockets: HashMap<String, String> = args
        .sockets
        .into_iter()
        .map(|s| (s.job_id, s.address))
        .collect();

    let multi = MultiProgress::new();
    let mut renders = JoinSet::new();
    let mut controllers = Vec::with_capacity(jobs.len());

    for job in &jobs {
        let controller = match sockets.get(&job.id) {
            Some(address) => JobProgressController::socket(&job.id, address, config),
            None => JobProgressController::event_stream(&job.id, config),
        };
        let controller = match controller {
            Ok(controller) => controller,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Cannot follow job");
                continue;
            }
        };

        let bar = multi.add(job_bar(job));
        renders.spawn(render(controller.subscribe(), bar));
        controllers.push(controller);
    }
    info!(jobs = controllers.len(), "Following jobs");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping");
                break;
            }
            finished = renders.join_next() => match finished {
                Some(Ok(view)) => {
                    if view.connection == ConnectionState::Completed && args.remove_completed {
                        registry.remove(&view.job_id);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Progress display task failed"),
                None => break,
            },
        }
    }

    for controller in controllers {
        controller.shutdown().await;
    }
    registry.flush();
    Ok(())
}

fn job_bar(job: &JobRecord) -> ProgressBar {
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let bar = ProgressBar::new(100).with_style(style);
    bar.set_prefix(format!("{} {}", job.kind, job.id));
    bar
}

/// Mirror one controller's view onto its bar until no more updates follow.
async fn render(mut rx: watch::Receiver<JobProgressView>, bar: ProgressBar) -> JobProgressView {
    loop {
        let view = rx.borrow_and_update().clone();
        bar.set_position(view.progress_percent.round() as u64);

        match view.connection {
            ConnectionState::Completed => {
                let message = match &view.result_id {
                    Some(result) => format!("{} ({result})", view.status),
                    None => view.status.clone(),
                };
                bar.finish_with_message(message);
                return view;
            }
            ConnectionState::Failed => {
                bar.abandon_with_message(format!(
                    "failed: {}",
                    view.error.as_deref().unwrap_or("unknown error")
                ));
                return view;
            }
            ConnectionState::Disposed => {
                bar.abandon_with_message("stopped");
                return view;
            }
            ConnectionState::Reconnecting { failed_attempts } => {
                bar.set_message(format!("{} (reconnecting, {failed_attempts} failed)", view.status));
            }
            ConnectionState::Connecting | ConnectionState::Open => {
                let message = match &view.current_step {
                    Some(step) => format!("{}: {step}", view.status),
                    None => view.status.clone(),
                };
                bar.set_message(message);
            }
        }

        if rx.changed().await.is_err() {
            let view = rx.borrow().clone();
            bar.abandon();
            return view;
        }
    }
}
