use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use flashdeck_client::DEFAULT_API_BASE;

#[derive(Parser, Debug)]
#[command(name = "flashdeck-watch")]
#[command(about = "Inspect tracked flashdeck jobs and follow their progress live")]
#[command(version)]
pub struct Cli {
    /// Directory holding the tracked job collection
    #[arg(long, env = "FLASHDECK_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// API base, absolute or page-relative
    #[arg(long, env = "FLASHDECK_API_BASE", default_value = DEFAULT_API_BASE, global = true)]
    pub api_base: String,

    /// Token passed to progress streams
    #[arg(long, env = "FLASHDECK_AUTH_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Origin of the page relative addresses resolve against, e.g. https://app.example.com
    #[arg(long, env = "FLASHDECK_PAGE_ORIGIN", global = true)]
    pub origin: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List tracked jobs
    List {
        /// Only jobs of this project
        #[arg(short, long)]
        project: Option<String>,

        /// Print the raw records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start tracking a job
    Track {
        id: String,

        /// Job type, e.g. document or flashcard-set
        #[arg(long = "type", default_value = "document")]
        kind: String,

        #[arg(short, long)]
        project: Option<String>,

        #[arg(long)]
        doc: Option<String>,
    },

    /// Stop tracking a job
    Remove { id: String },

    /// Stop tracking every job
    Clear,

    /// Follow live progress of tracked jobs
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Only jobs of this project
    #[arg(short, long)]
    pub project: Option<String>,

    /// Follow a job over a WebSocket instead of its event stream
    #[arg(long = "socket", value_name = "ID=ADDRESS")]
    pub sockets: Vec<SocketAssignment>,

    /// Stop tracking jobs once they complete
    #[arg(long)]
    pub remove_completed: bool,
}

/// `<job id>=<socket address>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAssignment {
    pub job_id: String,
    pub address: String,
}

impl FromStr for SocketAssignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (job_id, address) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ID=ADDRESS, got {s:?}"))?;
        let (job_id, address) = (job_id.trim(), address.trim());
        if job_id.is_empty() || address.is_empty() {
            return Err(format!("expected ID=ADDRESS, got {s:?}"));
        }
        Ok(Self {
            job_id: job_id.to_string(),
            address: address.to_string(),
        })
    }
}
