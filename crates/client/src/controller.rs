//! Job progress controller: one live progress channel per job, with its
//! state published for any number of observers.
//!
//! The controller never touches the job registry. Completion or failure is
//! only reported; removing the job is up to the owner.

use flashdeck_core::{
    event_stream_url, resolve_stream_url, ChannelKind, ChannelState, ProgressMachine, RetryPolicy,
    INITIAL_STATUS,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::config::TrackerConfig;
use crate::driver::run_channel;
use crate::error::TrackError;
use crate::event_stream::EventStreamConnector;
use crate::socket::SocketConnector;
use crate::transport::Connector;

/// Connection lifecycle as observers see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Waiting to redial after `failed_attempts` consecutive failures.
    Reconnecting { failed_attempts: u32 },
    Completed,
    Failed,
    Disposed,
}

impl ConnectionState {
    /// No further updates will follow.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ConnectionState::Completed | ConnectionState::Failed | ConnectionState::Disposed
        )
    }
}

/// Everything an observer needs to render one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressView {
    pub job_id: String,
    pub kind: ChannelKind,
    pub progress_percent: f64,
    pub status: String,
    pub current_step: Option<String>,
    pub result_id: Option<String>,
    /// Set once the channel has failed for good.
    pub error: Option<String>,
    /// The job finished, or the channel gave up on it.
    pub is_terminal: bool,
    pub connection: ConnectionState,
}

impl JobProgressView {
    fn initial(job_id: &str, kind: ChannelKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
            progress_percent: 0.0,
            status: INITIAL_STATUS.to_string(),
            current_step: None,
            result_id: None,
            error: None,
            is_terminal: false,
            connection: ConnectionState::Connecting,
        }
    }

    fn from_machine(job_id: &str, machine: &ProgressMachine) -> Self {
        let snap = machine.snapshot();
        let state = machine.state();
        let connection = match state {
            ChannelState::Idle | ChannelState::Connecting if machine.attempts() == 0 => {
                ConnectionState::Connecting
            }
            ChannelState::Idle | ChannelState::Connecting | ChannelState::Reconnecting => {
                ConnectionState::Reconnecting {
                    failed_attempts: machine.attempts(),
                }
            }
            ChannelState::Open => ConnectionState::Open,
            ChannelState::Completed => ConnectionState::Completed,
            ChannelState::Failed => ConnectionState::Failed,
            ChannelState::Disposed => ConnectionState::Disposed,
        };
        let error = match state {
            ChannelState::Failed => machine.last_error().map(ToString::to_string),
            _ => None,
        };

        Self {
            job_id: job_id.to_string(),
            kind: machine.kind(),
            progress_percent: snap.progress_percent,
            status: snap.status.clone(),
            current_step: snap.current_step.clone(),
            result_id: snap.result_id.clone(),
            error,
            is_terminal: matches!(state, ChannelState::Completed | ChannelState::Failed),
            connection,
        }
    }
}

/// Handle to one running progress channel. Dropping it disposes the channel.
pub struct JobProgressController {
    job_id: String,
    kind: ChannelKind,
    view: watch::Receiver<JobProgressView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JobProgressController {
    /// Track `job_id` over its event stream. Must be called inside a tokio runtime.
    pub fn event_stream(job_id: &str, config: &TrackerConfig) -> Result<Self, TrackError> {
        let url = event_stream_url(
            &config.api_base,
            &config.page,
            job_id,
            config.auth_token.as_deref(),
        )?;
        let connector = EventStreamConnector::new(config.http_client()?, url);
        Ok(Self::spawn(
            job_id,
            ChannelKind::EventStream,
            config.event_stream_retry,
            connector,
        ))
    }

    /// Track `job_id` over a socket at `address`, as handed out by the server.
    /// Must be called inside a tokio runtime.
    pub fn socket(job_id: &str, address: &str, config: &TrackerConfig) -> Result<Self, TrackError> {
        let url = resolve_stream_url(address, &config.api_base, &config.page, ChannelKind::Socket)?;
        Ok(Self::spawn(
            job_id,
            ChannelKind::Socket,
            config.socket_retry,
            SocketConnector::new(url),
        ))
    }

    /// Start a channel over any transport.
    pub fn spawn<C>(job_id: &str, kind: ChannelKind, policy: RetryPolicy, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        let (tx, rx) = watch::channel(JobProgressView::initial(job_id, kind));
        let cancel = CancellationToken::new();
        let span = info_span!("job_progress", job_id = %job_id, %kind);

        let task_cancel = cancel.clone();
        let task_job_id = job_id.to_string();
        let task = tokio::spawn(
            async move {
                let machine = ProgressMachine::new(kind, policy);
                let machine = run_channel(&connector, machine, task_cancel, |machine, _step| {
                    let next = JobProgressView::from_machine(&task_job_id, machine);
                    tx.send_if_modified(|current| {
                        if *current == next {
                            return false;
                        }
                        *current = next;
                        true
                    });
                })
                .await;
                debug!(state = ?machine.state(), attempts = machine.attempts(), "Progress channel finished");
            }
            .instrument(span),
        );

        Self {
            job_id: job_id.to_string(),
            kind,
            view: rx,
            cancel,
            task: Some(task),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Latest state.
    pub fn view(&self) -> JobProgressView {
        self.view.borrow().clone()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<JobProgressView> {
        self.view.clone()
    }

    /// Wait until the job completes or the channel fails. `None` when the
    /// controller was disposed first.
    pub async fn wait_terminal(&self) -> Option<JobProgressView> {
        let mut rx = self.view.clone();
        let view = rx.wait_for(|v| v.connection.is_final()).await.ok()?.clone();
        view.is_terminal.then_some(view)
    }

    /// Stop the channel: abandons any connection, read or pending retry.
    /// Idempotent; a no-op once the channel has finished.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    /// Dispose and wait for the channel task to release its connection.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(job_id = %self.job_id, error = %e, "Progress task ended abnormally");
            }
        }
    }
}

impl Drop for JobProgressController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
