//! Progress channel state machine.
//!
//! Protocol- and socket-independent: the driver feeds in what happened on the
//! wire as [`ChannelEvent`]s and carries out the returned [`Effect`]s.
//!
//! ```text
//! Idle → Connecting → Open → {Reconnecting → Connecting}* → Completed | Failed | Disposed
//! ```
//!
//! Terminal states have no exits: once there, every event is ignored.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::ChannelError;
use crate::progress::{parse_socket_message, ProgressSnapshot, ProgressUpdate, StreamFrame};
use crate::retry::RetryPolicy;

/// WebSocket close code for an intentional, successful stop.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reason sent with the self-requested normal closure.
pub const COMPLETED_CLOSE_REASON: &str = "job completed";

/// Wire protocol a channel speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// Server-sent events, one-way.
    EventStream,
    /// WebSocket, used one-way.
    Socket,
}

impl ChannelKind {
    /// Event streams retry (4 attempts, 3s apart); sockets connect once.
    pub fn default_policy(self) -> RetryPolicy {
        match self {
            ChannelKind::EventStream => RetryPolicy::default(),
            ChannelKind::Socket => RetryPolicy::single_shot(),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::EventStream => write!(f, "event-stream"),
            ChannelKind::Socket => write!(f, "socket"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Completed,
    Failed,
    Disposed,
}

impl ChannelState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelState::Completed | ChannelState::Failed | ChannelState::Disposed
        )
    }
}

/// Something that happened to the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Start the first connection.
    Dial,
    /// The transport finished its handshake.
    Opened,
    /// One inbound text frame, undecoded.
    Message(String),
    /// Connecting failed, or the connection errored.
    TransportError(ChannelError),
    /// The peer or the network closed the connection. `code` is only known
    /// for sockets.
    Closed { code: Option<u16>, reason: String },
    /// The reconnection delay elapsed.
    RetryTimerFired,
    Dispose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Tear the connection down without ceremony.
    Drop,
    /// Socket only: send close code 1000 with [`COMPLETED_CLOSE_REASON`].
    Normal,
}

/// What the driver must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Connect,
    /// Release the current connection, then fire `RetryTimerFired` after the delay.
    ScheduleRetry(Duration),
    Close(CloseKind),
}

/// Result of feeding one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    /// Present when a data-bearing frame was applied.
    pub snapshot: Option<ProgressSnapshot>,
    pub effect: Option<Effect>,
}

impl Step {
    fn none() -> Self {
        Self::default()
    }

    fn effect(effect: Effect) -> Self {
        Self {
            snapshot: None,
            effect: Some(effect),
        }
    }
}

/// State of one progress channel.
#[derive(Debug, Clone)]
pub struct ProgressMachine {
    kind: ChannelKind,
    policy: RetryPolicy,
    state: ChannelState,
    attempts: u32,
    snapshot: ProgressSnapshot,
    close_requested: bool,
    last_error: Option<ChannelError>,
}

impl ProgressMachine {
    pub fn new(kind: ChannelKind, policy: RetryPolicy) -> Self {
        Self {
            kind,
            policy,
            state: ChannelState::Idle,
            attempts: 0,
            snapshot: ProgressSnapshot::default(),
            close_requested: false,
            last_error: None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Consecutive failed attempts since the last well-formed message.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Most recent failure. Final once the state is `Failed`.
    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    /// Apply one event.
    pub fn step(&mut self, event: ChannelEvent) -> Step {
        if self.state.is_terminal() {
            trace!(state = ?self.state, ?event, "Ignoring event on finished channel");
            return Step::none();
        }

        match (self.state, event) {
            (_, ChannelEvent::Dispose) => {
                debug!(kind = %self.kind, "Channel disposed");
                self.state = ChannelState::Disposed;
                Step::effect(Effect::Close(CloseKind::Drop))
            }
            (ChannelState::Idle, ChannelEvent::Dial)
            | (ChannelState::Reconnecting, ChannelEvent::RetryTimerFired) => {
                self.state = ChannelState::Connecting;
                Step::effect(Effect::Connect)
            }
            (ChannelState::Connecting, ChannelEvent::Opened) => {
                debug!(kind = %self.kind, "Channel open");
                self.state = ChannelState::Open;
                Step::none()
            }
            (ChannelState::Connecting | ChannelState::Open, ChannelEvent::Message(text)) => self.on_message(&text),
            (ChannelState::Connecting | ChannelState::Open, ChannelEvent::TransportError(error)) => {
                self.on_failure(error)
            }
            (ChannelState::Connecting | ChannelState::Open, ChannelEvent::Closed { code, reason }) => {
                self.on_closed(code, reason)
            }
            (state, event) => {
                trace!(?state, ?event, "Event not applicable in current state");
                Step::none()
            }
        }
    }

    fn on_message(&mut self, text: &str) -> Step {
        let update = match self.decode(text) {
            Ok(update) => update,
            Err(reason) => {
                warn!(kind = %self.kind, error = %reason, "Skipping malformed progress frame");
                return Step::none();
            }
        };

        // Any well-formed message proves the link is healthy, keep-alives included.
        self.attempts = 0;
        if self.state == ChannelState::Connecting {
            self.state = ChannelState::Open;
        }
        let Some(update) = update else {
            return Step::none();
        };

        self.snapshot.apply(&update);
        let snapshot = Some(self.snapshot.clone());
        if !self.snapshot.is_terminal() {
            return Step { snapshot, effect: None };
        }

        info!(kind = %self.kind, status = %self.snapshot.status, "Job reached terminal state");
        self.state = ChannelState::Completed;
        let close = match self.kind {
            ChannelKind::EventStream => CloseKind::Drop,
            ChannelKind::Socket => {
                self.close_requested = true;
                CloseKind::Normal
            }
        };
        Step {
            snapshot,
            effect: Some(Effect::Close(close)),
        }
    }

    /// `Ok(None)` is a well-formed frame without progress data.
    fn decode(&self, text: &str) -> Result<Option<ProgressUpdate>, crate::error::FrameError> {
        match self.kind {
            ChannelKind::EventStream => Ok(StreamFrame::parse(text)?.update().cloned()),
            ChannelKind::Socket => parse_socket_message(text).map(Some),
        }
    }

    fn on_closed(&mut self, code: Option<u16>, reason: String) -> Step {
        let intentional = self.close_requested
            || self.snapshot.is_terminal()
            || (code == Some(NORMAL_CLOSURE) && !reason.is_empty());
        if intentional {
            info!(kind = %self.kind, ?code, %reason, "Channel closed after completion");
            self.state = ChannelState::Completed;
            return Step::effect(Effect::Close(CloseKind::Drop));
        }
        self.on_failure(ChannelError::UnexpectedClose { code, reason })
    }

    fn on_failure(&mut self, error: ChannelError) -> Step {
        self.attempts += 1;

        if self.attempts >= self.policy.max_attempts {
            warn!(
                kind = %self.kind,
                attempts = self.attempts,
                error = %error,
                "Progress channel failed"
            );
            self.last_error = Some(if self.policy.retries() {
                ChannelError::RetriesExhausted {
                    attempts: self.attempts,
                    last_error: error.to_string(),
                }
            } else {
                error
            });
            self.state = ChannelState::Failed;
            return Step::effect(Effect::Close(CloseKind::Drop));
        }

        warn!(
            kind = %self.kind,
            attempt = self.attempts,
            max_attempts = self.policy.max_attempts,
            delay_secs = self.policy.delay.as_secs_f64(),
            error = %error,
            "Progress channel dropped, reconnecting"
        );
        self.last_error = Some(error);
        self.state = ChannelState::Reconnecting;
        Step::effect(Effect::ScheduleRetry(self.policy.delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn refused() -> ChannelEvent {
        ChannelEvent::TransportError(ChannelError::Connect("connection refused".into()))
    }

    fn msg(text: &str) -> ChannelEvent {
        ChannelEvent::Message(text.to_string())
    }

    fn open(kind: ChannelKind) -> ProgressMachine {
        let mut m = ProgressMachine::new(kind, kind.default_policy());
        assert_eq!(m.step(ChannelEvent::Dial).effect, Some(Effect::Connect));
        m.step(ChannelEvent::Opened);
        assert_eq!(m.state(), ChannelState::Open);
        m
    }

    /// Fail the current attempt, then let the retry timer fire.
    fn fail_and_retry(m: &mut ProgressMachine) {
        let step = m.step(refused());
        assert_eq!(step.effect, Some(Effect::ScheduleRetry(Duration::from_secs(3))));
        assert_eq!(m.state(), ChannelState::Reconnecting);
        assert_eq!(m.step(ChannelEvent::RetryTimerFired).effect, Some(Effect::Connect));
    }

    #[test]
    fn test_retry_bound_exact() {
        let mut m = ProgressMachine::new(ChannelKind::EventStream, RetryPolicy::default());
        m.step(ChannelEvent::Dial);

        for _ in 0..3 {
            fail_and_retry(&mut m);
        }
        assert_eq!(m.attempts(), 3);

        let step = m.step(refused());
        assert_eq!(step.effect, Some(Effect::Close(CloseKind::Drop)));
        assert_eq!(m.state(), ChannelState::Failed);
        assert!(matches!(
            m.last_error(),
            Some(ChannelError::RetriesExhausted { attempts: 4, .. })
        ));
    }

    #[test]
    fn test_keep_alive_resets_attempts() {
        let mut m = ProgressMachine::new(ChannelKind::EventStream, RetryPolicy::default());
        m.step(ChannelEvent::Dial);
        fail_and_retry(&mut m);
        fail_and_retry(&mut m);
        assert_eq!(m.attempts(), 2);

        m.step(ChannelEvent::Opened);
        let step = m.step(msg(r#"{"type":"ping"}"#));
        assert_eq!(step, Step::default());
        assert_eq!(m.attempts(), 0);

        fail_and_retry(&mut m);
        fail_and_retry(&mut m);
        assert_eq!(m.attempts(), 2);
        assert_eq!(m.state(), ChannelState::Connecting);
    }

    #[test]
    fn test_malformed_frame_does_not_touch_attempts() {
        let mut m = ProgressMachine::new(ChannelKind::EventStream, RetryPolicy::default());
        m.step(ChannelEvent::Dial);
        fail_and_retry(&mut m);
        m.step(ChannelEvent::Opened);

        let step = m.step(msg("<html>502 Bad Gateway</html>"));
        assert_eq!(step, Step::default());
        assert_eq!(m.attempts(), 1);
        assert_eq!(m.state(), ChannelState::Open);
    }

    #[test]
    fn test_event_stream_progress_then_complete() {
        let mut m = open(ChannelKind::EventStream);

        let step = m.step(msg(r#"{"type":"progress","progress":40,"status":"processing"}"#));
        let snap = step.snapshot.unwrap();
        assert_eq!(snap.progress_percent, 40.0);
        assert_eq!(snap.status, "processing");
        assert_eq!(step.effect, None);

        let step = m.step(msg(r#"{"type":"progress","progress":100,"status":"completed"}"#));
        assert_eq!(step.snapshot.unwrap().progress_percent, 100.0);
        assert_eq!(step.effect, Some(Effect::Close(CloseKind::Drop)));
        assert_eq!(m.state(), ChannelState::Completed);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut m = open(ChannelKind::EventStream);
        m.step(msg(r#"{"type":"snapshot","progress":100}"#));
        assert_eq!(m.state(), ChannelState::Completed);

        for event in [
            msg(r#"{"type":"progress","progress":10,"status":"processing"}"#),
            refused(),
            ChannelEvent::Closed { code: None, reason: String::new() },
            ChannelEvent::RetryTimerFired,
            ChannelEvent::Dispose,
        ] {
            assert_eq!(m.step(event), Step::default());
            assert_eq!(m.state(), ChannelState::Completed);
        }
        assert_eq!(m.snapshot().progress_percent, 100.0);
    }

    #[test]
    fn test_event_stream_end_without_completion_retries() {
        let mut m = open(ChannelKind::EventStream);
        m.step(msg(r#"{"type":"progress","progress":30}"#));

        let step = m.step(ChannelEvent::Closed { code: None, reason: String::new() });
        assert_eq!(step.effect, Some(Effect::ScheduleRetry(Duration::from_secs(3))));
        // Progress survives the reconnect
        assert_eq!(m.snapshot().progress_percent, 30.0);
    }

    #[test]
    fn test_socket_completion_requests_normal_close() {
        let mut m = open(ChannelKind::Socket);
        let step = m.step(msg(r#"{"progress":"70","status":"completed"}"#));
        assert_eq!(step.effect, Some(Effect::Close(CloseKind::Normal)));
        assert_eq!(m.state(), ChannelState::Completed);

        // Echoed close from the server is ignored
        let step = m.step(ChannelEvent::Closed {
            code: Some(NORMAL_CLOSURE),
            reason: COMPLETED_CLOSE_REASON.into(),
        });
        assert_eq!(step, Step::default());
    }

    #[test]
    fn test_socket_unexpected_close_fails_single_shot() {
        let mut m = open(ChannelKind::Socket);
        m.step(msg(r#"{"progress":50,"status":"processing"}"#));

        let step = m.step(ChannelEvent::Closed {
            code: Some(1006),
            reason: String::new(),
        });
        assert_eq!(step.effect, Some(Effect::Close(CloseKind::Drop)));
        assert_eq!(m.state(), ChannelState::Failed);
        assert_eq!(
            m.last_error(),
            Some(&ChannelError::UnexpectedClose {
                code: Some(1006),
                reason: String::new()
            })
        );
    }

    #[test]
    fn test_socket_peer_normal_close_with_reason_completes() {
        let mut m = open(ChannelKind::Socket);
        m.step(ChannelEvent::Closed {
            code: Some(NORMAL_CLOSURE),
            reason: "done".into(),
        });
        assert_eq!(m.state(), ChannelState::Completed);
    }

    #[test]
    fn test_socket_peer_normal_close_without_reason_fails() {
        let mut m = open(ChannelKind::Socket);
        m.step(msg(r#"{"progress":60,"status":"processing"}"#));

        let step = m.step(ChannelEvent::Closed {
            code: Some(NORMAL_CLOSURE),
            reason: String::new(),
        });
        assert_eq!(step.effect, Some(Effect::Close(CloseKind::Drop)));
        assert_eq!(m.state(), ChannelState::Failed);
        assert_eq!(
            m.last_error(),
            Some(&ChannelError::UnexpectedClose {
                code: Some(NORMAL_CLOSURE),
                reason: String::new()
            })
        );
    }

    #[test]
    fn test_socket_with_retry_policy_reconnects() {
        let mut m = ProgressMachine::new(ChannelKind::Socket, RetryPolicy::default());
        m.step(ChannelEvent::Dial);
        m.step(ChannelEvent::Opened);
        let step = m.step(ChannelEvent::Closed {
            code: Some(1011),
            reason: "internal".into(),
        });
        assert_eq!(step.effect, Some(Effect::ScheduleRetry(Duration::from_secs(3))));
    }

    #[test]
    fn test_dispose_is_terminal_and_idempotent() {
        let mut m = ProgressMachine::new(ChannelKind::EventStream, RetryPolicy::default());
        m.step(ChannelEvent::Dial);
        m.step(refused());
        assert_eq!(m.state(), ChannelState::Reconnecting);

        let step = m.step(ChannelEvent::Dispose);
        assert_eq!(step.effect, Some(Effect::Close(CloseKind::Drop)));
        assert_eq!(m.state(), ChannelState::Disposed);

        // A timer that raced the disposal does nothing
        assert_eq!(m.step(ChannelEvent::RetryTimerFired), Step::default());
        assert_eq!(m.step(ChannelEvent::Dispose), Step::default());
    }

    #[test]
    fn test_message_before_open_counts_as_open() {
        let mut m = ProgressMachine::new(ChannelKind::EventStream, RetryPolicy::default());
        m.step(ChannelEvent::Dial);
        m.step(msg(r#"{"type":"heartbeat","progress":5}"#));
        assert_eq!(m.state(), ChannelState::Open);
    }

    #[test]
    fn test_stale_message_while_reconnecting_is_ignored() {
        let mut m = open(ChannelKind::EventStream);
        m.step(refused());
        let step = m.step(msg(r#"{"type":"progress","progress":90}"#));
        assert_eq!(step, Step::default());
        assert_eq!(m.snapshot().progress_percent, 0.0);
    }
}
