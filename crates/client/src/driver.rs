//! Runs a [`ProgressMachine`] against a live [`Connector`].

use std::collections::VecDeque;

use flashdeck_core::{ChannelEvent, CloseKind, Effect, ProgressMachine, Step};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::{Connection, Connector};

/// Drive `machine` until it reaches a terminal state, calling `observe` after
/// every step. Cancelling `cancel` disposes the channel: an in-flight connect,
/// read or retry wait is abandoned at once.
pub async fn run_channel<F>(
    connector: &dyn Connector,
    mut machine: ProgressMachine,
    cancel: CancellationToken,
    mut observe: F,
) -> ProgressMachine
where
    F: FnMut(&ProgressMachine, &Step) + Send,
{
    let mut queue = VecDeque::from([ChannelEvent::Dial]);
    let mut conn: Option<Box<dyn Connection>> = None;

    while !machine.state().is_terminal() {
        let event = match queue.pop_front() {
            Some(event) => event,
            None => match conn.as_mut() {
                Some(c) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ChannelEvent::Dispose,
                    wire = c.recv() => wire.into_channel_event(),
                },
                None => {
                    debug!(state = ?machine.state(), "Nothing left to wait on");
                    break;
                }
            },
        };

        let step = machine.step(event);
        observe(&machine, &step);

        match step.effect {
            Some(Effect::Connect) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => queue.push_back(ChannelEvent::Dispose),
                    result = connector.connect() => match result {
                        Ok(c) => {
                            conn = Some(c);
                            queue.push_back(ChannelEvent::Opened);
                        }
                        Err(e) => queue.push_back(ChannelEvent::TransportError(e)),
                    },
                }
            }
            Some(Effect::ScheduleRetry(delay)) => {
                if let Some(mut c) = conn.take() {
                    c.close(CloseKind::Drop).await;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => queue.push_back(ChannelEvent::Dispose),
                    _ = tokio::time::sleep(delay) => queue.push_back(ChannelEvent::RetryTimerFired),
                }
            }
            Some(Effect::Close(kind)) => {
                if let Some(mut c) = conn.take() {
                    c.close(kind).await;
                }
            }
            None => {}
        }
    }

    machine
}
