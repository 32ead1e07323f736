use std::pin::Pin;

use futures::{Stream, StreamExt as _};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::errors::{AdapterError, SinkClosed, TurnError};
use crate::event::UpstreamEvent;
use crate::frame::{DownstreamFrame, FinishReason};
use crate::sink::FrameSink;
use crate::turn::TurnState;
use crate::usage::Usage;

/// Handle used to request cancellation of a running turn.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The turn stops at its next suspension point, sends no further frames
    /// and resolves to [`TurnError::Cancelled`].
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Outcome of a turn that reached its `finish` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnSummary {
    /// Frames written to the sink, `finish` included.
    pub frames_emitted: u64,
    /// Model calls started during the turn.
    pub steps: u32,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

/// Streaming handle returned by [`StreamAdapter::start`](crate::StreamAdapter::start).
///
/// Use `next_frame()` to consume frames as they are produced and `finish()`
/// to obtain the turn result after the terminal frame.
pub struct TurnStream {
    turn_id: uuid::Uuid,
    rx: mpsc::Receiver<DownstreamFrame>,
    final_rx: oneshot::Receiver<Result<TurnSummary, TurnError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl TurnStream {
    pub fn turn_id(&self) -> uuid::Uuid {
        self.turn_id
    }

    /// Returns a handle that can cancel the turn.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next frame.
    ///
    /// Returns `None` once the turn task has stopped sending.
    pub async fn next_frame(&mut self) -> Option<DownstreamFrame> {
        let frame = self.rx.recv().await;
        if frame.as_ref().is_some_and(DownstreamFrame::is_terminal) {
            self.saw_terminal = true;
        }
        frame
    }

    /// Drains remaining frames (if any) and returns the turn result.
    ///
    /// Safe to call after consuming frames manually with `next_frame()`.
    pub async fn finish(mut self) -> Result<TurnSummary, TurnError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(frame) if frame.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    event = "turn.result_lost",
                    domain = "turn",
                    turn_id = %self.turn_id,
                    "turn task ended without a result"
                );
                Err(TurnError::Cancelled)
            }
        }
    }
}

/// Decodes a stream of raw engine events.
pub fn decode_stream<S>(values: S) -> impl Stream<Item = Result<UpstreamEvent, AdapterError>>
where
    S: Stream<Item = Value>,
{
    values.map(|value| UpstreamEvent::from_value(&value))
}

pub(crate) fn spawn_turn<E>(
    turn_id: uuid::Uuid,
    turn: TurnState,
    events: E,
    capacity: usize,
) -> TurnStream
where
    E: Stream<Item = Result<UpstreamEvent, AdapterError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let (final_tx, final_rx) = oneshot::channel();
    let (abort_tx, abort_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut sink = tx;
        let result = drive(turn_id, turn, events, &mut sink, Some(abort_rx)).await;
        let _ = final_tx.send(result);
    });

    TurnStream {
        turn_id,
        rx,
        final_rx,
        abort_handle: AbortHandle { tx: abort_tx },
        saw_terminal: false,
    }
}

/// Drives one turn to completion, writing every frame to `sink`.
pub(crate) async fn drive<E, S>(
    turn_id: uuid::Uuid,
    mut turn: TurnState,
    events: E,
    sink: &mut S,
    mut abort: Option<watch::Receiver<bool>>,
) -> Result<TurnSummary, TurnError>
where
    E: Stream<Item = Result<UpstreamEvent, AdapterError>> + Send,
    S: FrameSink + ?Sized,
{
    let mut events = std::pin::pin!(events);
    let mut frames = Vec::new();
    let mut emitted = 0_u64;
    debug!(event = "turn.started", domain = "turn", turn_id = %turn_id);

    loop {
        let next = match next_step(events.as_mut(), &mut abort).await {
            Step::Cancelled => {
                debug!(event = "turn.cancelled", domain = "turn", turn_id = %turn_id, frames_emitted = emitted);
                return Err(TurnError::Cancelled);
            }
            Step::Event(next) => next,
        };
        let result = match next {
            Some(Ok(event)) => turn.handle(&event, &mut frames),
            Some(Err(err)) => Err(err),
            None => break,
        };
        flush(&mut frames, sink, &mut emitted)
            .await
            .map_err(|closed| sink_closed(turn_id, emitted, closed))?;
        if let Err(err) = result {
            return Err(fail(turn_id, &turn, err, sink).await);
        }
    }

    turn.finish(&mut frames);
    flush(&mut frames, sink, &mut emitted)
        .await
        .map_err(|closed| sink_closed(turn_id, emitted, closed))?;
    let summary = TurnSummary {
        frames_emitted: emitted,
        steps: turn.steps(),
        usage: turn.usage(),
        finish_reason: turn.finish_reason(),
    };
    debug!(
        event = "turn.completed",
        domain = "turn",
        turn_id = %turn_id,
        frames_emitted = summary.frames_emitted,
        steps = summary.steps
    );
    Ok(summary)
}

enum Step {
    Event(Option<Result<UpstreamEvent, AdapterError>>),
    Cancelled,
}

async fn next_step<E>(mut events: Pin<&mut E>, abort: &mut Option<watch::Receiver<bool>>) -> Step
where
    E: Stream<Item = Result<UpstreamEvent, AdapterError>>,
{
    loop {
        let Some(rx) = abort.as_mut() else {
            return Step::Event(events.next().await);
        };
        if *rx.borrow_and_update() {
            return Step::Cancelled;
        }
        let watching = tokio::select! {
            biased;
            changed = rx.changed() => changed.is_ok(),
            next = events.next() => return Step::Event(next),
        };
        if !watching {
            // Every abort handle is gone; nothing can cancel this turn anymore.
            *abort = None;
        }
    }
}

async fn flush<S>(
    frames: &mut Vec<DownstreamFrame>,
    sink: &mut S,
    emitted: &mut u64,
) -> Result<(), SinkClosed>
where
    S: FrameSink + ?Sized,
{
    for frame in frames.drain(..) {
        sink.send(frame).await?;
        *emitted += 1;
    }
    Ok(())
}

async fn fail<S>(turn_id: uuid::Uuid, turn: &TurnState, err: AdapterError, sink: &mut S) -> TurnError
where
    S: FrameSink + ?Sized,
{
    warn!(
        event = "turn.failed",
        domain = "turn",
        turn_id = %turn_id,
        code = err.code(),
        error = %err
    );
    let message = turn.error_text(&err);
    let frame = DownstreamFrame::Error {
        error_text: message.clone(),
    };
    if sink.send(frame).await.is_err() {
        debug!(event = "turn.error_frame_dropped", domain = "turn", turn_id = %turn_id);
    }
    TurnError::Failed {
        message,
        source: err,
    }
}

fn sink_closed(turn_id: uuid::Uuid, emitted: u64, _closed: SinkClosed) -> TurnError {
    debug!(event = "turn.sink_closed", domain = "turn", turn_id = %turn_id, frames_emitted = emitted);
    TurnError::SinkClosed
}
