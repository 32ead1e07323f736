use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::SinkClosed;
use crate::frame::DownstreamFrame;

/// Destination of downstream frames.
///
/// Frames are sent one at a time in emission order. Backpressure is the
/// sink's business: `send` may wait. Returning [`SinkClosed`] stops the turn.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: DownstreamFrame) -> Result<(), SinkClosed>;
}

#[async_trait]
impl FrameSink for Vec<DownstreamFrame> {
    async fn send(&mut self, frame: DownstreamFrame) -> Result<(), SinkClosed> {
        self.push(frame);
        Ok(())
    }
}

#[async_trait]
impl FrameSink for mpsc::Sender<DownstreamFrame> {
    async fn send(&mut self, frame: DownstreamFrame) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, frame).await.map_err(|_| SinkClosed)
    }
}

#[async_trait]
impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    async fn send(&mut self, frame: DownstreamFrame) -> Result<(), SinkClosed> {
        (**self).send(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vec_sink_collects_in_order() {
        let mut sink: Vec<DownstreamFrame> = Vec::new();
        FrameSink::send(&mut sink, DownstreamFrame::StartStep)
            .await
            .expect("send");
        FrameSink::send(&mut sink, DownstreamFrame::FinishStep)
            .await
            .expect("send");
        assert_eq!(sink, vec![DownstreamFrame::StartStep, DownstreamFrame::FinishStep]);
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (mut tx, rx) = mpsc::channel::<DownstreamFrame>(1);
        drop(rx);
        let err = FrameSink::send(&mut tx, DownstreamFrame::StartStep)
            .await
            .expect_err("closed");
        assert_eq!(err, SinkClosed);
    }
}
