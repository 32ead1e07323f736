use crate::frame::DownstreamFrame;

/// Open text/reasoning spans of the current step.
///
/// A span is opened lazily by its first delta and gets a fresh id. At most one
/// span of each kind is open; a text span and a reasoning span may be open
/// together and stay open until they are closed explicitly.
#[derive(Debug, Default)]
pub struct SpanState {
    text: Option<String>,
    reasoning: Option<String>,
}

impl SpanState {
    pub fn text_open(&self) -> bool {
        self.text.is_some()
    }

    pub fn reasoning_open(&self) -> bool {
        self.reasoning.is_some()
    }

    pub fn any_open(&self) -> bool {
        self.text_open() || self.reasoning_open()
    }

    /// Emits a `text-delta`, preceded by `text-start` when no text span is open.
    pub fn text_delta(&mut self, delta: String, out: &mut Vec<DownstreamFrame>) {
        if delta.is_empty() {
            return;
        }
        let id = self.text.get_or_insert_with(|| {
            let id = new_span_id();
            out.push(DownstreamFrame::TextStart { id: id.clone() });
            id
        });
        out.push(DownstreamFrame::TextDelta {
            id: id.clone(),
            delta,
        });
    }

    /// Emits a `reasoning-delta`, preceded by `reasoning-start` when needed.
    pub fn reasoning_delta(&mut self, delta: String, out: &mut Vec<DownstreamFrame>) {
        if delta.is_empty() {
            return;
        }
        let id = self.open_reasoning(out);
        out.push(DownstreamFrame::ReasoningDelta { id, delta });
    }

    /// Forwards redacted reasoning inside the reasoning span.
    pub fn redacted_reasoning(&mut self, data: String, out: &mut Vec<DownstreamFrame>) {
        if data.is_empty() {
            return;
        }
        let id = self.open_reasoning(out);
        out.push(DownstreamFrame::RedactedReasoningDelta { id, data });
    }

    pub fn end_text(&mut self, out: &mut Vec<DownstreamFrame>) {
        if let Some(id) = self.text.take() {
            out.push(DownstreamFrame::TextEnd { id });
        }
    }

    pub fn end_reasoning(&mut self, out: &mut Vec<DownstreamFrame>) {
        if let Some(id) = self.reasoning.take() {
            out.push(DownstreamFrame::ReasoningEnd { id });
        }
    }

    /// Closes every open span, text first.
    pub fn close_all(&mut self, out: &mut Vec<DownstreamFrame>) {
        self.end_text(out);
        self.end_reasoning(out);
    }

    fn open_reasoning(&mut self, out: &mut Vec<DownstreamFrame>) -> String {
        self.reasoning
            .get_or_insert_with(|| {
                let id = new_span_id();
                out.push(DownstreamFrame::ReasoningStart { id: id.clone() });
                id
            })
            .clone()
    }
}

fn new_span_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
