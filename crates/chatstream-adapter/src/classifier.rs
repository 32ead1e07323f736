//! Splitting raw model text into answer text and tagged reasoning.
//!
//! The adapter only depends on the [`ContentClassifier`] contract: one call
//! per raw chunk, at most one typed piece out, state carried in a
//! [`ReasoningAccumulator`]. [`ThinkTagClassifier`] is the stock
//! implementation for models that wrap reasoning in `<think>...</think>`.

/// Partial tag state carried across chunk boundaries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReasoningAccumulator {
    /// Text held back because it may be the start of a tag, or because it
    /// follows a mode switch that has not been emitted yet.
    pub buffer: String,
    /// Whether the classifier is currently inside a reasoning block.
    pub is_reasoning: bool,
}

/// Kind of a classified piece of content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Reasoning,
}

/// One typed piece of classified content. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedPiece {
    pub kind: ContentKind,
    pub content: String,
}

impl ClassifiedPiece {
    /// Builds a piece, or `None` for empty content.
    pub fn new(kind: ContentKind, content: impl Into<String>) -> Option<Self> {
        let content = content.into();
        (!content.is_empty()).then_some(Self { kind, content })
    }
}

/// Result of classifying one chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub emit: Option<ClassifiedPiece>,
    pub accumulator: ReasoningAccumulator,
}

/// Pure chunk classifier.
pub trait ContentClassifier: Send + Sync {
    /// Classifies `chunk` given the state left by the previous call.
    fn classify(&self, chunk: &str, accumulator: ReasoningAccumulator) -> Classification;

    /// Drains whatever is still buffered when a model call ends.
    fn flush(&self, accumulator: ReasoningAccumulator) -> Vec<ClassifiedPiece> {
        let mut pieces = Vec::new();
        let mut accumulator = accumulator;
        loop {
            let before = accumulator.buffer.len();
            let Classification {
                emit,
                accumulator: next,
            } = self.classify("", accumulator);
            accumulator = next;
            match emit {
                Some(piece) => pieces.push(piece),
                None => break,
            }
            if accumulator.buffer.len() >= before {
                break;
            }
        }
        let kind = if accumulator.is_reasoning {
            ContentKind::Reasoning
        } else {
            ContentKind::Text
        };
        pieces.extend(ClassifiedPiece::new(kind, accumulator.buffer));
        pieces
    }
}

/// Classifier for `<think>...</think>` reasoning blocks.
#[derive(Clone, Debug)]
pub struct ThinkTagClassifier {
    open: String,
    close: String,
}

impl Default for ThinkTagClassifier {
    fn default() -> Self {
        Self::new("<think>", "</think>")
    }
}

impl ThinkTagClassifier {
    /// Creates a classifier for custom open/close tags.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    fn expected_tag(&self, is_reasoning: bool) -> &str {
        if is_reasoning { &self.close } else { &self.open }
    }
}

impl ContentClassifier for ThinkTagClassifier {
    fn classify(&self, chunk: &str, accumulator: ReasoningAccumulator) -> Classification {
        let ReasoningAccumulator {
            mut buffer,
            mut is_reasoning,
        } = accumulator;
        buffer.push_str(chunk);

        loop {
            let tag = self.expected_tag(is_reasoning);
            if tag.is_empty() || !buffer.starts_with(tag) {
                break;
            }
            buffer.drain(..tag.len());
            is_reasoning = !is_reasoning;
        }

        let tag = self.expected_tag(is_reasoning);
        let cut = match buffer.find(tag) {
            Some(idx) if !tag.is_empty() => idx,
            _ => partial_tag_start(&buffer, tag),
        };
        let content: String = buffer.drain(..cut).collect();
        let kind = if is_reasoning {
            ContentKind::Reasoning
        } else {
            ContentKind::Text
        };

        Classification {
            emit: ClassifiedPiece::new(kind, content),
            accumulator: ReasoningAccumulator {
                buffer,
                is_reasoning,
            },
        }
    }
}

/// Index where a trailing prefix of `tag` begins, or `buffer.len()`.
fn partial_tag_start(buffer: &str, tag: &str) -> usize {
    for len in (1..tag.len()).rev() {
        if tag.is_char_boundary(len) && buffer.ends_with(&tag[..len]) {
            return buffer.len() - len;
        }
    }
    buffer.len()
}
