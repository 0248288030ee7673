//! Per-stream aggregation state.
//!
//! One `StreamSession` exists per proxied request and is owned exclusively
//! by that request's pipeline task; nothing else reads or mutates it. It
//! folds decoded events into the visible answer, the reasoning side channel
//! and the latest usage counters, and builds the records handed to the
//! collaborators at finalization.

use chrono::NaiveDate;

use crate::framings::{DecodedEvent, FramingKind, UsageUpdate};
use crate::lines::LineBuffer;
use crate::model::{MessageKind, PersistedMessage, Role, StreamInfo, UsageRecord};

/// Start marker of a reasoning segment inside delta-framing content.
pub const THINK_OPEN: &str = "<think>";
/// End marker of a reasoning segment.
pub const THINK_CLOSE: &str = "</think>";

#[derive(Debug)]
pub struct StreamSession {
    info: StreamInfo,
    framing: FramingKind,
    lines: LineBuffer,
    visible: String,
    reasoning: String,
    in_side_channel: bool,
    usage: UsageUpdate,
}

impl StreamSession {
    #[must_use]
    pub fn new(info: StreamInfo, framing: FramingKind) -> Self {
        Self {
            info,
            framing,
            lines: LineBuffer::new(),
            visible: String::new(),
            reasoning: String::new(),
            in_side_channel: false,
            usage: UsageUpdate::default(),
        }
    }

    #[must_use]
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    #[must_use]
    pub fn visible(&self) -> &str {
        &self.visible
    }

    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    #[must_use]
    pub fn usage(&self) -> UsageUpdate {
        self.usage
    }

    /// Observe one raw upstream chunk: reassemble lines, decode, fold.
    /// Pure CPU work; the chunk itself is relayed elsewhere, untouched.
    pub fn ingest_chunk(&mut self, chunk: &[u8]) {
        for line in self.lines.feed(chunk) {
            for event in self.framing.decode(&line) {
                self.apply(event);
            }
        }
    }

    pub fn apply(&mut self, event: DecodedEvent) {
        match event {
            DecodedEvent::Content(text) => self.apply_marked(&text),
            DecodedEvent::Text(text) => self.visible.push_str(&text),
            DecodedEvent::Reasoning(text) => self.reasoning.push_str(&text),
            // Providers report cumulative totals, not deltas: overwrite.
            DecodedEvent::Usage(update) => self.usage = update,
            // Terminal-style override; later fragments append after it.
            DecodedEvent::ErrorPayload(block) => self.visible = block,
            DecodedEvent::Done | DecodedEvent::Ignored => {}
        }
    }

    /// Two-state marker machine over delta-framing content fragments.
    ///
    /// Markers only ever appear at a fragment boundary; a reasoning segment
    /// may span many fragments, so the open and close markers are usually
    /// seen in different calls.
    fn apply_marked(&mut self, text: &str) {
        if !self.in_side_channel {
            if let Some(rest) = text.strip_prefix(THINK_OPEN) {
                self.in_side_channel = true;
                let rest = rest.trim();
                if !rest.is_empty() {
                    self.reasoning.push_str(rest);
                }
            } else {
                self.visible.push_str(text);
            }
        } else if let Some(idx) = text.find(THINK_CLOSE) {
            let before = text[..idx].trim();
            if !before.is_empty() {
                self.reasoning.push_str(before);
            }
            self.in_side_channel = false;
            self.visible.push_str(&text[idx + THINK_CLOSE.len()..]);
        } else if !text.trim().is_empty() {
            // Whitespace-only keep-alive fragments are discarded.
            self.reasoning.push_str(text);
        }
    }

    /// The message to persist, present only when a conversation id was
    /// supplied. Call after the upstream stream is fully drained.
    #[must_use]
    pub fn persisted_message(&self) -> Option<PersistedMessage> {
        let conversation_id = self.info.conversation_id.clone()?;
        Some(PersistedMessage {
            conversation_id,
            content: self.visible.clone(),
            reasoning_content: self.reasoning.clone(),
            role: Role::Assistant,
            kind: MessageKind::Text,
            prompt_tokens: self.usage.prompt,
            completion_tokens: self.usage.completion,
            total_tokens: self.usage.total,
            model_id: self.info.model_id.clone(),
            provider_id: self.info.provider_id.clone(),
        })
    }

    /// The accounting record for the given calendar day, from the last-known
    /// counters. Built unconditionally at finalization.
    #[must_use]
    pub fn usage_record(&self, date: NaiveDate) -> UsageRecord {
        UsageRecord {
            owner_id: self.info.owner_id.clone(),
            conversation_id: self.info.conversation_id.clone(),
            date,
            model_id: self.info.model_id.clone(),
            provider_id: self.info.provider_id.clone(),
            prompt_tokens: self.usage.prompt,
            completion_tokens: self.usage.completion,
            total_tokens: self.usage.total,
        }
    }
}
