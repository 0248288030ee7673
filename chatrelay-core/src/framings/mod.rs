//! Provider framing families and per-line event decoding.
//!
//! Two wire shapes exist upstream: "delta" framing (OpenAI-compatible,
//! `choices[0].delta`) and "candidate" framing (`candidates[0].content`).
//! Both arrive as `data: `-prefixed SSE lines; decoding is a pure function
//! of the line text and is stateless across sessions.
//!
//! Decoding is tolerant by contract: a malformed or unexpected-shape line is
//! logged and skipped, never an error. Relay of raw bytes does not depend on
//! any decode outcome.

pub mod candidate;
pub mod delta;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{FramingCfg, FramingRule};
use crate::error::{CoreResult, RelayError};

/// Fixed prefix of content-bearing SSE lines.
pub const DATA_PREFIX: &str = "data: ";
/// Literal end sentinel emitted by delta-framing providers.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Latest cumulative token counts reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageUpdate {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

/// One decoded wire line, consumed immediately by the session.
///
/// A single line may legitimately carry both text and a usage update, so
/// decoders return `Vec<DecodedEvent>` per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Delta-framing answer text; subject to the `<think>` marker machine.
    Content(String),
    /// Verbatim answer text with no marker semantics (candidate framing).
    Text(String),
    /// Text that always belongs to the reasoning side channel.
    Reasoning(String),
    /// Cumulative usage counters; last write wins.
    Usage(UsageUpdate),
    /// Pretty-printed upstream error payload; replaces prior answer text.
    ErrorPayload(String),
    /// End sentinel; carries nothing and triggers nothing downstream.
    Done,
    /// Malformed or unexpected-shape line; contributes nothing.
    Ignored,
}

/// Which decoding rules a provider family uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingKind {
    Delta,
    Candidate,
}

impl FramingKind {
    /// Decode one complete line into zero or more events.
    ///
    /// The shared preamble mirrors the wire contract: strip the `data: `
    /// prefix, trim, drop blanks, recognize the end sentinel. Everything
    /// else is handed to the family-specific payload decoder.
    pub fn decode(self, line: &str) -> Vec<DecodedEvent> {
        let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line).trim();
        if payload.is_empty() {
            return Vec::new();
        }
        if payload == DONE_SENTINEL {
            return vec![DecodedEvent::Done];
        }
        match self {
            Self::Delta => delta::decode(payload),
            Self::Candidate => candidate::decode(payload),
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    regex: Regex,
    framing: FramingKind,
}

/// Resolves a provider id to its framing family.
///
/// Ordered regex rules, first match wins, falling back to the configured
/// default. Built once at startup; invalid patterns fail construction.
#[derive(Debug)]
pub struct FramingResolver {
    rules: Vec<CompiledRule>,
    default: FramingKind,
}

impl FramingResolver {
    pub fn new(cfg: &FramingCfg) -> CoreResult<Self> {
        let mut rules = Vec::new();
        for FramingRule { provider, framing } in &cfg.rules {
            let regex = Regex::new(provider).map_err(|e| {
                RelayError::Validation(format!("invalid framing rule regex '{provider}': {e}"))
            })?;
            rules.push(CompiledRule {
                regex,
                framing: *framing,
            });
        }
        Ok(Self {
            rules,
            default: cfg.default,
        })
    }

    #[must_use]
    pub fn resolve(&self, provider_id: &str) -> FramingKind {
        for rule in &self.rules {
            if rule.regex.is_match(provider_id) {
                return rule.framing;
            }
        }
        self.default
    }
}
