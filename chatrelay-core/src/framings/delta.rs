//! Delta-framing decoder (OpenAI-compatible `choices[0].delta` shape).
//!
//! Vendor quirks this decoder absorbs: some gateways report errors as a
//! top-level `error` object inside an otherwise normal SSE line; some
//! vendors attach `usage` to `choices[0]` instead of the top level; reasoning
//! models emit `reasoning_content` alongside or instead of `content`.

use serde::Deserialize;
use serde_json::Value;

use super::{DecodedEvent, UsageUpdate};

// ---- Wire structs (minimal) ----
#[derive(Deserialize)]
struct DeltaChunk {
    usage: Option<DeltaUsage>,
    #[serde(default)]
    choices: Vec<DeltaChoice>,
}

#[derive(Deserialize)]
struct DeltaChoice {
    #[serde(default)]
    delta: DeltaBody,
    usage: Option<DeltaUsage>,
}

#[derive(Deserialize, Default)]
struct DeltaBody {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
struct DeltaUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<DeltaUsage> for UsageUpdate {
    fn from(u: DeltaUsage) -> Self {
        Self {
            prompt: u.prompt_tokens,
            completion: u.completion_tokens,
            total: u.total_tokens,
        }
    }
}

pub(super) fn decode(payload: &str) -> Vec<DecodedEvent> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(err) => {
            tracing::debug!(%err, line = payload, "skipping undecodable delta line");
            return vec![DecodedEvent::Ignored];
        }
    };

    // Error payloads ride inside a regular data line; surface the whole
    // payload as a fenced block that overrides prior answer text.
    if value.get("error").is_some() {
        let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        return vec![DecodedEvent::ErrorPayload(format!("```json\n{pretty}\n```"))];
    }

    let chunk: DeltaChunk = match serde_json::from_value(value) {
        Ok(c) => c,
        Err(err) => {
            tracing::debug!(%err, line = payload, "skipping unexpected delta shape");
            return vec![DecodedEvent::Ignored];
        }
    };

    let mut events = Vec::new();
    let usage = chunk
        .usage
        .or_else(|| chunk.choices.first().and_then(|c| c.usage));
    if let Some(u) = usage {
        events.push(DecodedEvent::Usage(u.into()));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return events;
    };
    if let Some(content) = choice.delta.content
        && !content.is_empty()
    {
        events.push(DecodedEvent::Content(content));
    }
    if let Some(reasoning) = choice.delta.reasoning_content
        && !reasoning.is_empty()
    {
        events.push(DecodedEvent::Reasoning(reasoning));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::super::FramingKind;
    use super::*;

    fn decode_line(line: &str) -> Vec<DecodedEvent> {
        FramingKind::Delta.decode(line)
    }

    #[test]
    fn content_delta_maps_to_content_event() {
        let events = decode_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#);
        assert_eq!(events, vec![DecodedEvent::Content("Hi".into())]);
    }

    #[test]
    fn reasoning_content_is_independent_of_content() {
        let events = decode_line(
            r#"data: {"choices":[{"delta":{"content":"a","reasoning_content":"b"}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                DecodedEvent::Content("a".into()),
                DecodedEvent::Reasoning("b".into())
            ]
        );
    }

    #[test]
    fn top_level_usage_is_extracted() {
        let events = decode_line(
            r#"data: {"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15},"choices":[]}"#,
        );
        assert_eq!(
            events,
            vec![DecodedEvent::Usage(UsageUpdate {
                prompt: 10,
                completion: 5,
                total: 15
            })]
        );
    }

    #[test]
    fn choice_usage_fallback_applies_when_top_level_absent() {
        let events = decode_line(
            r#"data: {"choices":[{"delta":{},"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}]}"#,
        );
        assert_eq!(
            events,
            vec![DecodedEvent::Usage(UsageUpdate {
                prompt: 1,
                completion: 2,
                total: 3
            })]
        );
    }

    #[test]
    fn null_top_level_usage_falls_back_to_choice() {
        let events = decode_line(
            r#"data: {"usage":null,"choices":[{"delta":{"content":"x"},"usage":{"prompt_tokens":4,"completion_tokens":4,"total_tokens":8}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                DecodedEvent::Usage(UsageUpdate {
                    prompt: 4,
                    completion: 4,
                    total: 8
                }),
                DecodedEvent::Content("x".into()),
            ]
        );
    }

    #[test]
    fn empty_choices_without_usage_yields_nothing() {
        assert!(decode_line(r#"data: {"choices":[]}"#).is_empty());
    }

    #[test]
    fn malformed_json_is_ignored_not_fatal() {
        assert_eq!(decode_line("data: {not json"), vec![DecodedEvent::Ignored]);
    }

    #[test]
    fn error_payload_becomes_fenced_override() {
        let events = decode_line(r#"data: {"error":{"code":429,"message":"quota"}}"#);
        let DecodedEvent::ErrorPayload(block) = &events[0] else {
            panic!("expected ErrorPayload, got {events:?}");
        };
        assert!(block.starts_with("```json\n"));
        assert!(block.ends_with("\n```"));
        assert!(block.contains("\"quota\""));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn empty_string_fragments_are_dropped() {
        assert!(decode_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#).is_empty());
    }
}
