//! Candidate-framing decoder (`candidates[0].content.parts[0].text` shape).
//!
//! This family has no reasoning side channel and reports usage in
//! `usageMetadata`, applied only on frames that also carry a finish reason
//! (intermediate frames repeat partial counts that must not win).

use serde::Deserialize;

use super::{DecodedEvent, UsageUpdate};

// ---- Wire structs (minimal) ----
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<CandidateUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
struct CandidateUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<CandidateUsage> for UsageUpdate {
    fn from(u: CandidateUsage) -> Self {
        Self {
            prompt: u.prompt_token_count,
            completion: u.candidates_token_count,
            total: u.total_token_count,
        }
    }
}

pub(super) fn decode(payload: &str) -> Vec<DecodedEvent> {
    let chunk: CandidateChunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(err) => {
            tracing::debug!(%err, line = payload, "skipping undecodable candidate line");
            return vec![DecodedEvent::Ignored];
        }
    };

    // A frame without a first candidate, content or part has no mappable
    // shape; skip it wholesale, usage included. A part merely missing its
    // `text` key still counts as a well-shaped (empty) fragment.
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        tracing::debug!(line = payload, "candidate frame without candidates");
        return vec![DecodedEvent::Ignored];
    };
    let Some(part) = candidate.content.and_then(|c| c.parts.into_iter().next()) else {
        tracing::debug!(line = payload, "candidate frame without parts");
        return vec![DecodedEvent::Ignored];
    };
    let text = part.text.unwrap_or_default();

    let mut events = Vec::new();
    if !text.is_empty() {
        events.push(DecodedEvent::Text(text));
    }
    if candidate.finish_reason.is_some()
        && let Some(usage) = chunk.usage_metadata
    {
        events.push(DecodedEvent::Usage(usage.into()));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::super::FramingKind;
    use super::*;

    fn decode_line(line: &str) -> Vec<DecodedEvent> {
        FramingKind::Candidate.decode(line)
    }

    #[test]
    fn part_text_maps_to_verbatim_text_event() {
        let events =
            decode_line(r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#);
        assert_eq!(events, vec![DecodedEvent::Text("Hello".into())]);
    }

    #[test]
    fn usage_requires_finish_reason_and_metadata_together() {
        // Metadata alone: intermediate frame, counts must not apply.
        let events = decode_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"a"}]}}],"usageMetadata":{"promptTokenCount":9,"candidatesTokenCount":1,"totalTokenCount":10}}"#,
        );
        assert_eq!(events, vec![DecodedEvent::Text("a".into())]);

        // Finish reason alone: nothing to apply.
        let events = decode_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"b"}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(events, vec![DecodedEvent::Text("b".into())]);

        // Both together: usage applies.
        let events = decode_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":"c"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":9,"candidatesTokenCount":1,"totalTokenCount":10}}"#,
        );
        assert_eq!(
            events,
            vec![
                DecodedEvent::Text("c".into()),
                DecodedEvent::Usage(UsageUpdate {
                    prompt: 9,
                    completion: 1,
                    total: 10
                })
            ]
        );
    }

    #[test]
    fn frame_without_candidates_is_ignored() {
        assert_eq!(
            decode_line(r#"data: {"candidates":[]}"#),
            vec![DecodedEvent::Ignored]
        );
    }

    #[test]
    fn frame_without_parts_is_ignored_usage_included() {
        // Shape break skips the whole line, even if usage rode along.
        let events = decode_line(
            r#"data: {"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":0,"totalTokenCount":3}}"#,
        );
        assert_eq!(events, vec![DecodedEvent::Ignored]);
    }

    #[test]
    fn part_missing_text_key_still_applies_usage() {
        // A textless part is well-shaped; the final frame's usage must land.
        let events = decode_line(
            r#"data: {"candidates":[{"content":{"parts":[{}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":0,"totalTokenCount":3}}"#,
        );
        assert_eq!(
            events,
            vec![DecodedEvent::Usage(UsageUpdate {
                prompt: 3,
                completion: 0,
                total: 3
            })]
        );
    }

    #[test]
    fn empty_text_on_final_frame_still_applies_usage() {
        let events = decode_line(
            r#"data: {"candidates":[{"content":{"parts":[{"text":""}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":2,"candidatesTokenCount":2,"totalTokenCount":4}}"#,
        );
        assert_eq!(
            events,
            vec![DecodedEvent::Usage(UsageUpdate {
                prompt: 2,
                completion: 2,
                total: 4
            })]
        );
    }

    #[test]
    fn malformed_json_is_ignored_not_fatal() {
        assert_eq!(decode_line("data: {oops"), vec![DecodedEvent::Ignored]);
    }
}
