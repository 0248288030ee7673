//! Telemetry primitives for per-session stream tracing.
//! By default, nothing is emitted unless a sink is installed via
//! `set_telemetry_sink`.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;

/// Canonical per-session trace payload, emitted once at finalization and
/// once per failed usage submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct StreamTrace {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,

    pub tokens_prompt: Option<u32>,
    pub tokens_completion: Option<u32>,
    pub tokens_total: Option<u32>,

    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl StreamTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn provider(mut self, v: &str) -> Self {
        self.provider = Some(v.to_string());
        self
    }
    pub fn model(mut self, v: &str) -> Self {
        self.model = Some(v.to_string());
        self
    }
    pub fn conversation_id_opt(mut self, v: Option<&str>) -> Self {
        self.conversation_id = v.map(|s| s.to_string());
        self
    }
    pub fn message_id_opt(mut self, v: Option<&str>) -> Self {
        self.message_id = v.map(|s| s.to_string());
        self
    }
    pub fn tokens(mut self, prompt: u32, completion: u32, total: u32) -> Self {
        self.tokens_prompt = Some(prompt);
        self.tokens_completion = Some(completion);
        self.tokens_total = Some(total);
        self
    }
    pub fn error_kind(mut self, kind: &str) -> Self {
        self.error_kind = Some(kind.to_string());
        self
    }
    pub fn error_message(mut self, msg: &str) -> Self {
        self.error_message = Some(msg.to_string());
        self
    }
}

/// Implement this to receive telemetry events.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record` may be called from any thread, including detached usage
///   tasks; implementations should avoid panicking and keep overhead low.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record(&self, trace: StreamTrace);
}

static TELEMETRY_SINK: OnceCell<Arc<dyn TelemetrySink>> = OnceCell::new();

// In tests, gate emission to only the calling test thread to avoid
// cross-test interference.
#[cfg(test)]
thread_local! {
    static TEST_CAPTURE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Install a global telemetry sink. Returns `false` if a sink is already
/// installed. Write-once for the process lifetime.
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) -> bool {
    TELEMETRY_SINK.set(sink).is_ok()
}

/// Emit a trace if a sink is installed. Crate-visible by design.
#[inline]
pub(crate) fn emit(trace: StreamTrace) {
    #[cfg(test)]
    {
        if !TEST_CAPTURE.with(|c| c.get()) {
            return;
        }
    }
    if let Some(sink) = TELEMETRY_SINK.get() {
        sink.record(trace);
    }
}

#[cfg(test)]
/// Test-only helper: enable or disable capture for the current test thread.
pub fn test_set_capture_enabled(enabled: bool) {
    TEST_CAPTURE.with(|c| c.set(enabled));
}
