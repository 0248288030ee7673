//! The duplex relay pipeline.
//!
//! One upstream read loop per session drives both halves: every raw chunk
//! is yielded outbound unmodified and in order, and the same chunk is
//! offered to the session for line reassembly and decoding. Decoding is a
//! read-only side observation; its failures are invisible to the client.
//!
//! After the upstream body is drained the finalizer runs exactly once:
//! persist the assembled message and append the trailer frame (only when a
//! conversation id is present), then detach the usage submission, then
//! close. Dropping the outbound stream early drops the upstream body with
//! it and skips finalization entirely.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::config::FramingCfg;
use crate::error::{CoreResult, RelayError};
use crate::framings::FramingResolver;
use crate::model::{StreamInfo, TrailerEvent};
use crate::session::StreamSession;
use crate::store::{MessageStore, UsageRecorder};
use crate::telemetry::{self, StreamTrace};

/// Boxed stream of relayed byte chunks.
pub type ByteStream = futures::stream::BoxStream<'static, CoreResult<Bytes>>;

#[derive(Clone, Copy)]
enum Phase {
    Relay,
    Finalize,
    Closed,
}

struct RelayState {
    upstream: ByteStream,
    session: StreamSession,
    store: Arc<dyn MessageStore>,
    usage: Arc<dyn UsageRecorder>,
    phase: Phase,
}

/// Relay `upstream` outbound while aggregating it into `session`, then
/// finalize. The returned stream yields the relayed chunks byte-for-byte,
/// at most one trailer frame, and terminal errors.
pub fn relay_stream(
    upstream: ByteStream,
    session: StreamSession,
    store: Arc<dyn MessageStore>,
    usage: Arc<dyn UsageRecorder>,
) -> impl Stream<Item = CoreResult<Bytes>> + Send {
    let state = RelayState {
        upstream,
        session,
        store,
        usage,
        phase: Phase::Relay,
    };
    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            match st.phase {
                Phase::Relay => match st.upstream.next().await {
                    Some(Ok(chunk)) => {
                        st.session.ingest_chunk(&chunk);
                        return Some((Ok(chunk), st));
                    }
                    Some(Err(err)) => {
                        // Transport failure mid-stream: the session never
                        // reached natural completion, so no finalization.
                        st.phase = Phase::Closed;
                        return Some((Err(err), st));
                    }
                    None => st.phase = Phase::Finalize,
                },
                Phase::Finalize => {
                    st.phase = Phase::Closed;
                    match finalize(&st.session, st.store.as_ref(), &st.usage).await {
                        Ok(Some(trailer)) => return Some((Ok(trailer), st)),
                        Ok(None) => return None,
                        Err(err) => return Some((Err(err), st)),
                    }
                }
                Phase::Closed => return None,
            }
        }
    })
}

/// Post-completion bookkeeping, in order: persist (when a conversation id
/// exists), detach the usage submission, hand back the trailer frame.
///
/// Usage is submitted on every natural completion, including after a
/// persistence failure; it appends nothing outbound and must be detached
/// before the trailer is yielded, since the consumer may stop polling once
/// it has the trailer.
async fn finalize(
    session: &StreamSession,
    store: &dyn MessageStore,
    usage: &Arc<dyn UsageRecorder>,
) -> CoreResult<Option<Bytes>> {
    let persisted = match session.persisted_message() {
        Some(message) => Some(store.persist_assembled_message(&message).await),
        None => None,
    };

    submit_usage(session, Arc::clone(usage));

    let info = session.info();
    let counters = session.usage();
    let mut trace = StreamTrace::new()
        .provider(&info.provider_id)
        .model(&info.model_id)
        .conversation_id_opt(info.conversation_id.as_deref())
        .tokens(counters.prompt, counters.completion, counters.total);

    match persisted {
        None => {
            telemetry::emit(trace);
            Ok(None)
        }
        Some(Ok(id)) => {
            trace = trace.message_id_opt(Some(&id));
            telemetry::emit(trace);
            let frame = TrailerEvent::new(id).encode()?;
            Ok(Some(Bytes::from(frame)))
        }
        Some(Err(err)) => {
            tracing::error!(%err, conversation = ?info.conversation_id, "persisting assembled message failed");
            telemetry::emit(
                trace
                    .error_kind("persistence_failed")
                    .error_message(&err.to_string()),
            );
            Err(err)
        }
    }
}

/// Fire-and-forget usage submission. Failure is logged and reported to the
/// telemetry sink, never propagated to the stream's success path.
fn submit_usage(session: &StreamSession, recorder: Arc<dyn UsageRecorder>) {
    let record = session.usage_record(chrono::Utc::now().date_naive());
    let owner = record.owner_id.clone();
    let provider = record.provider_id.clone();
    let model = record.model_id.clone();
    tokio::spawn(async move {
        if let Err(err) = recorder.record_usage(&owner, record).await {
            tracing::warn!(%err, owner = %owner, "usage submission failed");
            telemetry::emit(
                StreamTrace::new()
                    .provider(&provider)
                    .model(&model)
                    .error_kind("usage_record_failed")
                    .error_message(&err.to_string()),
            );
        }
    });
}

/// Outbound response for one proxied stream: fixed SSE headers plus the
/// relay+trailer body.
pub struct StreamingResponse {
    body: ByteStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse").finish_non_exhaustive()
    }
}

impl StreamingResponse {
    /// Headers fixed for every proxied stream.
    pub const HEADERS: [(&'static str, &'static str); 3] = [
        ("content-type", "text/event-stream"),
        ("cache-control", "no-cache"),
        ("connection", "keep-alive"),
    ];

    fn new(body: ByteStream) -> Self {
        Self { body }
    }

    #[must_use]
    pub fn headers() -> &'static [(&'static str, &'static str)] {
        &Self::HEADERS
    }

    #[must_use]
    pub fn into_body(self) -> ByteStream {
        self.body
    }
}

/// Proxy entry point shared by both framing families.
pub struct ChatStreamProxy {
    store: Arc<dyn MessageStore>,
    usage: Arc<dyn UsageRecorder>,
    resolver: FramingResolver,
}

impl ChatStreamProxy {
    pub fn new(
        framing: &FramingCfg,
        store: Arc<dyn MessageStore>,
        usage: Arc<dyn UsageRecorder>,
    ) -> CoreResult<Self> {
        Ok(Self {
            store,
            usage,
            resolver: FramingResolver::new(framing)?,
        })
    }

    /// Start proxying an upstream body. Fails with `MissingBody` before any
    /// relaying when the body is absent.
    pub fn proxy(&self, body: Option<ByteStream>, info: StreamInfo) -> CoreResult<StreamingResponse> {
        let body = body.ok_or(RelayError::MissingBody)?;
        let framing = self.resolver.resolve(&info.provider_id);
        let session = StreamSession::new(info, framing);
        let stream = relay_stream(
            body,
            session,
            Arc::clone(&self.store),
            Arc::clone(&self.usage),
        );
        Ok(StreamingResponse::new(Box::pin(stream)))
    }

    /// Adapter over a live `reqwest` upstream response.
    pub fn proxy_response(
        &self,
        response: reqwest::Response,
        info: StreamInfo,
    ) -> CoreResult<StreamingResponse> {
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| RelayError::Other(e.into()))),
        );
        self.proxy(Some(body), info)
    }
}
