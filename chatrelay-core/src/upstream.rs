use std::time::Duration;

use http::StatusCode;
use reqwest::Client;

use crate::config::HttpCfg;
use crate::error::{CoreResult, RelayError};

/// Thin wrapper around `reqwest::Client` for opening upstream SSE bodies.
///
/// The pipeline itself never constructs requests; this exists for callers
/// (the CLI smoke tool, embedding servers) that hold a ready-to-stream URL.
/// No retries anywhere: failed opens map to typed errors and stop there.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    inner: Client,
    user_agent: String,
}

impl UpstreamClient {
    pub fn new(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(cap) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(cap);
        }
        let inner = builder
            .build()
            .map_err(|e| RelayError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "chatrelay/0.1".to_string(),
        })
    }

    /// Open an SSE response. Success returns the still-streaming response;
    /// non-success statuses are read (truncated) and mapped to typed errors.
    pub async fn open_stream(&self, url: &str) -> CoreResult<reqwest::Response> {
        let resp = self
            .inner
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|_| RelayError::UpstreamUnavailable)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, retry_after, &body));
        }
        Ok(resp)
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored; numeric seconds cover the providers we see.
    None
}

fn map_http_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> RelayError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RelayError::RateLimited { retry_after },
        s if s.is_server_error() => RelayError::UpstreamUnavailable,
        s => RelayError::UpstreamStatus {
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let mut t = s[..cut].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    fn client() -> UpstreamClient {
        UpstreamClient::new(&HttpCfg::default()).unwrap()
    }

    #[tokio::test]
    async fn open_stream_returns_streaming_response() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/stream");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: {\"choices\":[]}\n\n");
        });
        let resp = client()
            .open_stream(&format!("{}/stream", server.base_url()))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.text().await.unwrap();
        assert!(body.starts_with("data: "));
    }

    #[tokio::test]
    async fn status_429_maps_to_rate_limited_with_retry_after() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/stream");
            then.status(429).header("Retry-After", "2").body("limit");
        });
        let err = client()
            .open_stream(&format!("{}/stream", server.base_url()))
            .await
            .unwrap_err();
        match err {
            RelayError::RateLimited { retry_after } => assert_eq!(retry_after, Some(2)),
            other => panic!("expected RateLimited, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_503_maps_to_unavailable() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/stream");
            then.status(503).body("down");
        });
        let err = client()
            .open_stream(&format!("{}/stream", server.base_url()))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamUnavailable));
    }

    #[tokio::test]
    async fn status_400_truncates_body_excerpt() {
        let server = MockServer::start();
        let big = "x".repeat(1000);
        let _m = server.mock(|when, then| {
            when.method(GET).path("/stream");
            then.status(400).body(big);
        });
        let err = client()
            .open_stream(&format!("{}/stream", server.base_url()))
            .await
            .unwrap_err();
        match err {
            RelayError::UpstreamStatus { code, message } => {
                assert_eq!(code, "400");
                assert!(message.ends_with("..."));
                assert!(message.len() <= 303);
            }
            other => panic!("expected UpstreamStatus, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn network_error_maps_to_unavailable() {
        let err = client()
            .open_stream("http://127.0.0.1:9/stream")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamUnavailable));
    }
}
