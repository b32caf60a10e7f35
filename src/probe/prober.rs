//! Single timed HTTP round-trip

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::transport::{HttpResponse, HttpTransport};
use crate::error::Result;
use crate::models::{
    CaptureMode, ListingEnvelope, ProbeResult, ProxyConfig, ResponsePayload, DIRECT_LABEL,
};

/// Issues GET requests against one fixed target and times them
///
/// Never returns an error: every failure becomes a failed [`ProbeResult`].
pub struct Prober {
    target_url: String,
    transport: Arc<dyn HttpTransport>,
    capture: CaptureMode,
}

impl Prober {
    pub fn new(
        target_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        capture: CaptureMode,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            transport,
            capture,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn capture(&self) -> CaptureMode {
        self.capture
    }

    /// Probe the target without a proxy
    #[instrument(skip(self), fields(target = %self.target_url))]
    pub async fn probe_direct(&self) -> ProbeResult {
        self.probe(None).await
    }

    /// Probe the target through `proxy`
    #[instrument(skip(self, proxy), fields(target = %self.target_url, proxy = %proxy))]
    pub async fn probe_via_proxy(&self, proxy: &ProxyConfig) -> ProbeResult {
        self.probe(Some(proxy)).await
    }

    async fn probe(&self, proxy: Option<&ProxyConfig>) -> ProbeResult {
        let label = proxy
            .map(ProxyConfig::label)
            .unwrap_or_else(|| DIRECT_LABEL.to_string());

        // Client lookup and request building stay outside the timed window.
        let pending = self.transport.prepare(&self.target_url, proxy);

        let timestamp = Utc::now();
        let start = Instant::now();
        let outcome = match pending {
            Ok(pending) => pending
                .await
                .and_then(|response| self.capture_response(response)),
            Err(e) => Err(e),
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(payload) => {
                debug!(status = payload.status(), latency_ms, "probe succeeded");
                ProbeResult::success(timestamp, label, latency_ms, payload)
            }
            Err(e) => {
                let error = e.describe();
                warn!(latency_ms, "probe via {} failed: {}", label, error);
                ProbeResult::failure(timestamp, label, latency_ms, error)
            }
        }
    }

    fn capture_response(&self, response: HttpResponse) -> Result<ResponsePayload> {
        let HttpResponse { status, body } = response;
        match self.capture {
            CaptureMode::Raw => Ok(ResponsePayload::Raw { status, body }),
            CaptureMode::Json => {
                let payload: ListingEnvelope = serde_json::from_str(&body)?;
                Ok(ResponsePayload::Json { status, payload })
            }
        }
    }
}
