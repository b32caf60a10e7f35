//! HTTP transport used by the prober
//!
//! Wraps `reqwest` behind a trait so the prober and scheduler can be driven
//! without a network in tests. Sending is split in two: `prepare` does all
//! local setup (client, proxy route, request build) and returns a future that
//! performs the round-trip only when awaited, so callers can time the network
//! part alone.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::{Client, Proxy, Request};
use tracing::debug;

use crate::error::{ProxyProbeError, Result};
use crate::models::ProxyConfig;

/// Locale preference sent on every request
pub const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7";

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A received HTTP response, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Round-trip that has been set up but not sent yet
pub type PendingResponse<'a> = BoxFuture<'a, Result<HttpResponse>>;

/// Capability to perform one GET request, directly or through a proxy
///
/// Any response counts as `Ok`, including non-2xx statuses. Only transport
/// failures (connect, DNS, TLS, proxy auth, timeout, body read) are errors.
pub trait HttpTransport: Send + Sync {
    /// Set up a GET of `url`. Nothing goes on the wire until the returned
    /// future is polled.
    fn prepare<'a>(
        &'a self,
        url: &str,
        proxy: Option<&ProxyConfig>,
    ) -> Result<PendingResponse<'a>>;
}

/// `reqwest`-backed transport
///
/// Keeps one client per proxy so proxied requests reuse connections the same
/// way direct requests do.
pub struct ReqwestTransport {
    direct: Client,
    proxied: Mutex<HashMap<ProxyConfig, Client>>,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        // Ambient HTTP(S)_PROXY variables must not reroute direct probes.
        let direct = Self::builder(timeout).no_proxy().build()?;
        Ok(Self {
            direct,
            proxied: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    /// Create a transport and build the client for every proxy in `pool` up front
    pub fn with_pool(timeout: Duration, pool: &[ProxyConfig]) -> Result<Self> {
        let transport = Self::new(timeout)?;
        for proxy in pool {
            transport.client_for(proxy)?;
        }
        debug!("Prepared {} proxied clients", transport.proxied.lock().len());
        Ok(transport)
    }

    fn builder(timeout: Duration) -> reqwest::ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

        Client::builder().default_headers(headers).timeout(timeout)
    }

    fn client_for(&self, proxy: &ProxyConfig) -> Result<Client> {
        if let Some(client) = self.proxied.lock().get(proxy) {
            return Ok(client.clone());
        }

        let client = self.proxied_client(proxy)?;
        self.proxied.lock().insert(proxy.clone(), client.clone());
        Ok(client)
    }

    /// Build a client that tunnels through `proxy`.
    ///
    /// Certificate validation toward the target is disabled for proxied
    /// requests: intercepting proxies present their own certificates.
    fn proxied_client(&self, proxy: &ProxyConfig) -> Result<Client> {
        let proxy_url = proxy.url()?;
        let upstream = Proxy::all(proxy_url.as_str())
            .map_err(|e| ProxyProbeError::ProxySetup(format!("{}: {}", proxy.label(), e)))?;

        Self::builder(self.timeout)
            .proxy(upstream)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(ProxyProbeError::from)
    }
}

impl HttpTransport for ReqwestTransport {
    fn prepare<'a>(
        &'a self,
        url: &str,
        proxy: Option<&ProxyConfig>,
    ) -> Result<PendingResponse<'a>> {
        let client = match proxy {
            Some(proxy) => self.client_for(proxy)?,
            None => self.direct.clone(),
        };
        let request = client.get(url).build()?;

        Ok(Box::pin(send(client, request)))
    }
}

async fn send(client: Client, request: Request) -> Result<HttpResponse> {
    let response = client.execute(request).await?;
    let status = response.status().as_u16();
    let body = response.text().await?;

    debug!(status, bytes = body.len(), "response received");
    Ok(HttpResponse { status, body })
}
