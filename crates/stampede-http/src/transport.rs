// Reqwest-backed transport
//
// Latency is measured from just before the request is issued to the last
// body byte. A response whose body read fails mid-stream counts as no
// response: the connection died under the request.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use tracing::warn;

use stampede_core::{HttpTransport, Method, RequestOutcome, RequestSpec, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HttpTransport implementation over a shared reqwest client
///
/// # Example
///
/// ```ignore
/// use stampede_http::ReqwestTransport;
///
/// let transport = ReqwestTransport::new()?;
/// // or with a tighter per-request timeout
/// let transport = ReqwestTransport::with_timeout(Duration::from_secs(5))?;
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with a per-request timeout. A request that exceeds
    /// it is reported as status 0, like any other transport failure.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: RequestSpec) -> RequestOutcome {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %request.url, error = %err, "request failed without a response");
                return RequestOutcome::no_response(start.elapsed());
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => RequestOutcome::new(status, body, start.elapsed()),
            Err(err) => {
                warn!(url = %request.url, error = %err, "response body read failed");
                RequestOutcome::no_response(start.elapsed())
            }
        }
    }
}
