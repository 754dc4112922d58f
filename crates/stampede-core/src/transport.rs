// Transport seam
//
// The engine never performs I/O itself. Scenarios build RequestSpecs and the
// scheduler pushes them through an HttpTransport implementation: the reqwest
// adapter in production, in-memory mocks in tests and examples.
//
// send() is infallible by contract. A transport that could not obtain a
// response reports the status-0 sentinel so the classifier stays total and
// network failures are recorded instead of thrown.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::outcome::RequestOutcome;

/// HTTP method subset the engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// One request, fully specified by a scenario's request factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// POST with a JSON body and content-type header
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::post(url)
            .with_body(body)
            .with_header("Content-Type", "application/json")
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// The engine's only I/O boundary
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request and report its outcome. Never fails: transport-level
    /// errors surface as status 0.
    async fn send(&self, request: RequestSpec) -> RequestOutcome;
}
