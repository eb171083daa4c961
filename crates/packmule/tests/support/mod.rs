//! Shared test support: an in-memory HTTP transport and packument
//! builders.

// Each integration test binary compiles its own copy; not every binary
// uses every helper.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use packmule::http::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// In-memory transport: responses are registered per (method, url) and
/// returned FIFO.
#[derive(Clone, Default)]
pub struct StubTransport {
    inner: Arc<Mutex<HashMap<(HttpMethod, String), VecDeque<HttpResponse>>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, method: HttpMethod, url: impl Into<String>, body: &serde_json::Value) {
        self.push(
            method,
            url,
            HttpResponse {
                status: 200,
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: body.to_string().into_bytes(),
            },
        );
    }

    pub fn push_status(&self, method: HttpMethod, url: impl Into<String>, status: u16) {
        self.push(
            method,
            url,
            HttpResponse {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            },
        );
    }

    fn push(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
        self.inner
            .lock()
            .expect("stub transport lock")
            .entry((method, url.into()))
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self.inner.lock().expect("stub transport lock");
        match inner
            .get_mut(&(request.method, request.url.clone()))
            .and_then(|queue| queue.pop_front())
        {
            Some(response) => Ok(response),
            None => Err(HttpError::NoMockResponse {
                method: request.method.as_str().to_string(),
                url: request.url,
            }),
        }
    }
}

/// Base URL used by every stubbed registry.
pub const REGISTRY_URL: &str = "https://reg.test";

/// Build one version entry for a packument.
pub fn version_json(version: &str, size: u64, deps: &[(&str, &str)]) -> serde_json::Value {
    serde_json::json!({
        "version": version,
        "dependencies": deps
            .iter()
            .map(|(name, spec)| (name.to_string(), serde_json::json!(spec)))
            .collect::<serde_json::Map<String, serde_json::Value>>(),
        "dist": { "unpackedSize": size }
    })
}

/// Register a packument whose `latest` tag points at the given version.
pub fn push_packument(
    transport: &StubTransport,
    name: &str,
    latest: &str,
    versions: serde_json::Value,
) {
    transport.push_json(
        HttpMethod::Get,
        format!("{REGISTRY_URL}/{}", packmule::registry::encode_name(name)),
        &serde_json::json!({
            "name": name,
            "dist-tags": { "latest": latest },
            "versions": versions
        }),
    );
}

/// Register a single-version packument with no dependencies.
pub fn push_leaf(transport: &StubTransport, name: &str, version: &str, size: u64) {
    push_packument(
        transport,
        name,
        version,
        serde_json::json!({ version: version_json(version, size, &[]) }),
    );
}
