//! Birdwatcher HTTP client
//!
//! [`Transport`] is the seam between the pipeline and the network: it turns a
//! request path into a response body. [`Client`] layers typed, JSON-decoding
//! calls for every birdwatcher endpoint on top of it.

use crate::source::birdwatcher::types::{
    CountResponse, ProtocolsResponse, ProtocolsShortResponse, RoutesResponse, StatusResponse,
};
use crate::source::error::{SourceError, SourceResult};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Upstream request timeout; no retry is attempted on expiry
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const NEIGHBOR_SUMMARY_ENDPOINT: &str = "/neighbors/summary";

/// Query string parameters, encoded by the transport
pub type Query<'a> = [(&'a str, &'a str)];

/// Fetch the raw body behind an API path (e.g. `/protocols`)
pub trait Transport: Send + Sync {
    fn get(&self, path: &str, query: &Query<'_>) -> SourceResult<String>;
}

/// `path?k=v&...` without any encoding, for logs and error messages
pub fn display_path(path: &str, query: &Query<'_>) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", path, pairs.join("&"))
}

/// Blocking HTTP transport backed by a shared `ureq` agent
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str, query: &Query<'_>) -> SourceResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let shown = format!("{}{}", self.base_url, display_path(path, query));

        let mut request = self
            .agent
            .get(&url)
            .header("Accept", "application/json; charset=utf-8");
        for (key, value) in query {
            request = request.query(*key, *value);
        }

        // non-2xx statuses surface as errors from `call()`
        let mut response = request.call().map_err(|e| match e {
            ureq::Error::StatusCode(status) => SourceError::status(shown.as_str(), status),
            e => SourceError::transport(shown.as_str(), e),
        })?;

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| SourceError::transport(shown.as_str(), e))
    }
}

/// Typed birdwatcher API client
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client talking HTTP to the birdwatcher at `base_url`
    pub fn http(base_url: &str) -> Self {
        Self::new(Arc::new(HttpTransport::new(base_url)))
    }

    /// GET `path` with `query` and decode the body as `T`
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &Query<'_>) -> SourceResult<T> {
        let body = self.transport.get(path, query)?;
        serde_json::from_str::<T>(&body)
            .map_err(|e| SourceError::decode(display_path(path, query), e))
    }

    pub fn get_status(&self) -> SourceResult<StatusResponse> {
        self.get_json("/status", &[])
    }

    pub fn get_protocols(&self) -> SourceResult<ProtocolsResponse> {
        self.get_json("/protocols", &[])
    }

    /// Short session states, bypassing the birdwatcher cache
    pub fn get_protocols_short(&self) -> SourceResult<ProtocolsShortResponse> {
        self.get_json("/protocols/short", &[("uncached", "true")])
    }

    pub fn get_neighbor_summary(&self) -> SourceResult<ProtocolsResponse> {
        self.get_json(NEIGHBOR_SUMMARY_ENDPOINT, &[])
    }

    pub fn get_routes(&self, path: &str, query: &Query<'_>) -> SourceResult<RoutesResponse> {
        self.get_json(path, query)
    }

    pub fn get_count(&self, path: &str, query: &Query<'_>) -> SourceResult<CountResponse> {
        self.get_json(path, query)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport serving JSON fixtures by path

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    #[derive(Default)]
    pub struct FakeTransport {
        responses: Mutex<HashMap<String, String>>,
        calls: Mutex<HashMap<String, usize>>,
        queries: Mutex<HashMap<String, Vec<(String, String)>>>,
        failures: Mutex<HashMap<String, String>>,
        total: AtomicUsize,
        latency: Option<Duration>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_latency(latency: Duration) -> Self {
            Self {
                latency: Some(latency),
                ..Default::default()
            }
        }

        pub fn serve(&self, path: &str, body: serde_json::Value) {
            self.failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(path);
            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_string(), body.to_string());
        }

        pub fn serve_raw(&self, path: &str, body: &str) {
            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_string(), body.to_string());
        }

        /// Fail requests to `path` without any HTTP answer, like a refused connection
        pub fn fail(&self, path: &str, message: &str) {
            self.failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_string(), message.to_string());
        }

        pub fn calls(&self, path: &str) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .copied()
                .unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }

        /// Query parameters of the last request to `path`, as the transport got them
        pub fn last_query(&self, path: &str) -> Option<Vec<(String, String)>> {
            self.queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .cloned()
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, path: &str, query: &Query<'_>) -> SourceResult<String> {
            let key = display_path(path, query);
            self.total.fetch_add(1, Ordering::SeqCst);
            *self
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key.clone())
                .or_insert(0) += 1;
            self.queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    path.to_string(),
                    query
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                );

            if let Some(latency) = self.latency {
                std::thread::sleep(latency);
            }

            if let Some(message) = self
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
            {
                return Err(SourceError::transport(key.as_str(), message));
            }

            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
                .cloned()
                .ok_or_else(|| SourceError::status(key.as_str(), 404))
        }
    }
}
