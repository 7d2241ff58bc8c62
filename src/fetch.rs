//! Network access behind the `Fetcher` seam
//!
//! The controller never talks to the network directly. `HttpFetcher` is the
//! production implementation; `ScriptedFetcher` serves canned responses and
//! can be switched offline, which is how tests and `fetch --offline` model a
//! dead network.

use crate::config::schema::NetworkConfig;
use crate::error::{CampusError, CampusResult};
use crate::http::{Method, Request, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;
use ureq::{Agent, RequestBuilder};

/// Abstract network interface
///
/// A resolved future means the request reached a server, whatever the
/// status code. Only transport failures (offline, DNS, timeout) are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request
    async fn fetch(&self, request: &Request) -> CampusResult<Response>;

    /// Human-readable name for display
    fn name(&self) -> &'static str;
}

/// Blocking `ureq` agent driven from the tokio blocking pool
#[derive(Clone)]
pub struct HttpFetcher {
    agent: Agent,
    user_agent: String,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &NetworkConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();

        Self {
            agent: Agent::new_with_config(agent_config),
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    fn execute(&self, request: &Request) -> Result<Response, ureq::Error> {
        let (agent, user_agent) = (&self.agent, self.user_agent.as_str());
        let url = request.url.as_str();
        let mut response = match request.method {
            Method::Get => with_headers(agent.get(url), user_agent, request).call()?,
            Method::Head => with_headers(agent.head(url), user_agent, request).call()?,
            Method::Delete => with_headers(agent.delete(url), user_agent, request).call()?,
            Method::Options => with_headers(agent.options(url), user_agent, request).call()?,
            Method::Post => with_headers(agent.post(url), user_agent, request).send(&request.body[..])?,
            Method::Put => with_headers(agent.put(url), user_agent, request).send(&request.body[..])?,
            Method::Patch => with_headers(agent.patch(url), user_agent, request).send(&request.body[..])?,
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.max_body_bytes)
            .read_to_vec()?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(builder: RequestBuilder<B>, user_agent: &str, request: &Request) -> RequestBuilder<B> {
    request
        .headers
        .iter()
        .fold(builder.header("User-Agent", user_agent), |b, (name, value)| {
            b.header(name.as_str(), value.as_str())
        })
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> CampusResult<Response> {
        let fetcher = self.clone();
        let owned = request.clone();

        debug!("{} {}", request.method, request.url);
        tokio::task::spawn_blocking(move || fetcher.execute(&owned))
            .await
            .map_err(|e| CampusError::Internal(format!("fetch task failed: {}", e)))?
            .map_err(|e| CampusError::network(request.url.as_str(), e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// In-memory network with a kill switch
pub struct ScriptedFetcher {
    routes: RwLock<HashMap<String, Response>>,
    online: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// An online network with no routes (every URL answers 404)
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// A network where every request fails
    pub fn offline() -> Self {
        let fetcher = Self::new();
        fetcher.set_online(false);
        fetcher
    }

    /// Serve `response` for any method on `url`
    pub fn route(&self, url: &str, response: Response) {
        if let Ok(mut routes) = self.routes.write() {
            routes.insert(url.to_string(), response);
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> CampusResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.online.load(Ordering::SeqCst) {
            return Err(CampusError::network(request.url.as_str(), "network unreachable"));
        }

        let routes = self
            .routes
            .read()
            .map_err(|_| CampusError::Internal("route table poisoned".to_string()))?;
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "Not Found")))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: &str) -> Request {
        Request::parse(Method::Get, url).unwrap()
    }

    #[tokio::test]
    async fn scripted_serves_routes() {
        let fetcher = ScriptedFetcher::new();
        fetcher.route("http://localhost:3000/api/quiz", Response::new(200, "[1]"));

        let hit = fetcher.fetch(&request("http://localhost:3000/api/quiz")).await.unwrap();
        assert_eq!(hit.text(), "[1]");

        let miss = fetcher.fetch(&request("http://localhost:3000/nope")).await.unwrap();
        assert_eq!(miss.status, 404);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn scripted_offline_fails_every_request() {
        let fetcher = ScriptedFetcher::offline();
        fetcher.route("http://localhost:3000/", Response::new(200, "home"));

        let err = fetcher.fetch(&request("http://localhost:3000/")).await.unwrap_err();
        assert!(matches!(err, CampusError::Network { .. }));
        assert_eq!(fetcher.calls(), 1);

        fetcher.set_online(true);
        assert!(fetcher.fetch(&request("http://localhost:3000/")).await.is_ok());
    }

    #[tokio::test]
    async fn http_fetcher_keeps_error_status_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/quiz"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("Content-Type", "application/json")
                    .set_body_string(r#"{"error":"gone"}"#),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&NetworkConfig::default());
        let response = fetcher
            .fetch(&request(&format!("{}/api/quiz", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.text(), r#"{"error":"gone"}"#);
    }

    #[tokio::test]
    async fn http_fetcher_enforces_body_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/bundle.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/offline"))
            .respond_with(ResponseTemplate::new(200).set_body_string("offline page"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&NetworkConfig {
            max_body_bytes: 1024,
            ..NetworkConfig::default()
        });

        let err = fetcher
            .fetch(&request(&format!("{}/static/bundle.js", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, CampusError::Network { .. }));

        let small = fetcher
            .fetch(&request(&format!("{}/offline", server.uri())))
            .await
            .unwrap();
        assert_eq!(small.text(), "offline page");
    }

    #[tokio::test]
    async fn http_fetcher_reports_unreachable_host_as_network_error() {
        let fetcher = HttpFetcher::new(&NetworkConfig {
            timeout_secs: 2,
            ..NetworkConfig::default()
        });
        // Port 9 (discard) on loopback is closed on test machines
        let err = fetcher
            .fetch(&request("http://127.0.0.1:9/student/dashboard"))
            .await
            .unwrap_err();
        assert!(matches!(err, CampusError::Network { .. }));
    }
}
