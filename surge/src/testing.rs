//! In-process stand-in for the shop service.
use crate::http::{HttpClient, Request, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Clone)]
pub(crate) struct MockClient {
    latency: Duration,
    auth_latency: Option<Duration>,
    reject_auth: bool,
    record: bool,
    sequence: Arc<AtomicU64>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockClient {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            auth_latency: None,
            reject_auth: false,
            record: true,
            sequence: Arc::new(AtomicU64::new(0)),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn base_url() -> Url {
        Url::parse("http://shop.test").unwrap()
    }

    /// Every login answers 401.
    pub fn reject_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    pub fn auth_latency(mut self, latency: Duration) -> Self {
        self.auth_latency = Some(latency);
        self
    }

    /// Stop keeping a copy of every request; for long runs.
    pub fn untracked(mut self) -> Self {
        self.record = false;
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn authorized(request: &Request) -> bool {
        let cookie = request
            .header_value("cookie")
            .is_some_and(|v| v.starts_with("accessToken=token-"));
        let bearer = request
            .header_value("authorization")
            .is_some_and(|v| v.starts_with("Bearer token-"));
        cookie || bearer
    }
}

impl HttpClient for MockClient {
    async fn send(&self, request: Request) -> Response {
        let path = request.url.path().to_string();
        let latency = match (path.as_str(), self.auth_latency) {
            ("/api/auth", Some(latency)) => latency,
            _ => self.latency,
        };
        tokio::time::sleep(latency).await;

        let response = match path.as_str() {
            "/api/auth" if self.reject_auth => Response::new(401).body("unauthorized"),
            "/api/auth" => {
                let token = format!("token-{}", self.sequence.fetch_add(1, Ordering::Relaxed));
                Response::new(200)
                    .body(serde_json::json!({ "response": { "accessToken": token } }).to_string())
                    .cookie("accessToken", token)
            }
            _ if !Self::authorized(&request) => Response::new(401).body("unauthorized"),
            p if p.starts_with("/api/buy/") || p == "/api/info" => Response::new(200).body("ok"),
            _ => Response::new(404),
        };

        if self.record {
            self.requests.lock().unwrap().push(request);
        }
        response
    }
}
