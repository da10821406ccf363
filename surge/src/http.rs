//! The network collaborator.
//!
//! The engine never talks to the wire itself: every call goes through an [`HttpClient`].
//! Transport problems are reported as values on the [`Response`] so that a failing system
//! under test produces failed samples rather than errors.
use std::time::Duration;
use surge_core::{Method, DEFAULT_REQUEST_TIMEOUT};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: vec![],
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find(&self.headers, name)
    }
}

/// Immutable snapshot of one network call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// `0` when the call failed before a status was received.
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub body: String,
    /// Wall time of the call, filled in by the executor.
    pub duration: Duration,
    /// Transport failure (connection refused, timeout, ...).
    pub error: Option<String>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn transport_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Transport succeeded and the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        find(&self.headers, name)
    }

    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

fn find<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Sends requests to the system under test.
///
/// Implementations must not panic on transport failures; report them through
/// [`Response::transport_error`] instead.
#[trait_variant::make(HttpClient: Send)]
pub trait LocalHttpClient {
    async fn send(&self, request: Request) -> Response;
}

#[cfg(feature = "client")]
pub use reqwest_client::ReqwestClient;

#[cfg(feature = "client")]
mod reqwest_client {
    use super::{HttpClient, Request, Response};
    use surge_core::Method;

    /// [`HttpClient`] backed by a shared `reqwest` connection pool.
    ///
    /// No cookie jar is attached: tokens are forwarded explicitly by the executor so that
    /// virtual users never see each other's sessions.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder().build()?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    impl HttpClient for ReqwestClient {
        async fn send(&self, request: Request) -> Response {
            let mut builder = self
                .client
                .request(method(request.method), request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let res = match builder.send().await {
                Ok(res) => res,
                Err(err) => return Response::transport_error(err.to_string()),
            };

            let mut response = Response::new(res.status().as_u16());
            response.headers = res
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
                })
                .collect();
            response.cookies = res
                .cookies()
                .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
                .collect();

            match res.text().await {
                Ok(body) => response.body(body),
                Err(err) => Response {
                    error: Some(err.to_string()),
                    ..response
                },
            }
        }
    }
}
