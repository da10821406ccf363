//! An in-memory merch shop standing in for the system under test.
//!
//! - `POST /api/auth` registers on first login, then checks the password. Answers with an
//!   `accessToken` cookie and `{"response": {"accessToken": ...}}`.
//! - `POST /api/buy/:item` needs the token (cookie or bearer). Unknown items are a 500.
//! - `GET /api/info` lists the caller's purchases.
use axum::{
    debug_handler,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

pub const TOKEN_COOKIE: &str = "accessToken";

pub const MERCH: [&str; 10] = [
    "t-shirt",
    "cup",
    "book",
    "pen",
    "powerbank",
    "hoody",
    "umbrella",
    "socks",
    "wallet",
    "pink-hoody",
];

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Mean handling time of every request.
    pub latency: Duration,
    /// Standard deviation around `latency`.
    pub jitter: Duration,
    /// Answer every login with 401.
    pub reject_auth: bool,
    /// Requests above this rate are answered with 500.
    pub max_rps: Option<NonZeroU32>,
}

impl MockConfig {
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn reject_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    pub fn max_rps(mut self, max_rps: NonZeroU32) -> Self {
        self.max_rps = Some(max_rps);
        self
    }

    fn delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.latency;
        }
        let mean = self.latency.as_secs_f64();
        let secs = Normal::new(mean, self.jitter.as_secs_f64())
            .map(|normal| normal.sample(&mut rand::thread_rng()).max(0.))
            .unwrap_or(mean);
        Duration::from_secs_f64(secs)
    }
}

struct Shop {
    config: MockConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    users: RwLock<HashMap<String, String>>,
    sessions: RwLock<HashMap<String, String>>,
    inventory: RwLock<HashMap<String, BTreeMap<String, u64>>>,
}

impl Shop {
    async fn simulate(&self) -> Result<(), ShopError> {
        counter!("mock_service.requests").increment(1);
        if let Some(limiter) = &self.limiter {
            limiter.check().map_err(|_| ShopError::Overloaded)?;
        }
        tokio::time::sleep(self.config.delay()).await;
        Ok(())
    }

    fn user(&self, headers: &HeaderMap) -> Result<String, ShopError> {
        let token = token_from(headers).ok_or(ShopError::Unauthorized)?;
        self.sessions
            .read()?
            .get(&token)
            .cloned()
            .ok_or(ShopError::Unauthorized)
    }
}

fn token_from(headers: &HeaderMap) -> Option<String> {
    let cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == TOKEN_COOKIE).then(|| value.to_string())
        });

    cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
            .map(str::to_string)
    })
}

#[derive(Error, Debug)]
enum ShopError {
    #[error("invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("unknown item `{0}`")]
    UnknownItem(String),

    #[error("too many requests")]
    Overloaded,

    #[error("shop state is poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for ShopError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

#[derive(Serialize)]
struct ErrorBody {
    errors: String,
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = match self {
            ShopError::Unauthorized => StatusCode::UNAUTHORIZED,
            ShopError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ShopError::UnknownItem(_) | ShopError::Overloaded | ShopError::Poisoned => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        debug!("{status}: {self}");
        (
            status,
            Json(ErrorBody {
                errors: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct AuthRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    response: AccessToken,
}

#[derive(Serialize)]
struct AccessToken {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Serialize)]
struct InfoResponse {
    inventory: Vec<InventoryItem>,
}

#[derive(Serialize)]
struct InventoryItem {
    #[serde(rename = "type")]
    kind: String,
    quantity: u64,
}

pub fn router(config: MockConfig) -> Router {
    let shop = Shop {
        limiter: config
            .max_rps
            .map(|max_rps| RateLimiter::direct(Quota::per_second(max_rps))),
        config,
        users: RwLock::default(),
        sessions: RwLock::default(),
        inventory: RwLock::default(),
    };

    Router::new()
        .route("/api/auth", post(auth))
        .route("/api/buy/:item", post(buy))
        .route("/api/info", get(info))
        .with_state(Arc::new(shop))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    debug!("Mock shop listening on {addr}");
    axum::serve(listener, router(config)).await?;
    Ok(())
}

#[debug_handler]
async fn auth(
    State(shop): State<Arc<Shop>>,
    Json(request): Json<AuthRequest>,
) -> Result<impl IntoResponse, ShopError> {
    shop.simulate().await?;

    if request.username.is_empty() || request.password.is_empty() {
        return Err(ShopError::BadRequest("username and password are required"));
    }
    if shop.config.reject_auth {
        return Err(ShopError::Unauthorized);
    }

    {
        let mut users = shop.users.write()?;
        let password = users
            .entry(request.username.clone())
            .or_insert_with(|| request.password.clone());
        if *password != request.password {
            return Err(ShopError::Unauthorized);
        }
    }

    let token = Uuid::new_v4().to_string();
    shop.sessions
        .write()?
        .insert(token.clone(), request.username);

    let cookie = format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            response: AccessToken {
                access_token: token,
            },
        }),
    ))
}

#[debug_handler]
async fn buy(
    State(shop): State<Arc<Shop>>,
    Path(item): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ShopError> {
    shop.simulate().await?;
    let user = shop.user(&headers)?;

    if !MERCH.contains(&item.as_str()) {
        return Err(ShopError::UnknownItem(item));
    }

    *shop
        .inventory
        .write()?
        .entry(user)
        .or_default()
        .entry(item)
        .or_default() += 1;

    Ok(StatusCode::OK)
}

#[debug_handler]
async fn info(
    State(shop): State<Arc<Shop>>,
    headers: HeaderMap,
) -> Result<Json<InfoResponse>, ShopError> {
    shop.simulate().await?;
    let user = shop.user(&headers)?;

    let inventory = shop
        .inventory
        .read()?
        .get(&user)
        .map(|items| {
            items
                .iter()
                .map(|(kind, quantity)| InventoryItem {
                    kind: kind.clone(),
                    quantity: *quantity,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Json(InfoResponse { inventory }))
}
