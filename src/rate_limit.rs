//! Per-client sliding window request limits, applied as axum middleware.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

/// Forget idle clients once the table grows past this
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max_requests: usize,
    pub window: Duration,
}

impl Limit {
    /// Anonymous endpoints: 100 requests per 15 minutes
    pub fn public() -> Self {
        Limit {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }

    /// Signed-in endpoints: 300 requests per 15 minutes
    pub fn authenticated() -> Self {
        Limit {
            max_requests: 300,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: usize, reset: Duration },
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    limit: Limit,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: Limit) -> Self {
        RateLimiter {
            limit,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    /// Counts a request from `key` unless it is over the limit
    pub async fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let window = self.limit.window;
        let mut clients = self.clients.lock().await;
        if clients.len() > PRUNE_THRESHOLD {
            clients.retain(|_, times| times.back().map_or(false, |t| now - *t < window));
        }

        let times = clients.entry(key.to_string()).or_default();
        while times.front().map_or(false, |t| now - *t >= window) {
            times.pop_front();
        }
        let reset = |oldest: Instant| window.saturating_sub(now - oldest);
        if times.len() >= self.limit.max_requests {
            let retry_after = times.front().map_or(window, |t| reset(*t));
            return Decision::Limited { retry_after };
        }
        times.push_back(now);
        Decision::Allowed {
            remaining: self.limit.max_requests - times.len(),
            reset: times.front().map_or(window, |t| reset(*t)),
        }
    }
}

/// Limits for the anonymous and the signed-in parts of the API
#[derive(Clone)]
pub struct RateLimits {
    pub public: Arc<RateLimiter>,
    pub authenticated: Arc<RateLimiter>,
}

impl RateLimits {
    pub fn new(public: Limit, authenticated: Limit) -> Self {
        RateLimits {
            public: Arc::new(RateLimiter::new(public)),
            authenticated: Arc::new(RateLimiter::new(authenticated)),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits::new(Limit::public(), Limit::authenticated())
    }
}

/// First `X-Forwarded-For` hop, else the peer address
fn client_key<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    headers.insert(name, HeaderValue::from(value));
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

pub async fn limit_requests<B>(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    let key = client_key(&request);
    let max = limiter.limit().max_requests as u64;
    match limiter.check(&key).await {
        Decision::Allowed { remaining, reset } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            set_header(headers, "ratelimit-limit", max);
            set_header(headers, "ratelimit-remaining", remaining as u64);
            set_header(headers, "ratelimit-reset", ceil_secs(reset));
            response
        }
        Decision::Limited { retry_after } => {
            let retry_after = ceil_secs(retry_after);
            warn!("rate limited {key} on {}", request.uri().path());
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Too many requests",
                    "message": "Please try again later",
                    "retryAfter": retry_after,
                })),
            )
                .into_response();
            let headers = response.headers_mut();
            set_header(headers, "retry-after", retry_after);
            set_header(headers, "ratelimit-limit", max);
            set_header(headers, "ratelimit-remaining", 0);
            set_header(headers, "ratelimit-reset", retry_after);
            debug!("{key} may retry in {retry_after}s");
            response
        }
    }
}
