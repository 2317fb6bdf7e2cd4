//! Sliding-window rate limiter per client network identity (spec.md §5).
//!
//! A small hand-rolled tower `Layer`/`Service`, matching the teacher's habit
//! of keeping shared mutable state behind a single lock rather than pulling
//! in an external limiter crate (`connection_retry.rs`'s `ConnectionManager`
//! follows the same shape: `Arc<RwLock<HashMap<...>>>`).

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tower::{Layer, Service};

#[derive(Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Default)]
struct Window {
    hits: VecDeque<Instant>,
}

pub struct RateLimiterState {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiterState {
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Returns `(allowed, remaining, reset_in, retry_after)`.
    async fn check(&self, client: &str) -> (bool, u32, Duration, Duration) {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(client.to_string()).or_default();

        while let Some(&front) = entry.hits.front() {
            if now.duration_since(front) > self.config.window {
                entry.hits.pop_front();
            } else {
                break;
            }
        }

        let count = entry.hits.len() as u32;
        if count >= self.config.max_requests {
            let retry_after = entry
                .hits
                .front()
                .map(|&first| self.config.window.saturating_sub(now.duration_since(first)))
                .unwrap_or(self.config.window);
            return (false, 0, retry_after, retry_after);
        }

        entry.hits.push_back(now);
        let remaining = self.config.max_requests - count - 1;
        (true, remaining, self.config.window, Duration::ZERO)
    }
}

#[derive(Clone)]
pub struct RateLimitLayer {
    state: Arc<RateLimiterState>,
}

impl RateLimitLayer {
    pub fn new(state: Arc<RateLimiterState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    state: Arc<RateLimiterState>,
}

impl<S, B> Service<Request<B>> for RateLimitMiddleware<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let client = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let state = self.state.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let (allowed, remaining, reset_in, retry_after) = state.check(&client).await;
            if !allowed {
                let body = serde_json::json!({
                    "detail": "rate limit exceeded",
                    "retry_after": retry_after.as_secs(),
                });
                let mut resp = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
                let headers = resp.headers_mut();
                headers.insert("X-RateLimit-Limit", state.config.max_requests.into());
                headers.insert("X-RateLimit-Remaining", 0.into());
                headers.insert("X-RateLimit-Reset", retry_after.as_secs().into());
                return Ok(resp);
            }

            let mut resp = inner.call(req).await?;
            let headers = resp.headers_mut();
            headers.insert("X-RateLimit-Limit", state.config.max_requests.into());
            headers.insert("X-RateLimit-Remaining", remaining.into());
            headers.insert("X-RateLimit-Reset", reset_in.as_secs().into());
            Ok(resp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_cap_then_blocks() {
        let state = RateLimiterState::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        });
        let (allowed1, _, _, _) = state.check("client-a").await;
        let (allowed2, _, _, _) = state.check("client-a").await;
        let (allowed3, remaining3, _, retry_after) = state.check("client-a").await;
        assert!(allowed1);
        assert!(allowed2);
        assert!(!allowed3);
        assert_eq!(remaining3, 0);
        assert!(retry_after <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn separate_clients_have_independent_windows() {
        let state = RateLimiterState::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let (a, _, _, _) = state.check("client-a").await;
        let (b, _, _, _) = state.check("client-b").await;
        assert!(a);
        assert!(b);
    }
}
