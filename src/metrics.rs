//! Prometheus request metrics.
//!
//! Every request bumps `http_requests_total` and records its latency in
//! `http_response_time_seconds`, plus a per-route series in
//! `http_request_duration_seconds{method,path,status_code}`.
//! `GET /metrics` renders the registry.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Registry, TextEncoder,
};
use tracing::error;

use crate::state::AppState;

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    http_requests_total: IntCounter,
    http_response_time_seconds: Histogram,
    http_request_duration_seconds: HistogramVec,
}

/// Label for requests that matched no route, keeps path cardinality bounded.
const UNMATCHED_PATH: &str = "unmatched";

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests_total =
            IntCounter::new("http_requests_total", "Total HTTP requests received")?;
        let http_response_time_seconds = Histogram::with_opts(
            HistogramOpts::new("http_response_time_seconds", "Response time in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Request duration in seconds by route",
            )
            .buckets(vec![0.003, 0.03, 0.1, 0.3, 1.5, 10.0]),
            &["method", "path", "status_code"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_response_time_seconds.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_response_time_seconds,
                http_request_duration_seconds,
            }),
        })
    }

    pub fn requests(&self) -> u64 {
        self.inner.http_requests_total.get()
    }

    fn record(&self, method: &str, path: &str, status: u16, secs: f64) {
        self.inner.http_requests_total.inc();
        self.inner.http_response_time_seconds.observe(secs);
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path, &status.to_string()])
            .observe(secs);
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub async fn track(State(metrics): State<Metrics>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_PATH.to_owned());

    let start = Instant::now();
    let res = next.run(req).await;
    metrics.record(
        &method,
        &path,
        res.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    res
}

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
