//! Request metrics
//!
//! Counters and latency histogram for the HTTP surface, kept in a
//! prometheus-client registry.

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// A summary line is logged every this many requests
const LOG_EVERY: u64 = 10;

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResponseLabels {
    method: String,
    status: String,
}

/// Snapshot served by `GET /metrics`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    /// Percentage of requests answered with a 4xx or 5xx status
    pub error_rate: f64,
    /// Mean response time in milliseconds
    pub average_response_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// Service-wide request metrics
#[derive(Debug)]
pub struct RequestMetrics {
    registry: Registry,
    requests: Counter,
    errors: Counter,
    response_time_ms: Counter<f64, AtomicU64>,
    responses: Family<ResponseLabels, Counter>,
    latency: Histogram,
}

impl RequestMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("transfer_service");

        let requests = Counter::default();
        let errors = Counter::default();
        let response_time_ms = Counter::<f64, AtomicU64>::default();
        let responses = Family::<ResponseLabels, Counter>::default();
        let latency = Histogram::new(exponential_buckets(0.001, 2.0, 14));

        registry.register("http_requests", "HTTP requests handled", requests.clone());
        registry.register(
            "http_request_errors",
            "HTTP requests answered with a 4xx or 5xx status",
            errors.clone(),
        );
        registry.register(
            "http_response_time_milliseconds",
            "Accumulated response time",
            response_time_ms.clone(),
        );
        registry.register(
            "http_responses",
            "HTTP responses by method and status",
            responses.clone(),
        );
        registry.register(
            "http_request_duration_seconds",
            "HTTP request latency",
            latency.clone(),
        );

        Self {
            registry,
            requests,
            errors,
            response_time_ms,
            responses,
            latency,
        }
    }

    /// Record one completed request
    pub fn record(&self, method: &Method, status: StatusCode, elapsed: Duration) {
        let total = self.requests.inc() + 1;
        if status.is_client_error() || status.is_server_error() {
            self.errors.inc();
        }

        self.response_time_ms.inc_by(elapsed.as_secs_f64() * 1_000.0);
        self.latency.observe(elapsed.as_secs_f64());
        self.responses
            .get_or_create(&ResponseLabels {
                method: method.to_string(),
                status: status.as_u16().to_string(),
            })
            .inc();

        if total % LOG_EVERY == 0 {
            let summary = self.summary();
            tracing::info!(
                requests = summary.total_requests,
                errors = summary.total_errors,
                error_rate = format!("{:.2}%", summary.error_rate),
                avg_response_ms = format!("{:.2}", summary.average_response_time),
                "Request metrics"
            );
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let total_requests = self.requests.get();
        let total_errors = self.errors.get();

        let (error_rate, average_response_time) = if total_requests == 0 {
            (0.0, 0.0)
        } else {
            let total = total_requests as f64;
            (
                total_errors as f64 / total * 100.0,
                self.response_time_ms.get() / total,
            )
        };

        MetricsSummary {
            total_requests,
            total_errors,
            error_rate,
            average_response_time,
            timestamp: Utc::now(),
        }
    }

    /// OpenMetrics text exposition of the registry
    pub fn encode_text(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}
