use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::state::AppState;

/// Engine counters exposed at `/metrics`.
pub struct Metrics {
    registry: Registry,
    pub requests_expired: IntCounter,
    pub bookings_expired: IntCounter,
    pub payment_events_applied: IntCounter,
    pub payment_events_replayed: IntCounter,
    pub payouts_released: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let requests_expired =
            IntCounter::new("venuo_requests_expired_total", "Requests expired by the sweep")
                .unwrap();
        let bookings_expired =
            IntCounter::new("venuo_bookings_expired_total", "Bookings expired by the sweep")
                .unwrap();
        let payment_events_applied = IntCounter::new(
            "venuo_payment_events_applied_total",
            "Payment events applied for the first time",
        )
        .unwrap();
        let payment_events_replayed = IntCounter::new(
            "venuo_payment_events_replayed_total",
            "Payment event redeliveries skipped by the dedup ledger",
        )
        .unwrap();
        let payouts_released =
            IntCounter::new("venuo_payouts_released_total", "Payouts released to vendors")
                .unwrap();

        registry.register(Box::new(requests_expired.clone())).unwrap();
        registry.register(Box::new(bookings_expired.clone())).unwrap();
        registry.register(Box::new(payment_events_applied.clone())).unwrap();
        registry.register(Box::new(payment_events_replayed.clone())).unwrap();
        registry.register(Box::new(payouts_released.clone())).unwrap();

        Self {
            registry,
            requests_expired,
            bookings_expired,
            payment_events_applied,
            payment_events_replayed,
            payouts_released,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(serve_metrics))
}

async fn serve_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if encoder
        .encode(&state.metrics.registry.gather(), &mut buf)
        .is_err()
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).into_owned())
}
