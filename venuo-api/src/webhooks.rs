use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use venuo_core::payment::PaymentOutcome;
use venuo_payments::service::AppliedPayment;

use crate::state::AppState;

/// Webhooks are authenticated by the processor's signature at the edge
/// proxy, not by a bearer token, so these routes skip the auth layer.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/webhooks/payments", post(handle_payment_webhook))
        .route("/v1/webhooks/payout-accounts", post(handle_payout_account_webhook))
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
}

/// POST /v1/webhooks/payments
///
/// Redelivery is routine for processor webhooks; a replayed event id
/// acks with 200 carrying an `already_processed` marker, without
/// touching the ledger.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<Value>, StatusCode> {
    tracing::info!("Received webhook: {} for session {}", payload.type_, payload.data.object.id);

    let outcome = match payload.type_.as_str() {
        "checkout.session.completed" => PaymentOutcome::Succeeded,
        "checkout.session.payment_failed" => PaymentOutcome::Failed,
        "checkout.session.expired" | "checkout.session.canceled" => PaymentOutcome::Canceled,
        // Event types the engine does not consume are acked so the
        // processor stops redelivering them.
        _ => return Ok(Json(json!({ "received": true, "ignored": true }))),
    };

    let applied = state
        .payments
        .apply_payment_event(&payload.id, &payload.data.object.id, outcome)
        .await
        .map_err(|e| {
            tracing::error!("Failed to apply payment event {}: {}", payload.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match applied {
        AppliedPayment::Applied => state.metrics.payment_events_applied.inc(),
        AppliedPayment::AlreadyProcessed => state.metrics.payment_events_replayed.inc(),
    }
    Ok(Json(json!({
        "received": true,
        "already_processed": applied == AppliedPayment::AlreadyProcessed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PayoutAccountWebhook {
    pub vendor_id: Uuid,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    #[serde(default)]
    pub pending_requirements: Vec<String>,
}

/// POST /v1/webhooks/payout-accounts
async fn handle_payout_account_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PayoutAccountWebhook>,
) -> Result<StatusCode, StatusCode> {
    state
        .vendors
        .apply_payout_account_status(
            payload.vendor_id,
            payload.charges_enabled,
            payload.payouts_enabled,
            payload.pending_requirements,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to apply payout account status: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(StatusCode::OK)
}
