use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use venuo_core::identity::Principal;
use venuo_core::payment::CheckoutSession;
use venuo_payments::models::{Invoice, InvoiceSubject, Payout};
use venuo_payments::service::ReleaseOutcome;

use crate::error::AppError;
use crate::middleware::auth::{admin_auth_middleware, auth_middleware, vendor_auth_middleware};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let party = Router::new()
        .route("/v1/checkout", post(open_checkout))
        .route("/v1/invoices/{id}", get(get_invoice))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let vendor = Router::new()
        .route("/v1/vendor/payouts", get(my_payouts))
        .layer(from_fn_with_state(state.clone(), vendor_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/payouts/pending", get(pending_payouts))
        .route("/v1/admin/payouts/{id}/release", post(release_payout))
        .route("/v1/admin/payouts/retry", post(retry_payouts))
        .route("/v1/admin/invoices/{id}/void", post(void_invoice))
        .route("/v1/admin/invoices/{id}/refund", post(refund_invoice))
        .layer(from_fn_with_state(state, admin_auth_middleware));

    party.merge(vendor).merge(admin)
}

#[derive(Debug, Deserialize)]
pub struct OpenCheckoutBody {
    pub subject: InvoiceSubject,
    pub success_ref: String,
    pub cancel_ref: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub invoice: Invoice,
    pub session: CheckoutSession,
}

async fn open_checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<OpenCheckoutBody>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let (invoice, session) = state
        .payments
        .open_checkout(&principal, body.subject, &body.success_ref, &body.cancel_ref)
        .await?;
    Ok(Json(CheckoutResponse { invoice, session }))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.payments.invoice(id).await?))
}

async fn my_payouts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Payout>>, AppError> {
    Ok(Json(state.payments.payouts_for_vendor(principal.id).await?))
}

async fn pending_payouts(State(state): State<AppState>) -> Result<Json<Vec<Payout>>, AppError> {
    Ok(Json(state.payments.payout_queue().await?))
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

async fn release_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let outcome = state.payments.release_payout(id).await?;
    if outcome == ReleaseOutcome::Released {
        state.metrics.payouts_released.inc();
    }
    Ok(Json(ReleaseResponse { released: outcome == ReleaseOutcome::Released }))
}

#[derive(Debug, Serialize)]
pub struct RetryResponse {
    pub released: usize,
}

async fn retry_payouts(State(state): State<AppState>) -> Result<Json<RetryResponse>, AppError> {
    let released = state.payments.retry_pending_payouts().await?;
    Ok(Json(RetryResponse { released }))
}

async fn void_invoice(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.payments.void_invoice(&principal, id).await?))
}

async fn refund_invoice(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.payments.mark_invoice_refunded(&principal, id).await?))
}
