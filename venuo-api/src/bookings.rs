use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;
use venuo_booking::models::{Booking, FeeBreakdown, ItemSpec};
use venuo_core::identity::Principal;
use venuo_payments::InvoiceStatus;

use crate::error::AppError;
use crate::middleware::auth::{
    admin_auth_middleware, auth_middleware, customer_auth_middleware, vendor_auth_middleware,
};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let customer = Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}/submit", post(submit_booking))
        .layer(from_fn_with_state(state.clone(), customer_auth_middleware));

    let vendor = Router::new()
        .route("/v1/vendor/bookings", get(list_vendor_bookings))
        .layer(from_fn_with_state(state.clone(), vendor_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/bookings/{id}/complete", post(complete_booking))
        .layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    // Negotiation moves are open to both parties; the service checks
    // who actually holds the turn.
    let party = Router::new()
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/items/{item_id}/counter", post(counter_offer))
        .route("/v1/bookings/{id}/items/{item_id}/accept", post(accept_offer))
        .route("/v1/bookings/{id}/items/{item_id}/decline", post(decline_offer))
        .route("/v1/bookings/{id}/agreement/accept", post(accept_agreement))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .layer(from_fn_with_state(state, auth_middleware));

    customer.merge(vendor).merge(admin).merge(party)
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub event_date: NaiveDate,
    /// Defaults to now + the configured negotiation window.
    pub negotiation_deadline: Option<DateTime<Utc>>,
    pub items: Vec<ItemSpec>,
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateBookingBody>,
) -> Result<Json<Booking>, AppError> {
    let deadline = body.negotiation_deadline.unwrap_or_else(|| {
        Utc::now() + chrono::Duration::hours(state.business_rules.negotiation_window_hours)
    });
    let booking = state
        .bookings
        .create_booking(&principal, body.event_date, deadline, body.items)
        .await?;
    Ok(Json(booking))
}

async fn submit_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.submit_booking(&principal, id).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(id).await?))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_for_customer(principal.id).await?))
}

async fn list_vendor_bookings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_for_vendor(principal.id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CounterOfferBody {
    pub price_cents: i64,
    pub reason: Option<String>,
    #[serde(default)]
    pub breakdown: FeeBreakdown,
}

async fn counter_offer(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<CounterOfferBody>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .counter_offer(&principal, id, item_id, body.price_cents, body.reason, body.breakdown)
        .await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct AcceptOfferBody {
    /// Version the caller believes is current; a mismatch is a 409.
    pub offer_version: u32,
}

async fn accept_offer(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AcceptOfferBody>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .accept_offer(&principal, id, item_id, body.offer_version)
        .await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct DeclineOfferBody {
    pub reason: Option<String>,
}

async fn decline_offer(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<DeclineOfferBody>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .decline_offer(&principal, id, item_id, body.reason)
        .await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct AcceptAgreementBody {
    pub agreement_version: u32,
    #[serde(default)]
    pub ip: String,
}

async fn accept_agreement(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<AcceptAgreementBody>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .accept_agreement(&principal, id, body.agreement_version, body.ip)
        .await?;
    Ok(Json(booking))
}

async fn complete_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.get_booking(id).await?;
    let invoice_id = booking
        .invoice_id
        .ok_or_else(|| AppError::Unprocessable("booking has no invoice yet".into()))?;
    let invoice = state.payments.invoice(invoice_id).await?;
    if invoice.status != InvoiceStatus::Paid {
        return Err(AppError::Unprocessable(format!(
            "invoice must be paid before completion, currently {:?}",
            invoice.status
        )));
    }
    Ok(Json(state.bookings.complete_booking(&principal, id).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.cancel_booking(&principal, id).await?))
}
