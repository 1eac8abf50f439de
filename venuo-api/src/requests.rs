use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;
use venuo_core::identity::Principal;
use venuo_request::models::{OfferStatus, RequestThread};

use crate::error::AppError;
use crate::middleware::auth::{customer_auth_middleware, vendor_auth_middleware};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let customer = Router::new()
        .route("/v1/requests", post(create_request).get(list_requests))
        .route("/v1/requests/{id}", get(get_request))
        .route("/v1/requests/{id}/cancel", post(cancel_request))
        .route(
            "/v1/requests/{id}/offers/{offer_id}/status",
            post(set_offer_status),
        )
        .layer(from_fn_with_state(state.clone(), customer_auth_middleware));

    let vendor = Router::new()
        .route("/v1/requests/{id}/offers", post(submit_offer))
        .layer(from_fn_with_state(state, vendor_auth_middleware));

    customer.merge(vendor)
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub email: String,
    pub categories: BTreeSet<String>,
    pub budget_cents: i64,
    /// Hours until the request stops accepting offers; defaults to the
    /// configured TTL.
    pub deadline_hours: Option<i64>,
}

async fn create_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<RequestThread>, AppError> {
    let deadline_hours = body
        .deadline_hours
        .unwrap_or(state.business_rules.request_ttl_hours);
    let thread = state
        .requests
        .create_request(
            &principal,
            body.email,
            body.categories,
            body.budget_cents,
            deadline_hours,
        )
        .await?;
    Ok(Json(thread))
}

async fn list_requests(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<RequestThread>>, AppError> {
    Ok(Json(state.requests.list_for_customer(&principal).await?))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestThread>, AppError> {
    Ok(Json(state.requests.get_request(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SubmitOfferBody {
    pub price_cents: i64,
    pub message: Option<String>,
}

async fn submit_offer(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitOfferBody>,
) -> Result<Json<RequestThread>, AppError> {
    let thread = state
        .requests
        .submit_offer(&principal, id, body.price_cents, body.message)
        .await?;
    Ok(Json(thread))
}

#[derive(Debug, Deserialize)]
pub struct OfferStatusBody {
    pub status: OfferStatus,
}

async fn set_offer_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, offer_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<OfferStatusBody>,
) -> Result<Json<RequestThread>, AppError> {
    let thread = state
        .requests
        .set_offer_status(&principal, id, offer_id, body.status)
        .await?;
    Ok(Json(thread))
}

async fn cancel_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestThread>, AppError> {
    Ok(Json(state.requests.cancel_request(&principal, id).await?))
}
