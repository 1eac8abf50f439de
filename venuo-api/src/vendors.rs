use axum::{
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use venuo_core::identity::Principal;
use venuo_vendor::calendar::Calendar;
use venuo_vendor::compliance::VendorCompliance;
use venuo_vendor::listing::Listing;

use crate::error::AppError;
use crate::middleware::auth::{admin_auth_middleware, vendor_auth_middleware};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let vendor = Router::new()
        .route("/v1/vendor/compliance", get(my_compliance))
        .route("/v1/vendor/contract/accept", post(accept_contract))
        .route("/v1/vendor/listings", post(create_listing).get(my_listings))
        .route("/v1/vendor/listings/{id}/publish", post(publish_listing))
        .route("/v1/vendor/listings/{id}/documents", post(attach_document))
        .route("/v1/vendor/calendar/{resource_id}", get(get_calendar))
        .route("/v1/vendor/calendar/{resource_id}/tentative", post(mark_tentative))
        .route("/v1/vendor/calendar/{resource_id}/confirm", post(confirm_booking_date))
        .route("/v1/vendor/calendar/{resource_id}/release", post(release_date))
        .layer(from_fn_with_state(state.clone(), vendor_auth_middleware));

    let admin = Router::new()
        .route("/v1/admin/vendors/{id}/compliance", get(vendor_compliance))
        .route("/v1/admin/vendors/{id}/approve", post(approve_vendor))
        .route("/v1/admin/vendors/{id}/training-complete", post(complete_training))
        .layer(from_fn_with_state(state, admin_auth_middleware));

    vendor.merge(admin)
}

async fn my_compliance(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<VendorCompliance>, AppError> {
    Ok(Json(state.vendors.compliance_status(principal.id).await?))
}

async fn vendor_compliance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VendorCompliance>, AppError> {
    Ok(Json(state.vendors.compliance_status(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AcceptContractBody {
    pub version: u32,
    #[serde(default)]
    pub ip: String,
}

async fn accept_contract(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<AcceptContractBody>,
) -> Result<Json<VendorCompliance>, AppError> {
    let record = state
        .vendors
        .record_contract_acceptance(&principal, principal.id, body.version, body.ip)
        .await?;
    Ok(Json(record))
}

async fn approve_vendor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<VendorCompliance>, AppError> {
    Ok(Json(state.vendors.record_admin_approval(&principal, id).await?))
}

async fn complete_training(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<VendorCompliance>, AppError> {
    Ok(Json(state.vendors.record_training_completion(&principal, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateListingBody {
    pub title: String,
    pub category: String,
}

async fn create_listing(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateListingBody>,
) -> Result<Json<Listing>, AppError> {
    let listing = state
        .vendors
        .create_listing(&principal, body.title, body.category)
        .await?;
    Ok(Json(listing))
}

async fn my_listings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(state.vendors.vendor_listings(principal.id).await?))
}

async fn publish_listing(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Listing>, AppError> {
    Ok(Json(state.vendors.publish_listing(&principal, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AttachDocumentQuery {
    pub file_name: String,
}

/// Raw document bytes in the body; the object store returns the URL the
/// listing keeps.
async fn attach_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Query(query): Query<AttachDocumentQuery>,
    body: axum::body::Bytes,
) -> Result<Json<Listing>, AppError> {
    let url = state
        .documents
        .store_document(principal.id, &query.file_name, body.to_vec())
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;
    Ok(Json(state.vendors.attach_document(&principal, id, url).await?))
}

async fn get_calendar(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
) -> Result<Json<Option<Calendar>>, AppError> {
    Ok(Json(state.vendors.calendar(resource_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CalendarDateBody {
    pub date: NaiveDate,
}

async fn mark_tentative(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    Json(body): Json<CalendarDateBody>,
) -> Result<Json<Calendar>, AppError> {
    Ok(Json(state.vendors.mark_tentative(resource_id, body.date).await?))
}

async fn confirm_booking_date(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    Json(body): Json<CalendarDateBody>,
) -> Result<Json<Calendar>, AppError> {
    Ok(Json(state.vendors.confirm_booking_date(resource_id, body.date).await?))
}

async fn release_date(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
    Json(body): Json<CalendarDateBody>,
) -> Result<Json<Calendar>, AppError> {
    Ok(Json(state.vendors.release_date(resource_id, body.date).await?))
}
