use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use venuo_core::identity::{ActorRole, Principal};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

fn principal_from_request(state: &AppState, req: &Request) -> Result<Principal, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let role = match token_data.claims.role.as_str() {
        "CUSTOMER" => ActorRole::Customer,
        "VENDOR" => ActorRole::Vendor,
        "ADMIN" => ActorRole::Admin,
        _ => return Err(StatusCode::FORBIDDEN),
    };
    Ok(Principal { id, role })
}

/// Validates the bearer token and injects the `Principal` as a request
/// extension. Role checks happen per route group.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = principal_from_request(&state, &req)?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = principal_from_request(&state, &req)?;
    if principal.role != ActorRole::Customer {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn vendor_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = principal_from_request(&state, &req)?;
    if principal.role != ActorRole::Vendor {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = principal_from_request(&state, &req)?;
    if principal.role != ActorRole::Admin {
        return Err(StatusCode::FORBIDDEN);
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
