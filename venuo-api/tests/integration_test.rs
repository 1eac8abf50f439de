use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use venuo_api::metrics::Metrics;
use venuo_api::middleware::auth::Claims;
use venuo_api::state::{AppState, AuthConfig};
use venuo_booking::service::BookingService;
use venuo_core::payment::MockCheckoutProvider;
use venuo_payments::service::PaymentService;
use venuo_payments::FeePolicy;
use venuo_request::service::RequestService;
use venuo_store::app_config::BusinessRules;
use venuo_store::MemoryStore;
use venuo_vendor::service::VendorService;

const SECRET: &str = "test-secret";

fn test_state() -> AppState {
    let store = Arc::new(MemoryStore::new());
    AppState {
        vendors: Arc::new(VendorService::new(store.clone(), store.clone(), store.clone())),
        requests: Arc::new(RequestService::new(store.clone(), store.clone())),
        bookings: Arc::new(BookingService::new(store.clone(), store.clone())),
        payments: Arc::new(PaymentService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(MockCheckoutProvider),
            FeePolicy::default(),
        )),
        documents: Arc::new(venuo_core::storage::MockDocumentStore),
        auth: AuthConfig { secret: SECRET.into(), expiration: 3600 },
        business_rules: BusinessRules {
            platform_fee_bps: 1200,
            min_platform_fee_cents: 500,
            request_ttl_hours: 72,
            negotiation_window_hours: 72,
            sweep_interval_seconds: 60,
            current_contract_version: 3,
        },
        metrics: Arc::new(Metrics::new()),
    }
}

fn token(id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: id.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = venuo_api::app(test_state());
    let response = app
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_are_rejected_without_a_token() {
    let app = venuo_api::app(test_state());
    let response = app
        .oneshot(request(
            Method::POST,
            "/v1/requests",
            None,
            Some(json!({"email": "a@b.test", "categories": ["catering"], "budget_cents": 100})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn vendor_token_cannot_hit_customer_routes() {
    let app = venuo_api::app(test_state());
    let vendor = token(Uuid::new_v4(), "VENDOR");
    let response = app
        .oneshot(request(
            Method::POST,
            "/v1/requests",
            Some(&vendor),
            Some(json!({"email": "a@b.test", "categories": ["catering"], "budget_cents": 100})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_and_fetch_a_request_over_http() {
    let state = test_state();
    let app = venuo_api::app(state);
    let customer_id = Uuid::new_v4();
    let customer = token(customer_id, "CUSTOMER");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/requests",
            Some(&customer),
            Some(json!({
                "email": "pat@example.test",
                "categories": ["catering", "av"],
                "budget_cents": 250_000
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    let request_id = created["request"]["id"].as_str().unwrap().to_owned();
    assert_eq!(created["request"]["status"], "OPEN");
    // The Masked wrapper hides the email from logs, not from the
    // owner's own responses.
    assert_eq!(created["request"]["customer_email"], "pat@example.test");

    let response = app
        .oneshot(request(
            Method::GET,
            &format!("/v1/requests/{request_id}"),
            Some(&customer),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = json_body(response).await;
    assert_eq!(fetched["request"]["id"].as_str().unwrap(), request_id);
    assert_eq!(fetched["offers"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn noncompliant_vendor_offer_is_a_422() {
    let state = test_state();
    let app = venuo_api::app(state.clone());
    let customer = token(Uuid::new_v4(), "CUSTOMER");
    let vendor = token(Uuid::new_v4(), "VENDOR");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/requests",
            Some(&customer),
            Some(json!({"email": "a@b.test", "categories": ["catering"], "budget_cents": 100_000})),
        ))
        .await
        .unwrap();
    let created = json_body(response).await;
    let request_id = created["request"]["id"].as_str().unwrap().to_owned();

    let response = app
        .oneshot(request(
            Method::POST,
            &format!("/v1/requests/{request_id}/offers"),
            Some(&vendor),
            Some(json!({"price_cents": 90_000})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("not compliant"));
}

#[tokio::test]
async fn unknown_webhook_types_are_acked() {
    let app = venuo_api::app(test_state());
    let response = app
        .oneshot(request(
            Method::POST,
            "/v1/webhooks/payments",
            None,
            Some(json!({
                "id": "evt_42",
                "type": "charge.updated",
                "data": {"object": {"id": "cs_none"}}
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ignored"], true);
}

#[tokio::test]
async fn webhook_replays_ack_with_a_marker() {
    let state = test_state();
    let app = venuo_api::app(state.clone());

    // A paid-able session, set up through the services directly.
    let customer = venuo_core::identity::Principal::customer(Uuid::new_v4());
    let vendor = venuo_core::identity::Principal::vendor(Uuid::new_v4());
    let admin = venuo_core::identity::Principal::admin(Uuid::new_v4());
    state.vendors.record_admin_approval(&admin, vendor.id).await.unwrap();
    state
        .vendors
        .record_contract_acceptance(&vendor, vendor.id, 3, "203.0.113.7".into())
        .await
        .unwrap();
    state.vendors.record_training_completion(&admin, vendor.id).await.unwrap();
    state.vendors.apply_payout_account_status(vendor.id, true, true, vec![]).await.unwrap();

    let thread = state
        .requests
        .create_request(&customer, "pat@example.test".into(), ["catering".into()].into(), 100_000, 72)
        .await
        .unwrap();
    let thread = state
        .requests
        .submit_offer(&vendor, thread.request.id, 90_000, None)
        .await
        .unwrap();
    let offer_id = thread.offers[0].id;
    state
        .requests
        .set_offer_status(
            &customer,
            thread.request.id,
            offer_id,
            venuo_request::models::OfferStatus::Accepted,
        )
        .await
        .unwrap();
    let subject = venuo_payments::InvoiceSubject::RequestOffer {
        request_id: thread.request.id,
        offer_id,
    };
    let (_, session) = state
        .payments
        .open_checkout(&customer, subject, "ok", "back")
        .await
        .unwrap();

    let event = json!({
        "id": "evt_77",
        "type": "checkout.session.completed",
        "data": {"object": {"id": session.session_ref}}
    });
    let response = app
        .clone()
        .oneshot(request(Method::POST, "/v1/webhooks/payments", None, Some(event.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["already_processed"], false);

    let response = app
        .oneshot(request(Method::POST, "/v1/webhooks/payments", None, Some(event)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["already_processed"], true);
}

#[tokio::test]
async fn metrics_endpoint_serves_counters() {
    let app = venuo_api::app(test_state());
    let response = app
        .oneshot(request(Method::GET, "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("venuo_payment_events_applied_total"));
}
