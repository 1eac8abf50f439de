use std::sync::Arc;

use venuo_booking::service::BookingService;
use venuo_core::storage::DocumentStore;
use venuo_payments::service::PaymentService;
use venuo_request::service::RequestService;
use venuo_store::app_config::BusinessRules;
use venuo_vendor::service::VendorService;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub vendors: Arc<VendorService>,
    pub requests: Arc<RequestService>,
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentService>,
    pub documents: Arc<dyn DocumentStore>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub metrics: Arc<Metrics>,
}
