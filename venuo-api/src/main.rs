use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use venuo_api::metrics::Metrics;
use venuo_api::state::{AppState, AuthConfig};
use venuo_api::{app, worker};
use venuo_booking::service::{BookingExpirySweep, BookingService};
use venuo_core::payment::MockCheckoutProvider;
use venuo_core::storage::MockDocumentStore;
use venuo_payments::service::PaymentService;
use venuo_payments::FeePolicy;
use venuo_request::expiry::RequestExpirySweep;
use venuo_request::service::RequestService;
use venuo_store::{DbClient, PgStore};
use venuo_vendor::service::VendorService;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "venuo_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = venuo_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Venuo API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let business_rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .expect("Failed to load business rules");

    let store = Arc::new(PgStore::new(db.pool.clone()));
    let vendors = Arc::new(VendorService::new(store.clone(), store.clone(), store.clone()));
    let requests = Arc::new(RequestService::new(store.clone(), store.clone()));
    let bookings = Arc::new(BookingService::new(store.clone(), store.clone()));
    let payments = Arc::new(PaymentService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(MockCheckoutProvider),
        FeePolicy {
            fee_bps: business_rules.platform_fee_bps,
            min_fee_cents: business_rules.min_platform_fee_cents,
        },
    ));
    let metrics = Arc::new(Metrics::new());

    tokio::spawn(worker::start_sweep_worker(
        RequestExpirySweep::new(store.clone()),
        BookingExpirySweep::new(store.clone()),
        payments.clone(),
        metrics.clone(),
        business_rules.sweep_interval_seconds,
    ));

    let app_state = AppState {
        vendors,
        requests,
        bookings,
        payments,
        documents: Arc::new(MockDocumentStore),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        business_rules,
        metrics,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
