use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use venuo_booking::service::BookingExpirySweep;
use venuo_request::expiry::RequestExpirySweep;
use venuo_payments::service::PaymentService;

use crate::metrics::Metrics;

/// Background loop running the deadline sweeps and the payout retry.
/// Each pass is independent; a failed pass logs and waits for the next
/// tick rather than tearing the loop down.
pub async fn start_sweep_worker(
    requests: RequestExpirySweep,
    bookings: BookingExpirySweep,
    payments: Arc<PaymentService>,
    metrics: Arc<Metrics>,
    interval_seconds: u64,
) {
    info!("Sweep worker started, interval {}s", interval_seconds);
    let mut ticker = interval(Duration::from_secs(interval_seconds));
    loop {
        ticker.tick().await;

        match requests.run_once().await {
            Ok(expired) if !expired.is_empty() => {
                metrics.requests_expired.inc_by(expired.len() as u64);
                info!("Expired {} overdue requests", expired.len());
            }
            Ok(_) => {}
            Err(e) => error!("Request expiry sweep failed: {}", e),
        }

        match bookings.run_once().await {
            Ok(expired) if !expired.is_empty() => {
                metrics.bookings_expired.inc_by(expired.len() as u64);
                info!("Expired {} overdue bookings", expired.len());
            }
            Ok(_) => {}
            Err(e) => error!("Booking expiry sweep failed: {}", e),
        }

        match payments.retry_pending_payouts().await {
            Ok(released) if released > 0 => {
                metrics.payouts_released.inc_by(released as u64);
                info!("Released {} queued payouts", released);
            }
            Ok(_) => {}
            Err(e) => error!("Payout retry pass failed: {}", e),
        }
    }
}
