use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use venuo_core::StoreResult;

use crate::models::Booking;

/// Keyed storage for booking aggregates. `insert` fails with `RevConflict`
/// if the id already exists; `update` is a compare-and-swap on `rev`.
#[async_trait]
pub trait BookingRepo: Send + Sync {
    async fn insert(&self, booking: &Booking) -> StoreResult<()>;
    async fn get(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;
    async fn update(&self, booking: &Booking) -> StoreResult<()>;
    async fn list_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Booking>>;
    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Booking>>;
    /// Ids of negotiable bookings whose deadline has passed, for the sweep.
    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;
}
