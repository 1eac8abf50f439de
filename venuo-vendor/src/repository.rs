use async_trait::async_trait;
use uuid::Uuid;
use venuo_core::StoreResult;

use crate::calendar::Calendar;
use crate::compliance::VendorCompliance;
use crate::listing::Listing;

/// Access to the per-vendor compliance rows. `update` is a compare-and-swap
/// on the aggregate's `rev`: it fails with `StoreError::RevConflict` if
/// another writer committed first.
#[async_trait]
pub trait ComplianceRepo: Send + Sync {
    async fn insert(&self, record: &VendorCompliance) -> StoreResult<()>;
    async fn get(&self, vendor_id: Uuid) -> StoreResult<Option<VendorCompliance>>;
    async fn update(&self, record: &VendorCompliance) -> StoreResult<()>;
}

#[async_trait]
pub trait CalendarRepo: Send + Sync {
    async fn insert(&self, calendar: &Calendar) -> StoreResult<()>;
    async fn get(&self, resource_id: Uuid) -> StoreResult<Option<Calendar>>;
    async fn update(&self, calendar: &Calendar) -> StoreResult<()>;
}

#[async_trait]
pub trait ListingRepo: Send + Sync {
    async fn upsert(&self, listing: &Listing) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Listing>>;
    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Listing>>;
}
