use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use venuo_core::StoreResult;

use crate::models::RequestThread;

/// Keyed storage for request threads. `insert` fails with `RevConflict`
/// if the id already exists; `update` is a compare-and-swap on `rev`.
#[async_trait]
pub trait RequestRepo: Send + Sync {
    async fn insert(&self, thread: &RequestThread) -> StoreResult<()>;
    async fn get(&self, request_id: Uuid) -> StoreResult<Option<RequestThread>>;
    async fn update(&self, thread: &RequestThread) -> StoreResult<()>;
    async fn list_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<RequestThread>>;
    /// Ids of open requests whose deadline has passed, for the sweep.
    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;
}
