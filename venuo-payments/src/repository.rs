use async_trait::async_trait;
use uuid::Uuid;
use venuo_core::StoreResult;

use crate::models::{Invoice, PaymentEventRecord, Payout};

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    async fn insert(&self, invoice: &Invoice) -> StoreResult<()>;
    async fn get(&self, invoice_id: Uuid) -> StoreResult<Option<Invoice>>;
    async fn update(&self, invoice: &Invoice) -> StoreResult<()>;
    async fn find_by_session(&self, session_ref: &str) -> StoreResult<Option<Invoice>>;
    /// All invoices for a subject key, used to enforce at-most-one
    /// non-void invoice per subject.
    async fn list_for_subject(&self, subject_key: &str) -> StoreResult<Vec<Invoice>>;
}

#[async_trait]
pub trait PayoutRepo: Send + Sync {
    async fn insert(&self, payout: &Payout) -> StoreResult<()>;
    async fn get(&self, payout_id: Uuid) -> StoreResult<Option<Payout>>;
    async fn update(&self, payout: &Payout) -> StoreResult<()>;
    async fn list_pending(&self) -> StoreResult<Vec<Payout>>;
    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Payout>>;
    async fn list_for_invoice(&self, invoice_id: Uuid) -> StoreResult<Vec<Payout>>;
}

/// Dedup ledger for external payment events.
#[async_trait]
pub trait PaymentEventRepo: Send + Sync {
    /// Returns `false` without writing when the event id was already
    /// recorded — the caller treats that as `AlreadyProcessed`.
    async fn insert_if_absent(&self, record: &PaymentEventRecord) -> StoreResult<bool>;
    async fn get(&self, external_event_id: &str) -> StoreResult<Option<PaymentEventRecord>>;
    /// Releases a claimed event id so a redelivery can re-attempt after
    /// a failed application. Removing an absent id is a no-op.
    async fn remove(&self, external_event_id: &str) -> StoreResult<()>;
}
