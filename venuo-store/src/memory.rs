//! In-memory store used by tests and local development. Every map is
//! guarded by its own lock; `update` is a compare-and-swap on `rev` so
//! the optimistic-concurrency behavior matches the Postgres store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use venuo_booking::models::{Booking, BookingStatus};
use venuo_booking::repository::BookingRepo;
use venuo_core::{StoreError, StoreResult};
use venuo_payments::models::{Invoice, PaymentEventRecord, Payout, PayoutStatus};
use venuo_payments::repository::{InvoiceRepo, PaymentEventRepo, PayoutRepo};
use venuo_request::models::{RequestStatus, RequestThread};
use venuo_request::repository::RequestRepo;
use venuo_vendor::calendar::Calendar;
use venuo_vendor::compliance::VendorCompliance;
use venuo_vendor::listing::Listing;
use venuo_vendor::repository::{CalendarRepo, ComplianceRepo, ListingRepo};

#[derive(Default)]
pub struct MemoryStore {
    compliance: RwLock<HashMap<Uuid, VendorCompliance>>,
    calendars: RwLock<HashMap<Uuid, Calendar>>,
    listings: RwLock<HashMap<Uuid, Listing>>,
    requests: RwLock<HashMap<Uuid, RequestThread>>,
    bookings: RwLock<HashMap<Uuid, Booking>>,
    invoices: RwLock<HashMap<Uuid, Invoice>>,
    payouts: RwLock<HashMap<Uuid, Payout>>,
    payment_events: RwLock<HashMap<String, PaymentEventRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

#[async_trait]
impl ComplianceRepo for MemoryStore {
    async fn insert(&self, record: &VendorCompliance) -> StoreResult<()> {
        let mut map = self.compliance.write().map_err(|_| poisoned())?;
        if map.contains_key(&record.vendor_id) {
            return Err(StoreError::RevConflict);
        }
        map.insert(record.vendor_id, record.clone());
        Ok(())
    }

    async fn get(&self, vendor_id: Uuid) -> StoreResult<Option<VendorCompliance>> {
        Ok(self.compliance.read().map_err(|_| poisoned())?.get(&vendor_id).cloned())
    }

    async fn update(&self, record: &VendorCompliance) -> StoreResult<()> {
        let mut map = self.compliance.write().map_err(|_| poisoned())?;
        let stored = map.get_mut(&record.vendor_id).ok_or(StoreError::RevConflict)?;
        if stored.rev != record.rev {
            return Err(StoreError::RevConflict);
        }
        *stored = record.clone();
        stored.rev += 1;
        Ok(())
    }
}

#[async_trait]
impl CalendarRepo for MemoryStore {
    async fn insert(&self, calendar: &Calendar) -> StoreResult<()> {
        let mut map = self.calendars.write().map_err(|_| poisoned())?;
        if map.contains_key(&calendar.resource_id) {
            return Err(StoreError::RevConflict);
        }
        map.insert(calendar.resource_id, calendar.clone());
        Ok(())
    }

    async fn get(&self, resource_id: Uuid) -> StoreResult<Option<Calendar>> {
        Ok(self.calendars.read().map_err(|_| poisoned())?.get(&resource_id).cloned())
    }

    async fn update(&self, calendar: &Calendar) -> StoreResult<()> {
        let mut map = self.calendars.write().map_err(|_| poisoned())?;
        let stored = map.get_mut(&calendar.resource_id).ok_or(StoreError::RevConflict)?;
        if stored.rev != calendar.rev {
            return Err(StoreError::RevConflict);
        }
        *stored = calendar.clone();
        stored.rev += 1;
        Ok(())
    }
}

#[async_trait]
impl ListingRepo for MemoryStore {
    async fn upsert(&self, listing: &Listing) -> StoreResult<()> {
        self.listings
            .write()
            .map_err(|_| poisoned())?
            .insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        Ok(self.listings.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Listing>> {
        Ok(self
            .listings
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|l| l.vendor_id == vendor_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RequestRepo for MemoryStore {
    async fn insert(&self, thread: &RequestThread) -> StoreResult<()> {
        let mut map = self.requests.write().map_err(|_| poisoned())?;
        if map.contains_key(&thread.request.id) {
            return Err(StoreError::RevConflict);
        }
        map.insert(thread.request.id, thread.clone());
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> StoreResult<Option<RequestThread>> {
        Ok(self.requests.read().map_err(|_| poisoned())?.get(&request_id).cloned())
    }

    async fn update(&self, thread: &RequestThread) -> StoreResult<()> {
        let mut map = self.requests.write().map_err(|_| poisoned())?;
        let stored = map.get_mut(&thread.request.id).ok_or(StoreError::RevConflict)?;
        if stored.rev != thread.rev {
            return Err(StoreError::RevConflict);
        }
        *stored = thread.clone();
        stored.rev += 1;
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<RequestThread>> {
        Ok(self
            .requests
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|t| t.request.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .requests
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|t| t.request.status == RequestStatus::Open && t.request.expires_at <= now)
            .map(|t| t.request.id)
            .collect())
    }
}

#[async_trait]
impl BookingRepo for MemoryStore {
    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        let mut map = self.bookings.write().map_err(|_| poisoned())?;
        if map.contains_key(&booking.id) {
            return Err(StoreError::RevConflict);
        }
        map.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().map_err(|_| poisoned())?.get(&booking_id).cloned())
    }

    async fn update(&self, booking: &Booking) -> StoreResult<()> {
        let mut map = self.bookings.write().map_err(|_| poisoned())?;
        let stored = map.get_mut(&booking.id).ok_or(StoreError::RevConflict)?;
        if stored.rev != booking.rev {
            return Err(StoreError::RevConflict);
        }
        *stored = booking.clone();
        stored.rev += 1;
        Ok(())
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Booking>> {
        Ok(self
            .bookings
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|b| b.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Booking>> {
        Ok(self
            .bookings
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|b| b.items.iter().any(|i| i.vendor_id == vendor_id))
            .cloned()
            .collect())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .bookings
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|b| {
                matches!(b.status, BookingStatus::Pending | BookingStatus::PartiallyAccepted)
                    && b.negotiation_deadline <= now
            })
            .map(|b| b.id)
            .collect())
    }
}

#[async_trait]
impl InvoiceRepo for MemoryStore {
    async fn insert(&self, invoice: &Invoice) -> StoreResult<()> {
        let mut map = self.invoices.write().map_err(|_| poisoned())?;
        if map.contains_key(&invoice.id) {
            return Err(StoreError::RevConflict);
        }
        // At most one non-void invoice per subject; a concurrent
        // checkout loses here instead of double-billing.
        let subject_key = invoice.subject.key();
        if map
            .values()
            .any(|i| i.subject.key() == subject_key && i.blocks_new_checkout())
        {
            return Err(StoreError::RevConflict);
        }
        map.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn get(&self, invoice_id: Uuid) -> StoreResult<Option<Invoice>> {
        Ok(self.invoices.read().map_err(|_| poisoned())?.get(&invoice_id).cloned())
    }

    async fn update(&self, invoice: &Invoice) -> StoreResult<()> {
        let mut map = self.invoices.write().map_err(|_| poisoned())?;
        let stored = map.get_mut(&invoice.id).ok_or(StoreError::RevConflict)?;
        if stored.rev != invoice.rev {
            return Err(StoreError::RevConflict);
        }
        *stored = invoice.clone();
        stored.rev += 1;
        Ok(())
    }

    async fn find_by_session(&self, session_ref: &str) -> StoreResult<Option<Invoice>> {
        Ok(self
            .invoices
            .read()
            .map_err(|_| poisoned())?
            .values()
            .find(|i| i.session_ref.as_deref() == Some(session_ref))
            .cloned())
    }

    async fn list_for_subject(&self, subject_key: &str) -> StoreResult<Vec<Invoice>> {
        Ok(self
            .invoices
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|i| i.subject.key() == subject_key)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutRepo for MemoryStore {
    async fn insert(&self, payout: &Payout) -> StoreResult<()> {
        let mut map = self.payouts.write().map_err(|_| poisoned())?;
        if map.contains_key(&payout.id) {
            return Err(StoreError::RevConflict);
        }
        map.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn get(&self, payout_id: Uuid) -> StoreResult<Option<Payout>> {
        Ok(self.payouts.read().map_err(|_| poisoned())?.get(&payout_id).cloned())
    }

    async fn update(&self, payout: &Payout) -> StoreResult<()> {
        let mut map = self.payouts.write().map_err(|_| poisoned())?;
        let stored = map.get_mut(&payout.id).ok_or(StoreError::RevConflict)?;
        if stored.rev != payout.rev {
            return Err(StoreError::RevConflict);
        }
        *stored = payout.clone();
        stored.rev += 1;
        Ok(())
    }

    async fn list_pending(&self) -> StoreResult<Vec<Payout>> {
        Ok(self
            .payouts
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|p| p.status == PayoutStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_for_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Payout>> {
        Ok(self
            .payouts
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|p| p.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    async fn list_for_invoice(&self, invoice_id: Uuid) -> StoreResult<Vec<Payout>> {
        Ok(self
            .payouts
            .read()
            .map_err(|_| poisoned())?
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentEventRepo for MemoryStore {
    async fn insert_if_absent(&self, record: &PaymentEventRecord) -> StoreResult<bool> {
        let mut map = self.payment_events.write().map_err(|_| poisoned())?;
        if map.contains_key(&record.external_event_id) {
            return Ok(false);
        }
        map.insert(record.external_event_id.clone(), record.clone());
        Ok(true)
    }

    async fn get(&self, external_event_id: &str) -> StoreResult<Option<PaymentEventRecord>> {
        Ok(self
            .payment_events
            .read()
            .map_err(|_| poisoned())?
            .get(external_event_id)
            .cloned())
    }

    async fn remove(&self, external_event_id: &str) -> StoreResult<()> {
        self.payment_events.write().map_err(|_| poisoned())?.remove(external_event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venuo_core::identity::Principal;
    use venuo_core::payment::PaymentOutcome;

    #[tokio::test]
    async fn update_is_a_compare_and_swap_on_rev() {
        let store = MemoryStore::new();
        let customer = Principal::customer(Uuid::new_v4());
        let thread = RequestThread::create(
            &customer,
            "a@b.test".to_string(),
            ["catering".to_string()].into(),
            50_000,
            48,
        );
        RequestRepo::insert(&store, &thread).await.unwrap();

        // Two readers load rev 0; only the first write lands.
        let a = RequestRepo::get(&store, thread.request.id).await.unwrap().unwrap();
        let b = a.clone();
        RequestRepo::update(&store, &a).await.unwrap();
        assert!(matches!(
            RequestRepo::update(&store, &b).await,
            Err(StoreError::RevConflict)
        ));

        let reloaded = RequestRepo::get(&store, thread.request.id).await.unwrap().unwrap();
        assert_eq!(reloaded.rev, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let compliance = VendorCompliance::new(Uuid::new_v4());
        ComplianceRepo::insert(&store, &compliance).await.unwrap();
        assert!(matches!(
            ComplianceRepo::insert(&store, &compliance).await,
            Err(StoreError::RevConflict)
        ));
    }

    #[tokio::test]
    async fn payment_event_ledger_dedupes_by_event_id() {
        let store = MemoryStore::new();
        let record = PaymentEventRecord {
            external_event_id: "evt_1".into(),
            session_ref: "cs_1".into(),
            outcome: PaymentOutcome::Succeeded,
            applied_at: Utc::now(),
        };
        assert!(store.insert_if_absent(&record).await.unwrap());
        assert!(!store.insert_if_absent(&record).await.unwrap());
    }
}
