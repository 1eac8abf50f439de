use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;
use venuo_core::identity::{ActorRole, Principal};
use venuo_core::StoreError;
use venuo_shared::events::{BookingAcceptedEvent, ItemAgreedEvent};
use venuo_vendor::repository::ComplianceRepo;

use crate::models::{Booking, BookingError, BookingStatus, FeeBreakdown, ItemSpec};
use crate::repository::BookingRepo;

const MAX_CAS_RETRIES: usize = 4;

/// Orchestrates the versioned booking-thread flow. Vendor-side writes are
/// gated on the compliance row; everything else is get → mutate → CAS.
pub struct BookingService {
    repo: Arc<dyn BookingRepo>,
    compliance: Arc<dyn ComplianceRepo>,
}

impl BookingService {
    pub fn new(repo: Arc<dyn BookingRepo>, compliance: Arc<dyn ComplianceRepo>) -> Self {
        Self { repo, compliance }
    }

    pub async fn create_booking(
        &self,
        customer: &Principal,
        event_date: NaiveDate,
        negotiation_deadline: DateTime<Utc>,
        items: Vec<ItemSpec>,
    ) -> Result<Booking, BookingError> {
        if customer.role != ActorRole::Customer {
            return Err(BookingError::Forbidden("only customers create bookings".into()));
        }
        if items.is_empty() {
            return Err(BookingError::InvalidState("a booking needs at least one item".into()));
        }
        let booking = Booking::create(customer, event_date, negotiation_deadline, items);
        self.repo.insert(&booking).await?;
        tracing::info!(booking_id = %booking.id, items = booking.items.len(), "booking drafted");
        Ok(booking)
    }

    pub async fn submit_booking(
        &self,
        customer: &Principal,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        self.mutate(booking_id, |b| b.submit(customer)).await
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let mut booking = self
            .repo
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        // Lazy half of the deadline sweep.
        if booking.sweep_expired(Utc::now()) {
            match self.repo.update(&booking).await {
                Ok(()) | Err(StoreError::RevConflict) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(booking)
    }

    pub async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        Ok(self.repo.list_for_customer(customer_id).await?)
    }

    pub async fn list_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        Ok(self.repo.list_for_vendor(vendor_id).await?)
    }

    pub async fn counter_offer(
        &self,
        actor: &Principal,
        booking_id: Uuid,
        item_id: Uuid,
        price_cents: i64,
        reason: Option<String>,
        breakdown: FeeBreakdown,
    ) -> Result<Booking, BookingError> {
        self.ensure_party(actor, booking_id, item_id).await?;
        if actor.role == ActorRole::Vendor {
            self.ensure_vendor_compliant(actor.id).await?;
        }
        self.mutate(booking_id, |b| {
            b.counter_offer(
                item_id,
                actor.role,
                price_cents,
                reason.clone(),
                breakdown.clone(),
                Utc::now(),
            )
            .map(|_| ())
        })
        .await
    }

    pub async fn accept_offer(
        &self,
        actor: &Principal,
        booking_id: Uuid,
        item_id: Uuid,
        expected_version: u32,
    ) -> Result<Booking, BookingError> {
        self.ensure_party(actor, booking_id, item_id).await?;
        let booking = self
            .mutate(booking_id, |b| {
                b.accept_offer(item_id, actor.role, expected_version, Utc::now()).map(|_| ())
            })
            .await?;
        if let Some(item) = booking.item(item_id) {
            if let crate::models::ItemStatus::Agreed { final_price_cents } = item.status {
                tracing::info!(
                    event = ?ItemAgreedEvent {
                        booking_id,
                        item_id,
                        offer_version: expected_version,
                        final_price_cents,
                        timestamp: Utc::now().timestamp(),
                    },
                    "booking item agreed"
                );
            }
        }
        Ok(booking)
    }

    pub async fn decline_offer(
        &self,
        actor: &Principal,
        booking_id: Uuid,
        item_id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.ensure_party(actor, booking_id, item_id).await?;
        self.mutate(booking_id, |b| {
            b.decline_offer(item_id, actor.role, reason.clone(), Utc::now())
        })
        .await
    }

    pub async fn accept_agreement(
        &self,
        actor: &Principal,
        booking_id: Uuid,
        agreement_version: u32,
        ip: String,
    ) -> Result<Booking, BookingError> {
        let current = self
            .repo
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        match actor.role {
            ActorRole::Customer if actor.id == current.customer_id => {}
            ActorRole::Vendor if current.items.iter().any(|i| i.vendor_id == actor.id) => {}
            _ => return Err(BookingError::Forbidden("not a party to this booking".into())),
        }
        let booking = self
            .mutate(booking_id, |b| {
                b.accept_agreement(actor.role, agreement_version, ip.clone(), Utc::now())
            })
            .await?;
        if booking.status == BookingStatus::Accepted {
            tracing::info!(
                event = ?BookingAcceptedEvent {
                    booking_id,
                    customer_id: booking.customer_id,
                    agreement_version,
                    timestamp: Utc::now().timestamp(),
                },
                "booking fully agreed, checkout open"
            );
        }
        Ok(booking)
    }

    /// Admin marks the event delivered. The handler verifies the invoice
    /// is paid before calling this.
    pub async fn complete_booking(
        &self,
        actor: &Principal,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        if actor.role != ActorRole::Admin {
            return Err(BookingError::Forbidden("only admins complete bookings".into()));
        }
        self.mutate(booking_id, |b| b.complete()).await
    }

    pub async fn cancel_booking(
        &self,
        actor: &Principal,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        self.mutate(booking_id, |b| b.cancel(actor)).await
    }

    async fn ensure_vendor_compliant(&self, vendor_id: Uuid) -> Result<(), BookingError> {
        let compliance = self.compliance.get(vendor_id).await?;
        match compliance {
            Some(c) if c.can_publish() => Ok(()),
            Some(c) => Err(BookingError::PublishingBlocked {
                vendor_id,
                missing: c.missing_prerequisites().iter().map(|s| s.to_string()).collect(),
            }),
            None => Err(BookingError::PublishingBlocked {
                vendor_id,
                missing: vec![
                    "admin_approval".into(),
                    "contract_acceptance".into(),
                    "training_completion".into(),
                    "payouts_enabled".into(),
                ],
            }),
        }
    }

    /// Actor checks: the customer must own the booking, a vendor must own
    /// the item being negotiated.
    async fn ensure_party(
        &self,
        actor: &Principal,
        booking_id: Uuid,
        item_id: Uuid,
    ) -> Result<(), BookingError> {
        let booking = self
            .repo
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        let item = booking.item(item_id).ok_or(BookingError::ItemNotFound(item_id))?;
        match actor.role {
            ActorRole::Customer if actor.id == booking.customer_id => Ok(()),
            ActorRole::Vendor if actor.id == item.vendor_id => Ok(()),
            ActorRole::Admin | ActorRole::System => Ok(()),
            _ => Err(BookingError::Forbidden("not a party to this item".into())),
        }
    }

    async fn mutate<F>(&self, booking_id: Uuid, mut f: F) -> Result<Booking, BookingError>
    where
        F: FnMut(&mut Booking) -> Result<(), BookingError>,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let mut booking = self
                .repo
                .get(booking_id)
                .await?
                .ok_or(BookingError::BookingNotFound(booking_id))?;
            // A write landing past the deadline must leave the booking
            // expired in the store, not just rejected.
            if booking.sweep_expired(Utc::now()) {
                match self.repo.update(&booking).await {
                    Ok(()) | Err(StoreError::RevConflict) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            f(&mut booking)?;
            match self.repo.update(&booking).await {
                Ok(()) => return Ok(booking),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }
}

/// Out-of-band deadline sweep over negotiable bookings, mirroring the
/// request sweep. Accepts racing the sweep are decided by commit order.
pub struct BookingExpirySweep {
    repo: Arc<dyn BookingRepo>,
}

impl BookingExpirySweep {
    pub fn new(repo: Arc<dyn BookingRepo>) -> Self {
        Self { repo }
    }

    pub async fn run_once(&self) -> Result<Vec<Uuid>, BookingError> {
        let now = Utc::now();
        let due = self.repo.list_due(now).await?;
        let mut expired = Vec::new();
        for booking_id in due {
            let Some(mut booking) = self.repo.get(booking_id).await? else {
                continue;
            };
            if !booking.sweep_expired(now) {
                continue;
            }
            match self.repo.update(&booking).await {
                Ok(()) => {
                    tracing::info!(%booking_id, "booking expired by sweep");
                    expired.push(booking_id);
                }
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }
}
