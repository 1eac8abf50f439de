use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use venuo_booking::models::{BookingStatus, ItemStatus};
use venuo_booking::repository::BookingRepo;
use venuo_core::identity::{ActorRole, Principal};
use venuo_core::payment::{CheckoutProvider, CheckoutSession, PaymentOutcome};
use venuo_core::StoreError;
use venuo_request::models::{OfferPaymentStatus, OfferStatus};
use venuo_request::repository::RequestRepo;
use venuo_shared::events::{InvoicePaidEvent, PayoutQueuedEvent, PayoutReleasedEvent};
use venuo_vendor::repository::ComplianceRepo;

use crate::fees::FeePolicy;
use crate::models::{
    Invoice, InvoiceStatus, InvoiceSubject, PaymentError, PaymentEventRecord, Payout, PayoutStatus,
};
use crate::repository::{InvoiceRepo, PaymentEventRepo, PayoutRepo};

const MAX_CAS_RETRIES: usize = 4;

/// Result of applying an external payment event. A replay is a no-op for
/// the caller, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedPayment {
    Applied,
    AlreadyProcessed,
}

/// Result of a payout release attempt. `Deferred` is a state, not a
/// failure: the vendor's payout account is not ready yet and the release
/// is safe to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    Deferred,
}

/// The payment and payout ledger: checkout opening, exactly-once
/// application of processor events, and the vendor payout queue.
pub struct PaymentService {
    invoices: Arc<dyn InvoiceRepo>,
    payouts: Arc<dyn PayoutRepo>,
    events: Arc<dyn PaymentEventRepo>,
    bookings: Arc<dyn BookingRepo>,
    requests: Arc<dyn RequestRepo>,
    compliance: Arc<dyn ComplianceRepo>,
    checkout: Arc<dyn CheckoutProvider>,
    fees: FeePolicy,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoices: Arc<dyn InvoiceRepo>,
        payouts: Arc<dyn PayoutRepo>,
        events: Arc<dyn PaymentEventRepo>,
        bookings: Arc<dyn BookingRepo>,
        requests: Arc<dyn RequestRepo>,
        compliance: Arc<dyn ComplianceRepo>,
        checkout: Arc<dyn CheckoutProvider>,
        fees: FeePolicy,
    ) -> Self {
        Self { invoices, payouts, events, bookings, requests, compliance, checkout, fees }
    }

    /// Opens checkout for a fully agreed subject. The checkout session is
    /// created with the processor before the invoice is committed, so a
    /// processor failure leaves no local state behind.
    pub async fn open_checkout(
        &self,
        actor: &Principal,
        subject: InvoiceSubject,
        success_ref: &str,
        cancel_ref: &str,
    ) -> Result<(Invoice, CheckoutSession), PaymentError> {
        let amount_cents = self.checkout_amount(actor, &subject).await?;

        let existing = self.invoices.list_for_subject(&subject.key()).await?;
        if existing.iter().any(|i| i.blocks_new_checkout()) {
            return Err(PaymentError::InvoiceAlreadyOpen);
        }

        let mut invoice = Invoice::draft(subject, amount_cents);
        let session = self
            .checkout
            .create_checkout_session(invoice.id, amount_cents, success_ref, cancel_ref)
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;
        invoice.issue(session.session_ref.clone())?;

        match self.invoices.insert(&invoice).await {
            Ok(()) => {}
            // Another checkout for the same subject committed first.
            Err(StoreError::RevConflict) => return Err(PaymentError::InvoiceAlreadyOpen),
            Err(e) => return Err(e.into()),
        }

        if let InvoiceSubject::Booking { booking_id } = invoice.subject {
            self.attach_invoice_to_booking(booking_id, invoice.id).await?;
        }

        tracing::info!(invoice_id = %invoice.id, amount_cents, "checkout opened");
        Ok((invoice, session))
    }

    /// Applies a payment-outcome event from the processor. Keyed by the
    /// external event id: replays return `AlreadyProcessed` without
    /// touching anything, regardless of delivery order or duplication.
    /// The event id is claimed in the ledger before any work and the
    /// claim is released again if the application fails, so an event
    /// that arrives before its session is visible (or hits a transient
    /// store failure) is re-attempted on redelivery instead of being
    /// swallowed as a replay.
    pub async fn apply_payment_event(
        &self,
        external_event_id: &str,
        session_ref: &str,
        outcome: PaymentOutcome,
    ) -> Result<AppliedPayment, PaymentError> {
        let record = PaymentEventRecord {
            external_event_id: external_event_id.to_string(),
            session_ref: session_ref.to_string(),
            outcome,
            applied_at: Utc::now(),
        };
        if !self.events.insert_if_absent(&record).await? {
            tracing::info!(external_event_id, "payment event replayed, skipping");
            return Ok(AppliedPayment::AlreadyProcessed);
        }

        match self.apply_claimed_event(external_event_id, session_ref, outcome).await {
            Ok(applied) => Ok(applied),
            Err(e) => {
                if let Err(release) = self.events.remove(external_event_id).await {
                    tracing::error!(
                        external_event_id,
                        error = %release,
                        "failed to release payment event claim"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply_claimed_event(
        &self,
        external_event_id: &str,
        session_ref: &str,
        outcome: PaymentOutcome,
    ) -> Result<AppliedPayment, PaymentError> {
        let invoice = self
            .invoices
            .find_by_session(session_ref)
            .await?
            .ok_or_else(|| PaymentError::UnknownSession(session_ref.to_string()))?;

        // A distinct event id can still target an already settled
        // invoice; that too is a replay from the ledger's point of view.
        // An earlier delivery may have settled the invoice and then lost
        // its claim partway through, so the settlement side effects are
        // re-run here; both are idempotent.
        if invoice.status == InvoiceStatus::Paid {
            if matches!(outcome, PaymentOutcome::Succeeded) {
                self.queue_payouts(&invoice).await?;
                self.propagate_offer_payment(&invoice.subject, OfferPaymentStatus::Paid).await?;
            }
            return Ok(AppliedPayment::AlreadyProcessed);
        }

        let invoice = self
            .mutate_invoice(invoice.id, |inv| inv.apply_outcome(outcome, Utc::now()))
            .await?;

        match outcome {
            PaymentOutcome::Succeeded => {
                tracing::info!(
                    event = ?InvoicePaidEvent {
                        invoice_id: invoice.id,
                        external_event_id: external_event_id.to_string(),
                        amount_cents: invoice.amount_cents,
                        timestamp: Utc::now().timestamp(),
                    },
                    "invoice paid"
                );
                self.queue_payouts(&invoice).await?;
                self.propagate_offer_payment(&invoice.subject, OfferPaymentStatus::Paid).await?;
            }
            PaymentOutcome::Failed | PaymentOutcome::Canceled => {
                tracing::warn!(invoice_id = %invoice.id, ?outcome, "payment did not complete");
                self.propagate_offer_payment(&invoice.subject, OfferPaymentStatus::Failed).await?;
            }
        }
        Ok(AppliedPayment::Applied)
    }

    /// Releases one payout if, and only if, the vendor's payout account
    /// is enabled. Otherwise the payout stays pending for a later retry.
    pub async fn release_payout(&self, payout_id: Uuid) -> Result<ReleaseOutcome, PaymentError> {
        let payout = self
            .payouts
            .get(payout_id)
            .await?
            .ok_or(PaymentError::PayoutNotFound(payout_id))?;
        match payout.status {
            PayoutStatus::Pending => {}
            PayoutStatus::Paid => return Ok(ReleaseOutcome::Released),
            PayoutStatus::Failed => {
                return Err(PaymentError::InvalidState("payout has failed".into()))
            }
        }

        let ready = self
            .compliance
            .get(payout.vendor_id)
            .await?
            .map(|c| c.payouts_enabled)
            .unwrap_or(false);
        if !ready {
            tracing::info!(%payout_id, vendor_id = %payout.vendor_id, "payout deferred, vendor not payout-ready");
            return Ok(ReleaseOutcome::Deferred);
        }

        for _ in 0..MAX_CAS_RETRIES {
            let mut payout = self
                .payouts
                .get(payout_id)
                .await?
                .ok_or(PaymentError::PayoutNotFound(payout_id))?;
            if payout.status == PayoutStatus::Paid {
                return Ok(ReleaseOutcome::Released);
            }
            payout.status = PayoutStatus::Paid;
            payout.released_at = Some(Utc::now());
            match self.payouts.update(&payout).await {
                Ok(()) => {
                    tracing::info!(
                        event = ?PayoutReleasedEvent {
                            payout_id,
                            vendor_id: payout.vendor_id,
                            vendor_net_cents: payout.vendor_net_cents,
                            timestamp: Utc::now().timestamp(),
                        },
                        "payout released"
                    );
                    return Ok(ReleaseOutcome::Released);
                }
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }

    /// Background pass retrying pending payouts whose vendor has become
    /// payout-ready since the invoice was paid.
    pub async fn retry_pending_payouts(&self) -> Result<usize, PaymentError> {
        let pending = self.payouts.list_pending().await?;
        let mut released = 0;
        for payout in pending {
            if self.release_payout(payout.id).await? == ReleaseOutcome::Released {
                released += 1;
            }
        }
        Ok(released)
    }

    pub async fn invoice(&self, invoice_id: Uuid) -> Result<Invoice, PaymentError> {
        self.invoices
            .get(invoice_id)
            .await?
            .ok_or(PaymentError::InvoiceNotFound(invoice_id))
    }

    pub async fn invoices_for_subject(
        &self,
        subject: &InvoiceSubject,
    ) -> Result<Vec<Invoice>, PaymentError> {
        Ok(self.invoices.list_for_subject(&subject.key()).await?)
    }

    pub async fn payouts_for_vendor(&self, vendor_id: Uuid) -> Result<Vec<Payout>, PaymentError> {
        Ok(self.payouts.list_for_vendor(vendor_id).await?)
    }

    pub async fn payout_queue(&self) -> Result<Vec<Payout>, PaymentError> {
        Ok(self.payouts.list_pending().await?)
    }

    pub async fn void_invoice(
        &self,
        actor: &Principal,
        invoice_id: Uuid,
    ) -> Result<Invoice, PaymentError> {
        if actor.role != ActorRole::Admin {
            return Err(PaymentError::Forbidden("only admins void invoices".into()));
        }
        self.mutate_invoice(invoice_id, |inv| inv.void()).await
    }

    pub async fn mark_invoice_refunded(
        &self,
        actor: &Principal,
        invoice_id: Uuid,
    ) -> Result<Invoice, PaymentError> {
        if actor.role != ActorRole::Admin {
            return Err(PaymentError::Forbidden("only admins record refunds".into()));
        }
        self.mutate_invoice(invoice_id, |inv| inv.mark_refunded()).await
    }

    // ------------------------------------------------------------------

    /// Validates the subject is checkout-ready and returns the amount.
    async fn checkout_amount(
        &self,
        actor: &Principal,
        subject: &InvoiceSubject,
    ) -> Result<i64, PaymentError> {
        match subject {
            InvoiceSubject::Booking { booking_id } => {
                let booking = self
                    .bookings
                    .get(*booking_id)
                    .await?
                    .ok_or(PaymentError::NotCheckoutReady(format!("booking {booking_id} not found")))?;
                if actor.role == ActorRole::Customer && actor.id != booking.customer_id {
                    return Err(PaymentError::Forbidden("not your booking".into()));
                }
                if booking.status != BookingStatus::Accepted {
                    return Err(PaymentError::NotCheckoutReady(format!(
                        "booking is {:?}, not ACCEPTED",
                        booking.status
                    )));
                }
                Ok(booking.agreed_total_cents())
            }
            InvoiceSubject::RequestOffer { request_id, offer_id } => {
                let thread = self
                    .requests
                    .get(*request_id)
                    .await?
                    .ok_or(PaymentError::NotCheckoutReady(format!("request {request_id} not found")))?;
                if actor.role == ActorRole::Customer && actor.id != thread.request.customer_id {
                    return Err(PaymentError::Forbidden("not your request".into()));
                }
                let offer = thread
                    .offer(*offer_id)
                    .ok_or(PaymentError::NotCheckoutReady(format!("offer {offer_id} not found")))?;
                if offer.status != OfferStatus::Accepted {
                    return Err(PaymentError::NotCheckoutReady(
                        "offer has not been accepted".into(),
                    ));
                }
                Ok(offer.price_cents)
            }
        }
    }

    /// One payout per vendor with agreed items on the booking; for the
    /// flat flow, a single payout to the accepted offer's vendor. When a
    /// booking has one vendor, the payout gross equals the invoice amount.
    /// Idempotent: an invoice that already has payouts queues nothing.
    async fn queue_payouts(&self, invoice: &Invoice) -> Result<(), PaymentError> {
        if !self.payouts.list_for_invoice(invoice.id).await?.is_empty() {
            return Ok(());
        }
        let shares: Vec<(Uuid, i64)> = match &invoice.subject {
            InvoiceSubject::Booking { booking_id } => {
                let booking = self
                    .bookings
                    .get(*booking_id)
                    .await?
                    .ok_or(PaymentError::NotCheckoutReady(format!("booking {booking_id} missing")))?;
                let mut by_vendor: BTreeMap<Uuid, i64> = BTreeMap::new();
                for item in &booking.items {
                    if let ItemStatus::Agreed { final_price_cents } = item.status {
                        *by_vendor.entry(item.vendor_id).or_default() += final_price_cents;
                    }
                }
                by_vendor.into_iter().collect()
            }
            InvoiceSubject::RequestOffer { request_id, offer_id } => {
                let thread = self
                    .requests
                    .get(*request_id)
                    .await?
                    .ok_or(PaymentError::NotCheckoutReady(format!("request {request_id} missing")))?;
                let offer = thread
                    .offer(*offer_id)
                    .ok_or(PaymentError::NotCheckoutReady(format!("offer {offer_id} missing")))?;
                vec![(offer.vendor_id, invoice.amount_cents)]
            }
        };

        for (vendor_id, gross_cents) in shares {
            let platform_fee_cents = self.fees.platform_fee(gross_cents);
            let payout = Payout {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                subject: invoice.subject,
                vendor_id,
                gross_cents,
                platform_fee_cents,
                vendor_net_cents: gross_cents - platform_fee_cents,
                status: PayoutStatus::Pending,
                created_at: Utc::now(),
                released_at: None,
                rev: 0,
            };
            self.payouts.insert(&payout).await?;
            tracing::info!(
                event = ?PayoutQueuedEvent {
                    payout_id: payout.id,
                    vendor_id,
                    gross_cents,
                    platform_fee_cents,
                    vendor_net_cents: payout.vendor_net_cents,
                    timestamp: Utc::now().timestamp(),
                },
                "payout queued"
            );
        }
        Ok(())
    }

    /// Mirrors the invoice outcome onto the flat flow's accepted offer.
    async fn propagate_offer_payment(
        &self,
        subject: &InvoiceSubject,
        status: OfferPaymentStatus,
    ) -> Result<(), PaymentError> {
        let InvoiceSubject::RequestOffer { request_id, offer_id } = subject else {
            return Ok(());
        };
        for _ in 0..MAX_CAS_RETRIES {
            let Some(mut thread) = self.requests.get(*request_id).await? else {
                return Ok(());
            };
            let Some(offer) = thread.offers.iter_mut().find(|o| o.id == *offer_id) else {
                return Ok(());
            };
            offer.payment_status = status;
            match self.requests.update(&thread).await {
                Ok(()) => return Ok(()),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }

    async fn attach_invoice_to_booking(
        &self,
        booking_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), PaymentError> {
        for _ in 0..MAX_CAS_RETRIES {
            let Some(mut booking) = self.bookings.get(booking_id).await? else {
                return Ok(());
            };
            booking.attach_invoice(invoice_id);
            match self.bookings.update(&booking).await {
                Ok(()) => return Ok(()),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }

    async fn mutate_invoice<F>(&self, invoice_id: Uuid, mut f: F) -> Result<Invoice, PaymentError>
    where
        F: FnMut(&mut Invoice) -> Result<(), PaymentError>,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let mut invoice = self
                .invoices
                .get(invoice_id)
                .await?
                .ok_or(PaymentError::InvoiceNotFound(invoice_id))?;
            f(&mut invoice)?;
            match self.invoices.update(&invoice).await {
                Ok(()) => return Ok(invoice),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }
}
