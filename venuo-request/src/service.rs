use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;
use venuo_core::identity::{ActorRole, Principal};
use venuo_core::StoreError;
use venuo_shared::events::{OfferAcceptedEvent, OfferSubmittedEvent};
use venuo_vendor::repository::ComplianceRepo;

use crate::models::{OfferStatus, RequestError, RequestThread};
use crate::repository::RequestRepo;

const MAX_CAS_RETRIES: usize = 4;

/// Orchestrates the flat request/offer flow against the ledger store,
/// consulting the compliance gate on every vendor-side write.
pub struct RequestService {
    repo: Arc<dyn RequestRepo>,
    compliance: Arc<dyn ComplianceRepo>,
}

impl RequestService {
    pub fn new(repo: Arc<dyn RequestRepo>, compliance: Arc<dyn ComplianceRepo>) -> Self {
        Self { repo, compliance }
    }

    pub async fn create_request(
        &self,
        customer: &Principal,
        customer_email: String,
        categories: BTreeSet<String>,
        budget_cents: i64,
        deadline_hours: i64,
    ) -> Result<RequestThread, RequestError> {
        if customer.role != ActorRole::Customer {
            return Err(RequestError::Forbidden("only customers create requests".into()));
        }
        let thread =
            RequestThread::create(customer, customer_email, categories, budget_cents, deadline_hours);
        self.repo.insert(&thread).await?;
        tracing::info!(request_id = %thread.request.id, budget_cents, "request created");
        Ok(thread)
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<RequestThread, RequestError> {
        let mut thread = self
            .repo
            .get(request_id)
            .await?
            .ok_or(RequestError::RequestNotFound(request_id))?;
        // Check-on-read half of the expiry sweep.
        if thread.sweep_expired(Utc::now()) {
            match self.repo.update(&thread).await {
                Ok(()) | Err(StoreError::RevConflict) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(thread)
    }

    pub async fn list_for_customer(
        &self,
        customer: &Principal,
    ) -> Result<Vec<RequestThread>, RequestError> {
        Ok(self.repo.list_for_customer(customer.id).await?)
    }

    pub async fn submit_offer(
        &self,
        vendor: &Principal,
        request_id: Uuid,
        price_cents: i64,
        message: Option<String>,
    ) -> Result<RequestThread, RequestError> {
        if vendor.role != ActorRole::Vendor {
            return Err(RequestError::Forbidden("only vendors submit offers".into()));
        }
        let compliance = self
            .compliance
            .get(vendor.id)
            .await?
            .ok_or_else(|| RequestError::VendorNotCompliant {
                vendor_id: vendor.id,
                missing: vec![
                    "admin_approval".into(),
                    "contract_acceptance".into(),
                    "training_completion".into(),
                    "payouts_enabled".into(),
                ],
            })?;
        if !compliance.can_publish() {
            return Err(RequestError::VendorNotCompliant {
                vendor_id: vendor.id,
                missing: compliance.missing_prerequisites().iter().map(|s| s.to_string()).collect(),
            });
        }

        let thread = self
            .mutate(request_id, |thread| {
                thread
                    .submit_offer(vendor.id, price_cents, message.clone(), Utc::now())
                    .map(|_| ())
            })
            .await?;
        if let Some(offer) = thread.offers.iter().rev().find(|o| o.vendor_id == vendor.id) {
            tracing::info!(
                event = ?OfferSubmittedEvent {
                    request_id,
                    offer_id: offer.id,
                    vendor_id: vendor.id,
                    price_cents,
                    timestamp: Utc::now().timestamp(),
                },
                "offer submitted"
            );
        }
        Ok(thread)
    }

    pub async fn set_offer_status(
        &self,
        actor: &Principal,
        request_id: Uuid,
        offer_id: Uuid,
        target: OfferStatus,
    ) -> Result<RequestThread, RequestError> {
        let thread = self
            .mutate(request_id, |thread| {
                thread.set_offer_status(offer_id, target, actor, Utc::now())
            })
            .await?;
        if target == OfferStatus::Accepted {
            let ignored =
                thread.offers.iter().filter(|o| o.status == OfferStatus::Ignored).count();
            if let Some(accepted) = thread.accepted_offer() {
                tracing::info!(
                    event = ?OfferAcceptedEvent {
                        request_id,
                        offer_id: accepted.id,
                        vendor_id: accepted.vendor_id,
                        ignored_siblings: ignored,
                        timestamp: Utc::now().timestamp(),
                    },
                    "offer accepted, request closed"
                );
            }
        }
        Ok(thread)
    }

    pub async fn cancel_request(
        &self,
        actor: &Principal,
        request_id: Uuid,
    ) -> Result<RequestThread, RequestError> {
        self.mutate(request_id, |thread| thread.cancel(actor)).await
    }

    async fn mutate<F>(&self, request_id: Uuid, mut f: F) -> Result<RequestThread, RequestError>
    where
        F: FnMut(&mut RequestThread) -> Result<(), RequestError>,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let mut thread = self
                .repo
                .get(request_id)
                .await?
                .ok_or(RequestError::RequestNotFound(request_id))?;
            // A write landing past the deadline must leave the thread
            // expired in the store, not just rejected, so the flip is
            // committed before the mutation gets a say.
            if thread.sweep_expired(Utc::now()) {
                match self.repo.update(&thread).await {
                    Ok(()) | Err(StoreError::RevConflict) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            f(&mut thread)?;
            match self.repo.update(&thread).await {
                Ok(()) => return Ok(thread),
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::RevConflict.into())
    }
}
