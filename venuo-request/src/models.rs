use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use venuo_core::identity::{ActorRole, Principal};
use venuo_shared::pii::Masked;

/// Request lifecycle. Transitions only move forward; a request is never
/// reopened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Open,
    Closed,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Ignored,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferPaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
}

/// A customer's ask for one or more service categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_email: Masked<String>,
    pub categories: BTreeSet<String>,
    pub budget_cents: i64,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One vendor's priced response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorOffer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub vendor_id: Uuid,
    pub price_cents: i64,
    pub message: Option<String>,
    pub status: OfferStatus,
    pub payment_status: OfferPaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// The aggregate the flat flow is transacted on: a request together with
/// all offers it has collected. Keeping siblings inside one aggregate is
/// what makes accept-one/ignore-the-rest/close-the-request atomic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestThread {
    pub request: ServiceRequest,
    pub offers: Vec<VendorOffer>,
    pub rev: u64,
}

impl RequestThread {
    pub fn create(
        customer: &Principal,
        customer_email: String,
        categories: BTreeSet<String>,
        budget_cents: i64,
        deadline_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            request: ServiceRequest {
                id: Uuid::new_v4(),
                customer_id: customer.id,
                customer_email: Masked(customer_email),
                categories,
                budget_cents,
                status: RequestStatus::Open,
                created_at: now,
                expires_at: now + Duration::hours(deadline_hours),
            },
            offers: Vec::new(),
            rev: 0,
        }
    }

    /// Lazy check-on-read half of the expiry sweep: flips an overdue open
    /// request to expired. Returns whether anything changed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> bool {
        if self.request.status == RequestStatus::Open && now > self.request.expires_at {
            self.request.status = RequestStatus::Expired;
            for offer in &mut self.offers {
                if offer.status == OfferStatus::Pending {
                    offer.status = OfferStatus::Ignored;
                }
            }
            true
        } else {
            false
        }
    }

    /// Records a vendor's priced response. The compliance gate is checked
    /// by the service before this is called.
    pub fn submit_offer(
        &mut self,
        vendor_id: Uuid,
        price_cents: i64,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&VendorOffer, RequestError> {
        if self.sweep_expired(now) {
            return Err(RequestError::DeadlinePassed);
        }
        match self.request.status {
            RequestStatus::Open => {}
            RequestStatus::Expired => return Err(RequestError::RequestExpired),
            _ => return Err(RequestError::RequestNotOpen),
        }
        self.offers.push(VendorOffer {
            id: Uuid::new_v4(),
            request_id: self.request.id,
            vendor_id,
            price_cents,
            message,
            status: OfferStatus::Pending,
            payment_status: OfferPaymentStatus::Unpaid,
            created_at: now,
        });
        Ok(self.offers.last().expect("offer just pushed"))
    }

    /// Customer verdict on one offer. Accepting closes the request and
    /// ignores every sibling pending offer in the same transaction.
    pub fn set_offer_status(
        &mut self,
        offer_id: Uuid,
        target: OfferStatus,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<(), RequestError> {
        if target == OfferStatus::Pending {
            return Err(RequestError::Forbidden("cannot reset an offer to pending".into()));
        }
        if self.sweep_expired(now) || self.request.status == RequestStatus::Expired {
            return Err(RequestError::RequestExpired);
        }
        let owner = actor.role == ActorRole::Customer && actor.id == self.request.customer_id;
        if !owner && actor.role != ActorRole::System {
            return Err(RequestError::Forbidden("only the owning customer may respond".into()));
        }

        match target {
            OfferStatus::Accepted => {
                match self.request.status {
                    RequestStatus::Open => {}
                    RequestStatus::Closed => return Err(RequestError::RequestAlreadyClosed),
                    RequestStatus::Cancelled => return Err(RequestError::RequestNotOpen),
                    RequestStatus::Expired => return Err(RequestError::RequestExpired),
                }
                let idx = self.offer_index(offer_id)?;
                if self.offers[idx].status != OfferStatus::Pending {
                    return Err(RequestError::OfferNotPending(offer_id));
                }
                for (i, offer) in self.offers.iter_mut().enumerate() {
                    if i == idx {
                        offer.status = OfferStatus::Accepted;
                        offer.payment_status = OfferPaymentStatus::Pending;
                    } else if offer.status == OfferStatus::Pending {
                        offer.status = OfferStatus::Ignored;
                    }
                }
                self.request.status = RequestStatus::Closed;
                Ok(())
            }
            OfferStatus::Declined | OfferStatus::Ignored => {
                if self.request.status != RequestStatus::Open {
                    return Err(RequestError::RequestNotOpen);
                }
                let idx = self.offer_index(offer_id)?;
                if self.offers[idx].status != OfferStatus::Pending {
                    return Err(RequestError::OfferNotPending(offer_id));
                }
                self.offers[idx].status = target;
                Ok(())
            }
            OfferStatus::Pending => unreachable!("rejected above"),
        }
    }

    /// Customer withdraws an open request.
    pub fn cancel(&mut self, actor: &Principal) -> Result<(), RequestError> {
        if actor.role != ActorRole::Customer || actor.id != self.request.customer_id {
            return Err(RequestError::Forbidden("only the owning customer may cancel".into()));
        }
        if self.request.status != RequestStatus::Open {
            return Err(RequestError::RequestNotOpen);
        }
        self.request.status = RequestStatus::Cancelled;
        for offer in &mut self.offers {
            if offer.status == OfferStatus::Pending {
                offer.status = OfferStatus::Ignored;
            }
        }
        Ok(())
    }

    pub fn accepted_offer(&self) -> Option<&VendorOffer> {
        self.offers.iter().find(|o| o.status == OfferStatus::Accepted)
    }

    pub fn offer(&self, offer_id: Uuid) -> Option<&VendorOffer> {
        self.offers.iter().find(|o| o.id == offer_id)
    }

    fn offer_index(&self, offer_id: Uuid) -> Result<usize, RequestError> {
        self.offers
            .iter()
            .position(|o| o.id == offer_id)
            .ok_or(RequestError::OfferNotFound(offer_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("offer not found: {0}")]
    OfferNotFound(Uuid),

    #[error("request is not open")]
    RequestNotOpen,

    #[error("request has expired")]
    RequestExpired,

    #[error("request is already closed")]
    RequestAlreadyClosed,

    #[error("response deadline has passed")]
    DeadlinePassed,

    #[error("offer {0} is no longer pending")]
    OfferNotPending(Uuid),

    #[error("vendor {vendor_id} is not compliant, missing: {missing:?}")]
    VendorNotCompliant { vendor_id: Uuid, missing: Vec<String> },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] venuo_core::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Principal {
        Principal::customer(Uuid::new_v4())
    }

    fn open_thread(customer: &Principal) -> RequestThread {
        RequestThread::create(
            customer,
            "customer@example.com".into(),
            BTreeSet::from(["catering".to_string()]),
            50_000,
            48,
        )
    }

    #[test]
    fn accept_closes_request_and_ignores_siblings() {
        let customer = customer();
        let mut thread = open_thread(&customer);
        let now = Utc::now();

        let offer_a = thread.submit_offer(Uuid::new_v4(), 45_000, None, now).unwrap().id;
        let offer_b = thread.submit_offer(Uuid::new_v4(), 48_000, None, now).unwrap().id;

        thread.set_offer_status(offer_a, OfferStatus::Accepted, &customer, now).unwrap();

        assert_eq!(thread.request.status, RequestStatus::Closed);
        assert_eq!(thread.offer(offer_a).unwrap().status, OfferStatus::Accepted);
        assert_eq!(thread.offer(offer_b).unwrap().status, OfferStatus::Ignored);

        // Re-accepting anything on a closed request fails.
        let err = thread
            .set_offer_status(offer_b, OfferStatus::Accepted, &customer, now)
            .unwrap_err();
        assert!(matches!(err, RequestError::RequestAlreadyClosed));
    }

    #[test]
    fn at_most_one_accepted_offer() {
        let customer = customer();
        let mut thread = open_thread(&customer);
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(thread.submit_offer(Uuid::new_v4(), 40_000 + i, None, now).unwrap().id);
        }
        thread.set_offer_status(ids[1], OfferStatus::Declined, &customer, now).unwrap();
        thread.set_offer_status(ids[3], OfferStatus::Accepted, &customer, now).unwrap();

        let accepted: Vec<_> =
            thread.offers.iter().filter(|o| o.status == OfferStatus::Accepted).collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(thread.request.status, RequestStatus::Closed);
        assert!(thread.offers.iter().all(|o| o.status != OfferStatus::Pending));
    }

    #[test]
    fn decline_has_no_side_effects() {
        let customer = customer();
        let mut thread = open_thread(&customer);
        let now = Utc::now();

        let offer_a = thread.submit_offer(Uuid::new_v4(), 45_000, None, now).unwrap().id;
        let offer_b = thread.submit_offer(Uuid::new_v4(), 48_000, None, now).unwrap().id;

        thread.set_offer_status(offer_a, OfferStatus::Declined, &customer, now).unwrap();
        assert_eq!(thread.request.status, RequestStatus::Open);
        assert_eq!(thread.offer(offer_b).unwrap().status, OfferStatus::Pending);
    }

    #[test]
    fn late_offer_flips_request_to_expired() {
        let customer = customer();
        let mut thread = open_thread(&customer);
        let late = Utc::now() + Duration::hours(72);

        let err = thread.submit_offer(Uuid::new_v4(), 45_000, None, late).unwrap_err();
        assert!(matches!(err, RequestError::DeadlinePassed));
        assert_eq!(thread.request.status, RequestStatus::Expired);

        // Once expired, accept/decline is off the table too.
        let err = thread
            .set_offer_status(Uuid::new_v4(), OfferStatus::Declined, &customer, late)
            .unwrap_err();
        assert!(matches!(err, RequestError::RequestExpired));
    }

    #[test]
    fn only_owner_may_accept() {
        let customer = customer();
        let stranger = Principal::customer(Uuid::new_v4());
        let vendor = Principal::vendor(Uuid::new_v4());
        let mut thread = open_thread(&customer);
        let now = Utc::now();

        let offer = thread.submit_offer(vendor.id, 45_000, None, now).unwrap().id;

        for actor in [&stranger, &vendor] {
            let err = thread.set_offer_status(offer, OfferStatus::Accepted, actor, now).unwrap_err();
            assert!(matches!(err, RequestError::Forbidden(_)));
        }
        assert_eq!(thread.request.status, RequestStatus::Open);
    }

    #[test]
    fn cancel_is_terminal() {
        let customer = customer();
        let mut thread = open_thread(&customer);
        let now = Utc::now();

        thread.cancel(&customer).unwrap();
        assert_eq!(thread.request.status, RequestStatus::Cancelled);

        let err = thread.submit_offer(Uuid::new_v4(), 45_000, None, now).unwrap_err();
        assert!(matches!(err, RequestError::RequestNotOpen));
        assert!(matches!(thread.cancel(&customer).unwrap_err(), RequestError::RequestNotOpen));
    }
}
