use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use venuo_core::identity::{ActorRole, Principal};

/// Booking lifecycle. `Accepted` is a pure projection over the items and
/// the agreement block, recomputed after every mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Draft,
    Pending,
    PartiallyAccepted,
    Accepted,
    Declined,
    Expired,
    Cancelled,
    Completed,
}

/// Per-item negotiation state. The final price only exists once the item
/// is agreed; a declined item keeps the stated reason. This is the tagged
/// shape the wire contract uses as well.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Requested,
    Countered,
    Agreed { final_price_cents: i64 },
    Declined { reason: Option<String> },
    Expired,
    Cancelled,
}

impl ItemStatus {
    pub fn is_negotiable(&self) -> bool {
        matches!(self, ItemStatus::Requested | ItemStatus::Countered)
    }

    pub fn is_agreed(&self) -> bool {
        matches!(self, ItemStatus::Agreed { .. })
    }
}

/// One vendor/service line inside a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub vendor_id: Uuid,
    pub service_id: Uuid,
    pub is_required: bool,
    pub current_offer_version: u32,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferEventKind {
    RequestCreated,
    VendorCountered,
    CustomerCountered,
    VendorAccepted,
    CustomerAccepted,
    Declined,
    Expired,
}

/// Structured fee fields attached to each proposal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub base_cents: i64,
    pub service_fee_cents: i64,
    pub discount_cents: i64,
}

/// Append-only audit entry for a booking item. Never mutated or deleted;
/// the item's current version and price are projections of this log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferEvent {
    pub id: Uuid,
    pub booking_item_id: Uuid,
    pub actor_role: ActorRole,
    pub kind: OfferEventKind,
    pub offer_version: u32,
    pub price_cents: i64,
    pub reason: Option<String>,
    pub breakdown: FeeBreakdown,
    pub created_at: DateTime<Utc>,
}

/// Separately timestamped sign-off by one party on the final terms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signoff {
    pub at: DateTime<Utc>,
    pub ip: String,
}

/// Dual-party agreement block. The version identifies a snapshot of the
/// negotiated terms; any item mutation bumps it and clears both flags, so
/// a sign-off against revised terms always fails the version check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agreement {
    pub version: u32,
    pub customer_accepted: Option<Signoff>,
    pub vendor_accepted: Option<Signoff>,
}

impl Agreement {
    fn new() -> Self {
        Self { version: 1, customer_accepted: None, vendor_accepted: None }
    }

    fn invalidate(&mut self) {
        if self.customer_accepted.is_some() || self.vendor_accepted.is_some() {
            self.customer_accepted = None;
            self.vendor_accepted = None;
        }
        self.version += 1;
    }

    pub fn both_accepted(&self) -> bool {
        self.customer_accepted.is_some() && self.vendor_accepted.is_some()
    }
}

/// Line requested by the customer when the booking is drafted.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSpec {
    pub vendor_id: Uuid,
    pub service_id: Uuid,
    pub is_required: bool,
    pub asking_price_cents: i64,
    #[serde(default)]
    pub breakdown: FeeBreakdown,
}

/// Aggregate over the booking items for one event, including the full
/// offer-event log. All item operations are transacted on this aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub event_date: NaiveDate,
    pub negotiation_deadline: DateTime<Utc>,
    pub items: Vec<BookingItem>,
    pub events: Vec<OfferEvent>,
    pub status: BookingStatus,
    pub agreement: Agreement,
    pub invoice_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub rev: u64,
}

impl Booking {
    pub fn create(
        customer: &Principal,
        event_date: NaiveDate,
        negotiation_deadline: DateTime<Utc>,
        specs: Vec<ItemSpec>,
    ) -> Self {
        let now = Utc::now();
        let booking_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(specs.len());
        let mut events = Vec::with_capacity(specs.len());
        for spec in specs {
            let item_id = Uuid::new_v4();
            items.push(BookingItem {
                id: item_id,
                booking_id,
                vendor_id: spec.vendor_id,
                service_id: spec.service_id,
                is_required: spec.is_required,
                current_offer_version: 1,
                status: ItemStatus::Requested,
            });
            events.push(OfferEvent {
                id: Uuid::new_v4(),
                booking_item_id: item_id,
                actor_role: ActorRole::Customer,
                kind: OfferEventKind::RequestCreated,
                offer_version: 1,
                price_cents: spec.asking_price_cents,
                reason: None,
                breakdown: spec.breakdown,
                created_at: now,
            });
        }
        Self {
            id: booking_id,
            customer_id: customer.id,
            event_date,
            negotiation_deadline,
            items,
            events,
            status: BookingStatus::Draft,
            agreement: Agreement::new(),
            invoice_id: None,
            created_at: now,
            updated_at: now,
            rev: 0,
        }
    }

    /// Customer submits the draft; vendors can negotiate from here on.
    pub fn submit(&mut self, actor: &Principal) -> Result<(), BookingError> {
        self.ensure_owner(actor)?;
        if self.status != BookingStatus::Draft {
            return Err(BookingError::InvalidState("only a draft booking can be submitted".into()));
        }
        self.status = BookingStatus::Pending;
        self.touch();
        Ok(())
    }

    /// Most recent offer event for an item; the item's turn state.
    pub fn last_event(&self, item_id: Uuid) -> Option<&OfferEvent> {
        self.events.iter().rev().find(|e| e.booking_item_id == item_id)
    }

    /// Price of the proposal carrying the given version, if any.
    pub fn proposal_price(&self, item_id: Uuid, version: u32) -> Option<i64> {
        self.events
            .iter()
            .rev()
            .find(|e| {
                e.booking_item_id == item_id
                    && e.offer_version == version
                    && matches!(
                        e.kind,
                        OfferEventKind::RequestCreated
                            | OfferEventKind::VendorCountered
                            | OfferEventKind::CustomerCountered
                    )
            })
            .map(|e| e.price_cents)
    }

    /// Counter-proposal on one item. Turn-based: a party may only counter
    /// when the other party holds the most recent event on the item.
    pub fn counter_offer(
        &mut self,
        item_id: Uuid,
        actor_role: ActorRole,
        price_cents: i64,
        reason: Option<String>,
        breakdown: FeeBreakdown,
        now: DateTime<Utc>,
    ) -> Result<&OfferEvent, BookingError> {
        self.ensure_negotiable()?;
        let kind = match actor_role {
            ActorRole::Vendor => OfferEventKind::VendorCountered,
            ActorRole::Customer => OfferEventKind::CustomerCountered,
            other => {
                return Err(BookingError::Forbidden(format!("role {other:?} cannot counter")))
            }
        };
        let idx = self.item_index(item_id)?;
        if !self.items[idx].status.is_negotiable() {
            return Err(BookingError::ItemNotNegotiable(item_id));
        }
        let last = self.last_event(item_id).expect("items always carry a creation event");
        if last.actor_role == actor_role {
            return Err(BookingError::NotYourTurn { item_id, holder: actor_role });
        }

        let item = &mut self.items[idx];
        item.current_offer_version += 1;
        item.status = ItemStatus::Countered;
        let version = item.current_offer_version;
        self.events.push(OfferEvent {
            id: Uuid::new_v4(),
            booking_item_id: item_id,
            actor_role,
            kind,
            offer_version: version,
            price_cents,
            reason,
            breakdown,
            created_at: now,
        });
        self.agreement.invalidate();
        self.project();
        self.touch();
        Ok(self.events.last().expect("event just pushed"))
    }

    /// Accepts the proposal at `expected_version`. Optimistic concurrency:
    /// a stale version fails without mutating anything, the caller
    /// refetches and retries.
    pub fn accept_offer(
        &mut self,
        item_id: Uuid,
        actor_role: ActorRole,
        expected_version: u32,
        now: DateTime<Utc>,
    ) -> Result<i64, BookingError> {
        self.ensure_negotiable()?;
        let kind = match actor_role {
            ActorRole::Vendor => OfferEventKind::VendorAccepted,
            ActorRole::Customer => OfferEventKind::CustomerAccepted,
            other => return Err(BookingError::Forbidden(format!("role {other:?} cannot accept"))),
        };
        let idx = self.item_index(item_id)?;
        if !self.items[idx].status.is_negotiable() {
            return Err(BookingError::ItemNotNegotiable(item_id));
        }
        let current = self.items[idx].current_offer_version;
        if expected_version != current {
            return Err(BookingError::StaleOfferVersion { expected: expected_version, current });
        }
        let final_price_cents = self
            .proposal_price(item_id, current)
            .ok_or(BookingError::ItemNotNegotiable(item_id))?;

        let item = &mut self.items[idx];
        item.current_offer_version += 1;
        item.status = ItemStatus::Agreed { final_price_cents };
        let version = item.current_offer_version;
        self.events.push(OfferEvent {
            id: Uuid::new_v4(),
            booking_item_id: item_id,
            actor_role,
            kind,
            offer_version: version,
            price_cents: final_price_cents,
            reason: None,
            breakdown: FeeBreakdown::default(),
            created_at: now,
        });
        self.agreement.invalidate();
        self.project();
        self.touch();
        Ok(final_price_cents)
    }

    /// Declines the item; terminal for the item and, if it was required,
    /// for the booking.
    pub fn decline_offer(
        &mut self,
        item_id: Uuid,
        actor_role: ActorRole,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        self.ensure_negotiable()?;
        if !matches!(actor_role, ActorRole::Customer | ActorRole::Vendor) {
            return Err(BookingError::Forbidden(format!("role {actor_role:?} cannot decline")));
        }
        let idx = self.item_index(item_id)?;
        if !self.items[idx].status.is_negotiable() {
            return Err(BookingError::ItemNotNegotiable(item_id));
        }
        let item = &mut self.items[idx];
        item.current_offer_version += 1;
        item.status = ItemStatus::Declined { reason: reason.clone() };
        let version = item.current_offer_version;
        self.events.push(OfferEvent {
            id: Uuid::new_v4(),
            booking_item_id: item_id,
            actor_role,
            kind: OfferEventKind::Declined,
            offer_version: version,
            price_cents: 0,
            reason,
            breakdown: FeeBreakdown::default(),
            created_at: now,
        });
        self.agreement.invalidate();
        self.project();
        self.touch();
        Ok(())
    }

    /// Sets the actor's agreement flag. Both flags under the same version
    /// are required before checkout.
    pub fn accept_agreement(
        &mut self,
        actor_role: ActorRole,
        agreement_version: u32,
        ip: String,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if matches!(
            self.status,
            BookingStatus::Declined
                | BookingStatus::Expired
                | BookingStatus::Cancelled
                | BookingStatus::Completed
        ) {
            return Err(BookingError::InvalidState(format!(
                "agreement cannot be signed in status {:?}",
                self.status
            )));
        }
        if agreement_version != self.agreement.version {
            return Err(BookingError::AgreementVersionMismatch {
                given: agreement_version,
                current: self.agreement.version,
            });
        }
        let signoff = Signoff { at: now, ip };
        match actor_role {
            ActorRole::Customer => self.agreement.customer_accepted = Some(signoff),
            ActorRole::Vendor => self.agreement.vendor_accepted = Some(signoff),
            other => {
                return Err(BookingError::Forbidden(format!("role {other:?} cannot sign off")))
            }
        }
        self.project();
        self.touch();
        Ok(())
    }

    /// Deadline sweep: items still under negotiation expire, and the
    /// booking follows if a required item can no longer be agreed.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, BookingStatus::Pending | BookingStatus::PartiallyAccepted) {
            return false;
        }
        if now <= self.negotiation_deadline {
            return false;
        }
        let mut changed = false;
        let expiring: Vec<(Uuid, u32)> = self
            .items
            .iter_mut()
            .filter(|i| i.status.is_negotiable())
            .map(|i| {
                i.status = ItemStatus::Expired;
                i.current_offer_version += 1;
                (i.id, i.current_offer_version)
            })
            .collect();
        for (item_id, version) in expiring {
            changed = true;
            self.events.push(OfferEvent {
                id: Uuid::new_v4(),
                booking_item_id: item_id,
                actor_role: ActorRole::System,
                kind: OfferEventKind::Expired,
                offer_version: version,
                price_cents: 0,
                reason: None,
                breakdown: FeeBreakdown::default(),
                created_at: now,
            });
        }
        if changed {
            self.agreement.invalidate();
            self.project();
            self.touch();
        }
        changed
    }

    /// Customer cancels a booking that has not reached a terminal state.
    pub fn cancel(&mut self, actor: &Principal) -> Result<(), BookingError> {
        self.ensure_owner(actor)?;
        if matches!(
            self.status,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::Expired
        ) {
            return Err(BookingError::InvalidState(format!(
                "booking cannot be cancelled from {:?}",
                self.status
            )));
        }
        self.status = BookingStatus::Cancelled;
        for item in &mut self.items {
            if item.status.is_negotiable() {
                item.status = ItemStatus::Cancelled;
            }
        }
        self.touch();
        Ok(())
    }

    /// Marks the event delivered. Requires an accepted booking; the
    /// service additionally requires the invoice to be paid.
    pub fn complete(&mut self) -> Result<(), BookingError> {
        if self.status != BookingStatus::Accepted {
            return Err(BookingError::InvalidState(format!(
                "booking cannot complete from {:?}",
                self.status
            )));
        }
        self.status = BookingStatus::Completed;
        self.touch();
        Ok(())
    }

    pub fn attach_invoice(&mut self, invoice_id: Uuid) {
        self.invoice_id = Some(invoice_id);
        self.touch();
    }

    pub fn item(&self, item_id: Uuid) -> Option<&BookingItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Sum of agreed final prices; the invoice amount once checkout opens.
    pub fn agreed_total_cents(&self) -> i64 {
        self.items
            .iter()
            .filter_map(|i| match i.status {
                ItemStatus::Agreed { final_price_cents } => Some(final_price_cents),
                _ => None,
            })
            .sum()
    }

    pub fn required_items(&self) -> impl Iterator<Item = &BookingItem> {
        self.items.iter().filter(|i| i.is_required)
    }

    /// Recomputes the booking status from items and agreement flags.
    /// Draft/terminal states stick; everything else is projected.
    fn project(&mut self) {
        if matches!(
            self.status,
            BookingStatus::Draft
                | BookingStatus::Cancelled
                | BookingStatus::Completed
                | BookingStatus::Declined
                | BookingStatus::Expired
        ) {
            return;
        }
        let required: Vec<&BookingItem> = self.required_items().collect();
        if required.iter().any(|i| matches!(i.status, ItemStatus::Declined { .. })) {
            self.status = BookingStatus::Declined;
            return;
        }
        if required.iter().any(|i| i.status == ItemStatus::Expired) {
            self.status = BookingStatus::Expired;
            return;
        }
        let agreed = required.iter().filter(|i| i.status.is_agreed()).count();
        if agreed == required.len() && self.agreement.both_accepted() {
            self.status = BookingStatus::Accepted;
        } else if agreed > 0 && agreed < required.len() {
            self.status = BookingStatus::PartiallyAccepted;
        } else {
            self.status = BookingStatus::Pending;
        }
    }

    fn ensure_negotiable(&self) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Pending | BookingStatus::PartiallyAccepted => Ok(()),
            other => Err(BookingError::InvalidState(format!(
                "booking is not negotiable in status {other:?}"
            ))),
        }
    }

    fn ensure_owner(&self, actor: &Principal) -> Result<(), BookingError> {
        if actor.role == ActorRole::Customer && actor.id == self.customer_id {
            Ok(())
        } else {
            Err(BookingError::Forbidden("only the owning customer may do this".into()))
        }
    }

    fn item_index(&self, item_id: Uuid) -> Result<usize, BookingError> {
        self.items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(BookingError::ItemNotFound(item_id))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("booking item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("item {0} is not negotiable")]
    ItemNotNegotiable(Uuid),

    #[error("not your turn on item {item_id}: {holder:?} holds the latest proposal")]
    NotYourTurn { item_id: Uuid, holder: ActorRole },

    #[error("stale offer version: expected {expected}, current {current}")]
    StaleOfferVersion { expected: u32, current: u32 },

    #[error("agreement version mismatch: given {given}, current {current}")]
    AgreementVersionMismatch { given: u32, current: u32 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("vendor {vendor_id} is blocked from responding, missing: {missing:?}")]
    PublishingBlocked { vendor_id: Uuid, missing: Vec<String> },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] venuo_core::StoreError),
}
