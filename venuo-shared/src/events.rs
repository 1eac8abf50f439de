use uuid::Uuid;

// Telemetry events emitted at the mutation sites of the negotiation and
// payment ledgers. These are log-plane records, not part of any aggregate.

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OfferSubmittedEvent {
    pub request_id: Uuid,
    pub offer_id: Uuid,
    pub vendor_id: Uuid,
    pub price_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OfferAcceptedEvent {
    pub request_id: Uuid,
    pub offer_id: Uuid,
    pub vendor_id: Uuid,
    pub ignored_siblings: usize,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ItemAgreedEvent {
    pub booking_id: Uuid,
    pub item_id: Uuid,
    pub offer_version: u32,
    pub final_price_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingAcceptedEvent {
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub agreement_version: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InvoicePaidEvent {
    pub invoice_id: Uuid,
    pub external_event_id: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PayoutQueuedEvent {
    pub payout_id: Uuid,
    pub vendor_id: Uuid,
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub vendor_net_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PayoutReleasedEvent {
    pub payout_id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_net_cents: i64,
    pub timestamp: i64,
}
