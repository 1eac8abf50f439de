use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use venuo_core::payment::PaymentOutcome;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Failed,
    Refunded,
    Void,
}

/// What an invoice pays for: a structured booking, or the accepted offer
/// of the flat request flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceSubject {
    Booking { booking_id: Uuid },
    RequestOffer { request_id: Uuid, offer_id: Uuid },
}

impl InvoiceSubject {
    /// Stable key used to enforce at-most-one non-void invoice per subject.
    pub fn key(&self) -> String {
        match self {
            InvoiceSubject::Booking { booking_id } => format!("booking:{booking_id}"),
            InvoiceSubject::RequestOffer { request_id, .. } => format!("request:{request_id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub subject: InvoiceSubject,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub session_ref: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub rev: u64,
}

impl Invoice {
    pub fn draft(subject: InvoiceSubject, amount_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            amount_cents,
            status: InvoiceStatus::Draft,
            session_ref: None,
            issued_at: None,
            paid_at: None,
            created_at: Utc::now(),
            rev: 0,
        }
    }

    pub fn issue(&mut self, session_ref: String) -> Result<(), PaymentError> {
        if self.status != InvoiceStatus::Draft {
            return Err(PaymentError::InvalidState(format!(
                "invoice cannot be issued from {:?}",
                self.status
            )));
        }
        self.status = InvoiceStatus::Issued;
        self.session_ref = Some(session_ref);
        self.issued_at = Some(Utc::now());
        Ok(())
    }

    /// Transition driven by the first application of a payment event.
    pub fn apply_outcome(&mut self, outcome: PaymentOutcome, now: DateTime<Utc>) -> Result<(), PaymentError> {
        if self.status != InvoiceStatus::Issued {
            return Err(PaymentError::InvalidState(format!(
                "payment outcome not applicable to invoice in {:?}",
                self.status
            )));
        }
        match outcome {
            PaymentOutcome::Succeeded => {
                self.status = InvoiceStatus::Paid;
                self.paid_at = Some(now);
            }
            PaymentOutcome::Failed | PaymentOutcome::Canceled => {
                self.status = InvoiceStatus::Failed;
            }
        }
        Ok(())
    }

    /// Voiding abandons an unpaid invoice and reopens checkout
    /// eligibility for its subject.
    pub fn void(&mut self) -> Result<(), PaymentError> {
        match self.status {
            InvoiceStatus::Draft | InvoiceStatus::Issued | InvoiceStatus::Failed => {
                self.status = InvoiceStatus::Void;
                Ok(())
            }
            other => Err(PaymentError::InvalidState(format!(
                "invoice cannot be voided from {other:?}"
            ))),
        }
    }

    pub fn mark_refunded(&mut self) -> Result<(), PaymentError> {
        if self.status != InvoiceStatus::Paid {
            return Err(PaymentError::InvalidState(format!(
                "only a paid invoice can be refunded, was {:?}",
                self.status
            )));
        }
        self.status = InvoiceStatus::Refunded;
        Ok(())
    }

    /// Void invoices no longer block a new checkout for the same subject.
    pub fn blocks_new_checkout(&self) -> bool {
        self.status != InvoiceStatus::Void
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Paid,
    Failed,
}

/// Vendor payout computed when an invoice is paid. Queued until the
/// vendor's payout account is enabled, then released.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub subject: InvoiceSubject,
    pub vendor_id: Uuid,
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub vendor_net_cents: i64,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub rev: u64,
}

/// Dedup record for an external payment event, persisted before the
/// outcome is applied so replays stay no-ops across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    pub external_event_id: String,
    pub session_ref: String,
    pub outcome: PaymentOutcome,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    #[error("payout not found: {0}")]
    PayoutNotFound(Uuid),

    #[error("no invoice for checkout session {0}")]
    UnknownSession(String),

    #[error("subject is not ready for checkout: {0}")]
    NotCheckoutReady(String),

    #[error("an open invoice already exists for this subject")]
    InvoiceAlreadyOpen,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("payment collaborator unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Store(#[from] venuo_core::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_lifecycle() {
        let mut invoice =
            Invoice::draft(InvoiceSubject::Booking { booking_id: Uuid::new_v4() }, 150_000);
        invoice.issue("cs_123".into()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Issued);

        invoice.apply_outcome(PaymentOutcome::Succeeded, Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());

        // A second outcome application is an invalid transition; the
        // service never reaches this because of the dedup ledger.
        assert!(invoice.apply_outcome(PaymentOutcome::Succeeded, Utc::now()).is_err());

        invoice.mark_refunded().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Refunded);
    }

    #[test]
    fn void_reopens_checkout() {
        let mut invoice =
            Invoice::draft(InvoiceSubject::Booking { booking_id: Uuid::new_v4() }, 150_000);
        invoice.issue("cs_123".into()).unwrap();
        assert!(invoice.blocks_new_checkout());

        invoice.void().unwrap();
        assert!(!invoice.blocks_new_checkout());
        assert!(invoice.void().is_err());
    }

    #[test]
    fn failed_payment_keeps_invoice_voidable() {
        let mut invoice =
            Invoice::draft(InvoiceSubject::Booking { booking_id: Uuid::new_v4() }, 150_000);
        invoice.issue("cs_123".into()).unwrap();
        invoice.apply_outcome(PaymentOutcome::Failed, Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Failed);
        invoice.void().unwrap();
    }
}
