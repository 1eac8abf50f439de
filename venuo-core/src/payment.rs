use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome reported by the payment processor for a checkout session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Canceled,
}

/// Reference to an externally hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_ref: String,
    pub checkout_url: String,
}

/// Payment-processor collaborator. Session creation happens outside any
/// held aggregate lock; only the returned reference is persisted.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        invoice_id: Uuid,
        amount_cents: i64,
        success_ref: &str,
        cancel_ref: &str,
    ) -> Result<CheckoutSession, CollaboratorError>;
}

/// Per-vendor payout-account status as reported by the payout provider.
/// The engine only reads this; it never drives the provider's onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutAccountStatus {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub pending_requirements: Vec<String>,
}

#[async_trait]
pub trait PayoutAccountProvider: Send + Sync {
    async fn account_status(&self, vendor_id: Uuid) -> Result<PayoutAccountStatus, CollaboratorError>;
}

/// Failure talking to an external collaborator. Always retryable; never
/// allowed to leave local state half-written.
#[derive(Debug, thiserror::Error)]
#[error("collaborator unavailable: {0}")]
pub struct CollaboratorError(pub String);

/// In-process provider used by tests and local development.
pub struct MockCheckoutProvider;

#[async_trait]
impl CheckoutProvider for MockCheckoutProvider {
    async fn create_checkout_session(
        &self,
        invoice_id: Uuid,
        amount_cents: i64,
        _success_ref: &str,
        _cancel_ref: &str,
    ) -> Result<CheckoutSession, CollaboratorError> {
        let session_ref = format!("cs_{}", invoice_id.simple());
        tracing::info!(%invoice_id, amount_cents, %session_ref, "created mock checkout session");
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.example.com/{}", session_ref),
            session_ref,
        })
    }
}

pub struct MockPayoutAccountProvider;

#[async_trait]
impl PayoutAccountProvider for MockPayoutAccountProvider {
    async fn account_status(&self, vendor_id: Uuid) -> Result<PayoutAccountStatus, CollaboratorError> {
        tracing::info!(%vendor_id, "mock payout account lookup");
        Ok(PayoutAccountStatus {
            charges_enabled: true,
            payouts_enabled: true,
            pending_requirements: Vec::new(),
        })
    }
}
