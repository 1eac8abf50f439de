use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record of a vendor accepting the platform contract. Kept verbatim for
/// audit: who accepted, from where, and which contract version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractAcceptance {
    pub version: u32,
    pub accepted_at: DateTime<Utc>,
    pub actor_id: Uuid,
    pub ip: String,
}

/// Per-vendor compliance row. One row per vendor, mutated only by admin
/// actions, vendor self-service endpoints, and payout-provider webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCompliance {
    pub vendor_id: Uuid,
    pub admin_approved: bool,
    pub contract: Option<ContractAcceptance>,
    pub training_completed: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub pending_requirements: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub rev: u64,
}

impl VendorCompliance {
    pub fn new(vendor_id: Uuid) -> Self {
        Self {
            vendor_id,
            admin_approved: false,
            contract: None,
            training_completed: false,
            charges_enabled: false,
            payouts_enabled: false,
            pending_requirements: Vec::new(),
            updated_at: Utc::now(),
            rev: 0,
        }
    }

    /// The single derived predicate every publish/respond path consults.
    pub fn can_publish(&self) -> bool {
        self.admin_approved
            && self.contract.is_some()
            && self.training_completed
            && self.payouts_enabled
    }

    /// Names of the gate conditions still unmet, for the error payload.
    pub fn missing_prerequisites(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.admin_approved {
            missing.push("admin_approval");
        }
        if self.contract.is_none() {
            missing.push("contract_acceptance");
        }
        if !self.training_completed {
            missing.push("training_completion");
        }
        if !self.payouts_enabled {
            missing.push("payouts_enabled");
        }
        missing
    }

    /// Fail-fast check used by `submit_offer`, `counter_offer` and
    /// listing publication.
    pub fn ensure_can_publish(&self) -> Result<(), ComplianceError> {
        if self.can_publish() {
            Ok(())
        } else {
            Err(ComplianceError::PublishingBlocked {
                vendor_id: self.vendor_id,
                missing: self.missing_prerequisites().iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    pub fn record_admin_approval(&mut self) {
        self.admin_approved = true;
        self.updated_at = Utc::now();
    }

    /// Accepting an older contract version than the one already on file is
    /// rejected; accepting a newer one overwrites.
    pub fn record_contract_acceptance(
        &mut self,
        version: u32,
        actor_id: Uuid,
        ip: String,
    ) -> Result<(), ComplianceError> {
        if let Some(current) = &self.contract {
            if version < current.version {
                return Err(ComplianceError::StaleContractVersion {
                    offered: version,
                    current: current.version,
                });
            }
        }
        self.contract = Some(ContractAcceptance {
            version,
            accepted_at: Utc::now(),
            actor_id,
            ip,
        });
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_training_completion(&mut self) {
        self.training_completed = true;
        self.updated_at = Utc::now();
    }

    /// Applies a payout-account status report from the provider webhook.
    pub fn apply_payout_account_status(
        &mut self,
        charges_enabled: bool,
        payouts_enabled: bool,
        pending_requirements: Vec<String>,
    ) {
        self.charges_enabled = charges_enabled;
        self.payouts_enabled = payouts_enabled;
        self.pending_requirements = pending_requirements;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error("vendor {vendor_id} is blocked from publishing, missing: {missing:?}")]
    PublishingBlocked { vendor_id: Uuid, missing: Vec<String> },

    #[error("contract version {offered} is older than accepted version {current}")]
    StaleContractVersion { offered: u32, current: u32 },

    #[error("vendor not found: {0}")]
    VendorNotFound(Uuid),

    #[error("listing not found: {0}")]
    ListingNotFound(Uuid),

    #[error("actor not permitted: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] venuo_core::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vendor() -> VendorCompliance {
        VendorCompliance::new(Uuid::new_v4())
    }

    #[test]
    fn publish_gate_requires_all_four_flags() {
        let mut c = vendor();
        assert!(!c.can_publish());

        c.record_admin_approval();
        assert!(!c.can_publish());

        c.record_contract_acceptance(1, c.vendor_id, "198.51.100.7".into()).unwrap();
        assert!(!c.can_publish());

        c.record_training_completion();
        assert!(!c.can_publish());

        c.apply_payout_account_status(true, true, vec![]);
        assert!(c.can_publish());
        assert!(c.ensure_can_publish().is_ok());
    }

    #[test]
    fn missing_prerequisites_named_in_error() {
        let c = vendor();
        let err = c.ensure_can_publish().unwrap_err();
        match err {
            ComplianceError::PublishingBlocked { missing, .. } => {
                assert_eq!(
                    missing,
                    vec![
                        "admin_approval",
                        "contract_acceptance",
                        "training_completion",
                        "payouts_enabled"
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn payout_revocation_closes_the_gate() {
        let mut c = vendor();
        c.record_admin_approval();
        c.record_contract_acceptance(1, c.vendor_id, "198.51.100.7".into()).unwrap();
        c.record_training_completion();
        c.apply_payout_account_status(true, true, vec![]);
        assert!(c.can_publish());

        c.apply_payout_account_status(true, false, vec!["bank_account".into()]);
        assert!(!c.can_publish());
        assert_eq!(c.pending_requirements, vec!["bank_account"]);
    }

    #[test]
    fn older_contract_version_rejected() {
        let mut c = vendor();
        c.record_contract_acceptance(3, c.vendor_id, "198.51.100.7".into()).unwrap();
        let err = c.record_contract_acceptance(2, c.vendor_id, "198.51.100.7".into()).unwrap_err();
        assert!(matches!(err, ComplianceError::StaleContractVersion { offered: 2, current: 3 }));

        // Re-accepting a newer version overwrites.
        c.record_contract_acceptance(4, c.vendor_id, "198.51.100.7".into()).unwrap();
        assert_eq!(c.contract.as_ref().unwrap().version, 4);
    }
}
