use serde::{Deserialize, Serialize};

/// Platform fee policy: basis points of the gross amount with a minimum
/// floor, both sourced from config. Vendor net is gross minus fee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeePolicy {
    pub fee_bps: i64,
    pub min_fee_cents: i64,
}

impl FeePolicy {
    pub fn platform_fee(&self, gross_cents: i64) -> i64 {
        let proportional = gross_cents * self.fee_bps / 10_000;
        proportional.max(self.min_fee_cents).min(gross_cents)
    }

    pub fn vendor_net(&self, gross_cents: i64) -> i64 {
        gross_cents - self.platform_fee(gross_cents)
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        // 12% with a €5 floor.
        Self { fee_bps: 1_200, min_fee_cents: 500 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_fee() {
        let policy = FeePolicy { fee_bps: 1_200, min_fee_cents: 500 };
        assert_eq!(policy.platform_fee(100_000), 12_000);
        assert_eq!(policy.vendor_net(100_000), 88_000);
    }

    #[test]
    fn minimum_floor_applies_to_small_amounts() {
        let policy = FeePolicy { fee_bps: 1_200, min_fee_cents: 500 };
        assert_eq!(policy.platform_fee(1_000), 500);
        assert_eq!(policy.vendor_net(1_000), 500);
    }

    #[test]
    fn fee_never_exceeds_gross() {
        let policy = FeePolicy { fee_bps: 1_200, min_fee_cents: 500 };
        assert_eq!(policy.platform_fee(300), 300);
        assert_eq!(policy.vendor_net(300), 0);
    }
}
