use crate::config::EscrowConfig;
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary value half-up to the currency's minor unit, the same
/// rule applied to payment amounts. Fees and amounts rounding identically is
/// what keeps the ledger's net-zero invariant exact.
pub fn round_money(value: Decimal, currency: &str) -> Decimal {
    value.round_dp_with_strategy(
        EscrowConfig::minor_units(currency),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeBreakdown {
    pub platform: Decimal,
    pub processing: Decimal,
}

impl FeeBreakdown {
    pub fn total(&self) -> Decimal {
        self.platform + self.processing
    }
}

/// Pure mapping from (amount, currency) to the fees taken out of a payment.
/// Currency conversion and tax are out of scope; deployments with custom
/// schedules plug in their own implementation.
pub trait FeePolicy: Send + Sync {
    fn fee(&self, amount: Decimal, currency: &str) -> FeeBreakdown;
}

/// Percentage-of-gross policy with an optional processing percent and flat
/// component, each term rounded half-up to the currency minor unit.
#[derive(Debug, Clone)]
pub struct PercentFeePolicy {
    pub platform_percent: Decimal,
    pub processing_percent: Decimal,
    pub processing_flat: Decimal,
}

impl PercentFeePolicy {
    pub fn from_config(config: &EscrowConfig) -> Self {
        Self {
            platform_percent: config.platform_fee_percent,
            processing_percent: config.processing_fee_percent,
            processing_flat: config.processing_fee_flat,
        }
    }

    /// Platform-cut-only policy, mostly for tests and fee previews.
    pub fn platform_only(percent: Decimal) -> Self {
        Self {
            platform_percent: percent,
            processing_percent: Decimal::ZERO,
            processing_flat: Decimal::ZERO,
        }
    }
}

impl FeePolicy for PercentFeePolicy {
    fn fee(&self, amount: Decimal, currency: &str) -> FeeBreakdown {
        let hundred = Decimal::ONE_HUNDRED;
        let platform = round_money(amount * self.platform_percent / hundred, currency);
        let processing = round_money(
            amount * self.processing_percent / hundred + self.processing_flat,
            currency,
        );
        FeeBreakdown {
            platform,
            processing,
        }
    }
}
