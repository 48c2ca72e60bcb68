use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Runtime knobs for the payment core.
///
/// Configuration loading (files, env) is owned by the host service; this
/// struct is the already-resolved view the core consumes.
#[derive(Debug, Clone)]
pub struct EscrowConfig {
    /// Marketplace cut, percent of the gross amount.
    pub platform_fee_percent: Decimal,
    /// Processor cut, percent of the gross amount.
    pub processing_fee_percent: Decimal,
    /// Processor flat fee per payment, in the payment currency.
    pub processing_fee_flat: Decimal,
    /// When false, successful authorizations capture immediately and the
    /// payment completes without an escrow hold.
    pub escrow_enabled: bool,
    /// Days funds stay in escrow before they become due for release.
    pub hold_period_days: i64,
    /// Days after release-due during which a payer may still open a dispute.
    pub dispute_window_days: i64,
    /// When false, the sweep leaves due payments alone; release is manual.
    pub auto_release_enabled: bool,
    pub default_currency: String,
    /// ISO currency codes accepted by `create`.
    pub supported_currencies: Vec<String>,
    /// Upper bound on payments released per sweep run.
    pub sweep_batch_size: usize,
    /// Interval between sweep runs in the `run` loop.
    pub sweep_interval: Duration,
    /// How long processed webhook event ids are remembered. Matches the
    /// provider's redelivery window.
    pub webhook_dedup_ttl: Duration,
    /// Attempts per gateway call for retryable failures (including the first).
    pub gateway_max_attempts: u32,
    /// Base delay for exponential backoff between gateway attempts.
    pub gateway_backoff_base: Duration,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            platform_fee_percent: dec!(15),
            processing_fee_percent: dec!(2.9),
            processing_fee_flat: dec!(0.30),
            escrow_enabled: true,
            hold_period_days: 14,
            dispute_window_days: 7,
            auto_release_enabled: true,
            default_currency: "USD".to_string(),
            supported_currencies: ["USD", "EUR", "GBP", "CAD", "AUD", "JPY"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            sweep_batch_size: 50,
            sweep_interval: Duration::from_secs(120),
            webhook_dedup_ttl: Duration::from_secs(72 * 3600),
            gateway_max_attempts: 3,
            gateway_backoff_base: Duration::from_millis(200),
        }
    }
}

impl EscrowConfig {
    pub fn hold_period(&self) -> ChronoDuration {
        ChronoDuration::days(self.hold_period_days)
    }

    pub fn supports_currency(&self, code: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == code)
    }

    /// Minor units for a supported currency, used for fee and amount rounding.
    pub fn minor_units(currency: &str) -> u32 {
        match currency {
            "JPY" => 0,
            _ => 2,
        }
    }
}
