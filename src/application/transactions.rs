use crate::domain::fees::round_money;
use crate::domain::ledger_entry::{EntryKind, LedgerEntry, ESCROW_ACCOUNT, FEE_ACCOUNT};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Counterparty account for funds paid out to a payee's external account.
pub const PAYOUT_ACCOUNT: &str = "external:payout";

/// Builds the matched entry sets written alongside payment transitions, and
/// serves ledger lookups.
///
/// The builders are pure: they produce entries but never persist them.
/// Persistence always happens inside `PaymentStore::commit` so payment status
/// and ledger rows cannot diverge.
pub struct TransactionLedger {
    ledger: LedgerStoreRef,
}

impl TransactionLedger {
    pub fn new(ledger: LedgerStoreRef) -> Self {
        Self { ledger }
    }

    /// All entries for a payment in creation order.
    pub async fn entries_for(&self, payment_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.ledger.entries_for(payment_id).await
    }

    /// Direct capture set: payer debit of the gross amount, payee credit of
    /// amount minus fee, and a fee credit when fee > 0.
    pub fn capture_entries(payment: &Payment, now: DateTime<Utc>) -> Vec<LedgerEntry> {
        let mut entries = vec![
            LedgerEntry::new(
                payment.id,
                &payment.payer_id,
                EntryKind::Payment,
                -payment.amount,
                &payment.currency,
                now,
            ),
            LedgerEntry::new(
                payment.id,
                &payment.payee_id,
                EntryKind::Payment,
                payment.payee_net(),
                &payment.currency,
                now,
            ),
        ];
        if payment.fee > Decimal::ZERO {
            entries.push(LedgerEntry::new(
                payment.id,
                FEE_ACCOUNT,
                EntryKind::Fee,
                payment.fee,
                &payment.currency,
                now,
            ));
        }
        entries
    }

    /// Escrow hold set: payer debit, holding-account credit.
    pub fn escrow_hold_entries(payment: &Payment, now: DateTime<Utc>) -> Vec<LedgerEntry> {
        vec![
            LedgerEntry::new(
                payment.id,
                &payment.payer_id,
                EntryKind::EscrowHold,
                -payment.amount,
                &payment.currency,
                now,
            ),
            LedgerEntry::new(
                payment.id,
                ESCROW_ACCOUNT,
                EntryKind::EscrowHold,
                payment.amount,
                &payment.currency,
                now,
            ),
        ]
    }

    /// Release set: holding-account debit, payee credit of amount minus fee,
    /// fee credit.
    pub fn escrow_release_entries(payment: &Payment, now: DateTime<Utc>) -> Vec<LedgerEntry> {
        let mut entries = vec![
            LedgerEntry::new(
                payment.id,
                ESCROW_ACCOUNT,
                EntryKind::EscrowRelease,
                -payment.amount,
                &payment.currency,
                now,
            ),
            LedgerEntry::new(
                payment.id,
                &payment.payee_id,
                EntryKind::EscrowRelease,
                payment.payee_net(),
                &payment.currency,
                now,
            ),
        ];
        if payment.fee > Decimal::ZERO {
            entries.push(LedgerEntry::new(
                payment.id,
                FEE_ACCOUNT,
                EntryKind::Fee,
                payment.fee,
                &payment.currency,
                now,
            ));
        }
        entries
    }

    /// Reversing set for a refund. The payer is credited the refunded amount;
    /// what gets debited depends on where the money sat when the refund
    /// happened:
    ///
    /// - refunded from `HeldInEscrow`: the holding account gives the funds
    ///   back, since the payee was never credited;
    /// - refunded from `Completed`: the prior payee and fee credits are
    ///   reversed proportionally to the refunded fraction.
    ///
    /// The fee reversal is derived as `refund - payee_reversal` rather than
    /// rounded independently, which keeps the signed sum exactly zero.
    pub fn refund_entries(
        payment: &Payment,
        refund_amount: Decimal,
        prior_status: PaymentStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Vec<LedgerEntry> {
        let payer_credit = LedgerEntry::new(
            payment.id,
            &payment.payer_id,
            EntryKind::Refund,
            refund_amount,
            &payment.currency,
            now,
        )
        .with_metadata("reason", reason);

        match prior_status {
            PaymentStatus::HeldInEscrow => vec![
                payer_credit,
                LedgerEntry::new(
                    payment.id,
                    ESCROW_ACCOUNT,
                    EntryKind::Refund,
                    -refund_amount,
                    &payment.currency,
                    now,
                ),
            ],
            _ => {
                let ratio = refund_amount / payment.amount;
                let payee_reversal = round_money(payment.payee_net() * ratio, &payment.currency);
                let fee_reversal = refund_amount - payee_reversal;
                let mut entries = vec![
                    payer_credit,
                    LedgerEntry::new(
                        payment.id,
                        &payment.payee_id,
                        EntryKind::Refund,
                        -payee_reversal,
                        &payment.currency,
                        now,
                    ),
                ];
                if fee_reversal != Decimal::ZERO {
                    entries.push(LedgerEntry::new(
                        payment.id,
                        FEE_ACCOUNT,
                        EntryKind::Refund,
                        -fee_reversal,
                        &payment.currency,
                        now,
                    ));
                }
                entries
            }
        }
    }

    /// Payout pair: payee debit, external payout account credit, so the
    /// ledger stays balanced after funds leave the platform.
    pub fn payout_entries(
        payment: &Payment,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Vec<LedgerEntry> {
        vec![
            LedgerEntry::new(
                payment.id,
                &payment.payee_id,
                EntryKind::Payout,
                -payment.payee_net(),
                &payment.currency,
                now,
            )
            .with_metadata("destination", destination),
            LedgerEntry::new(
                payment.id,
                PAYOUT_ACCOUNT,
                EntryKind::Payout,
                payment.payee_net(),
                &payment.currency,
                now,
            ),
        ]
    }
}
