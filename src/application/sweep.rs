use crate::application::ledger::PaymentLedger;
use crate::config::EscrowConfig;
use crate::domain::payment::Actor;
use crate::domain::ports::{ClockRef, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Periodic sweep that releases escrow holds whose hold period has elapsed.
///
/// Stateless and crash-safe: nothing is persisted between runs, a payment
/// whose release fails simply shows up again on the next scan. Safe to run
/// concurrently with direct calls and with the webhook reconciler because all
/// mutation funnels through `PaymentLedger::release` and its conditional
/// commit.
pub struct EscrowSweeper {
    ledger: Arc<PaymentLedger>,
    payments: PaymentStoreRef,
    clock: ClockRef,
    config: EscrowConfig,
}

impl EscrowSweeper {
    pub fn new(
        ledger: Arc<PaymentLedger>,
        payments: PaymentStoreRef,
        clock: ClockRef,
        config: EscrowConfig,
    ) -> Self {
        Self {
            ledger,
            payments,
            clock,
            config,
        }
    }

    /// One sweep pass. Returns the number of payments released.
    pub async fn sweep_once(&self) -> Result<usize> {
        self.sweep(None).await
    }

    /// Interval loop with cooperative shutdown. The shutdown signal is
    /// honored between payments, never mid-transition.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(Some(&shutdown)).await {
                        warn!(error = %err, "escrow sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("escrow sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn sweep(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<usize> {
        if !self.config.auto_release_enabled {
            debug!("auto-release disabled, skipping sweep");
            return Ok(0);
        }

        let now = self.clock.now();
        let due = self
            .payments
            .due_for_release(now, self.config.sweep_batch_size)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "escrow sweep found due payments");

        let actor = Actor::system();
        let mut released = 0;
        for payment in due {
            if let Some(rx) = shutdown {
                if *rx.borrow() {
                    info!(released, "sweep interrupted by shutdown");
                    break;
                }
            }
            // The scan snapshot may be stale; release re-reads and validates
            // the payment itself.
            match self.ledger.release(&actor, payment.id).await {
                Ok(_) => released += 1,
                Err(PaymentError::Conflict { .. }) => {
                    debug!(payment_id = %payment.id, "already transitioned, skipping");
                }
                Err(err) => {
                    // Left held; the next sweep retries it.
                    warn!(payment_id = %payment.id, error = %err, "release failed during sweep");
                }
            }
        }
        if released > 0 {
            info!(released, "escrow sweep finished");
        }
        Ok(released)
    }
}
