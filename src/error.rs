use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Classification of a gateway failure, deciding whether the call site may
/// retry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Network, timeout or rate-limit failures. Safe to retry with backoff.
    Retryable,
    /// Declined, invalid request, not found. Retrying cannot succeed.
    Terminal,
}

/// A failure reported by (or on the way to) the external payment processor.
///
/// The gateway adapter is the single translation point between
/// provider-specific error shapes and this taxonomy.
#[derive(Error, Debug, Clone)]
#[error("gateway error ({kind:?}): {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn retryable<S: Into<String>>(message: S) -> Self {
        Self {
            kind: GatewayErrorKind::Retryable,
            message: message.into(),
        }
    }

    pub fn terminal<S: Into<String>>(message: S) -> Self {
        Self {
            kind: GatewayErrorKind::Terminal,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == GatewayErrorKind::Retryable
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Malformed input: missing ids, non-positive amount, unsupported
    /// currency. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Illegal state transition attempted, e.g. releasing a pending payment.
    #[error("conflict on payment {payment_id}: cannot {action} while {status}")]
    Conflict {
        payment_id: Uuid,
        status: String,
        action: String,
    },

    /// Referenced payment or ledger entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Webhook signature verification failure. Fatal for that request; never
    /// causes a payment mutation.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// The durable store rejected or lost a write.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict<S: Into<String>>(payment_id: Uuid, status: S, action: S) -> Self {
        Self::Conflict {
            payment_id,
            status: status.into(),
            action: action.into(),
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
}
