//! Status enums and their state machines.

use serde::{Deserialize, Serialize};

/// The payment gateway a transaction was opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Flutterwave,
    Paystack,
}

impl Gateway {
    /// Stable string form, used for storage and logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flutterwave => "flutterwave",
            Self::Paystack => "paystack",
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gateway {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flutterwave" => Ok(Self::Flutterwave),
            "paystack" => Ok(Self::Paystack),
            _ => Err(format!("invalid gateway: {s}")),
        }
    }
}

/// Lifecycle of a gateway transaction.
///
/// `Pending` is the only live state. `Completed`, `Canceled`, and `Failed`
/// are terminal: no transition out of them is permitted, and attempts are
/// ignored rather than rejected — that is what makes duplicate confirmations
/// safe to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting confirmation from the gateway.
    #[default]
    Pending,
    /// Confirmed and settled; an order exists.
    Completed,
    /// Superseded by a newer transaction or a cart mutation.
    Canceled,
    /// Rejected by the gateway at initiation.
    Failed,
}

impl TransactionStatus {
    /// Whether this status permits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Stable string form, used for storage and logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid transaction status: {s}")),
        }
    }
}

/// Payment status recorded on a materialized order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Stable string form, used for storage and logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid payment status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_live_status() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Canceled.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Canceled,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
    }
}
