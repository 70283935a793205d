use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Whole stars, the internal currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Stars(pub i64);

impl Stars {
    pub const ZERO: Stars = Stars(0);

    /// Signed delta that removes this amount from a balance.
    pub fn as_charge(self) -> i64 {
        -self.0
    }

    /// Signed delta that gives this amount back.
    pub fn as_refund(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Stars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}⭐", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceReason {
    TrainingCharge,
    TrainingRefund,
    TopUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaApplied {
    pub balance: Stars,
    /// The operation id had been applied before; nothing changed this time.
    pub duplicate: bool,
}

/// Durable per-user star balance.
///
/// Implementations must apply each call atomically and must not apply the
/// same `operation_id` twice.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    async fn balance(&self, telegram_id: i64) -> Result<Stars, LedgerError>;

    async fn apply_delta(
        &self,
        telegram_id: i64,
        delta: i64,
        reason: BalanceReason,
        operation_id: &str,
    ) -> Result<DeltaApplied, LedgerError>;
}
