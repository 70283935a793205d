use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neuro_core::balance::{BalanceLedger, BalanceReason, DeltaApplied, Stars};
use neuro_core::error::LedgerError;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};

const BALANCES_TREE: &str = "balances";
const BALANCE_OPERATIONS_TREE: &str = "balance_operations";

/// Journal entry written next to every applied delta, keyed by operation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceOperation {
    pub telegram_id: i64,
    pub delta: i64,
    pub reason: BalanceReason,
    pub balance_after: i64,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SledBalanceLedger {
    pub balances: Tree,
    pub operations: Tree,
}

impl SledBalanceLedger {
    pub fn new(db: &Db) -> sled::Result<Self> {
        let balances = db.open_tree(BALANCES_TREE)?;
        let operations = db.open_tree(BALANCE_OPERATIONS_TREE)?;
        Ok(Self {
            balances,
            operations,
        })
    }

    #[cfg(test)]
    fn operation(&self, operation_id: &str) -> Option<BalanceOperation> {
        self.operations
            .get(operation_id.as_bytes())
            .ok()
            .flatten()
            .and_then(|ivec| serde_json::from_slice(&ivec).ok())
    }

    fn read_balance(&self, telegram_id: i64) -> Result<i64, LedgerError> {
        let raw = self
            .balances
            .get(telegram_id.to_be_bytes())
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        match raw {
            Some(ivec) => decode_amount(telegram_id, &ivec),
            None => Ok(0),
        }
    }
}

fn decode_amount(telegram_id: i64, raw: &[u8]) -> Result<i64, LedgerError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| {
        LedgerError::Decode(format!(
            "balance of {} has {} bytes, expected 8",
            telegram_id,
            raw.len()
        ))
    })?;
    Ok(i64::from_be_bytes(bytes))
}

#[async_trait]
impl BalanceLedger for SledBalanceLedger {
    async fn balance(&self, telegram_id: i64) -> Result<Stars, LedgerError> {
        self.read_balance(telegram_id).map(Stars)
    }

    async fn apply_delta(
        &self,
        telegram_id: i64,
        delta: i64,
        reason: BalanceReason,
        operation_id: &str,
    ) -> Result<DeltaApplied, LedgerError> {
        let key = telegram_id.to_be_bytes();

        let result = (&self.balances, &self.operations).transaction(|(balances, operations)| {
            let current = match balances.get(key.as_slice())? {
                Some(ivec) => {
                    decode_amount(telegram_id, &ivec).map_err(ConflictableTransactionError::Abort)?
                }
                None => 0,
            };

            if operations.get(operation_id.as_bytes())?.is_some() {
                return Ok(DeltaApplied {
                    balance: Stars(current),
                    duplicate: true,
                });
            }

            let next = current + delta;
            let entry = BalanceOperation {
                telegram_id,
                delta,
                reason,
                balance_after: next,
                applied_at: Utc::now(),
            };
            let encoded = serde_json::to_vec(&entry).map_err(|e| {
                ConflictableTransactionError::Abort(LedgerError::Storage(e.to_string()))
            })?;

            balances.insert(key.as_slice(), next.to_be_bytes().to_vec())?;
            operations.insert(operation_id.as_bytes(), encoded)?;

            Ok(DeltaApplied {
                balance: Stars(next),
                duplicate: false,
            })
        });

        match result {
            Ok(applied) => {
                if applied.duplicate {
                    log::info!(
                        "Balance operation {} for {} already applied",
                        operation_id,
                        telegram_id
                    );
                } else {
                    log::info!(
                        "Applied {:?} {} to {} (balance {}, op {})",
                        reason,
                        delta,
                        telegram_id,
                        applied.balance,
                        operation_id
                    );
                }
                Ok(applied)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(LedgerError::Storage(e.to_string())),
        }
    }
}
