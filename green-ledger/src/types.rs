//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - JSON serialization compatible with the portal's stored history
//! - Integer arithmetic (whole Green Tokens, no fractions)
//! - Immutability of recorded transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Mint a fresh, time-ordered identifier (UUIDv7)
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wrap an existing identifier (e.g. read back from storage)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a transaction credited the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credit from redeeming a one-time code
    Redeem,
    /// Reserved for activity-based credits; never produced by redemption
    Earn,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Redeem => write!(f, "redeem"),
            TransactionKind::Earn => write!(f, "earn"),
        }
    }
}

/// A single credit to the ledger. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,

    /// Canonical code that produced this credit
    pub code: String,

    /// Credited amount (always > 0)
    pub amount: u64,

    /// When the credit was applied
    pub timestamp: DateTime<Utc>,

    /// Kind of credit (`type` in the legacy portal format)
    #[serde(alias = "type")]
    pub kind: TransactionKind,
}

impl Transaction {
    /// Create a redemption transaction stamped with the current time
    pub fn redeem(code: impl Into<String>, amount: u64) -> Self {
        Self {
            id: TransactionId::generate(),
            code: code.into(),
            amount,
            timestamp: Utc::now(),
            kind: TransactionKind::Redeem,
        }
    }
}

/// The ledger aggregate: balance, spent codes and credit history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Sum of all applied credits
    pub balance: u64,

    /// Canonical codes that were already redeemed
    pub used_codes: BTreeSet<String>,

    /// Credit history, newest first
    pub transactions: Vec<Transaction>,
}

impl Ledger {
    /// Empty ledger for a device that never redeemed anything
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a canonical code has been spent
    pub fn is_used(&self, code: &str) -> bool {
        self.used_codes.contains(code)
    }

    /// Sum of all transaction amounts
    pub fn transaction_total(&self) -> u64 {
        self.transactions.iter().map(|t| t.amount).sum()
    }

    /// Most recent `limit` transactions, newest first
    pub fn history(&self, limit: usize) -> &[Transaction] {
        let end = limit.min(self.transactions.len());
        &self.transactions[..end]
    }

    /// Build the ledger that results from recording `transaction`
    pub(crate) fn with_credit(&self, transaction: Transaction) -> crate::Result<Self> {
        let balance = self.balance.checked_add(transaction.amount).ok_or_else(|| {
            crate::Error::InvalidAmount(format!(
                "crediting {} would overflow balance {}",
                transaction.amount, self.balance
            ))
        })?;

        let mut next = self.clone();
        next.balance = balance;
        next.used_codes.insert(transaction.code.clone());
        next.transactions.insert(0, transaction);
        Ok(next)
    }
}

/// Identity of one open view of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId(Uuid);

impl ViewId {
    /// Fresh random view identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identity used for writes that do not originate from a view
    pub fn system() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ViewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A balance transition delivered to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Balance before the change
    pub old_balance: u64,
    /// Balance after the change
    pub new_balance: u64,
}

impl BalanceChange {
    /// Create a new change
    pub fn new(old_balance: u64, new_balance: u64) -> Self {
        Self {
            old_balance,
            new_balance,
        }
    }

    /// Only a strict increase counts as a reward
    pub fn is_reward(&self) -> bool {
        self.new_balance > self.old_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_credit_updates_all_fields() {
        let ledger = Ledger::empty();
        let next = ledger.with_credit(Transaction::redeem("CLEAN10", 10)).unwrap();

        assert_eq!(next.balance, 10);
        assert!(next.is_used("CLEAN10"));
        assert_eq!(next.transactions.len(), 1);
        assert_eq!(next.transaction_total(), next.balance);
        // Source ledger untouched
        assert_eq!(ledger, Ledger::empty());
    }

    #[test]
    fn test_transactions_newest_first() {
        let ledger = Ledger::empty()
            .with_credit(Transaction::redeem("CLEAN10", 10))
            .unwrap()
            .with_credit(Transaction::redeem("GREEN25", 25))
            .unwrap();

        assert_eq!(ledger.transactions[0].code, "GREEN25");
        assert_eq!(ledger.history(1).len(), 1);
        assert_eq!(ledger.history(10).len(), 2);
    }

    #[test]
    fn test_transaction_ids_unique() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_legacy_type_field() {
        let json = r#"{"id":"1718000000000","code":"CLEAN10","amount":10,
            "timestamp":"2024-06-10T06:13:20.000Z","type":"redeem"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.kind, TransactionKind::Redeem);
        assert_eq!(tx.id.as_str(), "1718000000000");
    }

    #[test]
    fn test_reward_threshold() {
        assert!(BalanceChange::new(0, 20).is_reward());
        assert!(!BalanceChange::new(20, 20).is_reward());
        assert!(!BalanceChange::new(20, 10).is_reward());
    }
}
