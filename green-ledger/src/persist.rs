//! Persisted form of the ledger
//!
//! # Entries
//!
//! - `ledger.balance` - balance as decimal text
//! - `ledger.transactions` - JSON array of transactions, newest first
//! - `ledger.usedCodes` - JSON array of canonical codes
//!
//! All three are written by a single `commit` and read back together as one
//! snapshot. A malformed entry degrades to that field's empty default so a
//! corrupt history never blocks future redemptions.

use crate::{
    error::Result,
    storage::KeyValueStore,
    types::{Ledger, Transaction, ViewId},
};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

/// Balance entry
pub const BALANCE_KEY: &str = "ledger.balance";

/// Transaction log entry
pub const TRANSACTIONS_KEY: &str = "ledger.transactions";

/// Used-code set entry
pub const USED_CODES_KEY: &str = "ledger.usedCodes";

/// Entries written by the first version of the portal widget
const LEGACY_BALANCE_KEY: &str = "virtualCashBalance";
const LEGACY_TRANSACTIONS_KEY: &str = "virtualCashTransactions";
const LEGACY_USED_CODES_KEY: &str = "usedTokens";

/// Ledger read back from the substrate
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedLedger {
    /// Reconstructed ledger
    pub ledger: Ledger,

    /// At least one entry was unreadable or malformed and fell back to its default
    pub degraded: bool,
}

/// Reconstruct the ledger from the substrate
///
/// Returns the empty ledger when nothing has been persisted yet. Never fails:
/// an unreadable or malformed entry is logged and replaced by its empty default.
pub fn load_ledger(store: &dyn KeyValueStore) -> Ledger {
    read_ledger(store).ledger
}

/// Like `load_ledger`, also reporting whether any entry degraded
pub fn read_ledger(store: &dyn KeyValueStore) -> LoadedLedger {
    let current = [BALANCE_KEY, TRANSACTIONS_KEY, USED_CODES_KEY].map(|key| (key, store.get(key)));

    let never_written = current.iter().all(|(_, read)| matches!(read, Ok(None)));
    let entries = if never_written {
        let legacy = [LEGACY_BALANCE_KEY, LEGACY_TRANSACTIONS_KEY, LEGACY_USED_CODES_KEY]
            .map(|key| (key, store.get(key)));
        if legacy.iter().any(|(_, read)| matches!(read, Ok(Some(_)))) {
            tracing::info!("Reading ledger from legacy portal entries");
        }
        legacy
    } else {
        current
    };

    let mut degraded = false;
    let [balance, transactions, used_codes] =
        entries.map(|(key, read)| (key, read_entry(key, read, &mut degraded)));

    let mut ledger = Ledger {
        balance: parse_balance(balance.0, balance.1, &mut degraded),
        transactions: parse_json::<Vec<Transaction>>(transactions.0, transactions.1, &mut degraded),
        used_codes: parse_json::<BTreeSet<String>>(used_codes.0, used_codes.1, &mut degraded),
    };

    // A code that produced a credit stays spent even if the used-code entry was lost
    for transaction in &ledger.transactions {
        ledger.used_codes.insert(transaction.code.clone());
    }

    if ledger.balance != ledger.transaction_total() {
        tracing::warn!(
            balance = ledger.balance,
            transaction_total = ledger.transaction_total(),
            "Loaded balance does not match transaction history"
        );
    }

    LoadedLedger { ledger, degraded }
}

/// Write the whole ledger as one atomic commit
pub fn commit_ledger(store: &dyn KeyValueStore, origin: ViewId, ledger: &Ledger) -> Result<()> {
    let writes = vec![
        (TRANSACTIONS_KEY.to_string(), serde_json::to_string(&ledger.transactions)?),
        (USED_CODES_KEY.to_string(), serde_json::to_string(&ledger.used_codes)?),
        (BALANCE_KEY.to_string(), ledger.balance.to_string()),
    ];
    store.commit(origin, writes)
}

/// Parse a balance entry, treating absent or missing text as zero
pub fn parse_balance_text(raw: Option<&str>) -> Option<u64> {
    match raw {
        None => Some(0),
        Some(text) => text.trim().parse().ok(),
    }
}

fn read_entry(key: &str, read: Result<Option<String>>, degraded: &mut bool) -> Option<String> {
    read.unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "Unreadable ledger entry, falling back to empty");
        *degraded = true;
        None
    })
}

fn parse_balance(key: &str, raw: Option<String>, degraded: &mut bool) -> u64 {
    parse_balance_text(raw.as_deref()).unwrap_or_else(|| {
        tracing::warn!(key, "Malformed balance entry, falling back to 0");
        *degraded = true;
        0
    })
}

fn parse_json<T: DeserializeOwned + Default>(
    key: &str,
    raw: Option<String>,
    degraded: &mut bool,
) -> T {
    match raw {
        None => T::default(),
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Malformed ledger entry, falling back to empty");
            *degraded = true;
            T::default()
        }),
    }
}
