//! Green Token wallet ledger
//!
//! Points ledger behind the portal's "Virtual Cash" wallet: one-time codes are
//! redeemed for credits, the balance and history are persisted on the device,
//! and every open view of the application sees the same balance.
//!
//! # Architecture
//!
//! - **Code Registry**: read-only code → value table, case-insensitive
//! - **Single Writer**: one actor owns the ledger; all credits go through it
//! - **Atomic Commit**: balance, used codes and history land in one write
//! - **Two Notification Channels**: in-process bus for the writing view,
//!   substrate change feed for every other view
//!
//! # Invariants
//!
//! - Balance == Σ(transaction amounts)
//! - A code produces at most one transaction, ever
//! - Transactions are never modified or removed
//! - Memory never shows a credit that was not durably committed

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod actor;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod persist;
pub mod redemption;
pub mod registry;
pub mod storage;
pub mod types;
pub mod wallet;

// Re-exports
pub use actor::{LedgerHandle, LedgerStore};
pub use config::{Backend, Config};
pub use error::{Error, RedemptionError, Result};
pub use notifier::{BalanceBadge, ChangeNotifier, Subscription};
pub use redemption::{Notice, NoticeSink, Redemption, RedemptionService, Severity};
pub use registry::{canonicalize, CodeRegistry};
pub use storage::{KeyValueStore, MemoryStore, RocksStore, StorageEvent};
pub use types::{BalanceChange, Ledger, Transaction, TransactionId, TransactionKind, ViewId};
pub use wallet::{Device, View};
