//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns the in-memory ledger and is the only writer of its entries
//! - Every `apply` runs check, commit and swap without interleaving
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Views (redemption form, wallet badge)          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │  check code unused → build next ledger → commit      │
//! │  → swap in-memory ledger only after commit succeeded │
//! │                       │                               │
//! │                       ▼                               │
//! │           KeyValueStore::commit()                     │
//! │          (atomic multi-key write)                     │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    metrics::Metrics,
    persist::{commit_ledger, load_ledger, read_ledger},
    storage::KeyValueStore,
    types::{Ledger, Transaction, ViewId},
    Error, Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Durable, consistent storage of the ledger aggregate
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Re-read the ledger from persistent storage
    ///
    /// A reload that had to degrade any entry keeps the in-memory ledger.
    async fn load(&self) -> Result<Ledger>;

    /// Record a credit for a canonical, unused code and persist it before returning
    async fn apply(&self, origin: ViewId, code: &str, amount: u64) -> Result<Ledger>;

    /// Current ledger without touching storage
    async fn snapshot(&self) -> Result<Ledger>;
}

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Reload from storage
    Load {
        response: oneshot::Sender<Result<Ledger>>,
    },

    /// Read the in-memory ledger
    Snapshot {
        response: oneshot::Sender<Result<Ledger>>,
    },

    /// Apply a credit
    Apply {
        origin: ViewId,
        code: String,
        amount: u64,
        response: oneshot::Sender<Result<Ledger>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    store: Arc<dyn KeyValueStore>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Last committed ledger
    ledger: Ledger,

    metrics: Option<Metrics>,
}

impl LedgerActor {
    /// Create new actor, loading the ledger from storage
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        metrics: Option<Metrics>,
    ) -> Self {
        let ledger = load_ledger(store.as_ref());

        tracing::info!(
            balance = ledger.balance,
            transactions = ledger.transactions.len(),
            "Ledger loaded"
        );

        Self {
            store,
            mailbox,
            ledger,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                msg => self.handle_message(msg),
            }
        }

        tracing::debug!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Load { response } => {
                let loaded = read_ledger(self.store.as_ref());
                if loaded.degraded {
                    tracing::warn!(
                        balance = self.ledger.balance,
                        "Reload degraded, keeping the in-memory ledger"
                    );
                } else {
                    self.ledger = loaded.ledger;
                }
                let _ = response.send(Ok(self.ledger.clone()));
            }

            LedgerMessage::Snapshot { response } => {
                let _ = response.send(Ok(self.ledger.clone()));
            }

            LedgerMessage::Apply {
                origin,
                code,
                amount,
                response,
            } => {
                let result = self.apply(origin, code, amount);
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Check, commit, then swap. Memory is untouched unless the commit succeeded.
    fn apply(&mut self, origin: ViewId, code: String, amount: u64) -> Result<Ledger> {
        if amount == 0 {
            return Err(Error::InvalidAmount(format!("credit for {} must be positive", code)));
        }
        if self.ledger.is_used(&code) {
            return Err(Error::CodeAlreadyUsed(code));
        }

        let started = Instant::now();
        let next = self.ledger.with_credit(Transaction::redeem(code.clone(), amount))?;

        if let Err(e) = commit_ledger(self.store.as_ref(), origin, &next) {
            tracing::error!(code = %code, error = %e, "Failed to persist credit");
            if let Some(metrics) = &self.metrics {
                metrics.record_persist_failure();
            }
            return Err(e);
        }

        self.ledger = next;

        if let Some(metrics) = &self.metrics {
            metrics.record_apply(started.elapsed().as_secs_f64(), self.ledger.balance);
        }

        tracing::info!(
            code = %code,
            amount,
            balance = self.ledger.balance,
            %origin,
            "Credit applied"
        );

        Ok(self.ledger.clone())
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
    task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl LedgerHandle {
    /// Create new handle for the actor running as `task`
    pub fn new(sender: mpsc::Sender<LedgerMessage>, task: JoinHandle<()>) -> Self {
        Self {
            sender,
            task: Arc::new(parking_lot::Mutex::new(Some(task))),
        }
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<Ledger>>) -> LedgerMessage,
    ) -> Result<Ledger> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor and wait until it has released the store
    pub async fn shutdown(&self) -> Result<()> {
        let sent = self.sender.send(LedgerMessage::Shutdown).await;

        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await
                .map_err(|e| Error::Concurrency(format!("Ledger actor task failed: {}", e)))?;
        }

        sent.map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))
    }
}

#[async_trait]
impl LedgerStore for LedgerHandle {
    async fn load(&self) -> Result<Ledger> {
        self.request(|response| LedgerMessage::Load { response }).await
    }

    async fn apply(&self, origin: ViewId, code: &str, amount: u64) -> Result<Ledger> {
        let code = code.to_string();
        self.request(|response| LedgerMessage::Apply {
            origin,
            code,
            amount,
            response,
        })
        .await
    }

    async fn snapshot(&self) -> Result<Ledger> {
        self.request(|response| LedgerMessage::Snapshot { response }).await
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    store: Arc<dyn KeyValueStore>,
    mailbox_capacity: usize,
    metrics: Option<Metrics>,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let actor = LedgerActor::new(store, rx, metrics);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx, task)
}
