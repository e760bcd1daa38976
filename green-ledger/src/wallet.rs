//! Device and view orchestration
//!
//! A `Device` owns the persistent substrate and the single ledger actor. Every
//! open view of the application is a `View` on that device: it redeems through
//! the shared actor and learns about other views' redemptions from the
//! substrate's change feed.
//!
//! # Example
//!
//! ```no_run
//! use green_ledger::{Config, Device, Notice};
//! use parking_lot::Mutex;
//!
//! #[tokio::main]
//! async fn main() -> green_ledger::Result<()> {
//!     let device = Device::open(Config::default()).await?;
//!     let view = device.open_view();
//!     let badge = view.badge().await?;
//!
//!     let notices = Mutex::new(Vec::<Notice>::new());
//!     let _ = view.redeem("clean10", &notices).await;
//!     println!("{}", badge.label());
//!
//!     device.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle, LedgerStore},
    config::Backend,
    error::RedemptionError,
    metrics::Metrics,
    notifier::{BalanceBadge, ChangeNotifier, Subscription},
    redemption::{Notice, NoticeSink, Redemption, RedemptionService},
    registry::CodeRegistry,
    storage::{KeyValueStore, MemoryStore, RocksStore},
    types::{BalanceChange, Ledger, Transaction, ViewId},
    Config, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One device: shared storage plus the ledger's single writer
pub struct Device {
    store: Arc<dyn KeyValueStore>,
    ledger: LedgerHandle,
    registry: Arc<CodeRegistry>,
    metrics: Metrics,
}

impl Device {
    /// Open the configured backend and start the ledger actor
    pub async fn open(config: Config) -> Result<Self> {
        let registry = config.registry()?;

        let store: Arc<dyn KeyValueStore> = match config.backend {
            Backend::Rocksdb => Arc::new(RocksStore::open(&config)?),
            Backend::Memory => Arc::new(MemoryStore::new(config.feed_capacity)),
        };

        tracing::info!(
            service = %config.service_name,
            backend = ?config.backend,
            codes = registry.len(),
            "Opening wallet device"
        );

        Self::with_store(store, registry, config.mailbox_capacity)
    }

    /// Build a device on an existing substrate. Must run inside a Tokio runtime.
    pub fn with_store(
        store: Arc<dyn KeyValueStore>,
        registry: CodeRegistry,
        mailbox_capacity: usize,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        let ledger = spawn_ledger_actor(Arc::clone(&store), mailbox_capacity, Some(metrics.clone()));

        Ok(Self {
            store,
            ledger,
            registry: Arc::new(registry),
            metrics,
        })
    }

    /// Open a new view with its own notifier, already following other views
    pub fn open_view(&self) -> View {
        let id = ViewId::new();
        let notifier = ChangeNotifier::new();
        notifier.attach_storage_feed(Arc::clone(&self.store), id);

        let store: Arc<dyn LedgerStore> = Arc::new(self.ledger.clone());
        let service = RedemptionService::new(
            Arc::clone(&self.registry),
            Arc::clone(&store),
            notifier.clone(),
            id,
        )
        .with_metrics(self.metrics.clone());

        tracing::debug!(view = %id, "View opened");

        View {
            id,
            notifier,
            service,
            store,
            registry: Arc::clone(&self.registry),
            redeem_lock: tokio::sync::Mutex::new(()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Code registry in use
    pub fn registry(&self) -> &CodeRegistry {
        &self.registry
    }

    /// Device metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Handle to the ledger actor
    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    /// Stop the ledger actor and close the substrate
    ///
    /// Once this returns the data directory can be opened again.
    pub async fn shutdown(self) -> Result<()> {
        self.ledger.shutdown().await?;
        drop(self.store);
        tracing::debug!("Wallet device closed");
        Ok(())
    }
}

/// One open view of the application
pub struct View {
    id: ViewId,
    notifier: ChangeNotifier,
    service: RedemptionService,
    store: Arc<dyn LedgerStore>,
    registry: Arc<CodeRegistry>,
    redeem_lock: tokio::sync::Mutex<()>,
    in_flight: AtomicBool,
}

impl View {
    /// Identity of this view
    pub fn id(&self) -> ViewId {
        self.id
    }

    /// Redeem a code and show exactly one notice for the outcome
    ///
    /// Redemptions from the same view run one at a time.
    pub async fn redeem(
        &self,
        raw_code: &str,
        sink: &dyn NoticeSink,
    ) -> std::result::Result<Redemption, RedemptionError> {
        let _guard = self.redeem_lock.lock().await;

        self.in_flight.store(true, Ordering::SeqCst);
        let outcome = self.service.redeem(raw_code).await;
        self.in_flight.store(false, Ordering::SeqCst);

        sink.notify(Notice::for_outcome(&outcome));
        outcome
    }

    /// Whether a redemption is in progress (the submit control is disabled)
    pub fn is_redeeming(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Current ledger
    pub async fn ledger(&self) -> Result<Ledger> {
        self.store.snapshot().await
    }

    /// Current balance
    pub async fn balance(&self) -> Result<u64> {
        Ok(self.ledger().await?.balance)
    }

    /// Latest `limit` transactions, newest first
    pub async fn history(&self, limit: usize) -> Result<Vec<Transaction>> {
        Ok(self.ledger().await?.history(limit).to_vec())
    }

    /// Registered codes with whether each has been used on this device
    pub async fn code_list(&self) -> Result<Vec<(String, u64, bool)>> {
        let ledger = self.ledger().await?;
        Ok(self
            .registry
            .entries()
            .map(|(code, value)| (code.to_string(), value, ledger.is_used(code)))
            .collect())
    }

    /// Follow balance changes, from this view or any other
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(BalanceChange) + Send + Sync + 'static,
    {
        self.notifier.subscribe(handler)
    }

    /// Wallet badge showing the current balance and following changes
    pub async fn badge(&self) -> Result<BalanceBadge> {
        let balance = self.balance().await?;
        Ok(BalanceBadge::attach(&self.notifier, balance))
    }

    /// This view's notifier
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}
