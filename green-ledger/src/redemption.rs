//! Code redemption
//!
//! Validates a submitted code against the registry and the used-code set and,
//! when valid, credits the ledger through the single-writer store. The store
//! re-checks the used-code set inside the actor, so two racing attempts for the
//! same code produce exactly one credit.

use crate::{
    actor::LedgerStore,
    error::{Error, RedemptionError},
    metrics::Metrics,
    notifier::ChangeNotifier,
    registry::{canonicalize, CodeRegistry},
    types::{Transaction, ViewId},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a successful redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    /// Canonical code that was redeemed
    pub code: String,
    /// Points credited
    pub credited: u64,
    /// Balance before the credit
    pub old_balance: u64,
    /// Balance after the credit
    pub new_balance: u64,
    /// Recorded transaction
    pub transaction: Transaction,
}

/// Redemption service for one view
pub struct RedemptionService {
    registry: Arc<CodeRegistry>,
    store: Arc<dyn LedgerStore>,
    notifier: ChangeNotifier,
    origin: ViewId,
    metrics: Option<Metrics>,
}

impl RedemptionService {
    /// Create a service writing on behalf of `origin`
    pub fn new(
        registry: Arc<CodeRegistry>,
        store: Arc<dyn LedgerStore>,
        notifier: ChangeNotifier,
        origin: ViewId,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
            origin,
            metrics: None,
        }
    }

    /// Record outcomes on `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Redeem a code as typed by the user
    pub async fn redeem(&self, raw_code: &str) -> Result<Redemption, RedemptionError> {
        let result = self.try_redeem(raw_code).await;

        let outcome = match &result {
            Ok(redemption) => {
                tracing::info!(
                    code = %redemption.code,
                    credited = redemption.credited,
                    balance = redemption.new_balance,
                    "Code redeemed"
                );
                "success"
            }
            Err(RedemptionError::PersistenceFailure(e)) => {
                tracing::error!(error = %e, "Redemption could not be persisted");
                "persistence_failure"
            }
            Err(e) => {
                tracing::info!(reason = %e, "Redemption rejected");
                e.outcome()
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_redemption(outcome);
        }

        result
    }

    async fn try_redeem(&self, raw_code: &str) -> Result<Redemption, RedemptionError> {
        let code = canonicalize(raw_code);
        if code.is_empty() {
            return Err(RedemptionError::EmptyCode);
        }

        let ledger = self
            .store
            .snapshot()
            .await
            .map_err(RedemptionError::PersistenceFailure)?;
        if ledger.is_used(&code) {
            return Err(RedemptionError::AlreadyRedeemed(code));
        }

        let value = self
            .registry
            .lookup(&code)
            .ok_or_else(|| RedemptionError::UnknownCode(code.clone()))?;

        let ledger = self.store.apply(self.origin, &code, value).await?;

        let transaction = ledger.transactions.first().cloned().ok_or_else(|| {
            RedemptionError::PersistenceFailure(Error::Other(
                "applied ledger has no transaction".to_string(),
            ))
        })?;
        let old_balance = ledger.balance.saturating_sub(value);

        self.notifier.publish(old_balance, ledger.balance);

        Ok(Redemption {
            code,
            credited: value,
            old_balance,
            new_balance: ledger.balance,
            transaction,
        })
    }
}

/// Visual weight of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Positive outcome
    Success,
    /// Failure the user should act on
    Destructive,
}

/// A discrete, human-readable outcome message (toast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Headline
    pub title: String,
    /// Detail line
    pub description: String,
    /// Severity
    pub severity: Severity,
}

impl Notice {
    fn new(title: &str, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            severity,
        }
    }

    /// The notice for a redemption outcome
    pub fn for_outcome(outcome: &Result<Redemption, RedemptionError>) -> Self {
        match outcome {
            Ok(redemption) => Self::new(
                "Token Redeemed Successfully!",
                format!("Added {} Green Tokens to your balance", redemption.credited),
                Severity::Success,
            ),
            Err(RedemptionError::EmptyCode) => {
                Self::new("Invalid Token", "Please enter a token code", Severity::Destructive)
            }
            Err(RedemptionError::AlreadyRedeemed(_)) => Self::new(
                "Token Already Used",
                "This token has already been redeemed",
                Severity::Destructive,
            ),
            Err(RedemptionError::UnknownCode(_)) => {
                Self::new("Invalid Token", "This token code is not valid", Severity::Destructive)
            }
            Err(RedemptionError::PersistenceFailure(_)) => Self::new(
                "Redemption Failed",
                "Your token could not be saved. Please try again.",
                Severity::Destructive,
            ),
        }
    }
}

/// Surface that shows notices to the user
pub trait NoticeSink: Send + Sync {
    /// Show one notice
    fn notify(&self, notice: Notice);
}

impl NoticeSink for Mutex<Vec<Notice>> {
    fn notify(&self, notice: Notice) {
        self.lock().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_ledger_actor;
    use crate::storage::MemoryStore;
    use crate::types::BalanceChange;

    fn service() -> (RedemptionService, ChangeNotifier) {
        let store = spawn_ledger_actor(Arc::new(MemoryStore::default()), 8, None);
        let notifier = ChangeNotifier::new();
        let service = RedemptionService::new(
            Arc::new(CodeRegistry::demo()),
            Arc::new(store),
            notifier.clone(),
            ViewId::new(),
        );
        (service, notifier)
    }

    #[tokio::test]
    async fn test_redeem_credits_and_publishes() {
        let (service, notifier) = service();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let _sub = notifier.subscribe(move |change| sink.lock().push(change));

        let redemption = service.redeem(" eco2024 ").await.unwrap();
        assert_eq!(redemption.code, "ECO2024");
        assert_eq!(redemption.credited, 50);
        assert_eq!(redemption.old_balance, 0);
        assert_eq!(redemption.new_balance, 50);
        assert_eq!(redemption.transaction.code, "ECO2024");

        assert_eq!(*changes.lock(), vec![BalanceChange::new(0, 50)]);
    }

    #[tokio::test]
    async fn test_failures_do_not_publish() {
        let (service, notifier) = service();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let _sub = notifier.subscribe(move |change| sink.lock().push(change));

        assert!(matches!(service.redeem("   ").await, Err(RedemptionError::EmptyCode)));
        assert!(matches!(service.redeem("NOPE").await, Err(RedemptionError::UnknownCode(_))));
        assert!(changes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_record_outcomes() {
        let (service, _notifier) = service();
        let metrics = Metrics::new().unwrap();
        let service = service.with_metrics(metrics.clone());

        service.redeem("CLEAN10").await.unwrap();
        let _ = service.redeem("clean10").await;

        let count = |label: &str| metrics.redemptions_total.with_label_values(&[label]).get();
        assert_eq!(count("success"), 1);
        assert_eq!(count("already_redeemed"), 1);
    }

    #[test]
    fn test_notice_texts() {
        let empty = Notice::for_outcome(&Err(RedemptionError::EmptyCode));
        assert_eq!(empty.title, "Invalid Token");
        assert_eq!(empty.description, "Please enter a token code");
        assert_eq!(empty.severity, Severity::Destructive);

        let used = Notice::for_outcome(&Err(RedemptionError::AlreadyRedeemed("X".into())));
        assert_eq!(used.title, "Token Already Used");

        let unknown = Notice::for_outcome(&Err(RedemptionError::UnknownCode("X".into())));
        assert_eq!(unknown.description, "This token code is not valid");

        let failed = Notice::for_outcome(&Err(RedemptionError::PersistenceFailure(
            Error::Storage("io".into()),
        )));
        assert_eq!(failed.severity, Severity::Destructive);
    }

    #[test]
    fn test_success_notice() {
        let ok = Ok(Redemption {
            code: "GREEN25".to_string(),
            credited: 25,
            old_balance: 0,
            new_balance: 25,
            transaction: Transaction::redeem("GREEN25", 25),
        });
        let notice = Notice::for_outcome(&ok);
        assert_eq!(notice.title, "Token Redeemed Successfully!");
        assert_eq!(notice.description, "Added 25 Green Tokens to your balance");
        assert_eq!(notice.severity, Severity::Success);
    }
}
