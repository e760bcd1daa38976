//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balance conservation: balance == Σ(transaction amounts)
//! - At-most-once: no code ever appears twice in the history
//! - Canonicalization: case and surrounding whitespace never matter
//! - Round-trip: load → apply → load adds exactly the credited value

use green_ledger::{
    actor::spawn_ledger_actor, canonicalize, persist::load_ledger, ChangeNotifier, CodeRegistry,
    LedgerHandle, LedgerStore, MemoryStore, RedemptionError, RedemptionService, ViewId,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Strategy for submitted codes: registered, unregistered, mixed case, padded, blank
fn attempt_strategy() -> impl Strategy<Value = String> {
    let base = prop_oneof![
        Just("CLEAN10".to_string()),
        Just("clean20".to_string()),
        Just("Clean100".to_string()),
        Just("eco2024".to_string()),
        Just("GREEN25".to_string()),
        Just("NOPE".to_string()),
        Just(String::new()),
        "[A-Za-z0-9]{1,8}",
    ];
    (base, " {0,2}", " {0,2}").prop_map(|(code, pre, post)| format!("{}{}{}", pre, code, post))
}

fn test_service(store: Arc<MemoryStore>) -> (RedemptionService, LedgerHandle) {
    let handle = spawn_ledger_actor(store, 64, None);
    let service = RedemptionService::new(
        Arc::new(CodeRegistry::demo()),
        Arc::new(handle.clone()),
        ChangeNotifier::new(),
        ViewId::new(),
    );
    (service, handle)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: balance always equals the sum of transaction amounts
    #[test]
    fn prop_balance_matches_history(attempts in prop::collection::vec(attempt_strategy(), 0..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::default());
            let (service, handle) = test_service(store.clone());

            for attempt in &attempts {
                let _ = service.redeem(attempt).await;
                let ledger = handle.snapshot().await.unwrap();
                prop_assert_eq!(ledger.balance, ledger.transaction_total());
            }

            // Persisted state agrees with memory
            let persisted = load_ledger(store.as_ref());
            prop_assert_eq!(persisted, handle.snapshot().await.unwrap());

            handle.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: a code never produces two transactions
    #[test]
    fn prop_codes_credited_at_most_once(attempts in prop::collection::vec(attempt_strategy(), 0..30)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (service, handle) = test_service(Arc::new(MemoryStore::default()));
            let mut successes = HashSet::new();

            for attempt in &attempts {
                match service.redeem(attempt).await {
                    Ok(redemption) => {
                        prop_assert!(successes.insert(redemption.code.clone()));
                    }
                    Err(RedemptionError::AlreadyRedeemed(code)) => {
                        prop_assert!(successes.contains(&code));
                    }
                    Err(RedemptionError::PersistenceFailure(e)) => {
                        prop_assert!(false, "unexpected persistence failure: {}", e);
                    }
                    Err(_) => {}
                }
            }

            let ledger = handle.snapshot().await.unwrap();
            let codes: HashSet<_> = ledger.transactions.iter().map(|t| t.code.clone()).collect();
            prop_assert_eq!(codes.len(), ledger.transactions.len());
            prop_assert!(codes.iter().all(|c| ledger.used_codes.contains(c)));

            handle.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: canonicalization is idempotent and ignores case and padding
    #[test]
    fn prop_canonicalize_idempotent(code in "[A-Za-z0-9]{1,12}", pre in "[ \t]{0,3}", post in "[ \t]{0,3}") {
        let padded = format!("{}{}{}", pre, code, post);
        let once = canonicalize(&padded);
        prop_assert_eq!(canonicalize(&once), once.clone());
        prop_assert_eq!(once.clone(), code.to_uppercase());
        prop_assert_eq!(canonicalize(&code.to_lowercase()), once);
    }

    /// Property: load → apply → load increases the balance by exactly the value
    #[test]
    fn prop_apply_round_trip(value in 1u64..1_000_000u64, code in "[A-Z]{3,10}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::default());
            let handle = spawn_ledger_actor(store.clone(), 8, None);

            let before = handle.load().await.unwrap();
            handle.apply(ViewId::new(), &code, value).await.unwrap();
            let after = handle.load().await.unwrap();

            prop_assert_eq!(after.balance, before.balance + value);
            prop_assert!(after.is_used(&code));
            prop_assert_eq!(load_ledger(store.as_ref()), after);

            handle.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
