//! Property tests for the fallback queue
//!
//! Whatever the capacity and number of inserts, the queue holds exactly
//! the most recent entries in insertion order, and acknowledging a subset
//! removes only that subset.

use a3s_audit::{
    Actor, AuditAction, AuditLogEntry, AuditResource, AuditSeverity, MemorySink, MemoryStore,
    PendingQueue,
};
use proptest::prelude::*;
use std::sync::Arc;

fn entry(n: usize) -> AuditLogEntry {
    AuditLogEntry {
        id: format!("audit-{}", n),
        timestamp: chrono::Utc::now(),
        action: AuditAction::Create,
        resource: AuditResource::Content,
        resource_id: None,
        actor: Actor::anonymous(),
        severity: AuditSeverity::Low,
        description: format!("Entry {}", n),
        details: Default::default(),
        changes: Vec::new(),
        metadata: Default::default(),
        tags: Default::default(),
        success: true,
        error_message: None,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn queue(capacity: usize) -> PendingQueue {
    PendingQueue::with_capacity(
        Arc::new(MemoryStore::new()),
        capacity,
        Arc::new(MemorySink::new()),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_queue_keeps_latest_in_order(capacity in 1usize..40, inserts in 0usize..120) {
        let ids = runtime().block_on(async {
            let queue = queue(capacity);
            for n in 0..inserts {
                queue.enqueue(entry(n)).await;
            }
            queue.drain().await.into_iter().map(|e| e.id).collect::<Vec<_>>()
        });

        let kept = inserts.min(capacity);
        prop_assert_eq!(ids.len(), kept);
        let expected: Vec<String> = (inserts - kept..inserts)
            .map(|n| format!("audit-{}", n))
            .collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn prop_acknowledge_removes_only_delivered(
        total in 1usize..60,
        mask in proptest::collection::vec(any::<bool>(), 60),
    ) {
        let (removed, remaining) = runtime().block_on(async {
            let queue = queue(100);
            for n in 0..total {
                queue.enqueue(entry(n)).await;
            }
            let delivered: Vec<String> = (0..total)
                .filter(|n| mask[*n])
                .map(|n| format!("audit-{}", n))
                .collect();
            let removed = queue.acknowledge(&delivered).await.unwrap();
            let remaining: Vec<String> =
                queue.drain().await.into_iter().map(|e| e.id).collect();
            (removed, remaining)
        });

        let expected: Vec<String> = (0..total)
            .filter(|n| !mask[*n])
            .map(|n| format!("audit-{}", n))
            .collect();
        prop_assert_eq!(removed, total - expected.len());
        prop_assert_eq!(remaining, expected);
    }
}
