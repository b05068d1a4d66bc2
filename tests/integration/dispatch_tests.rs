/*!
 * Integration tests for the concurrent first pass
 */

use std::collections::HashSet;

use transfix::app_config::Config;
use transfix::database::{Item, ItemStatus};
use transfix::dispatcher::{DispatchOutcome, TaskDispatcher};
use transfix::errors::FailureKind;
use transfix::fixer::FixOrchestrator;
use transfix::providers::mock::{MockBackend, MockBehavior};

use crate::common::{config_with, numbered_platforms, session_with};

fn bounded_config(max_workers: usize) -> Config {
    Config {
        max_workers,
        ..config_with(numbered_platforms(3, &[0, 1, 2]), 1)
    }
}

/// N items with a pool of K < N workers
#[tokio::test]
async fn test_runAll_boundedPool_shouldProduceOneResultPerItem() {
    const ITEMS: usize = 24;
    const WORKERS: usize = 4;

    let backend = MockBackend::new(MockBehavior::SlowTagged { delay_ms: 15 });
    let session = session_with(bounded_config(WORKERS), &backend);
    let ids: Vec<String> = (0..ITEMS).map(|i| format!("item-{}", i)).collect();
    session
        .store()
        .ingest(ids.iter().map(|id| (id.clone(), format!("源文 {}", id))).collect())
        .await
        .unwrap();

    let outcomes = TaskDispatcher::new(&session).run_pending().await.unwrap();

    assert_eq!(outcomes.len(), ITEMS);
    let distinct: HashSet<&str> = outcomes.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(distinct.len(), ITEMS);
    assert!(outcomes.iter().all(|(_, o)| *o == DispatchOutcome::Translated));

    assert!(backend.peak_in_flight() <= WORKERS);
    assert!(backend.peak_in_flight() > 1);
    assert_eq!(backend.peak_item_in_flight(), 1);
    assert_eq!(backend.request_count(), ITEMS);

    for item in session.store().items().await.unwrap() {
        assert_eq!(item.status, ItemStatus::Done);
        assert_eq!(item.destination_text, MockBackend::tagged_text(&item.id));
    }
}

#[tokio::test]
async fn test_runAll_duplicateIds_shouldSendOneRequestPerId() {
    let backend = MockBackend::new(MockBehavior::SlowTagged { delay_ms: 10 });
    let session = session_with(bounded_config(8), &backend);
    session
        .store()
        .ingest(vec![("a".to_string(), "甲".to_string()), ("b".to_string(), "乙".to_string())])
        .await
        .unwrap();

    let items = vec![Item::new("a", "甲"), Item::new("a", "甲"), Item::new("b", "乙"), Item::new("a", "甲")];
    let outcomes = TaskDispatcher::new(&session).run_all(items).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(backend.request_count(), 2);
    assert_eq!(backend.peak_item_in_flight(), 1);
}

#[tokio::test]
async fn test_runAll_shouldUseOnlyActivePlatform() {
    let backend = MockBackend::new(MockBehavior::FailTransport)
        .with_platform("p0", MockBehavior::Tagged)
        .with_platform("p2", MockBehavior::Tagged);
    let session = session_with(bounded_config(2), &backend);
    session
        .store()
        .ingest(vec![("1".to_string(), "你好".to_string())])
        .await
        .unwrap();

    let outcomes = TaskDispatcher::new(&session).run_pending().await.unwrap();

    assert!(matches!(outcomes[0].1, DispatchOutcome::Failed(FailureKind::Transport, _)));
    assert_eq!(backend.platforms_called(), vec!["p1"]);
    assert_eq!(
        session.store().get_item("1").await.unwrap().unwrap().status,
        ItemStatus::Failed
    );
}

/// A failed first pass is picked up by an explicit repair pass
#[tokio::test]
async fn test_failedFirstPass_shouldBeRepairedOnFallbackPlatform() {
    let backend = MockBackend::new(MockBehavior::Tagged).with_platform("p1", MockBehavior::FailExhausted);
    let session = session_with(bounded_config(2), &backend);
    session
        .store()
        .ingest(vec![("1".to_string(), "你好".to_string())])
        .await
        .unwrap();

    TaskDispatcher::new(&session).run_pending().await.unwrap();
    assert_eq!(backend.request_count(), 1);

    let report = FixOrchestrator::new(&session).fix_store().await.unwrap();

    let result = &report.results()[0];
    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(backend.platforms_called(), vec!["p1", "p1", "p0"]);

    let item = session.store().get_item("1").await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Done);
    assert_eq!(item.destination_text, MockBackend::tagged_text("1"));
}
