/*!
 * Integration tests for the repair pass against scripted platforms
 */

use transfix::app_config::Config;
use transfix::detection::FixProblem;
use transfix::errors::FailureKind;
use transfix::events::{self, SessionEvent};
use transfix::fixer::{AttemptOutcome, FixOrchestrator};
use transfix::glossary::GlossaryEntry;
use transfix::platforms::valid_platforms;
use transfix::providers::mock::{MockBackend, MockBehavior};
use transfix::Session;

use crate::common::{config_with, numbered_platforms, seed_translated, session_with};

async fn single_problem(session: &Session, id: &str) -> FixProblem {
    let item = session.store().get_item(id).await.unwrap().unwrap();
    session.detector().detect(&item).expect("defect expected")
}

/// Five platforms, only the active one usable
#[tokio::test]
async fn test_fix_singleUsablePlatform_shouldMakeExactlyOneAttempt() {
    let backend = MockBackend::new(MockBehavior::Reply("I love programming".to_string()));
    let session = session_with(config_with(numbered_platforms(5, &[1]), 1), &backend);
    seed_translated(&session, &[("1", "我爱编程", "I love 编程")]).await;

    let result = FixOrchestrator::new(&session)
        .fix_problem(&single_problem(&session, "1").await)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(backend.request_count(), 1);
    assert_eq!(backend.platforms_called(), vec!["p1"]);
}

/// Fourteen platforms, usable at 10 and 12, active 12
#[tokio::test]
async fn test_fix_activeFailsThenFallbackResolves_shouldTakeTwoAttempts() {
    let backend = MockBackend::new(MockBehavior::FailTransport)
        .with_platform("p12", MockBehavior::Reply("I love 编程 so much".to_string()))
        .with_platform("p10", MockBehavior::Reply("I love programming".to_string()));
    let config = config_with(numbered_platforms(14, &[10, 12]), 12);
    let order: Vec<usize> = valid_platforms(&config).iter().map(|p| p.index).collect();
    assert_eq!(order, vec![12, 10]);

    let session = session_with(config, &backend);
    seed_translated(&session, &[("1", "我爱编程", "I love 编程")]).await;

    let result = FixOrchestrator::new(&session)
        .fix_problem(&single_problem(&session, "1").await)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.resolved_by.as_deref(), Some("p10"));
    assert_eq!(backend.platforms_called(), vec!["p12", "p10"]);
    assert_eq!(result.attempt_log[0].index, 12);
    assert!(matches!(
        result.attempt_log[0].outcome,
        AttemptOutcome::Failed {
            kind: FailureKind::ValidationFailure,
            ..
        }
    ));
    assert_eq!(result.attempt_log[1].outcome, AttemptOutcome::Resolved);

    let stored = session.store().get_item("1").await.unwrap().unwrap();
    assert_eq!(stored.destination_text, "I love programming");
}

/// Fourteen platforms, none usable
#[tokio::test]
async fn test_fix_noUsablePlatform_shouldReportConfigurationErrorWithoutCalls() {
    let backend = MockBackend::tagged();
    let session = session_with(config_with(numbered_platforms(14, &[]), 0), &backend);
    seed_translated(&session, &[("1", "我爱编程", "I love 编程")]).await;

    let report = FixOrchestrator::new(&session).fix_store().await.unwrap();

    assert_eq!(report.total(), 1);
    let result = &report.results()[0];
    assert!(!result.success);
    assert_eq!(result.attempts, 0);
    assert_eq!(result.failure, Some(FailureKind::Configuration));
    assert!(result.error.as_deref().unwrap().contains("API key"));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_fix_glossaryMiss_shouldResolveWithExpandedTerm() {
    let backend = MockBackend::new(MockBehavior::Reply(
        "Call the Application Programming Interface".to_string(),
    ));
    let config = Config {
        glossary: vec![GlossaryEntry::new("API", "Application Programming Interface")],
        ..config_with(numbered_platforms(2, &[0]), 0)
    };
    let session = session_with(config, &backend);
    seed_translated(&session, &[("1", "调用 API", "Call the API")]).await;

    let report = FixOrchestrator::new(&session).fix_store().await.unwrap();

    assert_eq!(report.fixed(), 1);
    let prompt = &backend.calls()[0].prompt;
    assert!(prompt.contains("## Terminology rules"));
    assert!(prompt.contains("- API -> Application Programming Interface"));
}

/// Every failure kind advances the platform index the same way
#[tokio::test]
async fn test_fix_allPlatformsFail_shouldRestoreAndBoundAttempts() {
    let backend = MockBackend::new(MockBehavior::FailTransport)
        .with_platform("p1", MockBehavior::FailRejected)
        .with_platform("p2", MockBehavior::FailExhausted)
        .with_platform("p3", MockBehavior::Empty)
        .with_platform("p4", MockBehavior::Reply("still 编程".to_string()));
    let config = config_with(numbered_platforms(6, &[0, 1, 2, 3, 4]), 0);
    let usable = valid_platforms(&config).len();
    let session = session_with(config, &backend);
    seed_translated(&session, &[("1", "我爱编程", "I love 编程")]).await;
    let before = session.store().get_item("1").await.unwrap().unwrap();

    let result = FixOrchestrator::new(&session)
        .fix_problem(&single_problem(&session, "1").await)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.attempts, usable);
    assert_eq!(backend.request_count(), usable);
    let kinds: Vec<FailureKind> = result
        .attempt_log
        .iter()
        .filter_map(|a| match &a.outcome {
            AttemptOutcome::Failed { kind, .. } => Some(*kind),
            AttemptOutcome::Resolved => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            FailureKind::Transport,
            FailureKind::Rejected,
            FailureKind::ExhaustedCredential,
            FailureKind::Rejected,
            FailureKind::ValidationFailure,
        ]
    );

    let after = session.store().get_item("1").await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(result.final_text, before.destination_text);
}

#[tokio::test]
async fn test_fixStore_secondRun_shouldBeNoOp() {
    let backend = MockBackend::new(MockBehavior::Reply("Hello world".to_string()));
    let session = session_with(config_with(numbered_platforms(1, &[0]), 0), &backend);
    seed_translated(&session, &[("1", "你好世界", "Hello 世界")]).await;

    let orchestrator = FixOrchestrator::new(&session);
    assert_eq!(orchestrator.fix_store().await.unwrap().fixed(), 1);
    let calls = backend.request_count();

    let second = orchestrator.fix_store().await.unwrap();
    assert_eq!(second.total(), 0);
    assert_eq!(backend.request_count(), calls);
}

#[tokio::test]
async fn test_fixAll_manyItems_shouldRepairConcurrentlyAndPublishProgress() {
    let backend = MockBackend::new(MockBehavior::Slow {
        delay_ms: 20,
        text: "fixed".to_string(),
    });
    let config = Config {
        max_workers: 3,
        ..config_with(numbered_platforms(2, &[0, 1]), 0)
    };
    let (sink, mut receiver) = events::channel();
    let session = session_with(config, &backend).with_events(sink);

    let seeds: Vec<(String, String)> = (0..9).map(|i| (i.to_string(), format!("源文{}", i))).collect();
    let rows: Vec<(&str, &str, &str)> = seeds
        .iter()
        .map(|(id, source)| (id.as_str(), source.as_str(), "残留"))
        .collect();
    seed_translated(&session, &rows).await;

    let report = FixOrchestrator::new(&session).fix_store().await.unwrap();

    assert_eq!(report.total(), 9);
    assert_eq!(report.fixed(), 9);
    assert!(backend.peak_in_flight() <= 3);
    assert_eq!(backend.peak_item_in_flight(), 1);

    let mut progress = 0;
    let mut finished = None;
    while let Ok(event) = receiver.try_recv() {
        match event {
            SessionEvent::FixProgress { completed, total, .. } => {
                progress += 1;
                assert_eq!(total, 9);
                assert_eq!(completed, progress);
            }
            SessionEvent::FixFinished { summary } => finished = Some(summary),
            _ => {}
        }
    }
    assert_eq!(progress, 9);
    assert_eq!(finished.unwrap().fixed, 9);
}
