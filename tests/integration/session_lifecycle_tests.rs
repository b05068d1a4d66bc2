/*!
 * Integration tests for a full session on an on-disk store
 */

use anyhow::Result;
use std::sync::Arc;

use transfix::app_config::Config;
use transfix::database::{ItemStatus, ItemStore};
use transfix::dispatcher::TaskDispatcher;
use transfix::fixer::FixOrchestrator;
use transfix::providers::mock::{MockBackend, MockBehavior};
use transfix::session::META_SESSION_ID;
use transfix::Session;

use crate::common::{config_with, init_logging, numbered_platforms};

fn open(path: &std::path::Path, config: Config, backend: &MockBackend) -> Result<Session> {
    init_logging();
    Session::with_backend(ItemStore::open(path)?, config, Arc::new(backend.clone()))
}

#[tokio::test]
async fn test_session_translateRepairClose_shouldPersistAcrossReopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.db");
    let config = config_with(numbered_platforms(2, &[0, 1]), 0);

    // Item 2 gets residue after the first pass and is repaired on the active platform
    let backend = MockBackend::new(MockBehavior::Reply("Good morning".to_string()));
    let session = open(&path, config.clone(), &backend)?;
    let session_id = session.record_setup().await?;
    session
        .store()
        .ingest(vec![
            ("1".to_string(), "早上好".to_string()),
            ("2".to_string(), "晚上好".to_string()),
        ])
        .await?;

    TaskDispatcher::new(&session).run_pending().await?;
    session
        .store()
        .apply_batch(vec![transfix::Mutation::translated("2", "Good 晚上")])
        .await?;

    let report = FixOrchestrator::new(&session).fix_store().await?;
    assert_eq!(report.fixed(), 1);
    assert_eq!(report.find("2").unwrap().resolved_by.as_deref(), Some("p0"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(json["summary"]["fixed"], 1);

    session.close()?;

    // Reopen: items and session id survive
    let reopened = open(&path, config, &MockBackend::tagged())?;
    let items = reopened.store().items().await?;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.status == ItemStatus::Done));
    assert_eq!(items[1].destination_text, "Good morning");
    assert_eq!(
        reopened.store().get_meta::<String>(META_SESSION_ID).await?,
        Some(session_id)
    );
    reopened.close()
}

#[tokio::test]
async fn test_session_cancelled_shouldLeaveItemsPending() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::tagged();
    let session = open(&dir.path().join("session.db"), config_with(numbered_platforms(1, &[0]), 0), &backend)?;
    session
        .store()
        .ingest(vec![("1".to_string(), "你好".to_string())])
        .await?;

    session.cancel();
    TaskDispatcher::new(&session).run_pending().await?;

    assert_eq!(backend.request_count(), 0);
    assert_eq!(session.store().status_counts().await?.pending, 1);

    session.cancel_flag().reset();
    TaskDispatcher::new(&session).run_pending().await?;
    assert_eq!(session.store().status_counts().await?.done, 1);
    session.close()
}
