/*!
 * Tests for the item store on disk
 */

use anyhow::Result;
use futures::future::join_all;

use transfix::database::{ItemStatus, ItemStore, Mutation};

fn wal_path(db: &std::path::Path) -> std::path::PathBuf {
    let mut name = db.as_os_str().to_owned();
    name.push("-wal");
    name.into()
}

#[tokio::test]
async fn test_open_shouldUseWriteAheadLog() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ItemStore::open(dir.path().join("session.db"))?;

    assert_eq!(store.connection().journal_mode()?, "wal");
    store.close()
}

#[tokio::test]
async fn test_close_shouldConsolidateLogAndKeepWrites() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.db");

    let store = ItemStore::open(&path)?;
    store
        .ingest(vec![("1".to_string(), "你好".to_string())])
        .await?;
    store
        .apply_batch(vec![Mutation::translated("1", "Hello")])
        .await?;
    store.close()?;

    let wal = wal_path(&path);
    assert!(!wal.exists() || std::fs::metadata(&wal)?.len() == 0);

    let reopened = ItemStore::open(&path)?;
    let item = reopened.get_item("1").await?.expect("item persisted");
    assert_eq!(item.destination_text, "Hello");
    assert_eq!(item.status, ItemStatus::Done);
    reopened.close()
}

#[tokio::test]
async fn test_applyBatch_concurrentWriters_shouldAllLand() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ItemStore::open(dir.path().join("session.db"))?;
    let ids: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    store
        .ingest(ids.iter().map(|id| (id.clone(), format!("源 {}", id))).collect())
        .await?;

    let writes = ids.iter().map(|id| {
        let store = store.clone();
        let id = id.clone();
        async move {
            store
                .apply_batch(vec![Mutation::translated(id.as_str(), format!("dest {}", id))])
                .await
        }
    });
    for result in join_all(writes).await {
        result?;
    }

    let counts = store.status_counts().await?;
    assert_eq!(counts.done, 20);
    for item in store.items().await? {
        assert_eq!(item.destination_text, format!("dest {}", item.id));
    }
    store.close()
}

#[tokio::test]
async fn test_applyBatch_failedBatch_shouldLeaveEarlierStateVisible() -> Result<()> {
    let store = ItemStore::new_in_memory()?;
    store
        .ingest(vec![
            ("a".to_string(), "甲".to_string()),
            ("b".to_string(), "乙".to_string()),
        ])
        .await?;
    store
        .apply_batch(vec![Mutation::translated("a", "first")])
        .await?;

    let failed = store
        .apply_batch(vec![
            Mutation::translated("a", "second"),
            Mutation::translated("b", "second"),
            Mutation::failed("ghost"),
        ])
        .await;
    assert!(failed.is_err());

    assert_eq!(store.get_item("a").await?.unwrap().destination_text, "first");
    assert_eq!(store.get_item("b").await?.unwrap().status, ItemStatus::Pending);
    Ok(())
}
