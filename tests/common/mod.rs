/*!
 * Common test utilities for the transfix test suite
 */

use std::sync::Arc;

use transfix::app_config::{ApiFormat, Config, PlatformConfig};
use transfix::database::{ItemStore, Mutation};
use transfix::language::Language;
use transfix::platforms::NO_KEY_REQUIRED;
use transfix::providers::mock::MockBackend;
use transfix::Session;

/// Route library logs to the test output when RUST_LOG is set
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// OpenAI-compatible platform with one key
pub fn platform(name: &str, key: &str) -> PlatformConfig {
    PlatformConfig::new(name, ApiFormat::OpenAI).with_keys([key])
}

/// Platform carrying only the placeholder credential
pub fn placeholder(name: &str) -> PlatformConfig {
    platform(name, NO_KEY_REQUIRED)
}

/// Chinese to English configuration over `platforms`
pub fn config_with(platforms: Vec<PlatformConfig>, active: usize) -> Config {
    Config {
        source_language: Language::Zh,
        target_language: Language::En,
        activate_platform: active,
        platforms,
        ..Config::default()
    }
}

/// `count` platforms named `p0..`, usable only at the given indices
pub fn numbered_platforms(count: usize, usable: &[usize]) -> Vec<PlatformConfig> {
    (0..count)
        .map(|i| {
            let name = format!("p{}", i);
            if usable.contains(&i) {
                platform(&name, &format!("key-{}", i))
            } else {
                placeholder(&name)
            }
        })
        .collect()
}

/// Session over an in-memory store and a scripted backend
pub fn session_with(config: Config, backend: &MockBackend) -> Session {
    init_logging();
    Session::with_backend(
        ItemStore::new_in_memory().expect("in-memory store"),
        config,
        Arc::new(backend.clone()),
    )
    .expect("valid session")
}

/// Ingest items and give each its destination text
pub async fn seed_translated(session: &Session, items: &[(&str, &str, &str)]) {
    session
        .store()
        .ingest(
            items
                .iter()
                .map(|(id, source, _)| (id.to_string(), source.to_string()))
                .collect(),
        )
        .await
        .expect("ingest");
    session
        .store()
        .apply_batch(
            items
                .iter()
                .map(|(id, _, destination)| Mutation::translated(*id, *destination))
                .collect(),
        )
        .await
        .expect("seed destinations");
}
