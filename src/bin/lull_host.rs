//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! The browser-side shim spawns this process, pushes its tab table with
//! `syncTabs`, forwards lifecycle notifications, and performs the
//! `tab.navigate` events it receives.
//!
//! All tracing output goes to stderr so that stdout remains a clean JSON
//! protocol channel.

use lull::alarms::FileAlarmBackend;
use lull::clock::SystemClock;
use lull::config::LullConfig;
use lull::engine::EngineParts;
use lull::host::stdio::run_stdio_bridge;
use lull::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use lull::suspended::SuspendedPage;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(LullConfig::default_config_path);
    let config = LullConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("cannot load {}: {e}", config_path.display()))?;

    let store_path = config.storage.store_path();
    let alarms_path = config.storage.alarms_path();
    tracing::info!(
        config = %config_path.display(),
        store = %store_path.display(),
        alarms = %alarms_path.display(),
        "lull-host starting"
    );

    let durable: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&store_path).await?);
    let session: Option<Arc<dyn KeyValueStore>> = config
        .storage
        .session_store
        .then(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
    let parts = EngineParts {
        alarms: Arc::new(FileAlarmBackend::open(&alarms_path).await?),
        session,
        durable,
        clock: Arc::new(SystemClock),
        suspended_page: SuspendedPage::new(config.runtime.suspended_page.clone()),
    };

    run_stdio_bridge(config.runtime.channel_options(), parts)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "lull-host exited with error");
            anyhow::anyhow!("lull-host failed: {e}")
        })?;

    tracing::info!("lull-host shut down cleanly");
    Ok(())
}
