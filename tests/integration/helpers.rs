//! Shared helpers for integration tests.

use async_trait::async_trait;
use lull::alarms::{AlarmBackend, MemoryAlarmBackend};
use lull::clock::ManualClock;
use lull::engine::{Engine, EngineParts, ReconcileReport};
use lull::storage::{KeyValueStore, MemoryStore};
use lull::suspended::SuspendedPage;
use lull::{LullError, Settings, Tab, TabHost, TabId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Start time shared by the engine tests (2024-01-01T00:00:00Z).
pub(crate) const T0: u64 = 1_704_067_200_000;

/// Scriptable tab host: a plain table plus a switch that makes navigations
/// fail, like a host whose tab vanished mid-call.
#[derive(Default)]
pub(crate) struct FakeTabs {
    tabs: Mutex<BTreeMap<TabId, Tab>>,
    navigations: Mutex<Vec<(TabId, String)>>,
    fail_updates: AtomicBool,
}

impl FakeTabs {
    pub(crate) fn with(tabs: Vec<Tab>) -> Arc<Self> {
        let fake = Self::default();
        for tab in tabs {
            fake.put(tab);
        }
        Arc::new(fake)
    }

    pub(crate) fn put(&self, tab: Tab) {
        self.tabs.lock().expect("lock tabs").insert(tab.id, tab);
    }

    pub(crate) fn drop_tab(&self, tab_id: TabId) {
        self.tabs.lock().expect("lock tabs").remove(&tab_id);
    }

    pub(crate) fn url_of(&self, tab_id: TabId) -> String {
        self.tabs
            .lock()
            .expect("lock tabs")
            .get(&tab_id)
            .and_then(|t| t.url.clone())
            .unwrap_or_default()
    }

    pub(crate) fn navigations(&self) -> Vec<(TabId, String)> {
        self.navigations.lock().expect("lock navigations").clone()
    }

    pub(crate) fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TabHost for FakeTabs {
    async fn get(&self, tab_id: TabId) -> lull::Result<Option<Tab>> {
        Ok(self.tabs.lock().expect("lock tabs").get(&tab_id).cloned())
    }

    async fn query_all(&self) -> lull::Result<Vec<Tab>> {
        Ok(self.tabs.lock().expect("lock tabs").values().cloned().collect())
    }

    async fn update_url(&self, tab_id: TabId, url: &str) -> lull::Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(LullError::Host(format!("tab {tab_id} is gone")));
        }
        let mut tabs = self.tabs.lock().expect("lock tabs");
        let tab = tabs
            .get_mut(&tab_id)
            .ok_or_else(|| LullError::Host(format!("no tab {tab_id}")))?;
        tab.url = Some(url.to_owned());
        self.navigations
            .lock()
            .expect("lock navigations")
            .push((tab_id, url.to_owned()));
        Ok(())
    }
}

/// Engine wired to in-memory collaborators.
pub(crate) struct Harness {
    pub engine: Engine,
    pub report: ReconcileReport,
    pub tabs: Arc<FakeTabs>,
    pub clock: ManualClock,
    pub durable: Arc<MemoryStore>,
    pub alarms: Arc<MemoryAlarmBackend>,
}

impl Harness {
    pub(crate) async fn start(tabs: Vec<Tab>) -> Self {
        Self::start_with(tabs, Settings::default()).await
    }

    pub(crate) async fn start_with(tabs: Vec<Tab>, settings: Settings) -> Self {
        let tabs = FakeTabs::with(tabs);
        let clock = ManualClock::new(T0);
        let durable = Arc::new(MemoryStore::new());
        settings.save(durable.as_ref()).await.expect("save settings");
        let alarms = Arc::new(MemoryAlarmBackend::new());

        let parts = EngineParts {
            alarms: alarms.clone(),
            session: Some(Arc::new(MemoryStore::new())),
            durable: durable.clone(),
            clock: Arc::new(clock.clone()),
            suspended_page: SuspendedPage::default(),
        };
        let (engine, report) = Engine::start(tabs.clone(), parts).await;

        Self {
            engine,
            report,
            tabs,
            clock,
            durable,
            alarms,
        }
    }

    pub(crate) fn page(&self) -> &SuspendedPage {
        self.engine.policy().page()
    }
}

pub(crate) fn web_tab(id: TabId, url: &str) -> Tab {
    Tab {
        title: format!("Tab {id}"),
        window_id: 1,
        ..Tab::new(id, url)
    }
}

/// Every monitorable live tab has exactly one timer and no timer belongs to
/// anything else.
pub(crate) async fn assert_one_timer_per_monitored_tab(
    engine: &Engine,
    tabs: &dyn TabHost,
    alarms: &dyn AlarmBackend,
) {
    let monitorable: BTreeSet<TabId> = tabs
        .query_all()
        .await
        .expect("query tabs")
        .iter()
        .filter(|t| engine.policy().is_monitorable(t))
        .map(|t| t.id)
        .collect();
    let registrations = engine.timers().list_all().await.expect("list timers");
    let armed: BTreeSet<TabId> = registrations.iter().map(|r| r.tab_id).collect();

    assert_eq!(armed.len(), registrations.len(), "duplicate registrations");
    assert_eq!(armed, monitorable);
    assert_eq!(alarms.get_all().await.expect("alarms").len(), armed.len());
}

/// Store a settings record directly, as the options page would.
pub(crate) async fn write_settings(store: &dyn KeyValueStore, settings: &Settings) {
    settings.save(store).await.expect("save settings");
}
