//! End-to-end runs of the coordinator against in-memory pages.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use shisetsu::Runtime;
use shisetsu::dom::{Document, locator};
use shisetsu::models::{
    Choice, Config, Dictionary, Message, Origin, SearchCriteria, StatusKind, TimingConfig,
};
use shisetsu::notify::MemoryNotifier;
use shisetsu::storage::{DictionaryStore, KvStore, MemoryStorage, TaskStore};
use shisetsu::surface::PageAction;
use shisetsu::surface::memory::{MemoryBrowser, MemorySite, MemorySurface};
use tokio::sync::broadcast;
use tokio::time::timeout;

const HOME: &str = include_str!("../fixtures/home.html");
const FACILITY: &str = include_str!("../fixtures/facility_select.html");
const CALENDAR: &str = include_str!("../fixtures/calendar.html");
const CALENDAR_EMPTY: &str = include_str!("../fixtures/calendar_empty.html");

struct Fixture {
    runtime: Runtime,
    browser: Arc<MemoryBrowser>,
    notifier: Arc<MemoryNotifier>,
    kv: Arc<MemoryStorage>,
    ui: broadcast::Receiver<Message>,
}

fn site(calendar: &str) -> MemorySite {
    MemorySite::new()
        .with_page("/user/Home", HOME)
        .with_page("/user/AvailabilityCheckApplySelectFacility", FACILITY)
        .with_page("/user/VacantFrameFacilityStatus", calendar)
}

fn config() -> Config {
    let mut config = Config::default();
    config.site.base_url = "https://site.test".to_string();
    config.timing = TimingConfig::instant();
    config
}

async fn start(site: MemorySite) -> Fixture {
    start_with(site, Arc::new(MemoryStorage::new())).await
}

async fn start_with(site: MemorySite, kv: Arc<MemoryStorage>) -> Fixture {
    let browser = Arc::new(MemoryBrowser::new(site));
    let notifier = Arc::new(MemoryNotifier::new());
    let runtime = Runtime::start(config(), browser.clone(), kv.clone(), notifier.clone())
        .await
        .unwrap();
    let ui = runtime.subscribe();
    Fixture {
        runtime,
        browser,
        notifier,
        kv,
        ui,
    }
}

fn tennis() -> SearchCriteria {
    SearchCriteria {
        purposes: vec![Choice::new("1000_1030", "テニス")],
        areas: vec![Choice::new("110", "中区")],
        date_from: NaiveDate::from_ymd_opt(2024, 6, 1),
        date_to: NaiveDate::from_ymd_opt(2024, 6, 14),
        ..SearchCriteria::default()
    }
}

/// Collect UI messages up to and including the first one `done` accepts.
async fn until(ui: &mut broadcast::Receiver<Message>, done: impl Fn(&Message) -> bool) -> Vec<Message> {
    let mut seen = Vec::new();
    let waited = timeout(Duration::from_secs(5), async {
        loop {
            let message = ui.recv().await.unwrap();
            let stop = done(&message);
            seen.push(message);
            if stop {
                break;
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out; saw {seen:?}");
    seen
}

fn is_complete(message: &Message) -> bool {
    matches!(message, Message::SearchComplete { .. })
}

fn is_error(message: &Message) -> bool {
    matches!(
        message,
        Message::StatusUpdate {
            kind: StatusKind::Error,
            ..
        }
    )
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn only_surface(browser: &MemoryBrowser) -> Arc<MemorySurface> {
    let surfaces = browser.surfaces();
    assert_eq!(surfaces.len(), 1);
    surfaces[0].clone()
}

#[tokio::test]
async fn test_search_finds_slots_and_notifies() {
    let mut f = start(site(CALENDAR)).await;
    f.runtime.send(Message::StartSearch { params: tennis() });

    let seen = until(&mut f.ui, |m| is_complete(m) || is_error(m)).await;
    assert_eq!(seen.last(), Some(&Message::SearchComplete { result_count: 3 }));
    assert!(seen.contains(&Message::status(
        "✓ 3件の空きが見つかりました！",
        StatusKind::Success
    )));
    assert!(seen.iter().any(|m| matches!(
        m,
        Message::StatusUpdate { text, kind: StatusKind::Busy } if text.starts_with("🔄 ")
    )));

    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "🎉 空きが見つかりました！");
    assert_eq!(sent[0].body, "1施設で3件の空きコマが見つかりました");

    let surface = only_surface(&f.browser);
    assert!(surface.url().ends_with("/user/VacantFrameFacilityStatus"));
    assert!(surface.is_focused());
    assert!(!surface.is_pinned());
    assert!(!surface.is_closed());
    assert!(eventually(|| surface.load_count() == 3).await);

    // On the home page only the requested purpose was toggled.
    let home = Document::parse(HOME);
    let purpose = |code: &str| {
        let css = format!(r#"input[name="HomeModel.SearchByDateTimeModel.SelectedPurpose"][value="{code}"]"#);
        locator(home.select(&css).unwrap()[0])
    };
    let toggled: Vec<String> = surface
        .actions()
        .into_iter()
        .filter_map(|(seq, action)| match action {
            PageAction::Toggle(target) if seq == 1 => Some(target),
            _ => None,
        })
        .collect();
    assert!(toggled.contains(&purpose("1000_1030")));
    assert!(!toggled.contains(&purpose("1000_1010")));
    assert!(!toggled.contains(&purpose("1000_1050")));

    let tasks = TaskStore::new(f.kv.clone());
    assert!(tasks.active().await.unwrap().is_none());
    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_manual_search_without_slots_keeps_tab() {
    let mut f = start(site(CALENDAR_EMPTY)).await;
    f.runtime.send(Message::StartSearch { params: tennis() });

    let seen = until(&mut f.ui, |m| is_complete(m) || is_error(m)).await;
    assert_eq!(seen.last(), Some(&Message::SearchComplete { result_count: 0 }));
    assert!(seen.contains(&Message::status(
        "検索完了 - 空きは見つかりませんでした",
        StatusKind::Success
    )));
    assert!(f.notifier.sent().is_empty());

    let surface = only_surface(&f.browser);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!surface.is_closed());
    assert!(!surface.is_pinned());
    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_scheduled_search_without_slots_closes_tab() {
    let mut f = start(site(CALENDAR_EMPTY)).await;
    f.runtime
        .bus()
        .send(Message::StartSearch { params: tennis() }, Origin::Scheduler);

    until(&mut f.ui, |m| is_complete(m) || is_error(m)).await;
    let surface = only_surface(&f.browser);
    assert!(!surface.is_focused());
    assert!(eventually(|| surface.is_closed()).await);
    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_invalid_criteria_opens_nothing() {
    let mut f = start(site(CALENDAR)).await;
    f.runtime.send(Message::StartSearch {
        params: SearchCriteria::default(),
    });

    let seen = until(&mut f.ui, is_error).await;
    let Some(Message::StatusUpdate { text, .. }) = seen.last() else {
        panic!("expected a status update");
    };
    assert!(text.contains("purpose"), "{text}");
    assert!(f.browser.surfaces().is_empty());
    assert!(TaskStore::new(f.kv.clone()).get().await.unwrap().is_none());
    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_missing_search_button_reports_error() {
    let home = HOME.replace("検索</button>", "送信</button>");
    let site = MemorySite::new().with_page("/user/Home", home);
    let mut f = start(site).await;
    f.runtime.send(Message::StartSearch { params: tennis() });

    let seen = until(&mut f.ui, is_error).await;
    assert_eq!(
        seen.last(),
        Some(&Message::status("❌ 検索ボタンが見つかりません", StatusKind::Error))
    );
    let surface = only_surface(&f.browser);
    assert!(eventually(|| !surface.is_pinned()).await);
    assert!(!surface.is_closed());
    let tasks = TaskStore::new(f.kv.clone());
    assert!(eventually_async(|| {
        let tasks = tasks.clone();
        async move { tasks.active().await.unwrap().is_none() }
    })
    .await);
    f.runtime.shutdown().await;
}

async fn eventually_async<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}

#[tokio::test]
async fn test_sync_saves_dictionary() {
    let mut f = start(site(CALENDAR)).await;
    f.runtime.send(Message::SyncDictionary);

    let seen = until(&mut f.ui, |m| matches!(m, Message::DictionarySynced) || is_error(m)).await;
    assert_eq!(seen.last(), Some(&Message::DictionarySynced));

    let dictionary = DictionaryStore::new(f.kv.clone()).get().await.unwrap().unwrap();
    assert_eq!(dictionary.purposes.len(), 3);
    assert_eq!(dictionary.purposes[0], Choice::new("1000_1030", "テニス"));
    assert_eq!(dictionary.areas.len(), 3);
    assert!(dictionary.synced_at > 0);

    let surface = only_surface(&f.browser);
    assert!(eventually(|| surface.is_closed()).await);
    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_sync_without_purposes_keeps_previous_dictionary() {
    let kv = Arc::new(MemoryStorage::new());
    let previous = Dictionary {
        purposes: vec![Choice::new("1000_1030", "テニス")],
        areas: Vec::new(),
        synced_at: 1,
    };
    let dictionaries = DictionaryStore::new(kv.clone() as Arc<dyn KvStore>);
    dictionaries.save(&previous).await.unwrap();

    let site = MemorySite::new().with_page("/user/Home", "<html><body><p>メンテナンス中</p></body></html>");
    let mut f = start_with(site, kv).await;
    f.runtime.send(Message::SyncDictionary);

    let seen = until(&mut f.ui, |m| matches!(m, Message::DictionarySynced) || is_error(m)).await;
    assert_eq!(
        seen.last(),
        Some(&Message::status(
            "⚠️ データが取得できませんでした。再試行してください。",
            StatusKind::Error
        ))
    );
    assert_eq!(dictionaries.get().await.unwrap(), Some(previous));
    let surface = only_surface(&f.browser);
    assert!(eventually(|| surface.is_closed()).await);
    f.runtime.shutdown().await;
}

#[tokio::test]
async fn test_periodic_check_interval_is_persisted() {
    let mut f = start(site(CALENDAR)).await;
    f.runtime.send(Message::SetupPeriodicCheck { interval_minutes: 30 });
    // Relayed messages keep the inbox ordered behind the setup.
    f.runtime
        .bus()
        .send(Message::DictionarySynced, Origin::Surface(99));
    until(&mut f.ui, |m| matches!(m, Message::DictionarySynced)).await;

    let settings = shisetsu::storage::SettingsStore::new(f.kv.clone());
    assert_eq!(settings.get().await.unwrap().check_interval, Some(30));

    f.runtime.send(Message::ClearPeriodicCheck);
    f.runtime
        .bus()
        .send(Message::DictionarySynced, Origin::Surface(99));
    until(&mut f.ui, |m| matches!(m, Message::DictionarySynced)).await;
    assert_eq!(settings.get().await.unwrap().check_interval, Some(0));
    f.runtime.shutdown().await;
}
