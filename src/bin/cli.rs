//! Shisetsu CLI
//!
//! Local entry point. Drives a Chrome instance over the DevTools protocol, or
//! the bundled fixture pages with `demo`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use shisetsu::{
    error::{AppError, Result},
    locale::Language,
    models::{
        Choice, Config, DateRange, Message, Profile, SearchCriteria, StatusKind, TimingConfig,
        format_hhmm,
    },
    notify::LogNotifier,
    runtime::{Runtime, classify},
    storage::{DictionaryStore, KvStore, LocalStorage, MemoryStorage, ProfileStore, SettingsStore, TaskStore},
    surface::{
        Browser,
        memory::{MemoryBrowser, MemorySite},
    },
    utils::log as console,
};
use tokio::sync::broadcast;

const DEMO_HOME: &str = include_str!("../../fixtures/home.html");
const DEMO_FACILITY: &str = include_str!("../../fixtures/facility_select.html");
const DEMO_CALENDAR: &str = include_str!("../../fixtures/calendar.html");
const DEMO_CALENDAR_EMPTY: &str = include_str!("../../fixtures/calendar_empty.html");

/// Shisetsu - Yokohama facility availability watcher
#[derive(Parser, Debug)]
#[command(
    name = "shisetsu",
    version,
    about = "Watches the Yokohama facility reservation site for open slots"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one search in a new browser tab
    Search {
        /// Use a saved profile instead of criteria flags
        #[arg(long)]
        profile: Option<String>,

        #[command(flatten)]
        criteria: CriteriaArgs,
    },

    /// Refresh the purpose/area dictionary from the site
    Sync,

    /// Keep running and search scheduled profiles periodically
    Watch {
        /// Minutes between checks, overriding the stored interval
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show which flow page a URL belongs to
    Classify { url: String },

    /// Manage saved search profiles
    Profiles {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Show or change stored settings
    Settings {
        #[arg(long)]
        login_id: Option<String>,

        #[arg(long)]
        login_pw: Option<String>,

        /// UI language (ja, zh)
        #[arg(long)]
        language: Option<Language>,

        /// Minutes between periodic checks; zero disables them
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show the stored task and dictionary
    Status,

    /// Validate the configuration file
    Validate,

    /// Run a search against the bundled fixture pages
    Demo {
        /// Serve a calendar without open slots
        #[arg(long)]
        empty: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    List,

    Add {
        name: String,

        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Search window: a number of days from today, or "month"
        #[arg(long, default_value = "14")]
        range: String,

        /// Include in periodic checks
        #[arg(long)]
        scheduled: bool,
    },

    Remove { name: String },
}

#[derive(Args, Debug, Clone, Default)]
struct CriteriaArgs {
    /// Purpose as CODE or CODE:LABEL (repeatable)
    #[arg(long = "purpose", value_parser = parse_choice)]
    purposes: Vec<Choice>,

    /// Area as CODE or CODE:LABEL (repeatable)
    #[arg(long = "area", value_parser = parse_choice)]
    areas: Vec<Choice>,

    /// First day (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Earliest start as HHMM
    #[arg(long)]
    time_from: Option<String>,

    /// Latest end as HHMM
    #[arg(long)]
    time_to: Option<String>,

    /// Weekday 0 (Sunday) to 6 (repeatable)
    #[arg(long = "day")]
    days: Vec<u8>,

    /// Include public holidays
    #[arg(long)]
    holiday: bool,
}

impl CriteriaArgs {
    fn into_criteria(self) -> SearchCriteria {
        SearchCriteria {
            purposes: self.purposes,
            areas: self.areas,
            date_from: self.from,
            date_to: self.to,
            time_from: self.time_from,
            time_to: self.time_to,
            days_of_week: self.days.into_iter().collect(),
            include_holiday: self.holiday,
        }
    }
}

fn parse_choice(raw: &str) -> std::result::Result<Choice, String> {
    let (value, label) = raw.split_once(':').unwrap_or((raw, raw));
    if value.trim().is_empty() {
        return Err("code must not be empty".to_string());
    }
    Ok(Choice::new(value.trim(), label.trim()))
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = if cli.config.exists() {
        Config::load_or_default(&cli.config)
    } else {
        log::debug!("No config at {}, using defaults", cli.config.display());
        Config::default()
    };
    let kv: Arc<dyn KvStore> = Arc::new(LocalStorage::new(&config.storage.dir));

    match cli.command {
        Command::Search { profile, criteria } => {
            let params = match profile {
                Some(name) => ProfileStore::new(kv.clone())
                    .find(&name)
                    .await?
                    .ok_or_else(|| AppError::validation(format!("no profile named '{name}'")))?
                    .resolve(Local::now().date_naive()),
                None => criteria.into_criteria(),
            };
            let browser = connect(&config).await?;
            let runtime = Runtime::start(config, browser, kv, Arc::new(LogNotifier)).await?;
            let ui = runtime.subscribe();
            runtime.send(Message::StartSearch { params });
            follow(ui, ends_search).await;
            runtime.shutdown().await;
        }

        Command::Sync => {
            let browser = connect(&config).await?;
            let runtime = Runtime::start(config, browser, kv, Arc::new(LogNotifier)).await?;
            let ui = runtime.subscribe();
            runtime.send(Message::SyncDictionary);
            follow(ui, ends_sync).await;
            runtime.shutdown().await;
        }

        Command::Watch { interval } => {
            let browser = connect(&config).await?;
            let runtime = Runtime::start(config, browser, kv, Arc::new(LogNotifier)).await?;
            if let Some(interval_minutes) = interval {
                runtime.send(Message::SetupPeriodicCheck { interval_minutes });
            }
            console::header("Watching scheduled profiles (Ctrl-C to stop)");
            follow(runtime.subscribe(), |_| false).await;
            runtime.shutdown().await;
        }

        Command::Classify { url } => {
            println!("{}", classify(&url));
        }

        Command::Profiles { command } => profiles(ProfileStore::new(kv), command).await?,

        Command::Settings {
            login_id,
            login_pw,
            language,
            interval,
        } => {
            let store = SettingsStore::new(kv);
            let mut settings = store.get().await?;
            let changed =
                login_id.is_some() || login_pw.is_some() || language.is_some() || interval.is_some();
            if let Some(id) = login_id {
                settings.login_id = Some(id);
            }
            if let Some(pw) = login_pw {
                settings.login_pw = Some(pw);
            }
            if let Some(language) = language {
                settings.language = language;
            }
            if interval.is_some() {
                settings.check_interval = interval;
            }
            if changed {
                store.save(&settings).await?;
                log::info!("Settings saved");
            }
            console::summary(
                "Settings",
                &[
                    ("login id", settings.login_id.clone().unwrap_or_default()),
                    (
                        "password",
                        if settings.login_pw.is_some() { "set" } else { "not set" }.to_string(),
                    ),
                    ("language", settings.language.to_string()),
                    (
                        "check interval (min)",
                        settings
                            .check_interval
                            .map_or_else(|| "default".to_string(), |m| m.to_string()),
                    ),
                ],
            );
        }

        Command::Status => {
            let task = TaskStore::new(kv.clone()).get().await?;
            match task {
                Some(task) => console::summary(
                    "Task",
                    &[
                        ("id", task.id.to_string()),
                        ("step", task.step.to_string()),
                        ("trigger", format!("{:?}", task.triggered_by)),
                        ("active", task.active.to_string()),
                    ],
                ),
                None => log::info!("No task recorded"),
            }
            match DictionaryStore::new(kv).get().await? {
                Some(dictionary) => console::summary(
                    "Dictionary",
                    &[
                        ("purposes", dictionary.purposes.len().to_string()),
                        ("areas", dictionary.areas.len().to_string()),
                        ("synced at (ms)", dictionary.synced_at.to_string()),
                    ],
                ),
                None => log::info!("Dictionary not synced yet"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Demo { empty } => {
            let calendar = if empty { DEMO_CALENDAR_EMPTY } else { DEMO_CALENDAR };
            let site = MemorySite::new()
                .with_page("/user/Home", DEMO_HOME)
                .with_page("/user/AvailabilityCheckApplySelectFacility", DEMO_FACILITY)
                .with_page("/user/VacantFrameFacilityStatus", calendar);
            let config = Config {
                timing: TimingConfig::instant(),
                ..config
            };
            let runtime = Runtime::start(
                config,
                Arc::new(MemoryBrowser::new(site)),
                Arc::new(MemoryStorage::new()),
                Arc::new(LogNotifier),
            )
            .await?;
            let ui = runtime.subscribe();
            console::header("Demo search against bundled pages");
            runtime.send(Message::StartSearch {
                params: SearchCriteria {
                    purposes: vec![Choice::new("1000_1030", "テニス")],
                    areas: vec![Choice::new("110", "中区")],
                    ..SearchCriteria::default()
                },
            });
            follow(ui, ends_search).await;
            runtime.shutdown().await;
        }
    }

    Ok(())
}

async fn profiles(store: ProfileStore, command: ProfileCommand) -> Result<()> {
    match command {
        ProfileCommand::List => {
            let profiles = store.list().await?;
            if profiles.is_empty() {
                log::info!("No profiles saved");
            }
            for profile in profiles {
                let purposes: Vec<&str> = profile
                    .criteria
                    .purposes
                    .iter()
                    .map(|p| p.label.as_str())
                    .collect();
                console::summary(
                    &profile.name,
                    &[
                        ("purposes", purposes.join(", ")),
                        ("range", profile.date_range_days.to_string()),
                        (
                            "time",
                            format!(
                                "{} - {}",
                                format_hhmm(profile.criteria.time_from.as_deref()),
                                format_hhmm(profile.criteria.time_to.as_deref())
                            ),
                        ),
                        ("scheduled", profile.scheduled_check.to_string()),
                    ],
                );
            }
        }
        ProfileCommand::Add {
            name,
            criteria,
            range,
            scheduled,
        } => {
            let criteria = criteria.into_criteria();
            criteria.validate()?;
            store
                .add(Profile {
                    name: name.clone(),
                    criteria,
                    date_range_days: DateRange::parse(&range),
                    scheduled_check: scheduled,
                })
                .await?;
            log::info!("Profile '{}' saved", name);
        }
        ProfileCommand::Remove { name } => {
            if store.remove(&name).await? {
                log::info!("Profile '{}' removed", name);
            } else {
                log::warn!("No profile named '{}'", name);
            }
        }
    }
    Ok(())
}

#[cfg(feature = "cdp")]
async fn connect(config: &Config) -> Result<Arc<dyn Browser>> {
    let browser = shisetsu::surface::cdp::CdpBrowser::connect(&config.cdp).await?;
    Ok(Arc::new(browser))
}

#[cfg(not(feature = "cdp"))]
async fn connect(_config: &Config) -> Result<Arc<dyn Browser>> {
    Err(AppError::config("built without the cdp feature; only `demo` can run"))
}

fn ends_search(message: &Message) -> bool {
    matches!(
        message,
        Message::SearchComplete { .. }
            | Message::StatusUpdate {
                kind: StatusKind::Error,
                ..
            }
    )
}

fn ends_sync(message: &Message) -> bool {
    matches!(
        message,
        Message::DictionarySynced
            | Message::StatusUpdate {
                kind: StatusKind::Error,
                ..
            }
    )
}

/// Print UI-bound messages until `done` says stop or Ctrl-C.
async fn follow(mut ui: broadcast::Receiver<Message>, done: impl Fn(&Message) -> bool) {
    loop {
        let message = tokio::select! {
            received = ui.recv() => match received {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Missed {} status message(s)", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        };
        match &message {
            Message::StatusUpdate { text, kind } => console::status(*kind, text),
            Message::SearchComplete { result_count } => {
                console::separator();
                console::summary("Search complete", &[("slots", result_count.to_string())]);
            }
            Message::DictionarySynced => console::sub_item("Dictionary updated"),
            other => log::debug!("UI message {}", other.action()),
        }
        if done(&message) {
            break;
        }
    }
}
