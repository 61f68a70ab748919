#![allow(missing_docs)]

//! sensorwatch CLI entry point.
//!
//! `start` runs the daemon (periodic passes plus the Telegram command
//! listener). Every other subcommand is a one-shot operation against the
//! local database or Home Assistant.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use sensorwatch::config::Config;
use sensorwatch::db::{SensorRegistry, SettingsStore, Store, StoreError};
use sensorwatch::discovery;
use sensorwatch::engine::{DiagnosticEngine, EngineDeps};
use sensorwatch::homeassistant::{HaClient, StateFetcher};
use sensorwatch::logging;
use sensorwatch::notifier::TelegramNotifier;
use sensorwatch::scheduler::{parse_interval, Scheduler};
use sensorwatch::settings::{mask_secret, SettingKey, Settings};
use sensorwatch::telegram::{self, BotState};

/// sensorwatch: Home Assistant sensor watchdog with Telegram alerts.
#[derive(Parser)]
#[command(name = "sensorwatch", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the watchdog daemon.
    Start,
    /// Run a single diagnostic pass and exit.
    Check,
    /// Register every `sensor.*` entity known to Home Assistant.
    Discover,
    /// Read or change runtime settings.
    Settings {
        /// Settings action.
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage the monitored sensor list.
    Sensors {
        /// Registry action.
        #[command(subcommand)]
        action: SensorsAction,
    },
}

/// `settings` subcommands.
#[derive(Subcommand)]
enum SettingsAction {
    /// Overwrite settings. Empty or omitted values are left unchanged.
    Set {
        /// Home Assistant base URL.
        #[arg(long)]
        ha_url: Option<String>,
        /// Home Assistant long-lived access token.
        #[arg(long)]
        ha_token: Option<String>,
        /// Telegram bot token.
        #[arg(long)]
        tg_token: Option<String>,
        /// Telegram chat id receiving alerts.
        #[arg(long)]
        chat_id: Option<String>,
        /// Poll interval in minutes.
        #[arg(long)]
        interval: Option<String>,
    },
    /// Print current settings with tokens masked.
    Show,
}

/// `sensors` subcommands.
#[derive(Subcommand)]
enum SensorsAction {
    /// Register a sensor.
    Add {
        /// Entity id, e.g. `sensor.kitchen_temperature`.
        name: String,
        /// Lower threshold.
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,
        /// Upper threshold.
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,
    },
    /// List registered sensors.
    List,
    /// Remove a sensor by id.
    Remove {
        /// Sensor id as shown by `sensors list`.
        id: i64,
    },
    /// Replace a sensor's thresholds. Omitted bounds are cleared.
    Thresholds {
        /// Sensor id as shown by `sensors list`.
        id: i64,
        /// Lower threshold.
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,
        /// Upper threshold.
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Command::Start => handle_start(&config).await,
        Command::Check => {
            logging::init_cli(&config.logging.level);
            handle_check(&config).await
        }
        Command::Discover => {
            logging::init_cli(&config.logging.level);
            handle_discover(&config).await
        }
        Command::Settings { action } => {
            logging::init_cli(&config.logging.level);
            handle_settings(&config, action).await
        }
        Command::Sensors { action } => {
            logging::init_cli(&config.logging.level);
            handle_sensors(&config, action).await
        }
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<Store>> {
    let db_path = config.db_path()?;
    let store = Store::open(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    Ok(Arc::new(store))
}

fn build_engine(
    config: &Config,
    store: &Arc<Store>,
    fetcher: &Arc<dyn StateFetcher>,
) -> Arc<DiagnosticEngine> {
    let deps = EngineDeps {
        settings: Arc::clone(store) as Arc<dyn SettingsStore>,
        registry: Arc::clone(store) as Arc<dyn SensorRegistry>,
        fetcher: Arc::clone(fetcher),
        notifier: Arc::new(TelegramNotifier::new()),
    };
    Arc::new(DiagnosticEngine::new(deps, &config.checks))
}

fn build_fetcher(config: &Config) -> anyhow::Result<Arc<dyn StateFetcher>> {
    let client = HaClient::new(std::time::Duration::from_secs(config.http.timeout_secs))?;
    Ok(Arc::new(client))
}

/// Run the watchdog daemon until Ctrl+C.
async fn handle_start(config: &Config) -> anyhow::Result<()> {
    let logs_dir = config.logs_dir()?;
    let _logging_guard = logging::init_production(&logs_dir, &config.logging.level)?;

    let store = open_store(config).await?;
    let fetcher = build_fetcher(config)?;
    let scheduler = Scheduler::new(build_engine(config, &store, &fetcher));
    let settings = Settings::load(&*store).await;

    info!(
        db = %config.db_path()?.display(),
        logs = %logs_dir.display(),
        "sensorwatch started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let periodic = match parse_interval(&settings.cron_interval) {
        Some(interval) => {
            let scheduler = scheduler.clone();
            Some(tokio::spawn(async move {
                scheduler.run_periodic(interval, shutdown_rx).await;
            }))
        }
        None => {
            warn!(
                value = %settings.cron_interval,
                "cron_interval is not a positive number of minutes, periodic checks disabled"
            );
            None
        }
    };

    if settings.tg_token.is_empty() {
        info!("tg_token not set, Telegram commands disabled");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
    } else {
        let state = BotState {
            scheduler,
            store: Arc::clone(&store),
            fetcher,
        };
        telegram::run_telegram(&settings.tg_token, state).await?;
    }

    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = periodic {
        if let Err(e) = handle.await {
            warn!(error = %e, "periodic task ended abnormally");
        }
    }

    info!("sensorwatch stopped");
    Ok(())
}

/// Run one pass in the foreground and print a summary.
async fn handle_check(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let fetcher = build_fetcher(config)?;
    let scheduler = Scheduler::new(build_engine(config, &store, &fetcher));

    let Some(report) = scheduler.run_now().await else {
        anyhow::bail!("a diagnostic pass is already running");
    };

    println!(
        "Checked {} sensors, {} alerts",
        report.sensors_checked,
        report.alerts.len()
    );
    for alert in &report.alerts {
        println!("- {}", alert.kind());
    }
    if report.registry_failed {
        println!("Sensor registry could not be read; sensor checks were skipped");
    }
    Ok(())
}

async fn handle_discover(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let fetcher = build_fetcher(config)?;
    let settings = Settings::load(&*store).await;

    let report = discovery::discover_sensors(&*fetcher, &store, &settings).await?;
    println!(
        "Found {} sensors, {} newly registered",
        report.found, report.added
    );
    Ok(())
}

async fn handle_settings(config: &Config, action: SettingsAction) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    match action {
        SettingsAction::Set {
            ha_url,
            ha_token,
            tg_token,
            chat_id,
            interval,
        } => {
            if let Some(raw) = interval.as_deref().filter(|v| !v.is_empty()) {
                anyhow::ensure!(
                    parse_interval(raw).is_some(),
                    "interval must be a positive whole number of minutes"
                );
            }

            let updates = [
                (SettingKey::HaUrl, ha_url),
                (SettingKey::HaToken, ha_token),
                (SettingKey::TgToken, tg_token),
                (SettingKey::ChatId, chat_id),
                (SettingKey::CronInterval, interval),
            ];
            let mut changed = 0_usize;
            for (key, value) in updates {
                let Some(value) = value.filter(|v| !v.is_empty()) else {
                    continue;
                };
                store.set_setting(key.as_str(), &value).await?;
                changed = changed.saturating_add(1);
            }

            if changed == 0 {
                println!("Nothing to update");
            } else {
                println!("Updated {changed} setting(s)");
            }
        }
        SettingsAction::Show => {
            let settings = Settings::load(&*store).await;
            for key in SettingKey::ALL {
                let value = settings.get(key);
                let shown = if key.is_secret() {
                    mask_secret(value)
                } else {
                    value.to_owned()
                };
                println!("{}: {}", key.as_str(), shown);
            }
        }
    }
    Ok(())
}

async fn handle_sensors(config: &Config, action: SensorsAction) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    match action {
        SensorsAction::Add { name, min, max } => match store.add_sensor(&name, min, max).await {
            Ok(id) => println!("Added sensor {name} with id {id}"),
            Err(StoreError::AlreadyRegistered(name)) => {
                anyhow::bail!("sensor already registered: {name}")
            }
            Err(e) => return Err(e.into()),
        },
        SensorsAction::List => {
            let sensors = store.list_sensors().await?;
            if sensors.is_empty() {
                println!("No sensors registered");
            }
            for sensor in &sensors {
                println!("{sensor}");
            }
        }
        SensorsAction::Remove { id } => {
            if store.remove_sensor(id).await? {
                println!("Removed sensor {id}");
            } else {
                println!("No sensor with id {id}");
            }
        }
        SensorsAction::Thresholds { id, min, max } => {
            store.update_thresholds(id, min, max).await?;
            println!("Updated thresholds for sensor {id}");
        }
    }
    Ok(())
}
