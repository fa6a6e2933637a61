//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use pdv_config::ConfigResolver;
use pdv_db::{Database, DatabaseSettings, PendingCounts};
use pdv_equipment::{
    format_weight, EquipmentManager, ScaleReading, ScaleStatusReport, SharedEquipment,
};
use pdv_sync::{ApiSettings, HttpRemoteClient, RemoteClient, SyncPass, SyncWorker};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::{Command, SettingCommand};

pub async fn execute(command: Command, config: &ConfigResolver) -> Result<()> {
    match command {
        Command::Status { json } => status(config, json).await,
        Command::Weigh { stable, timeout } => weigh(config, stable, timeout).await,
        Command::Tare => scale_action(config, ScaleAction::Tare).await,
        Command::Zero => scale_action(config, ScaleAction::Zero).await,
        Command::Sync => sync_once(config).await,
        Command::Run => run_worker(config).await,
        Command::Backup { path } => {
            let db = open_database(config).await?;
            let written = db.backup(path.as_deref()).await.context("backing up the database")?;
            println!("{}", written.display());
            Ok(())
        }
        Command::Info => {
            let db = open_database(config).await?;
            let info = db.info().await.context("reading database info")?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Setting(action) => setting(config, action).await,
    }
}

// =============================================================================
// Wiring
// =============================================================================

async fn open_database(config: &ConfigResolver) -> Result<Database> {
    let settings: DatabaseSettings = config.section("database", "");
    let path = settings.path.clone();
    Database::new(settings.into())
        .await
        .with_context(|| format!("opening local database {}", path.display()))
}

fn equipment(config: &ConfigResolver) -> Result<SharedEquipment> {
    let manager = EquipmentManager::from_config(config).context("configuring the scale")?;
    Ok(SharedEquipment::new(manager))
}

/// Connects the scale or fails with its last error.
async fn connected_scale(config: &ConfigResolver) -> Result<SharedEquipment> {
    let scale = equipment(config)?;
    if !scale.connect().await? {
        let report = scale.status().await?;
        if !report.enabled {
            bail!("Scale is disabled in equipment.scale.enabled");
        }
        bail!(
            "Scale did not connect: {}",
            report.last_error.unwrap_or_else(|| report.status.clone())
        );
    }
    Ok(scale)
}

fn sync_pass(config: &ConfigResolver, db: Database) -> Result<(SyncPass, ApiSettings)> {
    let settings = ApiSettings::from_resolver(config);
    let remote = Arc::new(HttpRemoteClient::new(&settings).context("configuring the API client")?);
    Ok((SyncPass::new(db, remote, settings.clone()), settings))
}

// =============================================================================
// Scale
// =============================================================================

fn describe(reading: &ScaleReading) -> String {
    format!(
        "{} ({})",
        format_weight(Some(reading.signed_weight())),
        if reading.stable { "stable" } else { "unstable" }
    )
}

async fn weigh(config: &ConfigResolver, stable: bool, timeout: f64) -> Result<()> {
    let timeout = Duration::try_from_secs_f64(timeout)
        .context("--timeout must be a non-negative number of seconds")?;
    let scale = connected_scale(config).await?;

    let reading = if stable {
        scale.wait_for_stable_weight(timeout).await?
    } else {
        scale.read_weight().await?
    };
    let report = scale.status().await?;
    scale.disconnect().await?;

    match reading {
        Some(reading) => {
            println!("{}", describe(&reading));
            Ok(())
        }
        None if stable => bail!("No stable weight within {:.1}s", timeout.as_secs_f64()),
        None => bail!(
            "No reading: {}",
            report.last_error.unwrap_or_else(|| "no answer".to_string())
        ),
    }
}

#[derive(Debug, Clone, Copy)]
enum ScaleAction {
    Tare,
    Zero,
}

async fn scale_action(config: &ConfigResolver, action: ScaleAction) -> Result<()> {
    let scale = connected_scale(config).await?;
    let done = match action {
        ScaleAction::Tare => scale.tare().await?,
        ScaleAction::Zero => scale.zero().await?,
    };
    let report = scale.status().await?;
    scale.disconnect().await?;

    if !done {
        bail!(
            "{action:?} failed: {}",
            report.last_error.unwrap_or_else(|| "no answer".to_string())
        );
    }
    println!("{action:?} done");
    Ok(())
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Serialize)]
struct AgentStatus {
    config_dir: String,
    scale: ScaleStatusReport,
    database_ok: bool,
    pending: Option<PendingCounts>,
    api_reachable: bool,
}

async fn status(config: &ConfigResolver, json: bool) -> Result<()> {
    let scale = match equipment(config) {
        Ok(scale) => scale.status().await?,
        Err(e) => {
            warn!(error = %e, "Scale configuration invalid");
            let mut report = ScaleStatusReport::disabled();
            report.last_error = Some(format!("{e:#}"));
            report
        }
    };

    let (database_ok, pending) = match open_database(config).await {
        Ok(db) => {
            let pending = db.sync_state().pending_counts().await.ok();
            (db.health_check().await, pending)
        }
        Err(e) => {
            warn!(error = %e, "Local database unavailable");
            (false, None)
        }
    };

    let settings = ApiSettings::from_resolver(config);
    let api_reachable = match HttpRemoteClient::new(&settings) {
        Ok(remote) => remote.health_check().await,
        Err(_) => false,
    };

    let status = AgentStatus {
        config_dir: config.dir().display().to_string(),
        scale,
        database_ok,
        pending,
        api_reachable,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("config:   {}", status.config_dir);
    println!(
        "scale:    {}{}",
        status.scale.status,
        status
            .scale
            .brand
            .as_deref()
            .map(|b| format!(" ({b})"))
            .unwrap_or_default()
    );
    if let Some(error) = &status.scale.last_error {
        println!("          last error: {error}");
    }
    println!("database: {}", if status.database_ok { "ok" } else { "unavailable" });
    if let Some(p) = &status.pending {
        println!(
            "pending:  {} (products {}, customers {}, sessions {}, sales {})",
            p.total(),
            p.products,
            p.customers,
            p.cashier_sessions,
            p.sales
        );
    }
    println!("api:      {}", if status.api_reachable { "reachable" } else { "unreachable" });
    Ok(())
}

// =============================================================================
// Sync
// =============================================================================

async fn sync_once(config: &ConfigResolver) -> Result<()> {
    let db = open_database(config).await?;
    let (pass, _) = sync_pass(config, db)?;
    let report = pass.run_once().await.context("sync pass")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean() {
        warn!(
            failed = report.total_failed(),
            pull_errors = report.errors.len(),
            "Sync pass finished with errors"
        );
    }
    Ok(())
}

async fn run_worker(config: &ConfigResolver) -> Result<()> {
    let db = open_database(config).await?;
    let (pass, settings) = sync_pass(config, db)?;
    let (worker, handle) = SyncWorker::new(pass, settings.sync.interval());
    let task = tokio::spawn(worker.run());

    info!(
        interval_secs = settings.sync.interval().as_secs(),
        "Sync worker running; Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    info!("Shutdown signal received");
    handle.shutdown().await?;
    task.await.context("sync worker task")?;
    Ok(())
}

// =============================================================================
// Settings
// =============================================================================

async fn setting(config: &ConfigResolver, action: SettingCommand) -> Result<()> {
    let db = open_database(config).await?;
    let settings = db.settings();
    match action {
        SettingCommand::Get { key } => match settings.get(&key).await? {
            Some(value) => println!("{value}"),
            None => bail!("Setting {key} is not set"),
        },
        SettingCommand::Set { key, value } => {
            settings.set(&key, &value).await?;
            println!("{key} = {value}");
        }
        SettingCommand::List => {
            for (key, value) in settings.all().await? {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdv_core::Decimal;
    use serde_json::json;

    fn config_in(dir: &std::path::Path) -> ConfigResolver {
        std::fs::write(
            dir.join("database.json"),
            json!({ "path": dir.join("pos.db") }).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join("equipment.json"),
            json!({ "scale": { "enabled": false } }).to_string(),
        )
        .unwrap();
        ConfigResolver::load(dir)
    }

    #[test]
    fn test_describe_reading() {
        let reading = ScaleReading {
            weight: Decimal::new(1250, 3),
            negative: true,
            stable: false,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(describe(&reading), "-1.250 kg (unstable)");
    }

    #[tokio::test]
    async fn test_settings_round_trip_through_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        setting(
            &config,
            SettingCommand::Set {
                key: "terminal_id".into(),
                value: "T07".into(),
            },
        )
        .await
        .unwrap();

        let db = open_database(&config).await.unwrap();
        assert_eq!(
            db.settings().get("terminal_id").await.unwrap().as_deref(),
            Some("T07")
        );
        assert!(setting(&config, SettingCommand::Get { key: "missing".into() })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled_scale_refuses_to_weigh() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let err = weigh(&config, false, 1.0).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
