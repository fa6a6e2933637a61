//! # pdv-agent Entry Point
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Startup Sequence                               │
//! │                                                                         │
//! │  1. Parse CLI ──────────────► --config-dir, subcommand                  │
//! │  2. Resolve config dir ─────► flag, PDV_CONFIG_DIR, ./config, platform  │
//! │  3. Load config domains ────► api, database, equipment, ui, logging     │
//! │  4. Initialize logging ─────► RUST_LOG / logging.* / default filter     │
//! │  5. Report config problems found before logging was up                  │
//! │  6. Run the subcommand                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use pdv_config::{resolve_config_dir, ConfigResolver};
use tracing::{info, warn};

use cli::Cli;
use logging::LoggingSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigResolver::load(resolve_config_dir(cli.config_dir.clone()));
    let (logging_settings, logging_error) = LoggingSettings::from_config(&config);
    let _guard = logging::init_logging(&logging_settings)?;

    // the resolver logged these before any subscriber existed
    for issue in config.load_issues() {
        warn!(issue = %issue, "Configuration problem");
    }
    if let Some(e) = logging_error {
        warn!(error = %e, "Invalid logging config, using defaults");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %config.dir().display(),
        "pdv-agent starting"
    );

    commands::execute(cli.command, &config).await
}
