//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pdv-agent")]
#[command(
    version,
    about = "Headless PDV terminal agent: scale, local store and sync",
    long_about = None
)]
pub struct Cli {
    /// Configuration directory (otherwise PDV_CONFIG_DIR, ./config, then the platform dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Scale state, pending sync counts and API reachability
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Read the scale once
    Weigh {
        /// Poll until the scale reports a stable weight
        #[arg(long)]
        stable: bool,

        /// Seconds to wait for a stable weight
        #[arg(long, default_value_t = 5.0)]
        timeout: f64,
    },

    /// Tare the scale
    Tare,

    /// Zero the scale
    Zero,

    /// Run one sync pass and print its report
    Sync,

    /// Run the sync worker until Ctrl-C
    Run,

    /// Copy the local database to `path` (default: next to the database)
    Backup { path: Option<PathBuf> },

    /// Local database path, size and row counts
    Info,

    /// Read or write terminal settings stored in the local database
    #[command(subcommand)]
    Setting(SettingCommand),
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum SettingCommand {
    Get { key: String },
    Set { key: String, value: String },
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_weigh_defaults() {
        let cli = Cli::try_parse_from(["pdv-agent", "weigh"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Weigh {
                stable: false,
                timeout: 5.0
            }
        );
        assert_eq!(cli.config_dir, None);
    }

    #[test]
    fn test_global_config_dir_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pdv-agent", "weigh", "--stable", "--timeout", "2.5", "--config-dir", "/etc/pdv",
        ])
        .unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/etc/pdv")));
        assert_eq!(
            cli.command,
            Command::Weigh {
                stable: true,
                timeout: 2.5
            }
        );
    }

    #[test]
    fn test_setting_subcommands() {
        let cli =
            Cli::try_parse_from(["pdv-agent", "setting", "set", "terminal_id", "T02"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Setting(SettingCommand::Set {
                key: "terminal_id".into(),
                value: "T02".into()
            })
        );
        assert!(Cli::try_parse_from(["pdv-agent", "setting", "get"]).is_err());
    }

    #[test]
    fn test_backup_path_is_optional() {
        let cli = Cli::try_parse_from(["pdv-agent", "backup"]).unwrap();
        assert_eq!(cli.command, Command::Backup { path: None });
    }
}
