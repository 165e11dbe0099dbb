// LinkVault - In-memory index and consistency layer for download queues
// Copyright (C) 2025 LinkVault contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! CLI argument definitions for LinkVault.

use crate::core::types::{DownloadState, DownloadStatus, PackageRef};
use clap::{Parser, Subcommand, ValueEnum};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plugin recorded for links added from the command line
pub const DEFAULT_PLUGIN: &str = "BasePlugin";

#[derive(Parser, Debug)]
#[command(name = "linkvault")]
#[command(author = "LinkVault Team")]
#[command(version = VERSION)]
#[command(about = "Inspect and edit a hierarchical download queue")]
#[command(long_about = "LinkVault keeps packages of download links in a SQLite queue.\n\n\
    Packages nest, files and packages keep a dense order among their siblings,\n\
    and every change goes through a cache that keeps views coherent.")]
pub struct Cli {
    /// Don't ask for confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Be verbose (show debug info and dispatched events)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Be quiet (minimal output)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use specific config file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<String>,

    /// Use specific queue database
    #[arg(long, value_name = "FILE", global = true, env = "LINKVAULT_DATABASE")]
    pub database: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// JSON output for scripting
    Json,
    /// Plain text (no colors, simple format)
    Plain,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage packages
    Package {
        #[command(subcommand)]
        action: PackageAction,
    },

    /// Manage links (files)
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Show the package tree
    Tree {
        /// Package to start from (omit for the root)
        package: Option<i64>,
        /// Walk the whole subtree instead of one level
        #[arg(short, long)]
        full: bool,
        /// Only files in this state
        #[arg(short, long, value_enum)]
        state: Option<StateFilter>,
        /// Only files whose name contains this
        #[arg(long)]
        search: Option<String>,
        /// Only entries of this owner
        #[arg(long)]
        owner: Option<i64>,
    },

    /// Show queue and download statistics
    Stats {
        /// Restrict to one owner
        #[arg(long)]
        owner: Option<i64>,
    },

    /// Show the next job per owner
    Jobs {
        /// Plugins that are busy and must be skipped
        #[arg(long = "occupied", value_name = "PLUGIN")]
        occupied: Vec<String>,
    },

    /// Queue every failed link again
    RestartFailed,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Package subcommands
#[derive(Subcommand, Debug)]
pub enum PackageAction {
    /// Create a package
    Add {
        name: String,
        /// Parent package (omit for the root)
        #[arg(long)]
        parent: Option<i64>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, default_value = "")]
        password: String,
        #[arg(long, default_value = "")]
        site: String,
        #[arg(long, default_value = "")]
        comment: String,
        /// Create the package paused
        #[arg(long)]
        paused: bool,
        #[arg(long, default_value = "0")]
        owner: i64,
    },
    /// Delete a package and everything below it
    Remove { pid: i64 },
    /// Move a package under another one
    Move {
        pid: i64,
        /// New parent (omit for the root)
        #[arg(long)]
        to: Option<i64>,
    },
    /// Change the position of a package among its siblings
    Order { pid: i64, position: i64 },
    /// Queue every link of a package again
    Restart { pid: i64 },
    /// Run an online check for the links of a package
    Recheck { pid: i64 },
    /// Show package details
    Info {
        /// Package id (omit for the root)
        pid: Option<i64>,
    },
}

/// Link subcommands
#[derive(Subcommand, Debug)]
pub enum LinkAction {
    /// Add links to a package
    Add {
        pid: i64,
        #[arg(required = true)]
        urls: Vec<String>,
        /// Plugin responsible for the links
        #[arg(long, default_value = DEFAULT_PLUGIN)]
        plugin: String,
        #[arg(long, default_value = "0")]
        owner: i64,
    },
    /// Delete links
    Remove {
        #[arg(required = true)]
        fids: Vec<i64>,
    },
    /// Move links to another package
    Move {
        #[arg(required = true)]
        fids: Vec<i64>,
        #[arg(long)]
        to: i64,
    },
    /// Move a contiguous block of links inside their package
    Order {
        pid: i64,
        position: i64,
        #[arg(required = true)]
        fids: Vec<i64>,
    },
    /// Queue a link again
    Restart { fid: i64 },
    /// Set the download status of a link
    Status {
        fid: i64,
        /// Status label or numeric code
        #[arg(value_parser = parse_status)]
        status: DownloadStatus,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Generate default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

/// File state filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateFilter {
    All,
    Finished,
    Unfinished,
    Failed,
    Unmanaged,
}

impl From<StateFilter> for DownloadState {
    fn from(filter: StateFilter) -> Self {
        match filter {
            StateFilter::All => DownloadState::All,
            StateFilter::Finished => DownloadState::Finished,
            StateFilter::Unfinished => DownloadState::Unfinished,
            StateFilter::Failed => DownloadState::Failed,
            StateFilter::Unmanaged => DownloadState::Unmanaged,
        }
    }
}

/// Shell types for completion generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<Shell> for clap_complete::Shell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}

/// Accept a status label ("temp. offline"), its identifier ("temp_offline") or its code
pub fn parse_status(value: &str) -> Result<DownloadStatus, String> {
    if let Ok(code) = value.parse::<i64>() {
        return DownloadStatus::ALL
            .iter()
            .copied()
            .find(|status| status.code() == code)
            .ok_or_else(|| format!("unknown status code {}", code));
    }

    let wanted = normalize(value);
    DownloadStatus::ALL
        .iter()
        .copied()
        .find(|status| normalize(status.label()) == wanted || normalize(&format!("{:?}", status)) == wanted)
        .ok_or_else(|| format!("unknown status '{}'", value))
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Map an optional CLI package id onto a package reference
pub fn package_ref(pid: Option<i64>) -> PackageRef {
    pid.map(PackageRef::from_raw).unwrap_or_default()
}

impl Cli {
    /// Check if confirmation should be skipped
    pub fn skip_confirm(&self) -> bool {
        self.yes
    }

    /// Get effective verbosity level
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Whether the command changes the queue
    pub fn is_read_only(&self) -> bool {
        match &self.command {
            Commands::Package { action } => matches!(action, PackageAction::Info { .. }),
            Commands::Link { .. } | Commands::RestartFailed => false,
            _ => true,
        }
    }
}

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_add_parsing() {
        let cli = Cli::parse_from(["linkvault", "package", "add", "Movies", "--parent", "3", "--paused"]);
        match cli.command {
            Commands::Package { action: PackageAction::Add { name, parent, paused, owner, .. } } => {
                assert_eq!(name, "Movies");
                assert_eq!(parent, Some(3));
                assert!(paused);
                assert_eq!(owner, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_link_order_parsing() {
        let cli = Cli::parse_from(["linkvault", "link", "order", "4", "3", "11", "12"]);
        match cli.command {
            Commands::Link { action: LinkAction::Order { pid, position, fids } } => {
                assert_eq!((pid, position), (4, 3));
                assert_eq!(fids, vec![11, 12]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["linkvault", "tree", "--full", "-v", "--output", "json"]);
        assert_eq!(cli.verbosity(), Verbosity::Verbose);
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.is_read_only());
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::parse_from(["linkvault", "-q", "stats"]);
        assert_eq!(cli.verbosity(), Verbosity::Quiet);
        assert!(Cli::try_parse_from(["linkvault", "-q", "-v", "stats"]).is_err());
    }

    #[test]
    fn test_is_read_only() {
        let cli = Cli::parse_from(["linkvault", "package", "remove", "2"]);
        assert!(!cli.is_read_only());
        let cli = Cli::parse_from(["linkvault", "package", "info"]);
        assert!(cli.is_read_only());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("temp. offline"), Ok(DownloadStatus::TempOffline));
        assert_eq!(parse_status("temp_offline"), Ok(DownloadStatus::TempOffline));
        assert_eq!(parse_status("Finished"), Ok(DownloadStatus::Finished));
        assert_eq!(parse_status("3"), Ok(DownloadStatus::Queued));
        assert!(parse_status("99").is_err());
        assert!(parse_status("exploded").is_err());
    }

    #[test]
    fn test_package_ref() {
        assert_eq!(package_ref(None), PackageRef::Root);
        assert_eq!(package_ref(Some(-1)), PackageRef::Root);
        assert_eq!(package_ref(Some(8)), PackageRef::Id(8));
    }
}
