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

use anyhow::Result;
use clap::Parser;
use console::style;
use linkvault::cli::{Cli, Verbosity, VERSION};
use linkvault::core::config::Config;
use linkvault::LinkVaultError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = try_main(&cli) {
        report(&err);
        std::process::exit(1);
    }
}

fn try_main(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(Path::new(path))?,
        None => Config::load()?,
    }
    .with_env_overrides();

    if let Some(database) = &cli.database {
        config.store.database = database.clone();
    }
    if cli.verbosity() == Verbosity::Verbose {
        config.general.verbose = true;
    }
    let config = Config::init(config);

    // keep the guard alive so buffered log lines are flushed on exit
    let _guard = init_tracing(cli, config);
    tracing::debug!("LinkVault v{}", VERSION);

    linkvault::cli::run(cli, config)
}

fn init_tracing(cli: &Cli, config: &Config) -> Option<WorkerGuard> {
    let default_level = if cli.verbosity() == Verbosity::Quiet {
        "error"
    } else if config.general.debug {
        "linkvault=trace"
    } else if config.general.verbose {
        "linkvault=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("LINKVAULT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match file_writer(config) {
        Some((writer, guard)) => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

fn file_writer(config: &Config) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let path = config.log_path()?;
    let dir = path.parent()?;
    let file = path.file_name()?;
    std::fs::create_dir_all(dir).ok()?;

    let appender = tracing_appender::rolling::never(dir, file);
    Some(tracing_appender::non_blocking(appender))
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<LinkVaultError>() {
        Some(known) => {
            eprintln!("{} [{}] {}", style("error:").red().bold(), known.code(), known);
            if let Some(hint) = known.suggestion() {
                eprintln!("  {} {}", style("hint:").cyan(), hint);
            }
        }
        None => eprintln!("{} {:#}", style("error:").red().bold(), err),
    }
}
