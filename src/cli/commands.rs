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

//! Command dispatch for the LinkVault binary.

use super::args::{package_ref, Cli, Commands, ConfigAction, LinkAction, PackageAction, Verbosity};
use crate::core::config::{generate_default_config, Config};
use crate::core::error::{LinkVaultError, QueueError};
use crate::core::types::{DownloadStatus, NewLink, NewPackage, PackageRef};
use crate::events::{self, EventBus};
use crate::manager::FileManager;
use crate::store::sqlite::SqliteStore;
use crate::ui::Output;
use crate::worker::IdleWorkers;
use anyhow::{Context, Result};
use clap::CommandFactory;
use dialoguer::Confirm;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Run a parsed command line against the configured queue
pub fn run(cli: &Cli, config: &Config) -> Result<()> {
    let out = Output::new(cli.output);

    match &cli.command {
        Commands::Config { action } => return run_config(cli, action, config, &out),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(clap_complete::Shell::from(*shell), &mut cmd, "linkvault", &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let store = SqliteStore::from_config(config)
        .with_context(|| format!("failed to open queue at {}", config.database_path().display()))?;
    let bus = Arc::new(EventBus::new());
    let manager = FileManager::new(Arc::new(store), bus.clone(), Arc::new(IdleWorkers), &config.cache);

    let mut receiver = bus.subscribe();
    let result = dispatch(cli, &manager, &out);

    if cli.verbosity() == Verbosity::Verbose {
        for event in events::drain(&mut receiver) {
            out.print_event(&event);
        }
    }

    if !cli.is_read_only() {
        manager.sync_save()?;
    }
    debug!("Cache after command: {}", manager.cache_stats());
    result
}

fn dispatch(cli: &Cli, manager: &FileManager, out: &Output) -> Result<()> {
    match &cli.command {
        Commands::Package { action } => run_package(cli, action, manager, out),
        Commands::Link { action } => run_link(cli, action, manager, out),
        Commands::Tree { package, full, state, search, owner } => {
            let tree = manager.get_tree(
                package_ref(*package),
                *full,
                state.map(Into::into),
                *owner,
                search.as_deref(),
            )?;
            out.print_tree(&tree);
            Ok(())
        }
        Commands::Stats { owner } => {
            let queue = manager.get_queue_stats(*owner, true)?;
            let downloads = manager.get_download_stats(*owner)?;
            out.print_stats(&queue, &downloads);
            Ok(())
        }
        Commands::Jobs { occupied } => {
            let jobs = manager.get_jobs(occupied)?;
            out.print_jobs(&jobs);
            Ok(())
        }
        Commands::RestartFailed => {
            if !confirm(cli, "Restart every failed link?")? {
                out.info("aborted");
                return Ok(());
            }
            let restarted = manager.restart_failed()?;
            out.success(&format!("restarted {} link(s)", restarted));
            Ok(())
        }
        // handled before the queue is opened
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}

fn run_package(cli: &Cli, action: &PackageAction, manager: &FileManager, out: &Output) -> Result<()> {
    match action {
        PackageAction::Add { name, parent, folder, password, site, comment, paused, owner } => {
            let mut package = NewPackage::new(name.clone(), package_ref(*parent), *owner);
            if let Some(folder) = folder {
                package.folder = folder.clone();
            }
            package.password = password.clone();
            package.site = site.clone();
            package.comment = comment.clone();
            package.paused = *paused;

            let pid = manager.add_package(&package)?;
            out.success(&format!("created package {} ({})", name, pid));
        }
        PackageAction::Remove { pid } => {
            if !confirm(cli, &format!("Remove package {} and everything below it?", pid))? {
                out.info("aborted");
                return Ok(());
            }
            if manager.remove_package(*pid)? {
                out.success(&format!("removed package {}", pid));
            } else {
                out.warn(&format!("package {} does not exist", pid));
            }
        }
        PackageAction::Move { pid, to } => {
            let dest = package_ref(*to);
            if manager.move_package(*pid, dest)? {
                out.success(&format!("moved package {} to {}", pid, describe(dest)));
            } else {
                out.info(&format!("package {} already lives in {}", pid, describe(dest)));
            }
        }
        PackageAction::Order { pid, position } => {
            manager.order_package(*pid, *position)?;
            out.success(&format!("package {} is now at position {}", pid, position));
        }
        PackageAction::Restart { pid } => {
            manager.restart_package(*pid)?;
            out.success(&format!("restarted package {}", pid));
        }
        PackageAction::Recheck { pid } => {
            let queued = manager.recheck_package(*pid)?;
            out.success(&format!("queued online check for {} link(s)", queued));
        }
        PackageAction::Info { pid } => {
            let pid = package_ref(*pid);
            let info = manager
                .get_package_info(pid)?
                .ok_or(LinkVaultError::Queue(QueueError::PackageDoesNotExist(pid)))?;
            out.print_package(&info);
        }
    }
    Ok(())
}

fn run_link(cli: &Cli, action: &LinkAction, manager: &FileManager, out: &Output) -> Result<()> {
    match action {
        LinkAction::Add { pid, urls, plugin, owner } => {
            let links: Vec<NewLink> = urls.iter().map(|url| NewLink::new(url.clone(), plugin.clone())).collect();
            let fids = manager.add_links(&links, *pid, *owner)?;
            out.success(&format!("added {} link(s) to package {}", fids.len(), pid));
        }
        LinkAction::Remove { fids } => {
            if !confirm(cli, &format!("Remove {} link(s)?", fids.len()))? {
                out.info("aborted");
                return Ok(());
            }
            let mut removed = 0;
            for fid in fids {
                if manager.remove_file(*fid)? {
                    removed += 1;
                } else {
                    out.warn(&format!("link {} does not exist", fid));
                }
            }
            out.success(&format!("removed {} link(s)", removed));
        }
        LinkAction::Move { fids, to } => {
            if manager.move_files(fids, *to)? {
                out.success(&format!("moved {} link(s) to package {}", fids.len(), to));
            } else {
                out.info(&format!("links already live in package {}", to));
            }
        }
        LinkAction::Order { pid, position, fids } => {
            manager.order_files(fids, *pid, *position)?;
            out.success(&format!("moved {} link(s) to position {}", fids.len(), position));
        }
        LinkAction::Restart { fid } => {
            if manager.restart_file(*fid)? {
                out.success(&format!("restarted link {}", fid));
            } else {
                out.warn(&format!("link {} does not exist", fid));
            }
        }
        LinkAction::Status { fid, status } => {
            manager
                .get_file_info(*fid)?
                .ok_or(LinkVaultError::Queue(QueueError::FileDoesNotExist(*fid)))?;
            manager.set_download_status(*fid, *status)?;
            out.success(&format!("link {} is now {}", fid, status));

            if *status == DownloadStatus::Finished {
                manager.check_package_finished(*fid)?;
            }
            if !status.is_processable() {
                manager.check_all_links_processed(None)?;
                manager.check_all_links_finished()?;
            }
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, action: &ConfigAction, config: &Config, out: &Output) -> Result<()> {
    let path = cli.config.as_ref().map(PathBuf::from).unwrap_or_else(Config::config_path);

    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(config).context("failed to render config")?;
            println!("{}", rendered);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                out.warn(&format!("{} already exists, use --force to overwrite", path.display()));
                return Ok(());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, generate_default_config())?;
            out.success(&format!("wrote {}", path.display()));
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn confirm(cli: &Cli, prompt: &str) -> Result<bool> {
    if cli.skip_confirm() {
        return Ok(true);
    }
    let answer = Confirm::new().with_prompt(prompt).default(false).interact()?;
    Ok(answer)
}

/// Human wording for a package reference
pub fn describe(pid: PackageRef) -> String {
    match pid {
        PackageRef::Root => "the root".to_string(),
        PackageRef::Id(id) => format!("package {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.store.database = dir.path().join("queue.db").to_string_lossy().into_owned();
        config.general.log_file = None;
        config
    }

    fn exec(config: &Config, args: &[&str]) -> Result<()> {
        let mut argv = vec!["linkvault", "-y", "--output", "plain"];
        argv.extend_from_slice(args);
        run(&Cli::parse_from(argv), config)
    }

    #[test]
    fn test_commands_persist_to_queue() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        exec(&config, &["package", "add", "Movies"]).unwrap();
        exec(&config, &["link", "add", "1", "http://host.example/a.bin", "http://host.example/b.bin"]).unwrap();
        exec(&config, &["link", "order", "1", "0", "2"]).unwrap();
        exec(&config, &["link", "status", "1", "finished"]).unwrap();

        let store = SqliteStore::from_config(&config).unwrap();
        let manager = FileManager::new(Arc::new(store), Arc::new(EventBus::new()), Arc::new(IdleWorkers), &config.cache);
        let tree = manager.get_tree(PackageRef::Id(1), false, None, None, None).unwrap();
        assert_eq!(tree.root.unwrap().fids, vec![2, 1]);
        assert_eq!(tree.files[&1].status, DownloadStatus::Finished);
    }

    #[test]
    fn test_errors_surface_as_queue_errors() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let err = exec(&config, &["package", "info", "42"]).unwrap_err();
        let err = err.downcast_ref::<LinkVaultError>().unwrap();
        assert!(matches!(err, LinkVaultError::Queue(QueueError::PackageDoesNotExist(PackageRef::Id(42)))));

        assert!(exec(&config, &["link", "add", "9", "http://host.example/a.bin"]).is_err());
    }

    #[test]
    fn test_read_only_commands() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        exec(&config, &["tree", "--full"]).unwrap();
        exec(&config, &["stats"]).unwrap();
        exec(&config, &["jobs", "--occupied", "BasePlugin"]).unwrap();
        exec(&config, &["package", "info"]).unwrap();
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(PackageRef::Root), "the root");
        assert_eq!(describe(PackageRef::Id(3)), "package 3");
    }
}
