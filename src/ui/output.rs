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

//! Output formatting for LinkVault.

use crate::cli::args::OutputFormat;
use crate::core::types::{
    DownloadStats, DownloadStatus, FileInfo, PackageInfo, PackageStatus, QueueStats,
    TreeCollection, UserId,
};
use crate::events::Event;
use comfy_table::{presets::ASCII_BORDERS_ONLY_CONDENSED, presets::UTF8_FULL, Table};
use console::style;
use serde::Serialize;
use serde_json::json;

/// Output formatter
pub struct Output {
    format: OutputFormat,
    colors: bool,
}

impl Output {
    /// Create a new output formatter
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colors: format == OutputFormat::Human,
        }
    }

    /// Disable colors
    pub fn no_colors(mut self, disable: bool) -> Self {
        if disable {
            self.colors = false;
        }
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Print a tree view
    pub fn print_tree(&self, tree: &TreeCollection) {
        if self.format == OutputFormat::Json {
            self.print_json(tree);
            return;
        }
        let Some(root) = &tree.root else {
            self.warn("package does not exist");
            return;
        };
        for line in render_tree(tree, root, self.colors) {
            println!("{}", line);
        }
    }

    /// Print a single package
    pub fn print_package(&self, info: &PackageInfo) {
        if self.format == OutputFormat::Json {
            self.print_json(info);
            return;
        }

        let stats = info.stats.unwrap_or_default();
        let rows = vec![
            vec!["id".to_string(), info.pid.to_string()],
            vec!["name".to_string(), info.name.clone()],
            vec!["folder".to_string(), info.folder.clone()],
            vec!["parent".to_string(), info.root.to_string()],
            vec!["order".to_string(), info.order.to_string()],
            vec!["status".to_string(), package_status_label(info.status).to_string()],
            vec!["owner".to_string(), info.owner.to_string()],
            vec!["site".to_string(), info.site.clone()],
            vec!["comment".to_string(), info.comment.clone()],
            vec!["links".to_string(), format!("{}/{}", stats.links_done, stats.links_total)],
            vec!["size".to_string(), format!("{}/{}", format_size(stats.size_done), format_size(stats.size_total))],
            vec!["packages".to_string(), join_ids(&info.pids)],
            vec!["files".to_string(), join_ids(&info.fids)],
        ];
        self.print_table(vec!["field", "value"], rows);
    }

    /// Print queue and download statistics
    pub fn print_stats(&self, queue: &QueueStats, downloads: &DownloadStats) {
        match self.format {
            OutputFormat::Json => self.print_json(&json!({ "queue": queue, "downloads": downloads })),
            _ => {
                let rows = vec![
                    vec!["queued files".to_string(), queue.files.to_string()],
                    vec!["queued size".to_string(), format_size(queue.bytes)],
                    vec![
                        "finished files".to_string(),
                        format!("{}/{} ({:.1}%)", downloads.done_files, downloads.total_files, downloads.percent()),
                    ],
                    vec![
                        "finished size".to_string(),
                        format!("{}/{}", format_size(downloads.done_bytes), format_size(downloads.total_bytes)),
                    ],
                ];
                self.print_table(vec!["statistic", "value"], rows);
            }
        }
    }

    /// Print the next job per owner
    pub fn print_jobs(&self, jobs: &[(UserId, FileInfo)]) {
        if self.format == OutputFormat::Json {
            let jobs: Vec<_> = jobs.iter().map(|(owner, file)| json!({ "owner": owner, "file": file })).collect();
            self.print_json(&jobs);
            return;
        }
        if jobs.is_empty() {
            self.info("no jobs available");
            return;
        }
        let rows = jobs
            .iter()
            .map(|(owner, file)| {
                vec![
                    owner.to_string(),
                    file.fid.to_string(),
                    file.package.to_string(),
                    file.name.clone(),
                    file.plugin.clone(),
                ]
            })
            .collect();
        self.print_table(vec!["owner", "fid", "package", "name", "plugin"], rows);
    }

    /// Print a dispatched event
    pub fn print_event(&self, event: &Event) {
        match self.format {
            OutputFormat::Json => self.print_json(event),
            OutputFormat::Human if self.colors => println!("{} {}", style("»").magenta().bold(), event),
            _ => println!("> {}", event),
        }
    }

    /// Print any serializable value as JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        if let Ok(json) = serde_json::to_string_pretty(data) {
            println!("{}", json);
        }
    }

    /// Print a table
    pub fn print_table(&self, headers: Vec<&str>, rows: Vec<Vec<String>>) {
        match self.format {
            OutputFormat::Human | OutputFormat::Plain => {
                let mut table = Table::new();
                if self.format == OutputFormat::Human {
                    table.load_preset(UTF8_FULL);
                } else {
                    table.load_preset(ASCII_BORDERS_ONLY_CONDENSED);
                }
                table.set_header(headers);
                for row in rows {
                    table.add_row(row);
                }
                println!("{}", table);
            }
            OutputFormat::Json => {
                let objects: Vec<_> = rows
                    .iter()
                    .map(|row| {
                        headers
                            .iter()
                            .zip(row.iter())
                            .map(|(h, v)| (h.to_string(), v.clone()))
                            .collect::<std::collections::BTreeMap<_, _>>()
                    })
                    .collect();
                self.print_json(&objects);
            }
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colors {
            eprintln!("{} {}", style("error:").red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        if self.colors {
            eprintln!("{} {}", style("warning:").yellow().bold(), message);
        } else {
            eprintln!("warning: {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.format == OutputFormat::Json {
            return;
        }
        if self.colors {
            println!("{} {}", style("::").bold().cyan(), message);
        } else {
            println!(":: {}", message);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Json {
            self.print_json(&json!({ "ok": true, "message": message }));
        } else if self.colors {
            println!("{} {}", style("✓").green().bold(), message);
        } else {
            println!("+ {}", message);
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new(OutputFormat::Human)
    }
}

/// Indented lines for a tree view, children in sibling order
pub fn render_tree(tree: &TreeCollection, root: &PackageInfo, colors: bool) -> Vec<String> {
    let mut lines = vec![package_line(root, colors)];
    render_children(tree, root, 1, colors, &mut lines);
    lines
}

fn render_children(tree: &TreeCollection, pack: &PackageInfo, depth: usize, colors: bool, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    for pid in &pack.pids {
        if let Some(child) = tree.packages.get(pid) {
            lines.push(format!("{}{}", indent, package_line(child, colors)));
            render_children(tree, child, depth + 1, colors, lines);
        }
    }
    for fid in &pack.fids {
        if let Some(file) = tree.files.get(fid) {
            lines.push(format!("{}{}", indent, file_line(file, colors)));
        }
    }
}

fn package_line(pack: &PackageInfo, colors: bool) -> String {
    let paused = if pack.status == PackageStatus::Paused { " [paused]" } else { "" };
    let progress = pack
        .stats
        .map(|stats| format!(" ({}/{})", stats.links_done, stats.links_total))
        .unwrap_or_default();
    if colors {
        format!(
            "{} {}{}{}",
            style(format!("[{}]", pack.pid)).cyan().bold(),
            style(&pack.name).bold(),
            style(progress).dim(),
            style(paused).yellow()
        )
    } else {
        format!("[{}] {}{}{}", pack.pid, pack.name, progress, paused)
    }
}

fn file_line(file: &FileInfo, colors: bool) -> String {
    if colors {
        format!(
            "{} {} {}",
            style(format!("#{}", file.fid)).dim(),
            file.name,
            status_style(file.status)
        )
    } else {
        format!("#{} {} ({})", file.fid, file.name, file.status)
    }
}

fn status_style(status: DownloadStatus) -> console::StyledObject<String> {
    let label = format!("({})", status);
    match status {
        DownloadStatus::Finished | DownloadStatus::Skipped => style(label).green(),
        DownloadStatus::Failed
        | DownloadStatus::Aborted
        | DownloadStatus::Offline
        | DownloadStatus::TempOffline
        | DownloadStatus::NotPossible
        | DownloadStatus::FileMismatch => style(label).red(),
        DownloadStatus::Downloading | DownloadStatus::Starting | DownloadStatus::Processing => style(label).cyan(),
        _ => style(label).yellow(),
    }
}

fn package_status_label(status: PackageStatus) -> &'static str {
    match status {
        PackageStatus::Ok => "ok",
        PackageStatus::Paused => "paused",
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

/// Human readable byte size
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::RootPackage;
    use crate::core::types::{PackageRef, PackageStats};

    fn sample_tree() -> TreeCollection {
        let mut root = RootPackage::new().to_info();
        root.pids = vec![1];

        let mut pack = RootPackage::new().to_info();
        pack.pid = PackageRef::Id(1);
        pack.name = "Movies".to_string();
        pack.status = PackageStatus::Paused;
        pack.stats = Some(PackageStats { links_total: 1, ..Default::default() });
        pack.fids = vec![7];

        let file = FileInfo {
            fid: 7,
            name: "movie.mkv".to_string(),
            package: 1,
            owner: 0,
            size: 0,
            status: DownloadStatus::Queued,
            error: String::new(),
            plugin: "BasePlugin".to_string(),
            url: "http://host.example/movie.mkv".to_string(),
            hash: String::new(),
            added: 0,
            order: 0,
        };

        TreeCollection {
            root: Some(root),
            packages: [(1, pack)].into_iter().collect(),
            files: [(7, file)].into_iter().collect(),
        }
    }

    #[test]
    fn test_render_tree_plain() {
        let tree = sample_tree();
        let lines = render_tree(&tree, tree.root.as_ref().unwrap(), false);
        assert_eq!(
            lines,
            vec![
                "[root] root".to_string(),
                "  [1] Movies (0/1) [paused]".to_string(),
                "    #7 movie.mkv (queued)".to_string(),
            ]
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_output_formats() {
        // Just ensure it doesn't panic
        let tree = sample_tree();
        Output::new(OutputFormat::Plain).print_tree(&tree);
        Output::new(OutputFormat::Json).print_tree(&tree);
        Output::new(OutputFormat::Human).no_colors(true).print_jobs(&[]);
        Output::default().print_event(&Event::AllFinished);
    }
}
