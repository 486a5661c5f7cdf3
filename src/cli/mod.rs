use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::backends::BackupEntry;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::job::Operation;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MEGABYTE: f64 = 1024.0 * 1024.0;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Path of the configuration file.
    #[arg(long, env = "BACKUPTOOL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Only run the given job, may be repeated. Runs all jobs by default.
    #[arg(long = "job", short = 'j')]
    pub jobs: Vec<String>,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create a backup and upload it to the target.
    Create {
        /// Delete outdated backups afterwards.
        #[arg(long)]
        rotate: bool,
    },
    /// Restore the newest backup. Overwrites files, databases and the directory!
    Restore,
    /// List the existing backups.
    List {
        /// Print the backups as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete all but the configured number of newest backups.
    Rotate,
    /// Delete a single backup.
    Delete {
        /// File name or object key of the backup.
        identifier: String,
    },
}

impl From<&Action> for Operation {
    fn from(action: &Action) -> Self {
        match action {
            Action::Create { rotate } => Operation::Create { rotate: *rotate },
            Action::Restore => Operation::Restore,
            Action::List { .. } => Operation::List,
            Action::Rotate => Operation::Rotate,
            Action::Delete { identifier } => Operation::Delete {
                identifier: identifier.clone(),
            },
        }
    }
}

/// Renders the backups of a job as a tree:
///
/// ```text
/// db1 (FILE):
/// ├─ backup-db1-20240101000000.tar.gz  0.50 MB  2024-01-01 00:00:00
/// └─ backup-db1-20240102000000.tar.gz  0.50 MB  2024-01-02 00:00:00
/// ```
pub fn render_listing(job: &str, kind: &str, entries: &[BackupEntry]) -> String {
    let mut out = format!("{job} ({kind}):\n");
    if entries.is_empty() {
        out.push_str("  <no backups>\n");
        return out;
    }

    for (i, entry) in entries.iter().enumerate() {
        let branch = if i + 1 == entries.len() { "└─" } else { "├─" };
        let size = entry
            .size
            .map(|size| format!("{:.2} MB", size as f64 / MEGABYTE))
            .unwrap_or_else(|| "? MB".to_string());
        let date = entry.modified.unwrap_or_else(|| entry.name.timestamp());
        out.push_str(&format!(
            "{branch} {}  {size}  {}\n",
            entry.name,
            date.format(DATE_FORMAT)
        ));
    }
    out
}
