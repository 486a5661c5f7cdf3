//! Backup of plain files and directories.
//!
//! Every match of a job's glob patterns is copied below `files/` of the stage
//! directory, mirroring its absolute path. Restoring syncs that tree back onto
//! the restore root with `rsync`.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::{RestoreError, StagingError};
use crate::command::{CommandLine, CommandRunner};

pub const FILES_DIR: &str = "files";

/// Path of `path` below `root`, e.g. `/etc/hosts` becomes `<root>/etc/hosts`.
fn mirrored(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect();
    root.join(relative)
}

/// Copies all files and directories matching `patterns` into the stage directory.
///
/// Patterns without any match are skipped. Returns the number of copied files.
pub fn stage(patterns: &[String], stage: &Path) -> Result<usize, StagingError> {
    let files_root = stage.join(FILES_DIR);
    let mut copied = 0;

    for pattern in patterns {
        let matches = glob::glob(pattern).map_err(|source| StagingError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        let mut matched = false;
        for member in matches {
            let member = member?;
            let member = std::path::absolute(&member).map_err(StagingError::io(&member))?;
            matched = true;

            if member.starts_with(stage) {
                log::warn!(target: "sources::files", "Skipping the stage directory itself: {}", member.display());
            } else if member.is_file() {
                copied += copy_file(&member, &mirrored(&files_root, &member))?;
            } else if member.is_dir() {
                copied += copy_tree(&member, &mirrored(&files_root, &member), stage)?;
            } else {
                log::warn!(target: "sources::files", "Skipping special file: {}", member.display());
            }
        }

        if !matched {
            log::debug!(target: "sources::files", "Pattern matched nothing: {pattern}");
        }
    }

    log::info!(target: "sources::files", "Staged {copied} file(s)");
    Ok(copied)
}

fn copy_file(src: &Path, dst: &Path) -> Result<usize, StagingError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(StagingError::io(parent))?;
    }
    log::trace!(target: "sources::files", "Copy {} to {}", src.display(), dst.display());
    fs::copy(src, dst).map_err(StagingError::io(src))?;
    Ok(1)
}

fn copy_tree(src: &Path, dst: &Path, stage: &Path) -> Result<usize, StagingError> {
    let mut copied = 0;

    let entries = WalkDir::new(src)
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(stage));
    for entry in entries {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir entries are below the walked directory");
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(StagingError::io(&target))?;
        } else if file_type.is_file() {
            copied += copy_file(entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), StagingError> {
    let link = fs::read_link(src).map_err(StagingError::io(src))?;
    std::os::unix::fs::symlink(link, dst).map_err(StagingError::io(dst))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<(), StagingError> {
    log::warn!(target: "sources::files", "Skipping symlink: {}", src.display());
    Ok(())
}

/// Syncs the staged files of an unpacked backup onto `restore_root`.
///
/// Returns `false` if the backup contains no files.
pub fn restore(
    runner: &dyn CommandRunner,
    stage: &Path,
    restore_root: &Path,
) -> Result<bool, RestoreError> {
    let files_root = stage.join(FILES_DIR);
    if !files_root.is_dir() {
        return Ok(false);
    }
    log::info!(target: "sources::files", "Restore files to {}", restore_root.display());

    // trailing slash: sync the content, not the directory itself
    let mut source = OsString::from(files_root.as_os_str());
    source.push("/");

    let rsync = CommandLine::new("rsync")
        .arg("-a")
        .arg(source)
        .arg(restore_root);
    runner.run(&rsync)?;

    Ok(true)
}
