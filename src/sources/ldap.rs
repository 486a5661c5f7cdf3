//! Backup of the slapd directory using `slapcat` and `slapadd`.
//!
//! <div class="warning">
//! Restoring wipes the data store of slapd before the dump is imported. If the
//! import fails, the directory stays empty.
//! </div>

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{RestoreError, StagingError};
use crate::command::{CommandLine, CommandRunner};
use crate::config::LdapConfig;

pub const LDAP_DIR: &str = "ldap";
const DUMP_FILE: &str = "dump.ldif";
const DB_CONFIG: &str = "DB_CONFIG";
const DB_CONFIG_FLAGS: &str = "set_flags DB_LOG_AUTOREMOVE";

fn dump_path(stage: &Path) -> PathBuf {
    stage.join(LDAP_DIR).join(DUMP_FILE)
}

/// Dumps the whole directory to `ldap/dump.ldif`.
pub fn dump(runner: &dyn CommandRunner, stage: &Path) -> Result<(), StagingError> {
    let dump_dest = stage.join(LDAP_DIR);
    fs::create_dir_all(&dump_dest).map_err(StagingError::io(&dump_dest))?;

    let dump_file = dump_path(stage);
    log::info!(target: "sources::ldap", "Create directory dump at: {}", dump_file.display());

    let slapcat = CommandLine::new("slapcat")
        .arg("-n1")
        .arg("-l")
        .arg(dump_file);
    runner.run(&slapcat)?;

    Ok(())
}

fn service(action: &str) -> CommandLine {
    CommandLine::new("service").arg("slapd").arg(action)
}

/// Removes everything inside of `datadir`, but not `datadir` itself.
fn wipe(datadir: &Path) -> Result<(), RestoreError> {
    if !datadir.is_dir() {
        fs::create_dir_all(datadir).map_err(RestoreError::io(datadir))?;
        return Ok(());
    }

    for entry in fs::read_dir(datadir).map_err(RestoreError::io(datadir))? {
        let path = entry.map_err(RestoreError::io(datadir))?.path();
        log::trace!(target: "sources::ldap", "Remove {}", path.display());
        let removed = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(RestoreError::io(&path))?;
    }

    Ok(())
}

/// Replaces the directory with the dump of an unpacked backup.
///
/// Returns `false` if the backup contains no directory dump.
pub fn restore(
    runner: &dyn CommandRunner,
    config: &LdapConfig,
    stage: &Path,
) -> Result<bool, RestoreError> {
    let dump_file = dump_path(stage);
    if !stage.join(LDAP_DIR).is_dir() {
        return Ok(false);
    }
    log::info!(target: "sources::ldap", "Restore directory from: {}", dump_file.display());

    runner.run(&service("stop"))?;
    wipe(&config.datadir)?;

    runner.run(&CommandLine::new("slapadd").arg("-l").arg(&dump_file))?;

    let db_config = config.datadir.join(DB_CONFIG);
    let mut db_config_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&db_config)
        .map_err(RestoreError::io(&db_config))?;
    writeln!(db_config_file, "{DB_CONFIG_FLAGS}").map_err(RestoreError::io(&db_config))?;

    let owner = format!("{}:{}", config.system_user, config.system_group);
    runner.run(
        &CommandLine::new("chown")
            .arg("-R")
            .arg(owner)
            .arg(&config.datadir),
    )?;

    runner.run(&service("start"))?;
    log::info!(target: "sources::ldap", "Finished directory restore.");

    Ok(true)
}
