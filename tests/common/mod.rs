//! # common
//!
//! A fake [CommandRunner] standing in for the system tools, and helpers to
//! build jobs on a `file://` target.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use backuptool_lib::command::{CommandError, CommandLine, CommandRunner};
use backuptool_lib::config::{BackupJob, Config};
use walkdir::WalkDir;

/// Prepended to "encrypted" files, which also have their bytes reversed.
const FAKE_GPG_HEADER: &[u8] = b"FAKE-GPG\n";

/// Records every command and emulates the tools whose output is needed later.
///
/// - `gpg --encrypt`/`--decrypt` transform the input reversibly.
/// - `slapcat -l <file>` writes a fake directory dump.
/// - `rsync -a <src>/ <dest>` copies the tree.
/// - Redirected stdout, e.g. of `mysqldump`, receives a fake dump.
#[derive(Default)]
pub struct FakeRunner {
    commands: RefCell<Vec<String>>,
    failing: Option<&'static str>,
}

impl FakeRunner {
    /// A runner on which `program` exits unsuccessfully.
    pub fn failing(program: &'static str) -> Self {
        Self {
            failing: Some(program),
            ..Default::default()
        }
    }

    /// Every command run so far, secrets masked.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Program names of every command run so far.
    pub fn programs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter_map(|command| command.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.commands.borrow_mut().clear();
    }
}

fn value_after(args: &[OsString], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn fake_gpg(args: &[OsString]) -> io::Result<()> {
    let output = value_after(args, "--output")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no --output"))?;
    let input = args
        .last()
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no input"))?;
    let content = fs::read(input)?;

    if args.iter().any(|arg| arg == "--encrypt") {
        let mut encrypted = FAKE_GPG_HEADER.to_vec();
        encrypted.extend(content.iter().rev());
        fs::write(output, encrypted)
    } else {
        let body = content
            .strip_prefix(FAKE_GPG_HEADER)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not encrypted"))?;
        let decrypted: Vec<u8> = body.iter().rev().copied().collect();
        fs::write(output, decrypted)
    }
}

fn fake_rsync(args: &[OsString]) -> io::Result<()> {
    let [.., src, dest] = args else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "rsync needs src and dest"));
    };
    let src = Path::new(src);
    let dest = Path::new(dest);

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &CommandLine) -> Result<(), CommandError> {
        let line = command.to_string();
        self.commands.borrow_mut().push(line.clone());

        let program = command.program().to_string_lossy().into_owned();
        if self.failing == Some(program.as_str()) {
            return Err(CommandError::Failed {
                command: line,
                status: "exit status: 1".to_string(),
                stderr: "failing on purpose".to_string(),
            });
        }

        let args: Vec<OsString> = command.raw_args().cloned().collect();
        let emulated = match program.as_str() {
            "gpg" => fake_gpg(&args),
            "rsync" => fake_rsync(&args),
            "slapcat" => match value_after(&args, "-l") {
                Some(dump) => fs::write(dump, "dn: dc=example,dc=com\n"),
                None => Ok(()),
            },
            _ => Ok(()),
        };
        let emulated = emulated.and_then(|()| match command.stdout() {
            Some(stdout) => fs::write(stdout, format!("-- {line}\n")),
            None => Ok(()),
        });

        emulated.map_err(|source| CommandError::NotRun {
            command: line,
            source,
        })
    }
}

/// A validated job `name` backing up to the directory `target`.
///
/// `extra` is appended to the job's TOML table.
pub fn file_job(name: &str, target: &Path, rotate: usize, extra: &str) -> BackupJob {
    let config = format!(
        "[jobs.{name}]\ntarget = 'file://{}'\nrotate = {rotate}\n{extra}\n",
        target.display()
    );
    let config = Config::from_toml(&config).unwrap();
    config.jobs(&[]).remove(0).unwrap()
}

/// Creates empty files named `names` in `dir`.
pub fn touch(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), "").unwrap();
    }
}

/// Names of the files in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
