//! Execution of the external tools (`mysqldump`, `slapcat`, `rsync`, `gpg`, ...).
//!
//! Every tool invocation is described by a [CommandLine] and executed by a
//! [CommandRunner], which allows to replace the real system with a recording
//! runner in tests.

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use derive_more::{Display, Error};

use crate::config::Secret;

/// A single argument of a [CommandLine].
#[derive(Clone)]
enum Arg {
    Plain(OsString),
    /// Never displayed, e.g. passwords.
    Secret(OsString),
}

/// Description of an external command.
///
/// The [Display] implementation is suitable for logging since secret arguments are masked.
#[derive(Clone)]
pub struct CommandLine {
    program: OsString,
    args: Vec<Arg>,
    stdin: Option<PathBuf>,
    stdout: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args
            .extend(args.into_iter().map(|arg| Arg::Plain(arg.into())));
        self
    }

    /// Adds `prefix` directly followed by the secret, e.g. `-p<password>`.
    pub fn secret_arg(mut self, prefix: &str, secret: &Secret) -> Self {
        let mut arg = OsString::from(prefix);
        arg.push(secret.expose());
        self.args.push(Arg::Secret(arg));
        self
    }

    /// Feed the content of `path` into the standard input of the command.
    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Write the standard output of the command into `path`.
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    /// Arguments as passed to the program, including secrets.
    pub fn raw_args(&self) -> impl Iterator<Item = &OsString> {
        self.args.iter().map(|arg| match arg {
            Arg::Plain(arg) | Arg::Secret(arg) => arg,
        })
    }

    pub fn stdin(&self) -> Option<&Path> {
        self.stdin.as_deref()
    }

    pub fn stdout(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            match arg {
                Arg::Plain(arg) => write!(f, " {}", arg.to_string_lossy())?,
                Arg::Secret(_) => f.write_str(" ****")?,
            }
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandLine({self})")
    }
}

#[derive(Debug, Display, Error)]
/// Errors on execution of an external command.
pub enum CommandError {
    /// The command couldn't be started.
    #[display("Running `{command}` failed: {source}")]
    NotRun {
        command: String,
        source: io::Error,
    },
    /// Redirecting stdin or stdout of the command failed.
    #[display("Redirecting i/o of `{command}` failed: {source}")]
    Redirect {
        command: String,
        source: io::Error,
    },
    /// The command exited unsuccessfully.
    #[display("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Capability to run external commands.
pub trait CommandRunner {
    /// Runs the command to completion, any non-zero exit is an error.
    fn run(&self, command: &CommandLine) -> Result<(), CommandError>;
}

/// Runs commands on the local system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandLine) -> Result<(), CommandError> {
        log::trace!(target: "command", "Running: {command}");

        let redirect = |source| CommandError::Redirect {
            command: command.to_string(),
            source,
        };

        let mut cmd = Command::new(command.program());
        cmd.args(command.raw_args()).stderr(Stdio::piped());
        match command.stdin() {
            Some(path) => cmd.stdin(File::open(path).map_err(redirect)?),
            None => cmd.stdin(Stdio::null()),
        };
        match command.stdout() {
            Some(path) => cmd.stdout(File::create(path).map_err(redirect)?),
            None => cmd.stdout(Stdio::piped()),
        };

        let output = cmd.output().map_err(|source| CommandError::NotRun {
            command: command.to_string(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim_end().into(),
            });
        }

        // relay stderr
        if !stderr.is_empty() {
            log::warn!(target: "command", "{}", stderr.trim_end());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            log::debug!(target: "command", "{line}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_secrets() {
        let cmd = CommandLine::new("mysqldump")
            .arg("-u")
            .arg("backup")
            .secret_arg("-p", &Secret::from("hunter2"))
            .arg("app")
            .stdout_to("/tmp/app.sql");

        assert_eq!(
            cmd.to_string(),
            "mysqldump -u backup **** app > /tmp/app.sql"
        );
        assert!(cmd.raw_args().any(|arg| arg == "-phunter2"));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_failures() {
        let res = SystemRunner.run(&CommandLine::new("false"));
        assert!(matches!(res, Err(CommandError::Failed { .. })));

        let res = SystemRunner.run(&CommandLine::new("backuptool-no-such-binary"));
        assert!(matches!(res, Err(CommandError::NotRun { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_redirects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        SystemRunner
            .run(&CommandLine::new("echo").arg("hello").stdout_to(&out))
            .unwrap();

        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello\n");
    }
}
