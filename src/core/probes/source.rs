//! Where a probe's raw text comes from: an external command or a file.

use std::{fmt, path::PathBuf, process::Stdio};

use tokio::process::Command;
use tracing::trace;

use super::{error::ProbeError, types::ProbeResult};

/// An argv-style command line. The first element is the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Builds from a configured argv; `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Runs the command to completion and returns its stdout.
    ///
    /// Fails when the program cannot start, writes anything to stderr, or
    /// exits unsuccessfully. Empty stdout is not an error here; probes decide
    /// what empty means for them.
    pub async fn run(&self) -> ProbeResult<String> {
        trace!(command = %self, "Running command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::CommandExecution {
                command: self.to_string(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(ProbeError::CommandStderr {
                command: self.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !output.status.success() {
            return Err(ProbeError::CommandStatus {
                command: self.to_string(),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Raw text origin for a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Command(CommandLine),
    File(PathBuf),
}

impl Source {
    pub async fn read(&self) -> ProbeResult<String> {
        match self {
            Source::Command(command) => command.run().await,
            Source::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| ProbeError::FileRead {
                        path: path.display().to_string(),
                        source,
                    })?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    /// Human-readable origin used in errors and logs.
    pub fn location(&self) -> String {
        match self {
            Source::Command(command) => command.to_string(),
            Source::File(path) => path.display().to_string(),
        }
    }
}
