use std::time::Duration;

use thiserror::Error;

/// Why a probe produced nothing for this cycle.
///
/// None of these stop the cycle: the probe logs the error and its report
/// fields stay empty.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The command could not be started at all.
    #[error("Command '{command}' failed to start: {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command wrote to stderr. Output on stderr is treated as failure
    /// even when the exit status is zero.
    #[error("Command '{command}' reported an error: {stderr}")]
    CommandStderr { command: String, stderr: String },

    #[error("Command '{command}' exited with {status}")]
    CommandStatus { command: String, status: String },

    #[error("No output from {location}")]
    EmptyOutput { location: String },

    #[error("Failed to parse {metric} from {location}: {reason}")]
    ParseError {
        metric: String,
        location: String,
        reason: String,
    },

    #[error("Missing required field: {field} in {location}")]
    MissingField { field: String, location: String },

    #[error("Probe '{probe}' did not finish within {after:?}")]
    Timeout { probe: String, after: Duration },
}
