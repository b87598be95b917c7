use super::error::ProbeError;

/// Result type shared by probe sampling and parsing.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
