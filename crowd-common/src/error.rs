use thiserror::Error;

/// Failures shared by the placement generator and the post-processing tools.
///
/// Every variant is terminal for the invocation that produced it.
#[derive(Debug, Error)]
pub enum CrowdError {
    #[error("Malformed trace at line {line}: {reason}")]
    MalformedTrace { line: usize, reason: String },

    #[error("Could not place agents: {placed} of {requested} background agents accepted after {attempts} attempts")]
    InfeasiblePlacement {
        requested: usize,
        placed: usize,
        attempts: u64,
    },

    #[error("Missing agent data at time {time}: expected {expected} agents, found {found}")]
    MissingAgentData {
        time: f64,
        expected: usize,
        found: usize,
    },

    #[error("No recorded runs for heuristic parameter {param}")]
    EmptyMetricGroup { param: f64 },

    #[error("Malformed configuration file at line {line}: {reason}")]
    MalformedConfiguration { line: usize, reason: String },

    #[error("Malformed results store at line {line}: {reason}")]
    MalformedResults { line: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrowdError>;
