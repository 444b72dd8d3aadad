use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No name server address configured")]
    MissingBrokerAddresses,

    #[error("Unknown credential: {0}")]
    UnknownCredential(String),

    #[error("Credential '{label}' is missing {missing}")]
    IncompleteCredential { label: String, missing: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ProbeError {
    /// Errors that make the whole run meaningless, as opposed to failing a single scenario.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            ProbeError::Config(_) | ProbeError::InvalidConfig(_) | ProbeError::MissingBrokerAddresses
        )
    }
}
