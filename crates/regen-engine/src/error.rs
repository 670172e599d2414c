//! Error types for the demo host binary.
//!
//! [`EngineError`] wraps every failure mode of startup and the demo run so
//! `main` can propagate with `?`.

/// Top-level error for the demo host.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: regen_core::config::ConfigError,
    },

    /// A built-in state spec failed to parse.
    #[error("state error: {source}")]
    State {
        /// The underlying parse error.
        #[from]
        source: regen_types::StateParseError,
    },

    /// The `demo` section of the config file is malformed.
    #[error("demo config error: {message}")]
    Demo {
        /// Description of the failure.
        message: String,
    },

    /// A burst worker task failed.
    #[error("burst worker failed: {source}")]
    Burst {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },

    /// The status report could not be serialised.
    #[error("status serialisation failed: {source}")]
    Status {
        /// The underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
}
