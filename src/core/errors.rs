use thiserror::Error;

use crate::core::ids::ComputerId;

/// Unified error type for the compute grid
#[derive(Debug, Error)]
pub enum GridError {
    /// A call to a specific machine failed; the space recovers by evicting it
    #[error("Transport failure talking to {computer}: {message}")]
    Transport {
        computer: ComputerId,
        message: String,
    },

    /// Submission attempted while no computer is registered
    #[error("No computers registered with the space")]
    NoComputers,

    #[error("Unknown computer: {0}")]
    UnknownComputer(ComputerId),

    #[error("Computer already registered: {0}")]
    DuplicateComputer(ComputerId),

    /// A closure received more child outcomes than its join counter allowed
    #[error("Join overflow on successor {task_id}")]
    JoinOverflow { task_id: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error("Workers already started on {0}")]
    AlreadyStarted(ComputerId),

    #[error("Space is shutting down")]
    ShuttingDown,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GridError {
    /// Create a transport error for a computer
    pub fn transport<M: Into<String>>(computer: &ComputerId, message: M) -> Self {
        Self::Transport {
            computer: computer.clone(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::NoComputers | Self::UnknownComputer(_) | Self::DuplicateComputer(_) => {
                "registry"
            }
            Self::JoinOverflow { .. } => "join",
            Self::Configuration { .. } | Self::Json(_) | Self::Yaml(_) => "configuration",
            Self::AlreadyStarted(_) => "lifecycle",
            Self::ShuttingDown => "lifecycle",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GridError>;
