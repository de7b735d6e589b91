//! Dispatcher error types.

use std::path::PathBuf;

use crate::RemoteError;

/// Errors surfaced by the task dispatcher.
///
/// Cloneable so a single initialization outcome can be handed to every
/// caller that asks for it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// Spawning a compute unit thread failed.
    #[error("failed to create compute pool: {0}")]
    PoolCreation(String),

    /// Task parameters could not be turned into a message.
    #[error("failed to serialize task parameters: {0}")]
    Serialization(String),

    /// The precompiled compute module could not be read.
    #[error("failed to read compute module {}: {reason}", path.display())]
    ModuleRead {
        /// Module location.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },

    /// A compute unit reported a failure. Every remote error kind is
    /// normalized into this one.
    #[error("{message}")]
    Runtime {
        /// Remote error message.
        message: String,
        /// Remote stack trace, when the unit provided one.
        stack: Option<String>,
    },

    /// Neither binary compute modules nor a fallback module are available.
    #[error("environment supports neither binary compute modules nor a fallback module")]
    UnsupportedEnvironment,

    /// The dispatcher was disposed.
    #[error("dispatcher has been disposed")]
    Disposed,

    /// The compute unit went away before answering.
    #[error("compute unit disconnected before responding")]
    Disconnected,
}

impl From<RemoteError> for DispatchError {
    fn from(remote: RemoteError) -> Self {
        Self::Runtime {
            message: remote.message,
            stack: remote.stack,
        }
    }
}
