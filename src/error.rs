use std::io;
use thiserror::Error;

/// Error type for thread and pool operations.
#[derive(Error, Debug)]
pub enum ThreadError {
    /// The native thread could not be created.
    #[error("Create thread failed: {0}")]
    Spawn(#[source] io::Error),

    /// The operation requires the thread to be stopped.
    #[error("Thread is not stopped")]
    NotStopped,

    /// An object was bound without a method, or a method without an object.
    #[error("Incomplete delegate binding")]
    IncompleteBinding,

    /// A task was submitted without an action.
    #[error("Task has no action")]
    InvalidTask,

    /// The pool no longer accepts work.
    #[error("Worker pool is shutting down")]
    ShuttingDown,

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for threadkit operations.
pub type Result<T> = std::result::Result<T, ThreadError>;
