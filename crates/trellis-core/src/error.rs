use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Routing errors
    #[error("router for node '{node}' produced unknown destination '{destination}'")]
    Routing { node: String, destination: String },

    #[error("node '{node}' visited more than {limit} times, aborting run")]
    LoopLimit { node: String, limit: u32 },

    // Quarantine errors
    #[error("privileged node '{node}' blocked: risk level is high and no quarantine node is configured")]
    Permission { node: String },

    // Node execution errors
    #[error("node '{node}' failed after {attempts} attempts")]
    NodeExecution {
        node: String,
        attempts: u32,
        #[source]
        source: Box<TrellisError>,
    },

    #[error("node execution failed: {0}")]
    Node(String),

    #[error("run cancelled")]
    Cancelled,

    // Resume errors
    #[error("no checkpoint found for run '{0}'")]
    CheckpointNotFound(String),

    #[error("no checkpoint store configured")]
    NoCheckpointStore,

    #[error("no review entry found for run '{0}'")]
    ReviewEntryNotFound(String),

    #[error("no review queue configured")]
    NoReviewQueue,

    // Graph construction errors
    #[error("graph error: {0}")]
    Graph(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // Storage errors
    #[error("database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
