use thiserror::Error;

/// Top-level error surfaced to callers of the engine.
///
/// Everything except [`EngineError::Internal`] is raised before a run record exists.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// HTTP-equivalent status class for synchronous API errors.
    pub fn status_class(&self) -> u16 {
        match self {
            EngineError::Validation(_) | EngineError::Serialization(_) => 400,
            EngineError::Unauthorized => 401,
            EngineError::NotFound(_) => 404,
            EngineError::Workflow(WorkflowError::NodeNotFound(_)) => 404,
            EngineError::Workflow(_) => 400,
            EngineError::Recorder(RecorderError::RunNotFound(_))
            | EngineError::Recorder(RecorderError::NodeRunNotFound(_)) => 404,
            EngineError::Recorder(_) | EngineError::Internal(_) => 500,
        }
    }
}

/// Failure of a single node handler. The message becomes the node run's `error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },
}

impl From<ServiceError> for NodeError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Timeout { seconds } => NodeError::Timeout { seconds },
            other => NodeError::ExecutionFailed(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}

/// Failure reported by an external collaborator (completion service, media transform, fetch).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// "Not found"-class failures let the caller move on to the next candidate.
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::NotFound(_) => true,
            ServiceError::Http { status, message } => {
                *status == 404 || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

/// Failure of the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecorderError {
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Node run not found: {0}")]
    NodeRunNotFound(String),

    #[error("Already finished: {0}")]
    AlreadyFinished(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
