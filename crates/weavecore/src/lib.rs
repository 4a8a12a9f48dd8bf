//! Core abstractions for the weave workflow engine
//!
//! This crate provides the graph model, run records and the traits that the
//! runtime, the node handlers and the persistence layer meet at. It performs
//! no I/O of its own.

mod error;
pub mod events;
mod kinds;
mod node;
mod recorder;
pub mod run;
pub mod services;
mod value;
mod workflow;

pub use error::{EngineError, NodeError, RecorderError, ServiceError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, NodeEvent};
pub use kinds::{
    CropImageConfig, ExtractFrameConfig, LlmConfig, NodeKind, NodeType, TextConfig,
    UploadImageConfig, UploadVideoConfig,
};
pub use node::{NodeContext, NodeDispatcher, NodeOutput};
pub use recorder::RunRecorder;
pub use run::{
    NodeRun, NodeRunId, NodeRunUpdate, RunId, RunScope, RunStatus, RunUpdate, WorkflowRun,
};
pub use value::{Record, Value};
pub use workflow::{
    record, Edge, GraphNode, NodeId, Position, Viewport, Workflow, WorkflowId,
    DEFAULT_SOURCE_HANDLE, DEFAULT_TARGET_HANDLE,
};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
