//! Workflow execution runtime
//!
//! Design-time checks (handle types, cycles), the planner and input collector,
//! the sequential executor, the in-memory record store and the runtime facade
//! that launches runs in the background.

mod catalog;
mod collector;
mod executor;
mod planner;
mod runtime;
mod store;
mod validation;

pub use catalog::{NodeCatalog, NodeDescriptor, PortDefinition};
pub use collector::{collect_node_inputs, NodeOutputs};
pub use executor::{NodeFailure, RunReport, WorkflowExecutor};
pub use planner::{create_execution_plan, ExecutionPlan};
pub use runtime::{ExecuteRequest, RunHandle, RuntimeConfig, WeaveRuntime};
pub use store::{MemoryStore, WorkflowPatch, RECENT_RUNS};
pub use validation::{
    check_connection, connect_checked, validate_connection, validate_connection_names,
    validate_graph, would_create_cycle, ConnectionValidation, HandleType,
};
