//! Flotilla Flow Library
//!
//! The declarative workflow layer: aggregations are JSON-shaped trees of
//! steps, references, and templates, interpreted by a generic engine that
//! dispatches procedure calls through a process-wide registry.
//!
//! - [`value`] — the aggregation value model and builder helpers
//! - [`context`] — the execution context named step results bind into
//! - [`resolve`] — reference and template resolution
//! - [`registry`] — procedure paths → native handlers or aggregations
//! - [`interpreter`] — control operators and recursive dispatch

pub mod context;
pub mod error;
pub mod interpreter;
pub mod registry;
pub mod resolve;
pub mod value;

pub use context::ExecutionContext;
pub use error::{FlowError, FlowResult};
pub use interpreter::{CallContext, Interpreter, MAX_NESTING_DEPTH};
pub use registry::{
    handler, NativeHandler, ProcedureKind, ProcedureMetadata, ProcedureRecord, ProcedureRegistry,
    RegisterOptions,
};
pub use resolve::resolve_input;
pub use value::{
    inverted_reference, is_reference, is_step, named_step, reference, step, step_when, StepDef,
    WhenTag, CONTROL_NAMESPACE, MAP_ITEM_KEY,
};
