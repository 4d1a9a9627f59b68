//! Core abstractions for the evalserve command server.
//!
//! This crate provides the fundamental building blocks:
//! - `Value` - Session values and their text rendering
//! - `Bindings` - Working copy of the namespace with change tracking
//! - `OutputCapture` - Scoped collection of printed text
//! - Store and code-execution traits

pub mod bindings;
pub mod capture;
pub mod json;
pub mod storage;
pub mod traits;
pub mod value;

pub use bindings::{Bindings, Changes};
pub use capture::OutputCapture;
pub use json::{JsonError, from_json_str, to_json_string};
#[cfg(feature = "memory")]
pub use storage::MemoryStore;
pub use traits::{
    CodeExecutor, EvaluationError, ExecutionError, ScriptError, StoreError, VariableStore,
};
pub use value::{Opaque, Value};
