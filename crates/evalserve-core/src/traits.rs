//! Core traits for storage and code execution.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Bindings, Changes, OutputCapture, Value};

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for session store backends.
///
/// One namespace shared by every connection. Writes are last-writer-wins.
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// Look up a value by name.
    async fn get(&self, name: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or overwrite a value.
    async fn set(&self, name: &str, value: Value) -> Result<(), StoreError>;

    /// Copy of the whole namespace, with no changes recorded.
    async fn snapshot(&self) -> Result<Bindings, StoreError>;

    /// Merge writes and deletions produced by the code-execution capability.
    async fn apply(&self, changes: Changes) -> Result<(), StoreError>;

    /// Number of bound names.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// Error raised by the code-execution capability.
///
/// Messages follow the wording users of the numeric host already know.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("{0}")]
    Syntax(String),
    #[error("name '{0}' is not defined")]
    Name(String),
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Value(String),
    #[error("{0}")]
    ZeroDivision(String),
    #[error("{0}")]
    Index(String),
    #[error("{0}")]
    Key(String),
    #[error("{0}")]
    Overflow(String),
    #[error("{0}")]
    Limit(String),
}

/// Failure of [`CodeExecutor::evaluate`].
pub type EvaluationError = ScriptError;

/// Failure of [`CodeExecutor::execute`].
pub type ExecutionError = ScriptError;

/// Pluggable code-execution capability.
///
/// Calls are synchronous and may block; callers run them off the async
/// runtime. Anything printed goes to the supplied capture.
pub trait CodeExecutor: Send + Sync {
    /// Evaluate a single expression against read-only bindings.
    ///
    /// # Errors
    /// Returns error if the expression cannot be parsed or evaluated.
    fn evaluate(
        &self,
        expression: &str,
        bindings: &Bindings,
        capture: &mut OutputCapture,
    ) -> Result<Value, EvaluationError>;

    /// Execute statements with read-write access to bindings.
    ///
    /// Statements that completed before a failure keep their effects.
    ///
    /// # Errors
    /// Returns error if a statement cannot be parsed or fails.
    fn execute(
        &self,
        statements: &str,
        bindings: &mut Bindings,
        capture: &mut OutputCapture,
    ) -> Result<(), ExecutionError>;
}
