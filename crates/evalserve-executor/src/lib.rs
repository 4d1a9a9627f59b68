//! Script interpreter for the evalserve command server.
//!
//! Provides:
//! - A small expression and statement language with familiar scripting semantics
//! - `ScriptExecutor`, the default `CodeExecutor` implementation

pub mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod ops;
pub mod parser;

use evalserve_core::{
    Bindings, CodeExecutor, EvaluationError, ExecutionError, OutputCapture, Value,
};

pub use interpreter::Interpreter;
pub use parser::{parse_expression, parse_program};

/// Default code-execution capability.
///
/// Stateless; all state lives in the bindings passed to each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptExecutor;

impl ScriptExecutor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeExecutor for ScriptExecutor {
    fn evaluate(
        &self,
        expression: &str,
        bindings: &Bindings,
        capture: &mut OutputCapture,
    ) -> Result<Value, EvaluationError> {
        let expr = parse_expression(expression)?;
        Interpreter::new(capture).eval(&expr, bindings)
    }

    fn execute(
        &self,
        statements: &str,
        bindings: &mut Bindings,
        capture: &mut OutputCapture,
    ) -> Result<(), ExecutionError> {
        // Nothing runs if any statement fails to parse.
        let program = parse_program(statements)?;
        tracing::debug!(statements = program.len(), "Executing program");
        Interpreter::new(capture).run(&program, bindings)
    }
}
