//! Command dispatch against the shared session store.

use std::sync::Arc;

use evalserve_core::{
    CodeExecutor, OutputCapture, ScriptError, StoreError, Value, VariableStore, from_json_str,
    to_json_string,
};
use thiserror::Error;

use crate::{command::Command, render};

/// Command failure reported to the client as `Server error: <message>`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("expected 'name=expression'")]
    MissingAssignment,
    #[error("expected 'name json'")]
    MissingSeparator,
    #[error("variable name is empty")]
    EmptyName,
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One unit of output sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text printed by the code-execution capability, sent verbatim.
    Captured(String),
    /// A reply line, without its terminating newline.
    Line(String),
}

/// What the connection does after sending a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Continue,
    /// Close this connection.
    Exit,
    /// Close this connection and stop the server.
    Shutdown,
}

/// Frames to send for one command, in order, and the follow-up action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub frames: Vec<Frame>,
    pub action: Action,
}

impl Reply {
    #[must_use]
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            frames: vec![Frame::Line(text.into())],
            action: Action::Continue,
        }
    }

    #[must_use]
    pub const fn exit() -> Self {
        Self {
            frames: Vec::new(),
            action: Action::Exit,
        }
    }

    #[must_use]
    pub fn shutdown(text: impl Into<String>) -> Self {
        Self {
            frames: vec![Frame::Line(text.into())],
            action: Action::Shutdown,
        }
    }

    /// Prepend captured output, if any.
    #[must_use]
    pub fn with_captured(mut self, output: String) -> Self {
        if !output.is_empty() {
            self.frames.insert(0, Frame::Captured(output));
        }
        self
    }
}

/// Runs commands against the shared store and code-execution capability.
///
/// Holds no per-connection state; one dispatcher is shared by all
/// connections.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn VariableStore>,
    executor: Arc<dyn CodeExecutor>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<dyn VariableStore>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self { store, executor }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VariableStore> {
        &self.store
    }

    /// Run one command. Failures become `Server error:` replies; this never
    /// ends the connection on its own.
    pub async fn dispatch(&self, command: Command<'_>) -> Reply {
        match self.handle(command).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(verb = command.verb(), "Exception while handling command: {e}");
                Reply::line(format!("Server error: {e}"))
            }
        }
    }

    async fn handle(&self, command: Command<'_>) -> Result<Reply, CommandError> {
        match command {
            Command::Eval(expression) => self.eval(expression).await,
            Command::Exec(statements) => self.exec(statements).await,
            Command::Get(name) => self.get(name.trim()).await,
            Command::Set(arg) => self.set(arg).await,
            Command::SetJson(arg) => self.set_json(arg).await,
            Command::GetJson(name) => self.get_json(name.trim()).await,
            Command::Exit => {
                tracing::info!("Client requested exit");
                Ok(Reply::exit())
            }
            Command::Close => {
                tracing::info!("Client requested server shutdown");
                Ok(Reply::shutdown("Server shutting down."))
            }
            Command::Unknown(line) => {
                tracing::info!("Unrecognized command: '{line}'");
                Ok(Reply::line(format!("Unrecognized command: '{line}'")))
            }
        }
    }

    async fn eval(&self, expression: &str) -> Result<Reply, CommandError> {
        let (result, output) = self.evaluate(expression).await?;
        let reply = match result {
            Ok(value) => Reply::line(format!("Result: {}", render::result_text(&value))),
            Err(e) => {
                tracing::error!("Eval error: {e}");
                Reply::line(format!("Eval error: {e}"))
            }
        };
        Ok(reply.with_captured(output))
    }

    async fn exec(&self, statements: &str) -> Result<Reply, CommandError> {
        let mut bindings = self.store.snapshot().await?;
        let executor = Arc::clone(&self.executor);
        let statements = statements.to_string();

        let (result, changes, output) = tokio::task::spawn_blocking(move || {
            let mut capture = OutputCapture::begin();
            let result = executor.execute(&statements, &mut bindings, &mut capture);
            (result, bindings.into_changes(), capture.end())
        })
        .await?;

        log_output(&output);
        // Statements that ran before a failure keep their effects.
        self.store.apply(changes).await?;
        result?;
        Ok(Reply::line("Exec success"))
    }

    async fn get(&self, name: &str) -> Result<Reply, CommandError> {
        Ok(match self.store.get(name).await? {
            Some(value) => Reply::line(render::get_text(&value)),
            None => not_found(name),
        })
    }

    async fn set(&self, arg: &str) -> Result<Reply, CommandError> {
        let (name, expression) = arg
            .split_once('=')
            .ok_or(CommandError::MissingAssignment)?;
        let name = variable_name(name)?;

        let (result, output) = self.evaluate(expression).await?;
        log_output(&output);
        let value = result?;

        let text = render::repr(&value);
        self.store.set(name, value).await?;
        Ok(Reply::line(format!("Set '{name}' to {text} success")))
    }

    async fn set_json(&self, arg: &str) -> Result<Reply, CommandError> {
        let (name, json) = arg
            .split_once(' ')
            .ok_or(CommandError::MissingSeparator)?;
        let name = variable_name(name)?;

        match from_json_str(json) {
            Ok(value) => {
                self.store.set(name, value).await?;
                Ok(Reply::line(format!("Set JSON '{name}' success")))
            }
            Err(e) => Ok(Reply::line(format!("Set JSON error: {e}"))),
        }
    }

    async fn get_json(&self, name: &str) -> Result<Reply, CommandError> {
        let Some(value) = self.store.get(name).await? else {
            return Ok(not_found(name));
        };
        Ok(match to_json_string(&value) {
            Ok(json) => Reply::line(json),
            Err(e) => Reply::line(format!("Get JSON error: {e}")),
        })
    }

    /// Evaluate against a snapshot on the blocking pool.
    async fn evaluate(
        &self,
        expression: &str,
    ) -> Result<(Result<Value, ScriptError>, String), CommandError> {
        let bindings = self.store.snapshot().await?;
        let executor = Arc::clone(&self.executor);
        let expression = expression.to_string();

        Ok(tokio::task::spawn_blocking(move || {
            let mut capture = OutputCapture::begin();
            let result = executor.evaluate(&expression, &bindings, &mut capture);
            (result, capture.end())
        })
        .await?)
    }
}

fn variable_name(raw: &str) -> Result<&str, CommandError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(CommandError::EmptyName)
    } else {
        Ok(name)
    }
}

fn not_found(name: &str) -> Reply {
    Reply::line(format!("Error: Variable '{name}' not found"))
}

fn log_output(output: &str) {
    if !output.is_empty() {
        tracing::info!(output, "Command printed output");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use evalserve_core::{Bindings, Changes, MemoryStore};
    use evalserve_executor::ScriptExecutor;

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(MemoryStore::new()), Arc::new(ScriptExecutor::new()))
    }

    async fn send(dispatcher: &Dispatcher, line: &str) -> Reply {
        let command = Command::parse(line).expect("non-empty command");
        dispatcher.dispatch(command).await
    }

    async fn line(dispatcher: &Dispatcher, line: &str) -> String {
        let reply = send(dispatcher, line).await;
        match reply.frames.as_slice() {
            [Frame::Line(text)] => text.clone(),
            other => panic!("expected a single line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_example_session() {
        let d = dispatcher();
        assert_eq!(line(&d, "/set x=5").await, "Set 'x' to 5 success");
        assert_eq!(line(&d, "/eval x+2").await, "Result: 7");
        assert_eq!(line(&d, "/get_json x").await, "5");
        assert_eq!(
            line(&d, "/bogus").await,
            "Unrecognized command: '/bogus'"
        );
    }

    #[tokio::test]
    async fn test_eval_forwards_captured_output_first() {
        let d = dispatcher();
        let reply = send(&d, "/eval print('hi')").await;
        assert_eq!(
            reply.frames,
            vec![
                Frame::Captured("hi\n".to_string()),
                Frame::Line("Result: None".to_string()),
            ]
        );
        assert_eq!(reply.action, Action::Continue);
    }

    #[tokio::test]
    async fn test_eval_error_keeps_connection() {
        let d = dispatcher();
        let reply = send(&d, "/eval 1/0").await;
        assert_eq!(
            reply.frames,
            vec![Frame::Line("Eval error: division by zero".to_string())]
        );
        assert_eq!(reply.action, Action::Continue);

        assert_eq!(
            line(&d, "/eval nope").await,
            "Eval error: name 'nope' is not defined"
        );
    }

    #[tokio::test]
    async fn test_eval_renders_strings_raw_and_lists_flat() {
        let d = dispatcher();
        assert_eq!(line(&d, "/eval 'a' + 'b'").await, "Result: ab");
        assert_eq!(line(&d, "/eval [1, 'a']").await, "Result: [1, 'a']");
        assert_eq!(line(&d, "/eval 7 / 1").await, "Result: 7.0");
    }

    #[tokio::test]
    async fn test_exec_updates_store() {
        let d = dispatcher();
        assert_eq!(line(&d, "/exec a = 1; b = a + 1").await, "Exec success");
        assert_eq!(line(&d, "/get b").await, "2");
        assert_eq!(
            line(&d, "/exec del a").await,
            "Exec success"
        );
        assert_eq!(line(&d, "/get a").await, "Error: Variable 'a' not found");
    }

    #[tokio::test]
    async fn test_exec_failure_keeps_earlier_statements() {
        let d = dispatcher();
        assert_eq!(
            line(&d, "/exec a = 1; b = 1 / 0").await,
            "Server error: division by zero"
        );
        assert_eq!(line(&d, "/get a").await, "1");
        assert_eq!(line(&d, "/get b").await, "Error: Variable 'b' not found");
    }

    #[tokio::test]
    async fn test_exec_output_is_not_forwarded() {
        let d = dispatcher();
        let reply = send(&d, "/exec print('quiet')").await;
        assert_eq!(reply.frames, vec![Frame::Line("Exec success".to_string())]);
    }

    #[tokio::test]
    async fn test_get_renders_by_type() {
        let d = dispatcher();
        line(&d, "/set s='hi'").await;
        line(&d, "/set f=2.5").await;
        line(&d, "/set m={'k': [1, 2]}").await;
        assert_eq!(line(&d, "/get s").await, "\"hi\"");
        assert_eq!(line(&d, "/get f").await, "2.5");
        assert_eq!(line(&d, "/get m").await, "{'k': [1, 2]}");
        assert_eq!(line(&d, "/get  s").await, "\"hi\"");
    }

    #[tokio::test]
    async fn test_get_missing_does_not_mutate() {
        let d = dispatcher();
        assert_eq!(line(&d, "/get X").await, "Error: Variable 'X' not found");
        assert_eq!(d.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_replies_with_repr() {
        let d = dispatcher();
        assert_eq!(
            line(&d, "/set  name = 'Ada'").await,
            "Set 'name' to 'Ada' success"
        );
        assert_eq!(d.store().get("name").await.unwrap(), Some(Value::from("Ada")));
    }

    #[tokio::test]
    async fn test_set_protocol_errors() {
        let d = dispatcher();
        assert_eq!(
            line(&d, "/set x").await,
            "Server error: expected 'name=expression'"
        );
        assert_eq!(line(&d, "/set =1").await, "Server error: variable name is empty");
        assert_eq!(
            line(&d, "/set y=1 +").await,
            "Server error: invalid syntax: unexpected end of input"
        );
        assert_eq!(d.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_json_and_get_json() {
        let d = dispatcher();
        assert_eq!(
            line(&d, "/set_json v {\"a\": [1, 2.5, null, true], \"b\": \"x\"}").await,
            "Set JSON 'v' success"
        );
        assert_eq!(
            line(&d, "/get_json v").await,
            "{\"a\": [1, 2.5, null, true], \"b\": \"x\"}"
        );
        assert_eq!(line(&d, "/eval v['a'][1] * 2").await, "Result: 5.0");
    }

    #[tokio::test]
    async fn test_set_json_errors() {
        let d = dispatcher();
        let reply = line(&d, "/set_json v {bad").await;
        assert!(reply.starts_with("Set JSON error: "), "{reply}");
        assert_eq!(
            line(&d, "/set_json v").await,
            "Server error: expected 'name json'"
        );
        assert_eq!(d.store().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_json_errors() {
        let d = dispatcher();
        assert_eq!(line(&d, "/get_json q").await, "Error: Variable 'q' not found");

        line(&d, "/set f=len").await;
        assert_eq!(
            line(&d, "/get_json f").await,
            "Get JSON error: Object of type builtin_function_or_method is not JSON serializable"
        );

        line(&d, "/set inf=float('inf')").await;
        assert_eq!(
            line(&d, "/get_json inf").await,
            "Get JSON error: Out of range float values are not JSON compliant"
        );
    }

    #[tokio::test]
    async fn test_exit_and_close() {
        let d = dispatcher();
        let exit = send(&d, "/exit").await;
        assert!(exit.frames.is_empty());
        assert_eq!(exit.action, Action::Exit);

        let close = send(&d, "/close").await;
        assert_eq!(
            close.frames,
            vec![Frame::Line("Server shutting down.".to_string())]
        );
        assert_eq!(close.action, Action::Shutdown);
    }

    #[tokio::test]
    async fn test_concurrent_sets_to_distinct_names() {
        let d = dispatcher();
        let tasks = (0..16).map(|i| {
            let d = d.clone();
            async move { line(&d, &format!("/set v{i}={i}")).await }
        });
        futures::future::join_all(tasks).await;

        for i in 0..16 {
            assert_eq!(line(&d, &format!("/get v{i}")).await, i.to_string());
        }
    }

    #[tokio::test]
    async fn test_concurrent_sets_to_one_name_keep_a_written_value() {
        let d = dispatcher();
        let tasks = (0..16).map(|i| {
            let d = d.clone();
            async move { line(&d, &format!("/set shared={i}")).await }
        });
        futures::future::join_all(tasks).await;

        let last: i64 = line(&d, "/get shared").await.parse().unwrap();
        assert!((0..16).contains(&last));
    }

    struct BrokenStore;

    #[async_trait]
    impl VariableStore for BrokenStore {
        async fn get(&self, _name: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Internal("poisoned".to_string()))
        }

        async fn set(&self, _name: &str, _value: Value) -> Result<(), StoreError> {
            Err(StoreError::Internal("poisoned".to_string()))
        }

        async fn snapshot(&self) -> Result<Bindings, StoreError> {
            Err(StoreError::Internal("poisoned".to_string()))
        }

        async fn apply(&self, _changes: Changes) -> Result<(), StoreError> {
            Err(StoreError::Internal("poisoned".to_string()))
        }

        async fn len(&self) -> Result<usize, StoreError> {
            Err(StoreError::Internal("poisoned".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_a_server_error() {
        let d = Dispatcher::new(Arc::new(BrokenStore), Arc::new(ScriptExecutor::new()));
        assert_eq!(
            line(&d, "/get x").await,
            "Server error: Storage error: poisoned"
        );
        assert_eq!(
            line(&d, "/eval 1").await,
            "Server error: Storage error: poisoned"
        );
    }
}
