//! Interface to the embedded script engine.
//!
//! The shell never interprets script code itself. A stage that is not a
//! builtin or an executable is handed to the engine, which compiles and runs
//! it against the stage's streams. The engine is a single shared resource, so
//! a pipeline may contain at most one script stage.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::error::{Result, ShellError};

/// A value returned by the engine.
pub type Value = serde_json::Value;

/// The engine as the shell sees it.
pub trait ScriptEngine: Send {
    /// Prepare `source` for [`ScriptEngine::execute`].
    fn compile(&mut self, source: &str) -> Result<()>;
    /// Run whatever was compiled last.
    fn execute(&mut self) -> Result<Value>;
    /// Call a function defined in the engine.
    fn call(&mut self, name: &str, args: &[String]) -> Result<Value>;
    fn set_input_stream(&mut self, stream: Box<dyn Read + Send>);
    fn set_output_stream(&mut self, stream: Box<dyn Write + Send>);
    fn set_error_stream(&mut self, stream: Box<dyn Write + Send>);
    /// Variables visible to the shell's `$name` lookup.
    fn local_variables(&self) -> Vec<(String, String)>;
}

/// Engine handle shared between the shell and script stages running on workers.
pub type SharedEngine = Arc<Mutex<Box<dyn ScriptEngine>>>;

pub fn shared(engine: Box<dyn ScriptEngine>) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Text form of a value as spliced into command output.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// What a script stage asks the engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCall {
    /// Compile and execute a line of script source.
    Execute(String),
    /// `call name args...`
    Call { name: String, args: Vec<String> },
}

impl ScriptCall {
    /// Run against `engine` with the stage's streams, then point the engine
    /// back at the process streams.
    pub fn run(
        &self,
        engine: &mut dyn ScriptEngine,
        stdin: Box<dyn Read + Send>,
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
    ) -> Result<Value> {
        engine.set_input_stream(stdin);
        engine.set_output_stream(stdout);
        engine.set_error_stream(stderr);
        let result = match self {
            ScriptCall::Execute(source) => engine.compile(source).and_then(|()| engine.execute()),
            ScriptCall::Call { name, args } => engine.call(name, args),
        };
        engine.set_input_stream(Box::new(std::io::stdin()));
        engine.set_output_stream(Box::new(std::io::stdout()));
        engine.set_error_stream(Box::new(std::io::stderr()));
        result
    }

    pub fn describe(&self) -> String {
        match self {
            ScriptCall::Execute(source) => source.clone(),
            ScriptCall::Call { name, args } => {
                let mut words = vec!["call".to_string(), name.clone()];
                words.extend(args.iter().cloned());
                words.join(" ")
            }
        }
    }
}

/// Engine used when no scripting language is attached: nothing compiles.
#[derive(Debug, Default)]
pub struct NullEngine;

impl ScriptEngine for NullEngine {
    fn compile(&mut self, _source: &str) -> Result<()> {
        Err(ShellError::Engine("no script engine attached".into()))
    }

    fn execute(&mut self) -> Result<Value> {
        Err(ShellError::Engine("no script engine attached".into()))
    }

    fn call(&mut self, name: &str, _args: &[String]) -> Result<Value> {
        Err(ShellError::Engine(format!("{name}: no script engine attached")))
    }

    fn set_input_stream(&mut self, _stream: Box<dyn Read + Send>) {}
    fn set_output_stream(&mut self, _stream: Box<dyn Write + Send>) {}
    fn set_error_stream(&mut self, _stream: Box<dyn Write + Send>) {}

    fn local_variables(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stringify_values() {
        assert_eq!(stringify(&json!(null)), "");
        assert_eq!(stringify(&json!("text")), "text");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn null_engine_compiles_nothing() {
        let mut engine = NullEngine;
        assert!(engine.compile("1 + 1").is_err());
        assert!(engine.local_variables().is_empty());
    }

    #[test]
    fn describe_call() {
        let call = ScriptCall::Call {
            name: "f".into(),
            args: vec!["a".into(), "b".into()],
        };
        assert_eq!(call.describe(), "call f a b");
    }
}
