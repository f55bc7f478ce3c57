//! The script runtime seam.
//!
//! The router and the extension loader only talk to a [`ScriptEngine`];
//! completion only needs the read-only [`ObjectGraph`] view of it. The
//! shipped implementation is [`RhaiEngine`].

mod rhai;

pub use self::rhai::{RhaiEngine, RhaiNode};

use crate::completion::ObjectGraph;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Runtime(String),

    #[error("cannot read script {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot register function `{name}`: {reason}")]
    Registration { name: String, reason: String },
}

/// Engine-neutral value passed between scripts and native functions.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

pub type NativeCall = Arc<dyn Fn(&[ScriptValue]) -> Result<ScriptValue, String> + Send + Sync>;

/// A host-side callable the engine exposes in its global scope.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub call: NativeCall,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, arity: usize, call: F) -> Self
    where
        F: Fn(&[ScriptValue]) -> Result<ScriptValue, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            call: Arc::new(call),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Anything native functions can be registered into.
pub trait FunctionRegistry {
    /// Makes `function` callable from scripts under its name. Registering a
    /// name and arity that already exist replaces the previous binding.
    ///
    /// # Errors
    ///
    /// Fails when the runtime refuses the name.
    fn register_function(&mut self, function: NativeFunction) -> Result<(), ScriptError>;
}

/// Output of one evaluation: whatever the script printed, plus either its
/// rendered result (`None` for unit) or the error that stopped it.
#[derive(Debug)]
pub struct Evaluation {
    pub printed: String,
    pub value: Result<Option<String>, ScriptError>,
}

pub trait ScriptEngine: FunctionRegistry + ObjectGraph + Send + 'static {
    /// Compiles and runs `source` against the persistent global scope.
    fn evaluate(&mut self, source: &str) -> Evaluation;

    /// Reads `path` and evaluates its contents.
    fn evaluate_file(&mut self, path: &Path) -> Evaluation {
        match std::fs::read_to_string(path) {
            Ok(source) => self.evaluate(&source),
            Err(source) => Evaluation {
                printed: String::new(),
                value: Err(ScriptError::Io {
                    path: path.to_path_buf(),
                    source,
                }),
            },
        }
    }
}

/// Names a native function may be registered under.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
