use crate::extension::ExtensionError;
use crate::script::ScriptError;
use twinsh_config::ConfigError;

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Everything a routed command can fail with. The router turns these into
/// failed results; they never leave `execute`.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0}")]
    Invalid(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl ConsoleError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code reported for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::UnknownCommand(_) => 127,
            _ => 1,
        }
    }
}
