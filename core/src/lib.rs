//! twinsh command engine
//!
//! - [`CommandRouter`]: mode-aware dispatch of one input line to a built-in,
//!   the script engine, an extension operation or an OS subprocess
//! - [`ExtensionLoader`]: native modules registering functions into the
//!   script engine's global scope
//! - [`completion`]: property completion over the engine's object graph
//! - [`AliasTable`] and [`CommandHistory`]
//!
//! ```no_run
//! # async fn demo() {
//! use twinsh_core::CommandRouter;
//!
//! let mut router = CommandRouter::with_rhai();
//! router.execute("js").await;
//! let result = router.execute("21*2").await;
//! assert_eq!(result.output(), "42");
//! # }
//! ```

#![allow(missing_docs)]

pub mod alias;
pub mod completion;
pub mod error;
pub mod extension;
pub mod help;
pub mod history;
pub mod mode;
pub mod result;
pub mod router;
pub mod script;

pub use alias::AliasTable;
pub use completion::{complete, expression_at, ObjectGraph, CALLABLE_MARKER};
pub use error::{ConsoleError, ConsoleResult};
pub use extension::{ExtensionError, ExtensionLoader, ExtensionModule};
pub use history::CommandHistory;
pub use mode::Mode;
pub use result::CommandResult;
pub use router::{
    CommandRouter, RouterOptions, BUILTIN_PREFIX, ESCAPE_MARKER, NOT_FOUND_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};
pub use script::{
    Evaluation, FunctionRegistry, NativeFunction, RhaiEngine, ScriptEngine, ScriptError,
    ScriptValue,
};
