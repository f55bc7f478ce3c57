//! twinsh configuration
//!
//! Two persisted formats live here:
//!
//! - the YAML application configuration ([`TwinshConfig`]), and
//! - the `key=value` session file ([`SessionFile`]) holding the initial mode
//!   and the alias table.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/twinsh/twinsh.yaml` (system-wide)
//! 3. `~/.config/twinsh/twinsh.yaml` (user)
//! 4. `./twinsh.yaml` (project-local)
//! 5. `TWINSH_CONFIG=/path/to/config.yaml` or `--config` (explicit)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! shell:
//!   prompt: "{green}{mode}{reset}:{cwd}> "
//!   timeout_secs: 60
//!   history:
//!     file: "~/.twinsh_history"
//!     max_entries: 5000
//!
//! extensions:
//!   directories: ["${HOME}/.twinsh/extensions"]
//!
//! logging:
//!   level: info
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod session;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use session::SessionFile;
pub use types::*;

/// Load configuration from default locations.
///
/// # Errors
///
/// See [`ConfigLoader::load`].
pub fn load() -> Result<TwinshConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from the default locations plus `path`.
///
/// # Errors
///
/// See [`ConfigLoader::load`].
pub fn load_from_file(path: &str) -> Result<TwinshConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}
