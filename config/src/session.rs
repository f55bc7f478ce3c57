//! The `key=value` session file holding the initial mode and aliases.
//!
//! ```text
//! # twinsh session
//! mode=script
//! alias.ll=ls -la
//! ```
//!
//! Blank lines and `#` comments are ignored. Keys other than `mode` and
//! `alias.*` are kept and written back unchanged.

use crate::ConfigError;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

const MODE_KEY: &str = "mode";
const ALIAS_PREFIX: &str = "alias.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFile {
    pub mode: Option<String>,
    pub aliases: BTreeMap<String, String>,
    pub extra: BTreeMap<String, String>,
}

impl SessionFile {
    /// Parses session text. Later duplicates of a key win.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSessionLine`] for a non-comment line
    /// without `=` or with an empty key.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut session = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::InvalidSessionLine {
                    line: index + 1,
                    text: raw.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                return Err(ConfigError::InvalidSessionLine {
                    line: index + 1,
                    text: raw.to_string(),
                });
            }
            if key == MODE_KEY {
                session.mode = Some(value.to_string());
            } else if let Some(name) = key.strip_prefix(ALIAS_PREFIX) {
                if !name.is_empty() {
                    session.aliases.insert(name.to_string(), value.to_string());
                }
            } else {
                session.extra.insert(key.to_string(), value.to_string());
            }
        }
        Ok(session)
    }

    /// Reads `path`; a missing file is an empty session.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let session = Self::parse(&text)?;
                debug!(path = ?path, aliases = session.aliases.len(), "Loaded session file");
                Ok(session)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("# twinsh session\n");
        if let Some(mode) = &self.mode {
            let _ = writeln!(out, "{MODE_KEY}={mode}");
        }
        for (name, value) in &self.aliases {
            let _ = writeln!(out, "{ALIAS_PREFIX}{name}={value}");
        }
        for (key, value) in &self.extra {
            let _ = writeln!(out, "{key}={value}");
        }
        out
    }

    /// Writes the session, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Fails when the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.render()).map_err(write_err)?;
        debug!(path = ?path, "Saved session file");
        Ok(())
    }
}
