use crate::{ConfigError, TwinshConfig};
use regex::Regex;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/twinsh/twinsh.yaml"));
        }
        search_paths.push(PathBuf::from("./twinsh.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/twinsh/twinsh.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    /// Loader that only reads `path` (plus environment overrides).
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Merges every existing file in the search path, then the explicit
    /// file (`TWINSH_CONFIG` or [`with_file`](Self::with_file)), then the
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Fails when an explicit file cannot be read or any file is not valid
    /// YAML for [`TwinshConfig`].
    pub fn load(&self) -> Result<TwinshConfig, ConfigError> {
        let mut merged = Value::Mapping(serde_yaml::Mapping::new());

        for path in &self.search_paths {
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    debug!(path = ?path, "Merging config file");
                    merge_values(&mut merged, self.parse_value(&content)?);
                }
                Err(e) => debug!(path = ?path, error = %e, "Skipping unreadable config file"),
            }
        }

        let explicit = std::env::var("TWINSH_CONFIG")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.explicit_file.clone());
        if let Some(path) = explicit {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
                path: path.clone(),
                source: e,
            })?;
            debug!(path = ?path, "Merging explicit config file");
            merge_values(&mut merged, self.parse_value(&content)?);
        }

        let mut config: TwinshConfig = serde_yaml::from_value(merged)?;
        self.apply_env_overrides(&mut config);
        Ok(config)
    }

    fn parse_value(&self, content: &str) -> Result<Value, ConfigError> {
        let expanded = self.expand_env_vars(content);
        let value: Value = serde_yaml::from_str(&expanded)?;
        Ok(match value {
            Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
            other => other,
        })
    }

    fn expand_env_vars(&self, content: &str) -> String {
        let Ok(re) = Regex::new(r"\$\{([^}]+)\}") else {
            return content.to_string();
        };
        re.replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .to_string()
    }

    fn apply_env_overrides(&self, config: &mut TwinshConfig) {
        if let Ok(level) = std::env::var("TWINSH_LOG_LEVEL") {
            if let Ok(l) = serde_yaml::from_str(&level) {
                config.logging.level = l;
            }
        }
        if let Ok(file) = std::env::var("TWINSH_HISTORY_FILE") {
            if !file.is_empty() {
                config.shell.history.file = file;
            }
        }
        if let Ok(file) = std::env::var("TWINSH_SESSION_FILE") {
            if !file.is_empty() {
                config.shell.session_file = file;
            }
        }
        if let Ok(dir) = std::env::var("TWINSH_EXTENSION_DIR") {
            if !dir.is_empty() {
                config.extensions.directories.insert(0, dir);
            }
        }
        if let Ok(timeout) = std::env::var("TWINSH_SHELL_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(0) => config.shell.timeout_secs = None,
                Ok(secs) => config.shell.timeout_secs = Some(secs),
                Err(_) => debug!(value = %timeout, "Ignoring invalid TWINSH_SHELL_TIMEOUT"),
            }
        }
    }
}

/// Overlays `overlay` onto `base`; mappings merge key by key, anything else
/// replaces.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
