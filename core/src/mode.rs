use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a line goes when it is not a built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Shell,
    Script,
}

impl Mode {
    /// Maps a whole input line to the mode it switches to, if it is one of
    /// the mode keywords.
    #[must_use]
    pub fn from_keyword(line: &str) -> Option<Self> {
        match line {
            "js" | "javascript" | "script" => Some(Self::Script),
            "shell" | "sh" => Some(Self::Shell),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode `{0}` (expected shell or script)")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(s.trim().to_ascii_lowercase().as_str())
            .ok_or_else(|| ParseModeError(s.to_string()))
    }
}
