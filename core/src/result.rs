use serde::Serialize;
use std::time::Duration;

/// Outcome of one routed line.
///
/// `success` always agrees with `exit_code == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    success: bool,
    output: String,
    error: String,
    exit_code: i32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    elapsed: Duration,
}

impl CommandResult {
    #[must_use]
    pub fn new(output: impl Into<String>, error: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            output: output.into(),
            error: error.into(),
            exit_code,
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self::new(output, String::new(), 0)
    }

    /// A failure with exit code 1.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::new(String::new(), error, 1)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::ok(String::new())
    }

    #[must_use]
    pub const fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// # Errors
    ///
    /// Fails only if serialization fails, which plain strings and integers
    /// do not.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_tracks_exit_code() {
        assert!(CommandResult::ok("x").success());
        assert!(!CommandResult::failure("bad").success());
        assert_eq!(CommandResult::failure("bad").exit_code(), 1);
        assert!(!CommandResult::new("", "", 127).success());
        assert!(CommandResult::new("out", "warning", 0).success());
    }

    #[test]
    fn empty_is_trivial_success() {
        let r = CommandResult::empty();
        assert!(r.success());
        assert!(r.output().is_empty());
        assert!(r.error().is_empty());
    }

    #[test]
    fn json_shape() {
        let r = CommandResult::ok("42").with_elapsed(Duration::from_millis(7));
        let value: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["output"], "42");
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["elapsed_ms"], 7);
    }
}
