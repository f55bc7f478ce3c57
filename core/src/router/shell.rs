//! Shell-mode subprocesses.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::result::CommandResult;

/// Exit code reported when a command is killed for running too long.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the shell program itself cannot be started.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

pub(super) fn default_program() -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".to_string(), "/C".to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

/// POSIX shells merge stderr into stdout themselves so the interleaving
/// is preserved; other programs get stderr appended after stdout.
fn is_posix_shell(program: &str) -> bool {
    let name = Path::new(program)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(program);
    matches!(name, "sh" | "bash" | "dash" | "zsh" | "ksh" | "ash" | "busybox")
}

/// Runs `line` through `program` and waits for it, killing it after
/// `timeout` when one is set.
pub(super) async fn run(line: &str, program: &[String], timeout: Option<Duration>) -> CommandResult {
    let Some((executable, leading)) = program.split_first() else {
        return CommandResult::new(String::new(), "no shell program configured", NOT_FOUND_EXIT_CODE);
    };

    let merge = is_posix_shell(executable);
    let script = if merge {
        format!("exec 2>&1\n{line}")
    } else {
        line.to_string()
    };

    debug!(program = %executable, line, "Spawning shell command");

    let child = Command::new(executable)
        .args(leading)
        .arg(&script)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            return CommandResult::new(
                String::new(),
                format!("{executable}: {e}"),
                NOT_FOUND_EXIT_CODE,
            )
        }
    };

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(waited) => waited,
            Err(_) => {
                warn!(line, timeout_secs = limit.as_secs_f64(), "Shell command timed out");
                return CommandResult::new(
                    String::new(),
                    format!("command timed out after {}s and was killed", limit.as_secs_f64()),
                    TIMEOUT_EXIT_CODE,
                );
            }
        },
        None => child.wait_with_output().await,
    };

    match waited {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            if !output.stderr.is_empty() {
                text.push_str(&String::from_utf8_lossy(&output.stderr));
            }
            CommandResult::new(text, String::new(), exit_code(output.status))
        }
        Err(e) => CommandResult::failure(format!("{executable}: {e}")),
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
