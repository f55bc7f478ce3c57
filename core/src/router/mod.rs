//! The mode-aware command router.
//!
//! [`CommandRouter::execute`] is the single entry point: it takes one raw
//! input line and always produces a [`CommandResult`]. Failures of any
//! component are converted at this boundary.

mod builtins;
mod shell;

pub use shell::{NOT_FOUND_EXIT_CODE, TIMEOUT_EXIT_CODE};

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use twinsh_config::{SessionFile, TwinshConfig};

use crate::alias::AliasTable;
use crate::completion;
use crate::extension::{panic_message, ExtensionLoader, ExtensionModule};
use crate::help;
use crate::history::{CommandHistory, DEFAULT_MAX_ENTRIES};
use crate::mode::Mode;
use crate::result::CommandResult;
use crate::script::{Evaluation, RhaiEngine, ScriptEngine};
use crate::ConsoleResult;

/// Forces a built-in: `.help`.
pub const BUILTIN_PREFIX: char = '.';

/// Evaluates one shell-mode line as script: `&1+1`.
pub const ESCAPE_MARKER: char = '&';

/// How shell-mode lines are run.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Program and leading arguments; the command line is appended.
    pub shell_program: Vec<String>,
    /// Kill the subprocess after this long.
    pub timeout: Option<Duration>,
    /// Target of the `save` built-in.
    pub session_file: Option<PathBuf>,
    pub history_max: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            shell_program: shell::default_program(),
            timeout: None,
            session_file: None,
            history_max: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&TwinshConfig> for RouterOptions {
    fn from(config: &TwinshConfig) -> Self {
        let shell_program = if config.shell.program.is_empty() {
            shell::default_program()
        } else {
            config.shell.program.clone()
        };
        Self {
            shell_program,
            timeout: config.shell.timeout_secs.map(Duration::from_secs),
            session_file: Some(config.shell.session_path()),
            history_max: config.shell.history.max_entries,
        }
    }
}

pub struct CommandRouter<E: ScriptEngine = RhaiEngine> {
    mode: Mode,
    engine: Arc<Mutex<E>>,
    extensions: ExtensionLoader,
    aliases: AliasTable,
    history: CommandHistory,
    options: RouterOptions,
    /// Session keys this router does not interpret, kept for `save`.
    session_extra: std::collections::BTreeMap<String, String>,
    previous_dir: Option<PathBuf>,
    last_exit_code: i32,
    should_quit: bool,
    requested_exit: Option<i32>,
}

impl CommandRouter<RhaiEngine> {
    /// A router over a fresh Rhai engine with default options.
    #[must_use]
    pub fn with_rhai() -> Self {
        Self::new(RhaiEngine::new())
    }
}

impl<E: ScriptEngine> CommandRouter<E> {
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self::with_options(engine, RouterOptions::default())
    }

    #[must_use]
    pub fn with_options(engine: E, options: RouterOptions) -> Self {
        Self {
            mode: Mode::Shell,
            engine: Arc::new(Mutex::new(engine)),
            extensions: ExtensionLoader::new(),
            aliases: AliasTable::new(),
            history: CommandHistory::new(options.history_max),
            options,
            session_extra: std::collections::BTreeMap::new(),
            previous_dir: None,
            last_exit_code: 0,
            should_quit: false,
            requested_exit: None,
        }
    }

    /// Routes one input line.
    pub async fn execute(&mut self, raw_line: &str) -> CommandResult {
        let line = raw_line.trim();
        if line.is_empty() {
            return CommandResult::empty();
        }
        self.history.add(line);

        let started = Instant::now();
        let result = self.dispatch(line).await.with_elapsed(started.elapsed());

        self.last_exit_code = result.exit_code();
        debug!(
            mode = %self.mode,
            exit_code = result.exit_code(),
            elapsed_ms = u64::try_from(result.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Command finished"
        );
        result
    }

    async fn dispatch(&mut self, line: &str) -> CommandResult {
        if let Some(mode) = Mode::from_keyword(line) {
            self.mode = mode;
            info!(%mode, "Mode switched");
            return CommandResult::ok(format!("switched to {mode} mode"));
        }

        let (word, rest) = split_first_word(line);
        if let Some(name) = word.strip_prefix(BUILTIN_PREFIX).filter(|n| is_command_word(n)) {
            return self.builtin(name, rest);
        }
        if help::is_builtin(word) {
            return self.builtin(word, rest);
        }

        match self.mode {
            Mode::Script => self.evaluate(line),
            Mode::Shell => match line.strip_prefix(ESCAPE_MARKER) {
                Some(source) => self.evaluate(source.trim_start()),
                None => {
                    let expanded = self.aliases.expand(line);
                    if expanded != line {
                        debug!(line, expanded = %expanded, "Alias expanded");
                    }
                    shell::run(&expanded, &self.options.shell_program, self.options.timeout).await
                }
            },
        }
    }

    fn builtin(&mut self, name: &str, args: &str) -> CommandResult {
        match self.run_builtin(name, args) {
            Ok(result) => result,
            Err(e) => CommandResult::new(String::new(), e.to_string(), e.exit_code()),
        }
    }

    fn evaluate(&self, source: &str) -> CommandResult {
        let mut engine = lock(&self.engine);
        match panic::catch_unwind(AssertUnwindSafe(|| engine.evaluate(source))) {
            Ok(evaluation) => evaluation_result(evaluation),
            Err(payload) => CommandResult::failure(format!(
                "script engine panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    fn evaluate_file(&self, path: &Path) -> CommandResult {
        let mut engine = lock(&self.engine);
        match panic::catch_unwind(AssertUnwindSafe(|| engine.evaluate_file(path))) {
            Ok(evaluation) => evaluation_result(evaluation),
            Err(payload) => CommandResult::failure(format!(
                "script engine panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Evaluates a script file outside of line routing: no history entry,
    /// mode unchanged.
    pub fn run_script_file(&mut self, path: &Path) -> CommandResult {
        let started = Instant::now();
        let result = self.evaluate_file(path).with_elapsed(started.elapsed());
        self.last_exit_code = result.exit_code();
        result
    }

    /// Loads an extension into this router's engine.
    ///
    /// # Errors
    ///
    /// See [`ExtensionLoader::load`].
    pub fn load_extension(&mut self, path: &Path) -> ConsoleResult<&ExtensionModule> {
        let mut engine = lock(&self.engine);
        Ok(self.extensions.load(path, &mut *engine)?)
    }

    /// Loads every library in `dir`; returns how many loaded.
    pub fn load_extension_directory(&mut self, dir: &Path) -> usize {
        let mut engine = lock(&self.engine);
        self.extensions.load_directory(dir, &mut *engine)
    }

    /// Attaches an extension entry point linked into the host.
    ///
    /// # Errors
    ///
    /// See [`ExtensionLoader::attach_static`].
    pub fn attach_extension(
        &mut self,
        name: &str,
        entry: twinsh_ext_ffi::EntryFn,
    ) -> ConsoleResult<&ExtensionModule> {
        let mut engine = lock(&self.engine);
        Ok(self.extensions.attach_static(name, entry, &mut *engine)?)
    }

    /// Completes a dotted script expression against the live engine.
    #[must_use]
    pub fn complete(&self, partial: &str) -> Vec<String> {
        completion::complete(&*lock(&self.engine), partial)
    }

    /// Applies the mode and aliases of a session file.
    pub fn apply_session(&mut self, session: &SessionFile) {
        if let Some(mode) = session.mode.as_deref() {
            match mode.parse() {
                Ok(mode) => self.mode = mode,
                Err(e) => debug!(error = %e, "Ignoring session mode"),
            }
        }
        for (name, value) in &session.aliases {
            self.aliases.set(name.clone(), value.clone());
        }
        self.session_extra.clone_from(&session.extra);
    }

    /// The current mode and aliases in session-file form.
    #[must_use]
    pub fn session_snapshot(&self) -> SessionFile {
        SessionFile {
            mode: Some(self.mode.to_string()),
            aliases: self
                .aliases
                .list()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            extra: self.session_extra.clone(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Shared handle to the engine, for collaborators such as the line
    /// editor. Hold the lock only briefly.
    #[must_use]
    pub fn engine(&self) -> Arc<Mutex<E>> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub const fn extensions(&self) -> &ExtensionLoader {
        &self.extensions
    }

    #[must_use]
    pub const fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    #[must_use]
    pub const fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        &mut self.history
    }

    #[must_use]
    pub const fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Set once `quit`/`exit` ran. The router never exits the process.
    #[must_use]
    pub const fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Exit code requested by `exit N`, or the last command's exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.requested_exit.unwrap_or(self.last_exit_code)
    }

    #[must_use]
    pub const fn last_exit_code(&self) -> i32 {
        self.last_exit_code
    }
}

/// Locks the engine, recovering from a poisoned lock.
pub fn lock<E>(engine: &Mutex<E>) -> MutexGuard<'_, E> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

fn evaluation_result(evaluation: Evaluation) -> CommandResult {
    let Evaluation { mut printed, value } = evaluation;
    match value {
        Ok(rendered) => {
            if let Some(rendered) = rendered {
                printed.push_str(&rendered);
            }
            CommandResult::ok(printed)
        }
        Err(e) => CommandResult::new(printed, e.to_string(), 1),
    }
}

/// Splits off the first whitespace-delimited word.
fn split_first_word(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(end) => (&line[..end], line[end..].trim_start()),
        None => (line, ""),
    }
}

/// `.help` is a forced built-in; `./run.sh` or `..` are not.
fn is_command_word(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_word_split() {
        assert_eq!(split_first_word("dll  /tmp/x.so"), ("dll", "/tmp/x.so"));
        assert_eq!(split_first_word("pwd"), ("pwd", ""));
        assert_eq!(split_first_word("alias ll=ls -la"), ("alias", "ll=ls -la"));
    }

    #[test]
    fn forced_builtin_words() {
        assert!(is_command_word("help"));
        assert!(is_command_word("frobnicate"));
        assert!(!is_command_word("/run.sh"));
        assert!(!is_command_word("."));
        assert!(!is_command_word(""));
        assert!(!is_command_word("venv/bin/python"));
    }

    #[test]
    fn evaluation_output_precedes_value() {
        let result = evaluation_result(Evaluation {
            printed: "hi\n".to_string(),
            value: Ok(Some("7".to_string())),
        });
        assert_eq!(result.output(), "hi\n7");
        assert!(result.success());
    }

    #[test]
    fn options_from_config() {
        let mut config = TwinshConfig::default();
        config.shell.timeout_secs = Some(3);
        config.shell.program = vec!["bash".into(), "-c".into()];
        let options = RouterOptions::from(&config);
        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.shell_program, ["bash", "-c"]);
        assert!(options.session_file.is_some());
    }

    #[tokio::test]
    async fn empty_line_is_trivial_success() {
        let mut router = CommandRouter::with_rhai();
        let result = router.execute("   ").await;
        assert!(result.success());
        assert!(result.output().is_empty());
        assert!(router.history().is_empty());
    }

    #[tokio::test]
    async fn mode_keywords_switch() {
        let mut router = CommandRouter::with_rhai();
        assert_eq!(router.mode(), Mode::Shell);
        let result = router.execute("js").await;
        assert!(result.success());
        assert_eq!(router.mode(), Mode::Script);
        router.execute("sh").await;
        assert_eq!(router.mode(), Mode::Shell);
        router.execute("script").await;
        assert_eq!(router.mode(), Mode::Script);
    }

    #[tokio::test]
    async fn script_mode_evaluates() {
        let mut router = CommandRouter::with_rhai();
        router.execute("js").await;
        let result = router.execute("21*2").await;
        assert!(result.success());
        assert_eq!(result.output(), "42");
        assert_eq!(result.exit_code(), 0);
    }

    #[tokio::test]
    async fn script_errors_are_results() {
        let mut router = CommandRouter::with_rhai();
        router.set_mode(Mode::Script);
        let result = router.execute("let = ;").await;
        assert!(!result.success());
        assert_eq!(result.exit_code(), 1);
        assert!(!result.error().is_empty());
        assert_eq!(router.mode(), Mode::Script);
    }

    #[tokio::test]
    async fn escape_is_one_shot() {
        let mut router = CommandRouter::with_rhai();
        let result = router.execute("&1+1").await;
        assert_eq!(result.output(), "2");
        assert_eq!(router.mode(), Mode::Shell);
    }

    #[tokio::test]
    async fn unknown_forced_builtin() {
        let mut router = CommandRouter::with_rhai();
        let result = router.execute(".frobnicate now").await;
        assert!(!result.success());
        assert_eq!(result.exit_code(), 127);
        assert!(result.error().contains("unknown command"));
    }

    #[tokio::test]
    async fn history_records_lines() {
        let mut router = CommandRouter::with_rhai();
        router.execute("js").await;
        router.execute("1").await;
        router.execute("1").await;
        assert_eq!(router.history().iter().collect::<Vec<_>>(), vec!["js", "1"]);
    }

    #[tokio::test]
    async fn completion_sees_script_bindings() {
        let mut router = CommandRouter::with_rhai();
        router.set_mode(Mode::Script);
        router
            .execute("let obj = #{apple: 1, apricot: 2, banana: 3};")
            .await;
        assert_eq!(router.complete("obj.ap"), vec!["apple", "apricot"]);
        assert!(router.complete("nonexistent.deep.path.").is_empty());
    }

    #[test]
    fn session_round_trip() {
        let mut session = SessionFile::default();
        session.mode = Some("script".into());
        session.aliases.insert("ll".into(), "ls -la".into());
        session.extra.insert("theme".into(), "dark".into());

        let mut router = CommandRouter::with_rhai();
        router.apply_session(&session);
        assert_eq!(router.mode(), Mode::Script);
        assert_eq!(router.aliases().get("ll"), Some("ls -la"));
        assert_eq!(router.session_snapshot(), session);
    }

    #[test]
    fn bad_session_mode_is_ignored() {
        let session = SessionFile {
            mode: Some("cobol".into()),
            ..SessionFile::default()
        };
        let mut router = CommandRouter::with_rhai();
        router.apply_session(&session);
        assert_eq!(router.mode(), Mode::Shell);
    }
}
