use std::env;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, info};

use super::CommandRouter;
use crate::error::{ConsoleError, ConsoleResult};
use crate::extension::ExtensionModule;
use crate::help;
use crate::result::CommandResult;
use crate::script::ScriptEngine;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

impl<E: ScriptEngine> CommandRouter<E> {
    pub(super) fn run_builtin(&mut self, name: &str, args: &str) -> ConsoleResult<CommandResult> {
        debug!(name, args, "Built-in command");
        match name {
            "help" => Ok(cmd_help(args)),
            "quit" | "exit" => self.cmd_exit(args),
            "clear" => Ok(CommandResult::ok(CLEAR_SCREEN)),
            "pwd" => cmd_pwd(),
            "cd" => self.cmd_cd(args),
            "alias" => self.cmd_alias(args),
            "unalias" => self.cmd_unalias(args),
            "history" => self.cmd_history(args),
            "mode" => Ok(CommandResult::ok(self.mode.to_string())),
            "save" => self.cmd_save(),
            "load" => {
                let path = require_path(args, "load PATH")?;
                Ok(self.evaluate_file(&path))
            }
            "dll" => {
                let path = require_path(args, "dll PATH")?;
                let module = self.load_extension(&path)?;
                Ok(CommandResult::ok(format!("loaded {}", describe(module))))
            }
            "unload" => {
                let path = require_path(args, "unload PATH")?;
                self.extensions.unload(&path)?;
                Ok(CommandResult::ok(format!("unloaded {}", path.display())))
            }
            "reload" => {
                let path = require_path(args, "reload PATH")?;
                let mut engine = super::lock(&self.engine);
                let module = self.extensions.reload(&path, &mut *engine)?;
                Ok(CommandResult::ok(format!("reloaded {}", describe(module))))
            }
            "dlls" => Ok(self.cmd_dlls()),
            _ => Err(ConsoleError::UnknownCommand(name.to_string())),
        }
    }

    fn cmd_exit(&mut self, args: &str) -> ConsoleResult<CommandResult> {
        let code = match args.split_whitespace().next() {
            None => None,
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| ConsoleError::Invalid(format!("exit: {raw}: numeric argument required")))?,
            ),
        };
        self.should_quit = true;
        self.requested_exit = code;
        info!(code = ?code, "Quit requested");
        Ok(CommandResult::empty())
    }

    fn cmd_cd(&mut self, args: &str) -> ConsoleResult<CommandResult> {
        let current = env::current_dir().map_err(|e| ConsoleError::io("cd", e))?;
        let (target, announce) = match args.split_whitespace().next() {
            None => (
                dirs::home_dir().ok_or_else(|| ConsoleError::Invalid("cd: HOME not set".to_string()))?,
                false,
            ),
            Some("-") => (
                self.previous_dir
                    .clone()
                    .ok_or_else(|| ConsoleError::Invalid("cd: OLDPWD not set".to_string()))?,
                true,
            ),
            Some(raw) => (expand(raw), false),
        };

        env::set_current_dir(&target)
            .map_err(|e| ConsoleError::io(format!("cd: {}", target.display()), e))?;
        self.previous_dir = Some(current);

        if announce {
            let now = env::current_dir().unwrap_or(target);
            Ok(CommandResult::ok(now.display().to_string()))
        } else {
            Ok(CommandResult::empty())
        }
    }

    fn cmd_alias(&mut self, args: &str) -> ConsoleResult<CommandResult> {
        if args.is_empty() {
            let mut out = String::new();
            for (name, value) in self.aliases.list() {
                let _ = writeln!(out, "alias {name}='{value}'");
            }
            return Ok(CommandResult::ok(out.trim_end().to_string()));
        }

        match args.split_once('=') {
            Some((name, value)) => {
                let name = name.trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(ConsoleError::Invalid(format!("alias: invalid name `{name}`")));
                }
                let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
                self.aliases.set(name, value);
                Ok(CommandResult::empty())
            }
            None => {
                let name = args.trim();
                self.aliases.get(name).map_or_else(
                    || Err(ConsoleError::Invalid(format!("alias: {name}: not found"))),
                    |value| Ok(CommandResult::ok(format!("alias {name}='{value}'"))),
                )
            }
        }
    }

    fn cmd_unalias(&mut self, args: &str) -> ConsoleResult<CommandResult> {
        let mut names = args.split_whitespace().peekable();
        if names.peek().is_none() {
            return Err(ConsoleError::Usage("unalias NAME"));
        }
        for name in names {
            if self.aliases.remove(name).is_none() {
                return Err(ConsoleError::Invalid(format!("unalias: {name}: not found")));
            }
        }
        Ok(CommandResult::empty())
    }

    fn cmd_history(&self, args: &str) -> ConsoleResult<CommandResult> {
        let total = self.history.len();
        let count = match args.split_whitespace().next() {
            None => total,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ConsoleError::Invalid(format!("history: {raw}: numeric argument required")))?,
        };
        let skip = total.saturating_sub(count);
        let mut out = String::new();
        for (index, line) in self.history.iter().enumerate().skip(skip) {
            let _ = writeln!(out, "{:5}  {line}", index + 1);
        }
        Ok(CommandResult::ok(out.trim_end().to_string()))
    }

    fn cmd_save(&self) -> ConsoleResult<CommandResult> {
        let path = self
            .options
            .session_file
            .clone()
            .ok_or_else(|| ConsoleError::Invalid("save: no session file configured".to_string()))?;
        self.session_snapshot().save(&path)?;
        Ok(CommandResult::ok(format!("saved session to {}", path.display())))
    }

    fn cmd_dlls(&self) -> CommandResult {
        if self.extensions.is_empty() {
            return CommandResult::ok("no extensions loaded");
        }
        let mut out = String::new();
        for module in self.extensions.list_loaded() {
            let age = SystemTime::now()
                .duration_since(module.loaded_at())
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let _ = writeln!(out, "{}  (loaded {age}s ago)", describe(module));
        }
        CommandResult::ok(out.trim_end().to_string())
    }
}

fn cmd_help(args: &str) -> CommandResult {
    match args.split_whitespace().next() {
        None => CommandResult::ok(help::format_help_list()),
        Some(name) => {
            let name = name.trim_start_matches(super::BUILTIN_PREFIX);
            help::get_help(name).map_or_else(
                || CommandResult::new(String::new(), format!("help: no help for `{name}`"), 1),
                |cmd| CommandResult::ok(help::format_help(cmd)),
            )
        }
    }
}

fn cmd_pwd() -> ConsoleResult<CommandResult> {
    let cwd = env::current_dir().map_err(|e| ConsoleError::io("pwd", e))?;
    Ok(CommandResult::ok(cwd.display().to_string()))
}

fn describe(module: &ExtensionModule) -> String {
    let functions = module.functions();
    if functions.is_empty() {
        module.path().display().to_string()
    } else {
        format!("{} [{}]", module.path().display(), functions.join(", "))
    }
}

fn require_path(args: &str, usage: &'static str) -> ConsoleResult<PathBuf> {
    let raw = args.trim().trim_matches(|c| c == '\'' || c == '"');
    if raw.is_empty() {
        return Err(ConsoleError::Usage(usage));
    }
    Ok(expand(raw))
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
