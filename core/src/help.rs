//! Built-in command descriptions, shared by `help` and line-editor
//! completion.

use std::fmt::Write;

pub struct CommandHelp {
    pub name: &'static str,
    pub summary: &'static str,
    pub usage: &'static str,
}

pub const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "alias",
        summary: "Define or display aliases",
        usage: "alias [name[=value]]",
    },
    CommandHelp {
        name: "cd",
        summary: "Change the working directory (no argument: home, '-': previous)",
        usage: "cd [DIR|-]",
    },
    CommandHelp {
        name: "clear",
        summary: "Clear the terminal",
        usage: "clear",
    },
    CommandHelp {
        name: "dll",
        summary: "Load a native extension module",
        usage: "dll PATH",
    },
    CommandHelp {
        name: "dlls",
        summary: "List loaded extension modules",
        usage: "dlls",
    },
    CommandHelp {
        name: "exit",
        summary: "Leave the console",
        usage: "exit [CODE]",
    },
    CommandHelp {
        name: "help",
        summary: "Show built-in commands",
        usage: "help [COMMAND]",
    },
    CommandHelp {
        name: "history",
        summary: "Show executed lines",
        usage: "history [N]",
    },
    CommandHelp {
        name: "load",
        summary: "Evaluate a script file",
        usage: "load PATH",
    },
    CommandHelp {
        name: "mode",
        summary: "Show the current mode",
        usage: "mode",
    },
    CommandHelp {
        name: "pwd",
        summary: "Print the working directory",
        usage: "pwd",
    },
    CommandHelp {
        name: "quit",
        summary: "Leave the console",
        usage: "quit [CODE]",
    },
    CommandHelp {
        name: "reload",
        summary: "Unload then load an extension module",
        usage: "reload PATH",
    },
    CommandHelp {
        name: "save",
        summary: "Write aliases and mode to the session file",
        usage: "save",
    },
    CommandHelp {
        name: "unalias",
        summary: "Remove an alias",
        usage: "unalias NAME",
    },
    CommandHelp {
        name: "unload",
        summary: "Release an extension module",
        usage: "unload PATH",
    },
];

#[must_use]
pub fn get_help(name: &str) -> Option<&'static CommandHelp> {
    COMMANDS.iter().find(|c| c.name == name)
}

#[must_use]
pub fn is_builtin(name: &str) -> bool {
    get_help(name).is_some()
}

#[must_use]
pub fn format_help(cmd: &CommandHelp) -> String {
    format!("{} - {}\n\nUsage: {}", cmd.name, cmd.summary, cmd.usage)
}

#[must_use]
pub fn format_help_list() -> String {
    let mut out = String::from("Built-in commands:\n\n");
    for cmd in COMMANDS {
        let _ = writeln!(out, "  {:10} {}", cmd.name, cmd.summary);
    }
    out.push_str(
        "\n'js' or 'script' switches to script mode, 'shell' or 'sh' back.\n\
         In shell mode, prefix a line with '&' to evaluate it as script once.\n\
         Prefix a built-in with '.' to call it explicitly, e.g. '.help'.",
    );
    out
}
