//! Prompt template rendering.

use std::env;
use std::path::Path;
use twinsh_core::Mode;

const COLOURS: &[(&str, &str)] = &[
    ("{red}", "\x1b[31m"),
    ("{green}", "\x1b[32m"),
    ("{blue}", "\x1b[34m"),
    ("{yellow}", "\x1b[33m"),
    ("{cyan}", "\x1b[36m"),
    ("{bold}", "\x1b[1m"),
    ("{reset}", "\x1b[0m"),
];

/// Fills `{mode}`, `{cwd}`, `{user}`, `{status}` and the colour tags.
pub fn render(template: &str, mode: Mode, cwd: &Path, home: Option<&Path>, status: i32) -> String {
    let mut prompt = template
        .replace("{mode}", mode.as_str())
        .replace("{cwd}", &display_cwd(cwd, home))
        .replace("{user}", &prompt_user())
        .replace("{status}", &status.to_string());
    for (tag, code) in COLOURS {
        prompt = prompt.replace(tag, code);
    }
    prompt
}

/// The working directory with the home prefix shown as `~`.
fn display_cwd(cwd: &Path, home: Option<&Path>) -> String {
    match home.and_then(|home| cwd.strip_prefix(home).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => cwd.display().to_string(),
    }
}

fn prompt_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "anonymous".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_cwd_and_status() {
        let prompt = render("{mode}:{cwd} [{status}]> ", Mode::Script, Path::new("/srv/app"), None, 3);
        assert_eq!(prompt, "script:/srv/app [3]> ");
    }

    #[test]
    fn home_is_abbreviated() {
        let home = Path::new("/home/ada");
        assert_eq!(display_cwd(Path::new("/home/ada"), Some(home)), "~");
        assert_eq!(display_cwd(Path::new("/home/ada/src"), Some(home)), "~/src");
        assert_eq!(display_cwd(Path::new("/home/adam"), Some(home)), "/home/adam");
    }

    #[test]
    fn colour_tags_become_escapes() {
        let prompt = render("{green}{mode}{reset}> ", Mode::Shell, Path::new("/"), None, 0);
        assert_eq!(prompt, "\x1b[32mshell\x1b[0m> ");
    }
}
