use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, Editor};
use tracing::{debug, warn};
use twinsh_config::TwinshConfig;
use twinsh_core::{CommandRouter, RhaiEngine};

use crate::completer::TwinshHelper;
use crate::{print_result, prompt};

/// Runs the interactive loop until `quit`/`exit` or end of input and
/// returns the process exit code.
pub async fn run(
    router: &mut CommandRouter<RhaiEngine>,
    config: &TwinshConfig,
) -> Result<i32, ReadlineError> {
    let history_config = &config.shell.history;
    let rl_config = Config::builder()
        .completion_type(CompletionType::List)
        .max_history_size(history_config.max_entries.max(1))?
        .history_ignore_dups(true)?
        .history_ignore_space(true)
        .build();

    let mut rl: Editor<TwinshHelper<RhaiEngine>, DefaultHistory> = Editor::with_config(rl_config)?;
    rl.set_helper(Some(TwinshHelper::new(router.engine())));

    let history_path = history_config.enabled.then(|| history_config.path());
    if let Some(path) = &history_path {
        if let Err(e) = router.history_mut().load(path) {
            warn!(path = ?path, error = %e, "Could not read history");
        }
        let entries: Vec<String> = router.history().iter().map(str::to_string).collect();
        for entry in entries {
            let _ = rl.add_history_entry(entry);
        }
    }

    println!("twinsh v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for built-ins, 'js'/'shell' to switch modes, 'exit' to quit.");
    println!();

    let home = twinsh_config::expand_path("~");
    loop {
        let cwd = std::env::current_dir().unwrap_or_default();
        let prompt = prompt::render(
            &config.shell.prompt,
            router.mode(),
            &cwd,
            Some(home.as_path()),
            router.last_exit_code(),
        );

        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                let result = router.execute(&line).await;
                print_result(&result);
                if router.should_quit() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("twinsh: {err}");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        match router.history().save(path) {
            Ok(()) => debug!(path = ?path, "Saved history"),
            Err(e) => warn!(path = ?path, error = %e, "Could not save history"),
        }
    }

    Ok(router.exit_code())
}
