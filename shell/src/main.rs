use clap::Parser;
use tracing::{info, warn};
use twinsh_config::{expand_path, SessionFile, TwinshConfig};
use twinsh_core::{CommandResult, CommandRouter, RhaiEngine, RouterOptions};

mod cli;
mod completer;
mod logging;
mod prompt;
mod repl;

use cli::{Args, Inputs};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => twinsh_config::load_from_file(path),
        None => twinsh_config::load(),
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("twinsh: failed to load config: {e}, using defaults");
        TwinshConfig::default()
    });

    logging::init(&config.logging);

    let code = run(args, &config).await;
    std::process::exit(code);
}

async fn run(args: Args, config: &TwinshConfig) -> i32 {
    let inputs = Inputs::classify(&args.inputs, &config.script.file_extension);
    let mut router = CommandRouter::with_options(RhaiEngine::new(), RouterOptions::from(config));

    let session_path = config.shell.session_path();
    match SessionFile::load(&session_path) {
        Ok(session) => router.apply_session(&session),
        Err(e) => warn!(path = ?session_path, error = %e, "Ignoring session file"),
    }
    if let Some(mode) = args.mode {
        router.set_mode(mode);
    }

    load_configured_extensions(&mut router, config);

    let mut failed = false;
    for path in &inputs.extensions {
        if let Err(e) = router.load_extension(path) {
            eprintln!("twinsh: {e}");
            failed = true;
        }
    }
    if failed && !args.interactive {
        return 1;
    }

    if let Some(command) = args.command {
        let result = router.execute(&command).await;
        if args.json {
            match result.to_json() {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("twinsh: {e}"),
            }
        } else {
            print_result(&result);
        }
        return router.exit_code();
    }

    if let Some(script) = &inputs.script {
        let result = router.run_script_file(script);
        print_result(&result);
        if !args.interactive {
            return if result.success() { 0 } else { 1 };
        }
    }

    match repl::run(&mut router, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("twinsh: {e}");
            1
        }
    }
}

fn load_configured_extensions(router: &mut CommandRouter<RhaiEngine>, config: &TwinshConfig) {
    let mut total_loaded = 0;

    for dir in &config.extensions.directories {
        let path = expand_path(dir);
        if path.is_dir() {
            let count = router.load_extension_directory(&path);
            if count > 0 {
                info!(dir = %dir, count, "Loaded extensions");
                total_loaded += count;
            }
        }
    }

    for entry in &config.extensions.preload {
        let path = expand_path(entry);
        if !path.exists() {
            warn!(path = %entry, "Preload extension not found");
            continue;
        }
        match router.load_extension(&path) {
            Ok(module) => {
                info!(path = ?module.path(), functions = module.functions().len(), "Preloaded extension");
                total_loaded += 1;
            }
            Err(e) => warn!(path = %entry, error = %e, "Failed to preload extension"),
        }
    }

    if total_loaded > 0 {
        let loaded: Vec<_> = router.extensions().list_loaded().map(|m| m.path().to_path_buf()).collect();
        info!(extensions = ?loaded, "Available extensions");
    }
}

/// Output to stdout, error text to stderr.
pub(crate) fn print_result(result: &CommandResult) {
    let output = result.output();
    if !output.is_empty() {
        if output.ends_with('\n') {
            print!("{output}");
        } else {
            println!("{output}");
        }
    }
    if !result.error().is_empty() {
        eprintln!("{}", result.error());
    }
}
