//! Command-line arguments and positional input classification.

use clap::Parser;
use std::path::{Path, PathBuf};
use twinsh_core::Mode;

/// twinsh - hybrid shell/script console with hot-loadable native extensions
#[derive(Parser, Debug)]
#[command(name = "twinsh", version, about)]
pub struct Args {
    /// Enter the REPL after loading modules and running the script
    #[arg(short, long)]
    pub interactive: bool,

    /// Execute one line and exit with its exit code
    #[arg(short = 'c', value_name = "COMMAND")]
    pub command: Option<String>,

    /// Configuration file (overrides the default search paths)
    #[arg(long, value_name = "FILE", env = "TWINSH_CONFIG")]
    pub config: Option<String>,

    /// Print the result of `-c` as JSON
    #[arg(long, requires = "command")]
    pub json: bool,

    /// Initial mode
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<Mode>,

    /// Script file and/or extension modules, in load order
    #[arg(value_name = "INPUTS")]
    pub inputs: Vec<PathBuf>,
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    raw.parse::<Mode>().map_err(|e| e.to_string())
}

/// Positional arguments split into the script to run and the extension
/// modules to load before it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Inputs {
    pub script: Option<PathBuf>,
    pub extensions: Vec<PathBuf>,
}

impl Inputs {
    /// The first input with the script extension (or `js`, or no extension
    /// at all) is the script; everything else is an extension module.
    pub fn classify(inputs: &[PathBuf], script_extension: &str) -> Self {
        let mut classified = Self::default();
        for input in inputs {
            if classified.script.is_none() && is_script(input, script_extension) {
                classified.script = Some(input.clone());
            } else {
                classified.extensions.push(input.clone());
            }
        }
        classified
    }
}

fn is_script(path: &Path, script_extension: &str) -> bool {
    let wanted = script_extension.trim_start_matches('.');
    match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => ext.eq_ignore_ascii_case(wanted) || ext.eq_ignore_ascii_case("js"),
    }
}
