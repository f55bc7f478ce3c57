use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use twinsh_core::router::lock;
use twinsh_core::{complete, expression_at, help, ObjectGraph, BUILTIN_PREFIX};

/// Completes built-in names on the first word and script expressions
/// everywhere else, reading the engine shared with the router.
pub struct TwinshHelper<G> {
    engine: Arc<Mutex<G>>,
}

impl<G> TwinshHelper<G> {
    pub fn new(engine: Arc<Mutex<G>>) -> Self {
        Self { engine }
    }
}

impl<G: ObjectGraph> TwinshHelper<G> {
    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<Pair>) {
        let pos = pos.min(line.len());
        let head = &line[..pos];
        let (start, word) = find_word_start(head);
        let is_first_word = head[..start].trim().is_empty();

        if is_first_word && !word.is_empty() {
            let builtins = complete_builtin(word);
            if !builtins.is_empty() {
                return (start, builtins);
            }
        }

        let (expr_start, expr) = expression_at(line, pos);
        let replace_from = expr_start + expr.rfind('.').map_or(0, |dot| dot + 1);
        let names = complete(&*lock(&self.engine), expr);
        let pairs = names
            .into_iter()
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();
        (replace_from, pairs)
    }
}

fn complete_builtin(word: &str) -> Vec<Pair> {
    let (marker, name) = match word.strip_prefix(BUILTIN_PREFIX) {
        Some(rest) => (".", rest),
        None => ("", word),
    };
    help::COMMANDS
        .iter()
        .filter(|cmd| cmd.name.starts_with(name))
        .map(|cmd| Pair {
            display: cmd.name.to_string(),
            replacement: format!("{marker}{}", cmd.name),
        })
        .collect()
}

fn find_word_start(line: &str) -> (usize, &str) {
    let mut start = line.len();
    for (i, c) in line.char_indices().rev() {
        if c.is_whitespace() || c == ';' || c == '|' || c == '&' || c == '>' || c == '<' {
            break;
        }
        start = i;
    }
    (start, &line[start..])
}

impl<G: ObjectGraph> Completer for TwinshHelper<G> {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.candidates(line, pos))
    }
}

impl<G> Hinter for TwinshHelper<G> {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl<G> Highlighter for TwinshHelper<G> {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }
}

impl<G> Validator for TwinshHelper<G> {}

impl<G: ObjectGraph> Helper for TwinshHelper<G> {}
