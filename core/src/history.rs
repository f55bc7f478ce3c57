//! Executed command lines with a navigation cursor.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Capped log of executed lines.
///
/// The `twinsh` REPL hands these entries to rustyline, which does its own
/// arrow-key navigation; [`previous`](Self::previous) and
/// [`next`](Self::next) serve front ends without a line editor of their own.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    max_entries: usize,
    /// Index of the selected entry; `None` means no selection.
    cursor: Option<usize>,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl CommandHistory {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            cursor: None,
        }
    }

    /// Appends `line`. Blank lines and repeats of the newest entry are
    /// dropped; the oldest entry is evicted past the cap. Always clears the
    /// cursor.
    pub fn add(&mut self, line: &str) {
        self.cursor = None;
        if line.trim().is_empty() {
            return;
        }
        if self.entries.back().is_some_and(|last| last == line) {
            return;
        }
        self.entries.push_back(line.to_string());
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Moves toward older entries. Returns `""` once past the oldest.
    pub fn previous(&mut self) -> &str {
        let next = match self.cursor {
            None if self.entries.is_empty() => return "",
            None => self.entries.len() - 1,
            Some(0) => return "",
            Some(i) => i - 1,
        };
        self.cursor = Some(next);
        &self.entries[next]
    }

    /// Moves toward newer entries. Returns `""` and clears the selection
    /// once past the newest.
    pub fn next(&mut self) -> &str {
        match self.cursor {
            Some(i) if i + 1 < self.entries.len() => {
                self.cursor = Some(i + 1);
                &self.entries[i + 1]
            }
            _ => {
                self.cursor = None;
                ""
            }
        }
    }

    /// Replaces the contents with the newest `max_entries` lines of `path`.
    /// A missing file leaves the history empty.
    ///
    /// # Errors
    ///
    /// Returns any read error other than "not found".
    pub fn load(&mut self, path: &Path) -> io::Result<()> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        self.entries.clear();
        self.cursor = None;
        for line in text.lines() {
            self.add(line);
        }
        debug!(path = ?path, entries = self.entries.len(), "Loaded history");
        Ok(())
    }

    /// Writes the entries newline-delimited, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the underlying write error.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        fs::write(path, text)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.entries.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }
}
