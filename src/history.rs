//! Line editor history, kept across sessions in a plain text file.
//!
//! One entry per line. Multi-line entries are stored with `\n` escaped
//! (and `\` doubled) so every entry stays on a single line of the file.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Read `path`, keeping the newest `capacity` entries. A missing file is
    /// an empty history.
    pub fn load(path: &Path, capacity: usize) -> io::Result<Self> {
        let mut history = History::new(capacity);
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(history),
            Err(e) => return Err(e),
        };
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                history.push(&unescape(&line));
            }
        }
        Ok(history)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        for entry in &self.entries {
            writeln!(out, "{}", escape(entry))?;
        }
        out.flush()
    }

    /// Blank input and an immediate repeat of the last entry are skipped.
    pub fn push(&mut self, entry: &str) {
        if self.capacity == 0 || entry.trim().is_empty() {
            return;
        }
        if self.entries.back().map(String::as_str) == Some(entry) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.to_string());
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn escape(entry: &str) -> String {
    entry.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
