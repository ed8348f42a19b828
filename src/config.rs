//! Startup configuration.
//!
//! In the browser the configuration comes from the page URL
//! (`?debug&input=...`). The native binary reads an optional TOML file and
//! lets command line flags override it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Show the log pane and route interpreter errors into it.
    pub debug: bool,

    /// Input run once the REPL is up, as if typed by the user.
    pub input: Option<String>,

    /// Interpreter program for the native binary.
    pub interpreter: String,

    pub args: Vec<String>,

    /// Directory the interpreter works in. A scratch directory when unset.
    pub working_dir: Option<PathBuf>,

    pub persistent_dir: Option<PathBuf>,

    pub log_file: Option<PathBuf>,

    /// How long the interpreter may stay quiet before its output is
    /// considered complete.
    pub settle_ms: u64,

    pub history_size: usize,

    /// Where the line editor keeps its history between sessions.
    pub history_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            input: None,
            interpreter: "fire".to_string(),
            args: Vec::new(),
            working_dir: None,
            persistent_dir: None,
            log_file: None,
            settle_ms: 50,
            history_size: 1000,
            history_file: None,
        }
    }
}

fn truthy(value: &str) -> bool {
    value.is_empty()
        || ["1", "true", "yes", "on"]
            .iter()
            .any(|v| value.eq_ignore_ascii_case(v))
}

impl Config {
    /// Read `debug` and `input` from a URL query string, with or without the
    /// leading `?`. Unknown parameters are ignored.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut config = Config::default();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "debug" => config.debug = truthy(&value),
                "input" => config.input = Some(value.into_owned()),
                _ => (),
            }
        }

        config
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Config::from_toml(&text)
    }

    /// `~/.config/fire-term/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fire-term").join("config.toml"))
    }

    pub fn default_persistent_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("fire-term").join("persistent"))
    }

    pub fn default_history_file() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("fire-term").join("history"))
    }
}
