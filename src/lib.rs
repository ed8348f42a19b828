//! Front end of the Fire Script REPL.
//!
//! A terminal pane wired to the interpreter module: keystrokes go to
//! `repl_step`, the module's output comes back into the pane, and the
//! interpreter's working directory lives on a persistent filesystem. The same
//! session core runs in the browser (xterm.js + Emscripten, see `web`) and in
//! a native terminal (the `fire-term` binary).
//!
//! The crate also carries the Fire Script lexical grammar used to highlight
//! source files, REPL transcripts and the line being edited.

pub mod command;
pub mod config;
pub mod error;
pub mod grammar;
pub mod highlight;
pub mod history;
pub mod pane;
pub mod render;
pub mod repl;
pub mod session;
pub mod vfs;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Host, Session};
