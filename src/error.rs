//! Error types and Result alias for the REPL front end.

use std::io;

use thiserror::Error;

use crate::vfs::VfsError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Persistent filesystem failed to mount or sync. Fatal for the session.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error("cannot start interpreter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("interpreter {0} is not piped")]
    Pipe(&'static str),

    #[error("interpreter I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Error reported by the interpreter module itself.
    #[error("interpreter module: {0}")]
    Module(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
