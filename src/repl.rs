//! Boundary to the interpreter module.
//!
//! The interpreter is an opaque, separately built program. It exposes three
//! entry points (init, prompt, step) and reports everything else through
//! callbacks: output, error output, quit request and filesystem sync request.
//! Here those callbacks are [`ModuleEvent`]s returned from each entry point,
//! in the order the module raised them.

#[cfg(not(target_arch = "wasm32"))]
pub mod process;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    Output(String),
    Error(String),
    Quit,
    Sync,
}

pub trait ReplModule {
    /// One-time REPL state setup (`repl_init`).
    fn init(&mut self) -> Result<Vec<ModuleEvent>>;

    /// Emit the prompt (`repl_prompt`).
    fn prompt(&mut self) -> Result<Vec<ModuleEvent>>;

    /// Feed one chunk of user input (`repl_step`).
    fn step(&mut self, input: &str) -> Result<Vec<ModuleEvent>>;
}

impl<M: ReplModule + ?Sized> ReplModule for Box<M> {
    fn init(&mut self) -> Result<Vec<ModuleEvent>> {
        (**self).init()
    }

    fn prompt(&mut self) -> Result<Vec<ModuleEvent>> {
        (**self).prompt()
    }

    fn step(&mut self, input: &str) -> Result<Vec<ModuleEvent>> {
        (**self).step(input)
    }
}
