//! Terminal bootstrap: wires the panes, the interpreter module, the persistent
//! filesystem and the host window together.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::pane::{Panes, Size};
use crate::render::RESET;
use crate::repl::{ModuleEvent, ReplModule};
use crate::vfs::{PersistentFs, SyncDirection};

/// Written when the interpreter asks to quit but the host keeps running.
pub const CLOSE_FALLBACK: &str = "\n[session ended, the window can be closed now]\n";

const ERROR_STYLE: &str = "\x1B[91m";

/// Whatever hosts the terminal: a browser window or the native event loop.
pub trait Host {
    /// Try to close the host. Returns false when the host refused.
    fn close_window(&mut self) -> bool;
}

impl<H: Host + ?Sized> Host for Box<H> {
    fn close_window(&mut self) -> bool {
        (**self).close_window()
    }
}

pub struct Session<M, F, H> {
    config: Config,
    panes: Panes,
    module: M,
    fs: F,
    host: H,
    closed: bool,
}

impl<M, F, H> Session<M, F, H>
where
    M: ReplModule,
    F: PersistentFs,
    H: Host,
{
    pub fn new(config: Config, panes: Panes, module: M, fs: F, host: H) -> Self {
        Session {
            config,
            panes,
            module,
            fs,
            host,
            closed: false,
        }
    }

    /// Mount the filesystem, fit the panes, then bring up the REPL.
    pub fn start(&mut self, viewport: Size) -> Result<()> {
        self.fs.mount()?;
        info!(debug = self.config.debug, "starting REPL session");

        self.panes.fit_all(viewport);

        let events = self.module.init()?;
        self.dispatch(events)?;

        if let Some(mut input) = self.config.input.clone().filter(|_| !self.closed) {
            if !input.ends_with('\n') {
                input.push('\n');
            }
            debug!(input = input.trim_end(), "running initial input");
            self.panes.write_main(&input);
            let events = self.module.step(&input)?;
            self.dispatch(events)?;
        }

        self.prompt()
    }

    pub fn prompt(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let events = self.module.prompt()?;
        self.dispatch(events)
    }

    /// Forward terminal data to the interpreter.
    pub fn on_data(&mut self, data: &str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let events = self.module.step(data)?;
        self.dispatch(events)
    }

    pub fn on_resize(&mut self, viewport: Size) {
        debug!(cols = viewport.cols, rows = viewport.rows, "resize");
        self.panes.fit_all(viewport);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Unfinished last line of the main pane, usually the interpreter's prompt.
    pub fn prompt_line(&self) -> &str {
        self.panes.main_tail()
    }

    fn dispatch(&mut self, events: Vec<ModuleEvent>) -> Result<()> {
        for event in events {
            match event {
                ModuleEvent::Output(text) => self.panes.write_main(&text),
                ModuleEvent::Error(text) => self.on_error(&text),
                ModuleEvent::Quit => self.on_quit(),
                ModuleEvent::Sync => {
                    debug!("interpreter requested filesystem sync");
                    self.fs.sync(SyncDirection::Store)?;
                }
            }
        }
        Ok(())
    }

    fn on_error(&mut self, text: &str) {
        if self.config.debug && self.panes.has_log() {
            self.panes.write_log(text);
        } else {
            self.panes.write_main(&format!("{}{}{}", ERROR_STYLE, text, RESET));
        }
    }

    fn on_quit(&mut self) {
        info!("interpreter requested quit");
        if !self.host.close_window() {
            warn!("host refused to close");
            self.panes.write_main(CLOSE_FALLBACK);
        }
        self.closed = true;
    }
}
