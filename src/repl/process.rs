use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{ModuleEvent, ReplModule};
use crate::error::{Error, Result};

/// Interpreter running as a child process with piped stdio.
///
/// Output arrives on reader threads. Each call collects it until the child
/// has been quiet for `settle`.
pub struct ProcessModule {
    child: Child,
    stdin: Option<ChildStdin>,
    events: Receiver<ModuleEvent>,
    settle: Duration,
    sync_after_step: bool,
    exited: bool,
}

fn forward<R>(mut reader: R, tx: Sender<ModuleEvent>, wrap: fn(String) -> ModuleEvent, quit_on_eof: bool)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let mut pending = Vec::new();

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("interpreter pipe read failed: {}", e);
                    break;
                }
            }

            // Hold back an incomplete UTF-8 sequence until the rest arrives.
            let complete = match std::str::from_utf8(&pending) {
                Ok(s) => s.len(),
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                Err(_) => pending.len(),
            };
            if complete == 0 {
                continue;
            }
            let text = String::from_utf8_lossy(&pending[..complete]).into_owned();
            pending.drain(..complete);
            if tx.send(wrap(text)).is_err() {
                return;
            }
        }

        if !pending.is_empty() {
            let _ = tx.send(wrap(String::from_utf8_lossy(&pending).into_owned()));
        }
        if quit_on_eof {
            let _ = tx.send(ModuleEvent::Quit);
        }
    });
}

impl ProcessModule {
    pub fn spawn(program: &str, args: &[String], working_dir: &Path, settle: Duration) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;
        debug!(program, pid = child.id(), "interpreter started");

        let stdin = child.stdin.take().ok_or(Error::Pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(Error::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(Error::Pipe("stderr"))?;

        let (tx, events) = mpsc::channel();
        forward(stdout, tx.clone(), ModuleEvent::Output, true);
        forward(stderr, tx, ModuleEvent::Error, false);

        Ok(ProcessModule {
            child,
            stdin: Some(stdin),
            events,
            settle,
            sync_after_step: true,
            exited: false,
        })
    }

    /// Request a filesystem sync after every step (on by default).
    pub fn sync_after_step(mut self, enable: bool) -> Self {
        self.sync_after_step = enable;
        self
    }

    fn drain(&mut self) -> Vec<ModuleEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.recv_timeout(self.settle) {
                Ok(ModuleEvent::Quit) => {
                    self.exited = true;
                    self.stdin = None;
                    // stderr may still hold the last words
                    events.extend(self.events.try_iter().filter(|e| *e != ModuleEvent::Quit));
                    events.push(ModuleEvent::Quit);
                    break;
                }
                Ok(event) => events.push(event),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        events
    }
}

impl ReplModule for ProcessModule {
    fn init(&mut self) -> Result<Vec<ModuleEvent>> {
        Ok(self.drain())
    }

    fn prompt(&mut self) -> Result<Vec<ModuleEvent>> {
        Ok(self.drain())
    }

    fn step(&mut self, input: &str) -> Result<Vec<ModuleEvent>> {
        if self.exited {
            return Ok(Vec::new());
        }

        if let Some(stdin) = self.stdin.as_mut() {
            let written = stdin.write_all(input.as_bytes()).and_then(|_| stdin.flush());
            match written {
                Ok(()) => (),
                // the child is gone, its reader thread reports the quit
                Err(e) if e.kind() == ErrorKind::BrokenPipe => self.stdin = None,
                Err(e) => return Err(e.into()),
            }
        }

        let mut events = self.drain();
        if self.sync_after_step && !self.exited {
            events.push(ModuleEvent::Sync);
        }
        Ok(events)
    }
}

impl Drop for ProcessModule {
    fn drop(&mut self) {
        self.stdin = None;
        if !self.exited {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
