//! Terminal panes the session writes into.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub cols: u16,
    pub rows: u16,
}

impl Size {
    pub fn new(cols: u16, rows: u16) -> Self {
        Size { cols, rows }
    }
}

pub trait Pane {
    fn write(&mut self, text: &str);

    /// Fit the pane into `size`. Fitting twice to the same size is a no-op.
    fn fit(&mut self, size: Size);

    fn size(&self) -> Size;
}

/// How the viewport is shared between the main pane and the log pane.
pub struct Layout;

impl Layout {
    pub const MIN_LOG_ROWS: u16 = 3;

    pub fn split(viewport: Size, has_log: bool) -> (Size, Option<Size>) {
        if !has_log {
            return (viewport, None);
        }
        let max_log = viewport.rows.saturating_sub(1);
        let log_rows = (viewport.rows / 3).max(Self::MIN_LOG_ROWS).min(max_log);
        let main = Size::new(viewport.cols, viewport.rows - log_rows);
        (main, Some(Size::new(viewport.cols, log_rows)))
    }
}

/// Terminal widgets don't translate line ends themselves.
pub fn crlf(text: &str) -> Cow<'_, str> {
    if !text.contains('\n') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    Cow::Owned(out)
}

/// Main pane plus the optional log pane.
pub struct Panes {
    main: Box<dyn Pane>,
    log: Option<Box<dyn Pane>>,
    // Text after the last newline written to the main pane, usually the prompt.
    main_tail: String,
}

impl Panes {
    pub fn new(main: Box<dyn Pane>) -> Self {
        Panes {
            main,
            log: None,
            main_tail: String::new(),
        }
    }

    pub fn with_log(mut self, log: Box<dyn Pane>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn has_log(&self) -> bool {
        self.log.is_some()
    }

    pub fn fit_all(&mut self, viewport: Size) {
        let (main, log) = Layout::split(viewport, self.has_log());
        self.main.fit(main);
        if let (Some(pane), Some(size)) = (self.log.as_mut(), log) {
            pane.fit(size);
        }
    }

    pub fn write_main(&mut self, text: &str) {
        match text.rfind('\n') {
            Some(i) => self.main_tail = text[i + 1..].to_string(),
            None => self.main_tail.push_str(text),
        }
        self.main.write(&crlf(text));
    }

    /// Falls back to the main pane when there is no log pane.
    pub fn write_log(&mut self, text: &str) {
        match self.log.as_mut() {
            Some(pane) => pane.write(&crlf(text)),
            None => self.write_main(text),
        }
    }

    pub fn main_tail(&self) -> &str {
        &self.main_tail
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs::{File, OpenOptions};
    use std::io::{self, Write};
    use std::path::Path;

    use tracing::warn;

    use super::{Pane, Size};

    /// The process's own terminal.
    #[derive(Debug, Default)]
    pub struct StdoutPane {
        size: Size,
    }

    impl StdoutPane {
        pub fn new() -> Self {
            StdoutPane::default()
        }
    }

    impl Pane for StdoutPane {
        fn write(&mut self, text: &str) {
            let mut out = io::stdout().lock();
            if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
                warn!("cannot write to terminal: {}", e);
            }
        }

        fn fit(&mut self, size: Size) {
            self.size = size;
        }

        fn size(&self) -> Size {
            self.size
        }
    }

    /// Log pane appended to a file, for `tail -f` in another terminal.
    #[derive(Debug)]
    pub struct FilePane {
        file: File,
        size: Size,
    }

    impl FilePane {
        pub fn open(path: &Path) -> io::Result<Self> {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(FilePane {
                file,
                size: Size::default(),
            })
        }
    }

    impl Pane for FilePane {
        fn write(&mut self, text: &str) {
            if let Err(e) = self.file.write_all(text.as_bytes()) {
                warn!("cannot write to log pane: {}", e);
            }
        }

        fn fit(&mut self, size: Size) {
            self.size = size;
        }

        fn size(&self) -> Size {
            self.size
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::{FilePane, StdoutPane};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_without_log() {
        let viewport = Size::new(80, 24);
        assert_eq!(Layout::split(viewport, false), (viewport, None));
    }

    #[test]
    fn layout_with_log() {
        assert_eq!(
            Layout::split(Size::new(80, 24), true),
            (Size::new(80, 16), Some(Size::new(80, 8)))
        );
        assert_eq!(
            Layout::split(Size::new(80, 6), true),
            (Size::new(80, 3), Some(Size::new(80, 3)))
        );
        assert_eq!(
            Layout::split(Size::new(80, 2), true),
            (Size::new(80, 1), Some(Size::new(80, 1)))
        );
    }

    #[test]
    fn crlf_translation() {
        assert_eq!(crlf("a\nb\r\nc"), "a\r\nb\r\nc");
        assert!(matches!(crlf("no newline"), Cow::Borrowed(_)));
    }
}
