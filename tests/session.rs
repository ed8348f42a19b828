use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use fire_term::error::{Error, Result};
use fire_term::pane::{Pane, Panes, Size};
use fire_term::repl::{ModuleEvent, ReplModule};
use fire_term::session::{Host, Session, CLOSE_FALLBACK};
use fire_term::vfs::{PersistentFs, SyncDirection, VfsError};
use fire_term::Config;
use pretty_assertions::assert_eq;

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Default)]
struct Screen {
    text: String,
    size: Size,
    fits: Vec<Size>,
}

#[derive(Clone, Default)]
struct MockPane(Rc<RefCell<Screen>>);

impl MockPane {
    fn text(&self) -> String {
        self.0.borrow().text.clone()
    }

    fn fits(&self) -> Vec<Size> {
        self.0.borrow().fits.clone()
    }
}

impl Pane for MockPane {
    fn write(&mut self, text: &str) {
        self.0.borrow_mut().text.push_str(text);
    }

    fn fit(&mut self, size: Size) {
        let mut screen = self.0.borrow_mut();
        screen.size = size;
        screen.fits.push(size);
    }

    fn size(&self) -> Size {
        self.0.borrow().size
    }
}

struct Scripted {
    log: Log,
    init: Vec<ModuleEvent>,
    steps: VecDeque<Vec<ModuleEvent>>,
}

impl ReplModule for Scripted {
    fn init(&mut self) -> Result<Vec<ModuleEvent>> {
        self.log.borrow_mut().push("init".to_string());
        Ok(std::mem::take(&mut self.init))
    }

    fn prompt(&mut self) -> Result<Vec<ModuleEvent>> {
        self.log.borrow_mut().push("prompt".to_string());
        Ok(vec![ModuleEvent::Output("_1 ? ".to_string())])
    }

    fn step(&mut self, input: &str) -> Result<Vec<ModuleEvent>> {
        self.log.borrow_mut().push(format!("step {:?}", input));
        Ok(self.steps.pop_front().unwrap_or_default())
    }
}

struct MockFs {
    log: Log,
    fail_store: bool,
}

impl PersistentFs for MockFs {
    fn mount(&mut self) -> std::result::Result<(), VfsError> {
        self.log.borrow_mut().push("mount".to_string());
        Ok(())
    }

    fn sync(&mut self, direction: SyncDirection) -> std::result::Result<(), VfsError> {
        self.log.borrow_mut().push(format!("sync {}", direction));
        if self.fail_store && direction == SyncDirection::Store {
            return Err(VfsError::Backend {
                direction,
                message: "quota exceeded".to_string(),
            });
        }
        Ok(())
    }
}

struct MockHost {
    accept: bool,
    requests: Rc<Cell<usize>>,
}

impl Host for MockHost {
    fn close_window(&mut self) -> bool {
        self.requests.set(self.requests.get() + 1);
        self.accept
    }
}

struct Fixture {
    log: Log,
    main: MockPane,
    errors: MockPane,
    close_requests: Rc<Cell<usize>>,
    session: Session<Scripted, MockFs, MockHost>,
}

struct Setup {
    config: Config,
    init: Vec<ModuleEvent>,
    steps: Vec<Vec<ModuleEvent>>,
    fail_store: bool,
    host_accepts: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Setup {
            config: Config::default(),
            init: Vec::new(),
            steps: Vec::new(),
            fail_store: false,
            host_accepts: false,
        }
    }
}

impl Setup {
    fn build(self) -> Fixture {
        let log = Log::default();
        let main = MockPane::default();
        let errors = MockPane::default();
        let close_requests = Rc::new(Cell::new(0));

        let mut panes = Panes::new(Box::new(main.clone()));
        if self.config.debug {
            panes = panes.with_log(Box::new(errors.clone()));
        }
        let module = Scripted {
            log: log.clone(),
            init: self.init,
            steps: self.steps.into(),
        };
        let fs = MockFs {
            log: log.clone(),
            fail_store: self.fail_store,
        };
        let host = MockHost {
            accept: self.host_accepts,
            requests: close_requests.clone(),
        };

        Fixture {
            log: log.clone(),
            main,
            errors,
            close_requests,
            session: Session::new(self.config, panes, module, fs, host),
        }
    }
}

fn debug_config() -> Config {
    Config {
        debug: true,
        ..Config::default()
    }
}

const VIEWPORT: Size = Size { cols: 80, rows: 24 };

#[test]
fn start_mounts_before_init_and_runs_initial_input() {
    let mut f = Setup {
        config: Config {
            input: Some("1 + 2".to_string()),
            ..Config::default()
        },
        init: vec![ModuleEvent::Output("Fire Script REPL\n".to_string())],
        steps: vec![vec![ModuleEvent::Output("3\n".to_string())]],
        ..Setup::default()
    }
    .build();

    f.session.start(VIEWPORT).unwrap();

    assert_eq!(
        *f.log.borrow(),
        vec!["mount", "init", "step \"1 + 2\\n\"", "prompt"]
    );
    assert_eq!(f.main.text(), "Fire Script REPL\r\n1 + 2\r\n3\r\n_1 ? ");
    assert_eq!(f.main.size(), VIEWPORT);
    assert_eq!(f.session.prompt_line(), "_1 ? ");
}

#[test]
fn quit_during_init_skips_initial_input() {
    let mut f = Setup {
        config: Config {
            input: Some("1 + 2".to_string()),
            ..Config::default()
        },
        init: vec![ModuleEvent::Quit],
        host_accepts: true,
        ..Setup::default()
    }
    .build();

    f.session.start(VIEWPORT).unwrap();

    assert!(f.session.is_closed());
    assert_eq!(*f.log.borrow(), vec!["mount", "init"]);
    assert!(!f.main.text().contains("1 + 2"));
}

#[test]
fn data_is_forwarded_to_step() {
    let mut f = Setup {
        steps: vec![vec![ModuleEvent::Output("a\nb\n_2 ? ".to_string())]],
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();

    f.session.on_data("x = 1\n").unwrap();

    assert_eq!(f.log.borrow().last().unwrap(), "step \"x = 1\\n\"");
    assert!(f.main.text().ends_with("a\r\nb\r\n_2 ? "));
    assert_eq!(f.session.prompt_line(), "_2 ? ");
}

#[test]
fn resize_refits_every_pane_idempotently() {
    let mut f = Setup {
        config: debug_config(),
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();

    f.session.on_resize(Size::new(100, 30));
    let main = f.main.size();
    let errors = f.errors.size();
    f.session.on_resize(Size::new(100, 30));

    assert_eq!(main, Size::new(100, 20));
    assert_eq!(errors, Size::new(100, 10));
    assert_eq!(f.main.size(), main);
    assert_eq!(f.errors.size(), errors);
    assert_eq!(f.main.fits().len(), 3);
    assert_eq!(f.errors.fits().len(), 3);
}

#[test]
fn errors_go_to_log_pane_in_debug_mode() {
    let mut f = Setup {
        config: debug_config(),
        steps: vec![vec![ModuleEvent::Error("boom\n".to_string())]],
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();
    f.session.on_data("1 / 0\n").unwrap();

    assert_eq!(f.errors.text(), "boom\r\n");
    assert!(!f.main.text().contains("boom"));
}

#[test]
fn errors_are_red_without_debug() {
    let mut f = Setup {
        steps: vec![vec![ModuleEvent::Error("boom\n".to_string())]],
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();
    f.session.on_data("1 / 0\n").unwrap();

    assert!(f.main.text().contains("\x1B[91mboom\r\n\x1B[0m"));
    assert_eq!(f.errors.text(), "");
}

#[test]
fn refused_close_writes_fallback_once() {
    let mut f = Setup {
        steps: vec![vec![ModuleEvent::Quit]],
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();
    f.session.on_data(".q\n").unwrap();

    assert!(f.session.is_closed());
    assert_eq!(f.close_requests.get(), 1);
    let fallback = CLOSE_FALLBACK.replace('\n', "\r\n");
    assert_eq!(f.main.text().matches(&fallback).count(), 1);

    // closed sessions ignore further input
    f.session.on_data("1\n").unwrap();
    assert_eq!(f.log.borrow().iter().filter(|l| l.starts_with("step")).count(), 1);
}

#[test]
fn accepted_close_writes_nothing() {
    let mut f = Setup {
        steps: vec![vec![ModuleEvent::Quit]],
        host_accepts: true,
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();
    f.session.on_data(".q\n").unwrap();

    assert!(f.session.is_closed());
    assert!(!f.main.text().contains("window can be closed"));
}

#[test]
fn sync_request_stores() {
    let mut f = Setup {
        steps: vec![vec![ModuleEvent::Sync]],
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();
    f.session.on_data("save()\n").unwrap();

    assert_eq!(f.log.borrow().last().unwrap(), "sync store");
}

#[test]
fn sync_failure_propagates() {
    let mut f = Setup {
        steps: vec![vec![
            ModuleEvent::Output("saved\n".to_string()),
            ModuleEvent::Sync,
        ]],
        fail_store: true,
        ..Setup::default()
    }
    .build();
    f.session.start(VIEWPORT).unwrap();

    let err = f.session.on_data("save()\n").unwrap_err();
    assert!(matches!(err, Error::Vfs(VfsError::Backend { .. })));
    assert!(err.to_string().contains("quota exceeded"));
    assert!(f.main.text().contains("saved\r\n"));
}
