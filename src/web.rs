//! Browser front end: xterm.js panes, the Emscripten interpreter module and
//! its IDBFS-backed filesystem.
//!
//! Page flow:
//!
//! ```js
//! const session = WebSession.fromLocation(term, fit);
//! if (session.debug) session.attachLog(logTerm, logFit);
//! const instance = await createFireModule(session.moduleConfig());
//! session.start(instance);
//! term.onData(data => session.onData(data));
//! window.addEventListener("resize", () => {
//!     const dims = fit.proposeDimensions();
//!     session.onResize(dims.cols, dims.rows);
//! });
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pane::{Pane, Panes, Size};
use crate::repl::{ModuleEvent, ReplModule};
use crate::session::{Host, Session};
use crate::vfs::{PersistentFs, SyncDirection, VfsError};

/// Emscripten's default working directory.
const MOUNT_POINT: &str = "/home/web_user";

const SYNC_DEPENDENCY: &str = "fire-term-syncfs";

#[wasm_bindgen]
extern "C" {
    /// xterm.js `Terminal`.
    pub type Terminal;

    #[wasm_bindgen(method)]
    fn write(this: &Terminal, data: &str);

    #[wasm_bindgen(method)]
    fn resize(this: &Terminal, cols: u16, rows: u16);

    #[wasm_bindgen(method, getter)]
    fn cols(this: &Terminal) -> u16;

    #[wasm_bindgen(method, getter)]
    fn rows(this: &Terminal) -> u16;

    /// `FitAddon` from `xterm-addon-fit`, already loaded into its terminal.
    pub type FitAddon;

    #[wasm_bindgen(method, js_name = proposeDimensions)]
    fn propose_dimensions(this: &FitAddon) -> JsValue;
}

fn get(target: &JsValue, key: &str) -> std::result::Result<JsValue, JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
}

fn set(target: &JsValue, key: &str, value: &JsValue) -> std::result::Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(key), value).map(|_| ())
}

fn call(target: &JsValue, method: &str, args: &Array) -> std::result::Result<JsValue, JsValue> {
    let function: Function = get(target, method)?.dyn_into()?;
    function.apply(target, args)
}

fn describe(value: &JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn to_js(error: Error) -> JsValue {
    js_sys::Error::new(&error.to_string()).into()
}

pub struct XtermPane {
    terminal: Terminal,
    fit: FitAddon,
}

impl XtermPane {
    pub fn new(terminal: Terminal, fit: FitAddon) -> Self {
        XtermPane { terminal, fit }
    }

    /// Size the terminal's container has room for.
    pub fn proposed(&self) -> Option<Size> {
        let dims = self.fit.propose_dimensions();
        let cols = get(&dims, "cols").ok()?.as_f64()?;
        let rows = get(&dims, "rows").ok()?.as_f64()?;
        Some(Size::new(cols as u16, rows as u16))
    }
}

impl Pane for XtermPane {
    fn write(&mut self, text: &str) {
        self.terminal.write(text);
    }

    fn fit(&mut self, size: Size) {
        if size.cols == 0 || size.rows == 0 || size == self.size() {
            return;
        }
        self.terminal.resize(size.cols, size.rows);
    }

    fn size(&self) -> Size {
        Size::new(self.terminal.cols(), self.terminal.rows())
    }
}

type EventQueue = Rc<RefCell<Vec<ModuleEvent>>>;

/// The interpreter's Emscripten module instance, called through `ccall`.
///
/// The module's hooks push into the shared queue; it is drained after every
/// call.
pub struct JsModule {
    module: JsValue,
    queue: EventQueue,
}

impl JsModule {
    fn ccall(&mut self, name: &str, args: &[&str]) -> Result<Vec<ModuleEvent>> {
        let types = Array::new();
        let values = Array::new();
        for arg in args {
            types.push(&JsValue::from_str("string"));
            values.push(&JsValue::from_str(arg));
        }
        let call_args = Array::of4(&JsValue::from_str(name), &JsValue::NULL, &types, &values);
        let result = call(&self.module, "ccall", &call_args);
        let events = std::mem::take(&mut *self.queue.borrow_mut());
        result.map_err(|e| Error::Module(format!("{}: {}", name, describe(&e))))?;
        Ok(events)
    }
}

impl ReplModule for JsModule {
    fn init(&mut self) -> Result<Vec<ModuleEvent>> {
        self.ccall("repl_init", &[])
    }

    fn prompt(&mut self) -> Result<Vec<ModuleEvent>> {
        self.ccall("repl_prompt", &[])
    }

    fn step(&mut self, input: &str) -> Result<Vec<ModuleEvent>> {
        self.ccall("repl_step", &[input])
    }
}

/// Emscripten `FS` with an IDBFS mount.
pub struct EmscriptenFs {
    module: JsValue,
    mount_point: String,
    mounted: Rc<Cell<bool>>,
}

fn backend(direction: SyncDirection) -> impl Fn(JsValue) -> VfsError {
    move |e| VfsError::Backend {
        direction,
        message: describe(&e),
    }
}

fn mount_idbfs(module: &JsValue, mount_point: &str) -> std::result::Result<(), JsValue> {
    let fs = get(module, "FS")?;
    let point = JsValue::from_str(mount_point);
    let found = call(&fs, "analyzePath", &Array::of1(&point))?;
    if !get(&found, "exists")?.as_bool().unwrap_or(false) {
        call(&fs, "mkdir", &Array::of1(&point))?;
    }
    let idbfs = get(&fs, "filesystems").and_then(|all| get(&all, "IDBFS"))?;
    call(&fs, "mount", &Array::of3(&idbfs, &Object::new(), &point))?;
    Ok(())
}

/// Start an asynchronous `FS.syncfs`. A failure reported to the callback is
/// rethrown from it.
fn syncfs(
    module: &JsValue,
    direction: SyncDirection,
    done: Option<Function>,
) -> std::result::Result<(), JsValue> {
    let fs = get(module, "FS")?;
    let populate = JsValue::from_bool(direction == SyncDirection::Load);
    let callback = Closure::once_into_js(move |err: JsValue| {
        if let Some(done) = done {
            let _ = done.call0(&JsValue::NULL);
        }
        if !err.is_null() && !err.is_undefined() {
            warn!(%direction, "filesystem sync failed: {}", describe(&err));
            wasm_bindgen::throw_val(err);
        }
    });
    call(&fs, "syncfs", &Array::of2(&populate, &callback))?;
    Ok(())
}

impl PersistentFs for EmscriptenFs {
    fn mount(&mut self) -> std::result::Result<(), VfsError> {
        if self.mounted.get() {
            return Ok(());
        }
        mount_idbfs(&self.module, &self.mount_point).map_err(|e| VfsError::Backend {
            direction: SyncDirection::Load,
            message: format!("cannot mount {}: {}", self.mount_point, describe(&e)),
        })?;
        self.mounted.set(true);
        self.sync(SyncDirection::Load)
    }

    fn sync(&mut self, direction: SyncDirection) -> std::result::Result<(), VfsError> {
        debug!(%direction, "filesystem sync");
        syncfs(&self.module, direction, None).map_err(backend(direction))
    }
}

pub struct BrowserHost;

impl Host for BrowserHost {
    fn close_window(&mut self) -> bool {
        let Some(window) = web_sys::window() else {
            return false;
        };
        if window.close().is_err() {
            return false;
        }
        // scripts may only close windows they opened
        window.closed().unwrap_or(false)
    }
}

type Hook = Closure<dyn FnMut(JsValue)>;

#[wasm_bindgen]
pub struct WebSession {
    config: Config,
    queue: EventQueue,
    mounted: Rc<Cell<bool>>,
    hooks: Vec<Hook>,
    main: Option<XtermPane>,
    log: Option<XtermPane>,
    session: Option<Session<JsModule, EmscriptenFs, BrowserHost>>,
}

#[wasm_bindgen]
impl WebSession {
    /// `query` is the page's URL query string, e.g. `?debug&input=1%2B2`.
    #[wasm_bindgen(constructor)]
    pub fn new(query: &str, terminal: Terminal, fit: FitAddon) -> WebSession {
        WebSession {
            config: Config::from_query(query),
            queue: Rc::default(),
            mounted: Rc::default(),
            hooks: Vec::new(),
            main: Some(XtermPane::new(terminal, fit)),
            log: None,
            session: None,
        }
    }

    #[wasm_bindgen(js_name = fromLocation)]
    pub fn from_location(terminal: Terminal, fit: FitAddon) -> WebSession {
        let query = web_sys::window()
            .and_then(|window| window.location().search().ok())
            .unwrap_or_default();
        WebSession::new(&query, terminal, fit)
    }

    #[wasm_bindgen(getter)]
    pub fn debug(&self) -> bool {
        self.config.debug
    }

    /// Secondary pane for interpreter errors. Ignored outside debug mode.
    #[wasm_bindgen(js_name = attachLog)]
    pub fn attach_log(&mut self, terminal: Terminal, fit: FitAddon) {
        if self.config.debug {
            self.log = Some(XtermPane::new(terminal, fit));
        }
    }

    /// Emscripten module settings with the output, error, quit and sync hooks
    /// installed, and a pre-run step that mounts and loads the filesystem.
    #[wasm_bindgen(js_name = moduleConfig)]
    pub fn module_config(&mut self) -> std::result::Result<Object, JsValue> {
        let config = Object::new();

        let queue = self.queue.clone();
        let print: Hook = Closure::new(move |text: JsValue| {
            let line = text.as_string().unwrap_or_default();
            queue.borrow_mut().push(ModuleEvent::Output(line + "\n"));
        });
        let queue = self.queue.clone();
        let print_err: Hook = Closure::new(move |text: JsValue| {
            let line = text.as_string().unwrap_or_default();
            queue.borrow_mut().push(ModuleEvent::Error(line + "\n"));
        });
        let queue = self.queue.clone();
        let quit: Hook = Closure::new(move |_status: JsValue| {
            queue.borrow_mut().push(ModuleEvent::Quit);
        });
        let queue = self.queue.clone();
        let sync_fs: Hook = Closure::new(move |_: JsValue| {
            queue.borrow_mut().push(ModuleEvent::Sync);
        });

        let mounted = self.mounted.clone();
        let pre_run: Hook = Closure::new(move |module: JsValue| {
            if let Err(e) = mount_idbfs(&module, MOUNT_POINT) {
                wasm_bindgen::throw_val(e);
            }
            mounted.set(true);

            // hold off main() until the persistent files are loaded
            let dependency = JsValue::from_str(SYNC_DEPENDENCY);
            let started = call(&module, "addRunDependency", &Array::of1(&dependency));
            let done = get(&module, "removeRunDependency")
                .and_then(|f| f.dyn_into::<Function>())
                .map(|f| f.bind1(&module, &dependency));
            let loading = started
                .and(done)
                .and_then(|done| syncfs(&module, SyncDirection::Load, Some(done)));
            if let Err(e) = loading {
                wasm_bindgen::throw_val(e);
            }
        });

        set(&config, "print", print.as_ref())?;
        set(&config, "printErr", print_err.as_ref())?;
        set(&config, "quit", quit.as_ref())?;
        set(&config, "sync_fs", sync_fs.as_ref())?;
        set(&config, "preRun", &Array::of1(pre_run.as_ref()))?;

        self.hooks.extend([print, print_err, quit, sync_fs, pre_run]);
        Ok(config)
    }

    /// Bring up the REPL on an instantiated module.
    pub fn start(&mut self, instance: JsValue) -> std::result::Result<(), JsValue> {
        let main = self
            .main
            .take()
            .ok_or_else(|| JsValue::from_str("session already started"))?;
        let viewport = viewport(&main, self.log.as_ref());

        let mut panes = Panes::new(Box::new(main));
        if let Some(log) = self.log.take() {
            panes = panes.with_log(Box::new(log));
        }

        let module = JsModule {
            module: instance.clone(),
            queue: self.queue.clone(),
        };
        let fs = EmscriptenFs {
            module: instance,
            mount_point: MOUNT_POINT.to_string(),
            mounted: self.mounted.clone(),
        };

        let mut session = Session::new(self.config.clone(), panes, module, fs, BrowserHost);
        session.start(viewport).map_err(to_js)?;
        self.session = Some(session);
        Ok(())
    }

    #[wasm_bindgen(js_name = onData)]
    pub fn on_data(&mut self, data: &str) -> std::result::Result<(), JsValue> {
        match self.session.as_mut() {
            Some(session) => session.on_data(data).map_err(to_js),
            None => Ok(()),
        }
    }

    #[wasm_bindgen(js_name = onResize)]
    pub fn on_resize(&mut self, cols: u16, rows: u16) {
        if let Some(session) = self.session.as_mut() {
            session.on_resize(Size::new(cols, rows));
        }
    }

    #[wasm_bindgen(getter)]
    pub fn closed(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_closed())
    }
}

/// Room available to both panes together.
fn viewport(main: &XtermPane, log: Option<&XtermPane>) -> Size {
    let main_size = main.proposed().unwrap_or_else(|| main.size());
    match log.and_then(XtermPane::proposed) {
        Some(log_size) => Size::new(main_size.cols, main_size.rows + log_size.rows),
        None => main_size,
    }
}
