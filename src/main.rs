use std::fs::{self, OpenOptions};
use std::io::{self, stdin, stdout, Stdout, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use termion::event::{Event, Key};
use termion::input::TermRead;
use termion::raw::{IntoRawMode, RawTerminal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fire_term::grammar::Grammar;
use fire_term::highlight::Highlighter;
use fire_term::history::History;
use fire_term::pane::{FilePane, Panes, Size, StdoutPane};
use fire_term::repl::process::ProcessModule;
use fire_term::vfs::MirrorDir;
use fire_term::{render, Config, Error, Host, Result, Session};

const POLL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "fire-term", version, about = "Terminal front end for the Fire Script REPL")]
struct Cli {
    /// Configuration file (default: ~/.config/fire-term/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show interpreter errors in the log file instead of the terminal
    #[arg(short, long, global = true)]
    debug: bool,

    /// Input to run once the REPL is up
    #[arg(short = 'e', long)]
    input: Option<String>,

    #[arg(long)]
    interpreter: Option<String>,

    #[arg(long)]
    working_dir: Option<PathBuf>,

    #[arg(long)]
    persistent_dir: Option<PathBuf>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Line editor history (default: in the user data directory)
    #[arg(long)]
    history_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,

    /// Argument passed to the interpreter (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the interactive REPL (default)
    Repl,
    /// Print Fire Script files with syntax highlighting
    Highlight {
        /// Emit highlight.js compatible HTML instead of terminal colors
        #[arg(long)]
        html: bool,
        /// Treat the files as REPL transcripts
        #[arg(long)]
        transcript: bool,
        files: Vec<PathBuf>,
    },
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => match Config::default_path().filter(|p| p.is_file()) {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            },
        };

        config.debug |= self.debug;
        if let Some(input) = &self.input {
            config.input = Some(input.clone());
        }
        if let Some(interpreter) = &self.interpreter {
            config.interpreter = interpreter.clone();
        }
        if !self.args.is_empty() {
            config.args = self.args.clone();
        }
        if let Some(dir) = &self.working_dir {
            config.working_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.persistent_dir {
            config.persistent_dir = Some(dir.clone());
        }
        if let Some(file) = &self.log_file {
            config.log_file = Some(file.clone());
        }
        if let Some(file) = &self.history_file {
            config.history_file = Some(file.clone());
        }
        Ok(config)
    }
}

/// The terminal has no window to close, the REPL loop just ends.
struct TerminalHost;

impl Host for TerminalHost {
    fn close_window(&mut self) -> bool {
        true
    }
}

struct Editor {
    stdout: RawTerminal<Stdout>,
    keys: Receiver<io::Result<Event>>,
    history: History,
    highlighter: Highlighter,
    size: Size,
}

fn terminal_size() -> Option<Size> {
    termion::terminal_size()
        .ok()
        .map(|(cols, rows)| Size::new(cols, rows))
}

/// Printed width of a prompt that may carry color codes.
fn visible_width(text: &str) -> usize {
    let mut width = 0;
    let mut escape = false;
    for ch in text.chars() {
        match ch {
            '\x1B' => escape = true,
            c if escape && c.is_ascii_alphabetic() => escape = false,
            _ if escape => (),
            _ => width += 1,
        }
    }
    width
}

fn prev_boundary(line: &str, cursor: usize) -> usize {
    line[..cursor]
        .chars()
        .next_back()
        .map_or(0, |c| cursor - c.len_utf8())
}

fn next_boundary(line: &str, cursor: usize) -> usize {
    line[cursor..]
        .chars()
        .next()
        .map_or(cursor, |c| cursor + c.len_utf8())
}

impl Editor {
    pub fn new(history: History) -> io::Result<Self> {
        let stdout = stdout().into_raw_mode()?;

        // keys are read on their own thread so resizes can be polled meanwhile
        let (tx, keys) = mpsc::channel();
        thread::spawn(move || {
            for event in stdin().events() {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Editor {
            stdout,
            keys,
            history,
            highlighter: Highlighter::default(),
            size: terminal_size().unwrap_or_default(),
        })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn history(&self) -> &History {
        &self.history
    }


    fn redraw(
        &mut self,
        indicator: &str,
        lines: &[String],
        line: &str,
        cursor: usize,
        hint: bool,
    ) -> io::Result<bool> {
        let mut text: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        let offset = text.len();
        text.push_str(line);

        let result = self.highlighter.highlight(&text, offset + cursor);
        let shown = result.output.rsplit('\n').next().unwrap_or_default();
        let hint = match (hint, &result.hint) {
            (true, Some(h)) => h.as_str(),
            _ => "",
        };

        write!(
            self.stdout,
            "\r\x1B[2K{}{}\n\r\x1B[2K\x1B[2m{}\x1B[0m\x1B[{}G\x1B[1A",
            indicator,
            shown,
            hint,
            visible_width(indicator) + line[..cursor].chars().count() + 1
        )?;
        self.stdout.flush()?;
        Ok(result.open_bracket)
    }

    /// Read one input. `None` when the user quit.
    pub fn readline(
        &mut self,
        prompt: &str,
        mut on_resize: impl FnMut(Size),
    ) -> io::Result<Option<String>> {
        let prompt = if prompt.trim().is_empty() { ">> " } else { prompt };
        let mut lines: Vec<String> = Vec::new();
        let mut line = String::new();
        let mut cursor: usize = 0;
        let mut history_pos: usize = self.history.len();
        let mut open_bracket = self.redraw(prompt, &lines, &line, cursor, true)?;

        loop {
            let event = match self.keys.recv_timeout(POLL) {
                Ok(event) => event?,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(size) = terminal_size().filter(|&s| s != self.size) {
                        self.size = size;
                        on_resize(size);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            };

            match event {
                Event::Key(Key::Char('\n')) if !open_bracket => break,
                Event::Key(Key::Char('\n')) | Event::Key(Key::Alt('\r')) => {
                    self.redraw(prompt_for(prompt, &lines), &lines, &line, line.len(), false)?;
                    write!(self.stdout, "\r\n")?;
                    lines.push(std::mem::take(&mut line));
                    cursor = 0;
                }
                Event::Key(Key::Char('\t')) => {
                    line.insert_str(cursor, "    ");
                    cursor += 4;
                }
                Event::Key(Key::Backspace) => {
                    if cursor > 0 {
                        let prev = prev_boundary(&line, cursor);
                        line.replace_range(prev..cursor, "");
                        cursor = prev;
                    }
                }
                Event::Key(Key::Char(x)) => {
                    line.insert(cursor, x);
                    cursor += x.len_utf8();
                }
                Event::Key(Key::Ctrl('c')) | Event::Key(Key::Ctrl('d')) => {
                    write!(self.stdout, "\r\n\x1B[2K")?;
                    return Ok(None);
                }
                Event::Key(Key::Left) => cursor = prev_boundary(&line, cursor),
                Event::Key(Key::Right) => cursor = next_boundary(&line, cursor),
                Event::Key(Key::Up) => {
                    history_pos = history_pos.saturating_sub(1);
                    line = self.history.get(history_pos).map(str::to_string).unwrap_or_default();
                    cursor = line.len();
                }
                Event::Key(Key::Down) => {
                    history_pos = (history_pos + 1).min(self.history.len());
                    line = self.history.get(history_pos).map(str::to_string).unwrap_or_default();
                    cursor = line.len();
                }
                _ => (),
            }

            open_bracket = self.redraw(prompt_for(prompt, &lines), &lines, &line, cursor, true)?;
        }

        self.redraw(prompt_for(prompt, &lines), &lines, &line, line.len(), false)?;
        write!(self.stdout, "\r\n")?;
        self.stdout.flush()?;

        lines.push(line);
        let input = lines.join("\n");
        self.history.push(&input);
        Ok(Some(input))
    }
}

fn prompt_for<'a>(prompt: &'a str, lines: &[String]) -> &'a str {
    match lines.is_empty() {
        true => prompt,
        false => ".. ",
    }
}

fn init_logging(config: &Config, log_file: &Path) -> Result<()> {
    let default = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // the terminal is in raw mode, keep log lines out of it
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn highlight(files: &[PathBuf], html: bool, transcript: bool) -> Result<()> {
    let grammar = match transcript {
        true => Grammar::transcript(),
        false => Grammar::source(),
    };
    let palette = Default::default();
    let mut out = stdout().lock();

    for file in files {
        let src = fs::read_to_string(file)?;
        let text = match html {
            true => format!(
                "<pre><code class=\"hljs\">{}</code></pre>\n",
                render::html(grammar, &src)
            ),
            false => render::ansi(grammar, &src, &palette),
        };
        out.write_all(text.as_bytes())?;
    }
    Ok(())
}

fn repl(config: Config) -> Result<()> {
    let log_file = config
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("fire-term.log"));
    init_logging(&config, &log_file)?;

    let scratch = config.working_dir.is_none();
    let working = config
        .working_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(format!("fire-term-{}", std::process::id())));
    let persistent = config
        .persistent_dir
        .clone()
        .or_else(Config::default_persistent_dir)
        .ok_or_else(|| Error::Config("no persistent directory, set persistent_dir".to_string()))?;
    fs::create_dir_all(&working)?;
    info!(working = %working.display(), persistent = %persistent.display(), "starting fire-term");

    let module = ProcessModule::spawn(
        &config.interpreter,
        &config.args,
        &working,
        Duration::from_millis(config.settle_ms),
    )?;
    let mirror = MirrorDir::new(&working, &persistent);

    let mut panes = Panes::new(Box::new(StdoutPane::new()));
    if config.debug {
        panes = panes.with_log(Box::new(FilePane::open(&log_file)?));
    }

    let history_file = config.history_file.clone().or_else(Config::default_history_file);
    let history = match &history_file {
        Some(path) => History::load(path, config.history_size).unwrap_or_else(|e| {
            warn!(path = %path.display(), "cannot read history: {}", e);
            History::new(config.history_size)
        }),
        None => History::new(config.history_size),
    };

    let mut editor = Editor::new(history)?;
    let viewport = editor.size();
    let mut session = Session::new(config, panes, module, mirror, TerminalHost);
    let result = run(&mut session, &mut editor, viewport);

    drop(session);
    if let Some(path) = &history_file {
        if let Err(e) = editor.history().save(path) {
            warn!(path = %path.display(), "cannot save history: {}", e);
        }
    }
    if scratch {
        let _ = fs::remove_dir_all(&working);
    }
    result
}

fn run<M, F, H>(session: &mut Session<M, F, H>, editor: &mut Editor, viewport: Size) -> Result<()>
where
    M: fire_term::repl::ReplModule,
    F: fire_term::vfs::PersistentFs,
    H: Host,
{
    session.start(viewport)?;

    while !session.is_closed() {
        let prompt = session.prompt_line().to_string();
        match editor.readline(&prompt, |size| session.on_resize(size))? {
            Some(input) => session.on_data(&format!("{}\n", input))?,
            None => break,
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = cli.config().and_then(|config| match &cli.cmd {
        Some(Command::Highlight {
            html,
            transcript,
            files,
        }) => highlight(files, *html, *transcript),
        Some(Command::Repl) | None => repl(config),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("fire-term: {}", e);
            ExitCode::FAILURE
        }
    }
}
