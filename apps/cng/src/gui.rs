//! Full-screen terminal adapter. Keys are edited into a command line or
//! forwarded to the panel manager; dirty panels are redrawn as text blocks.

use std::{
    collections::{BTreeMap, VecDeque},
    io::{self, Write},
    thread,
    time::Duration,
};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use dispatch::{
    plugins::{manager, Key},
    CommandBus, PanelStore,
};
use futures::StreamExt;
use shared::{
    domain::CommandSource,
    error::BusError,
    protocol::{Command, PanelState},
};
use tracing::{debug, error, info, warn};

const REDRAW_INTERVAL: Duration = Duration::from_millis(50);
const HISTORY_CAPACITY: usize = 100;
const PROMPT: &str = "> ";

/// What a single key press asks the adapter to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    Ignore,
    /// The input line changed and needs redrawing.
    Edited,
    Submit(String),
    Forward(Key),
    Quit,
}

#[derive(Debug, Default)]
pub struct LineEditor {
    input: String,
    history: VecDeque<String>,
    /// Index into `history` while browsing it with PageUp/PageDown.
    recall: Option<usize>,
}

impl LineEditor {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn handle(&mut self, key: KeyEvent) -> EditorAction {
        if key.kind == KeyEventKind::Release {
            return EditorAction::Ignore;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => EditorAction::Quit,
                KeyCode::Char('x') => EditorAction::Forward(Key::CtrlX),
                KeyCode::Char('s') => EditorAction::Forward(Key::CtrlS),
                _ => EditorAction::Ignore,
            };
        }

        if key.modifiers.contains(KeyModifiers::ALT) {
            let forwarded = match key.code {
                KeyCode::Char('c') => Key::AltC,
                KeyCode::Up => Key::AltUp,
                KeyCode::Down => Key::AltDown,
                KeyCode::Left => Key::AltLeft,
                KeyCode::Right => Key::AltRight,
                KeyCode::Char('w') => Key::AltW,
                KeyCode::Char('s') => Key::AltS,
                KeyCode::Char('a') => Key::AltA,
                KeyCode::Char('d') => Key::AltD,
                _ => return EditorAction::Ignore,
            };
            return EditorAction::Forward(forwarded);
        }

        match key.code {
            KeyCode::Char(c) => {
                self.input.push(c);
                self.recall = None;
                EditorAction::Edited
            }
            KeyCode::Backspace => match self.input.pop() {
                Some(_) => EditorAction::Edited,
                None => EditorAction::Ignore,
            },
            KeyCode::Esc if !self.input.is_empty() => {
                self.input.clear();
                self.recall = None;
                EditorAction::Edited
            }
            KeyCode::Enter => self.submit(),
            KeyCode::PageUp => self.recall_older(),
            KeyCode::PageDown => self.recall_newer(),
            KeyCode::Tab => EditorAction::Forward(Key::Tab),
            KeyCode::Up => EditorAction::Forward(Key::Up),
            KeyCode::Down => EditorAction::Forward(Key::Down),
            KeyCode::Left => EditorAction::Forward(Key::Left),
            KeyCode::Right => EditorAction::Forward(Key::Right),
            KeyCode::Home => EditorAction::Forward(Key::Home),
            KeyCode::End => EditorAction::Forward(Key::End),
            _ => EditorAction::Ignore,
        }
    }

    fn submit(&mut self) -> EditorAction {
        let line = std::mem::take(&mut self.input);
        self.recall = None;
        if line.trim().is_empty() {
            return if line.is_empty() {
                EditorAction::Ignore
            } else {
                EditorAction::Edited
            };
        }

        if self.history.back() != Some(&line) {
            if self.history.len() == HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(line.clone());
        }
        EditorAction::Submit(line)
    }

    fn recall_older(&mut self) -> EditorAction {
        let index = match self.recall {
            Some(0) => return EditorAction::Ignore,
            Some(index) => index - 1,
            None if self.history.is_empty() => return EditorAction::Ignore,
            None => self.history.len() - 1,
        };
        self.show_recalled(index)
    }

    fn recall_newer(&mut self) -> EditorAction {
        match self.recall {
            Some(index) if index + 1 < self.history.len() => self.show_recalled(index + 1),
            Some(_) => {
                self.recall = None;
                self.input.clear();
                EditorAction::Edited
            }
            None => EditorAction::Ignore,
        }
    }

    fn show_recalled(&mut self, index: usize) -> EditorAction {
        self.recall = Some(index);
        self.input = self.history[index].clone();
        EditorAction::Edited
    }
}

/// `p panels key <key>`: lets the panel manager route the key.
pub fn key_command(key: Key) -> String {
    format!("{} panels key {key}", manager::NAME)
}

/// Last known contents of every non-empty panel.
#[derive(Debug)]
pub struct Screen {
    title: String,
    panels: BTreeMap<String, Vec<String>>,
}

impl Screen {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            panels: BTreeMap::new(),
        }
    }

    /// Takes in fresh panel states. Returns whether anything changed.
    pub fn absorb(&mut self, states: Vec<PanelState>) -> bool {
        let mut changed = false;
        for state in states {
            if state.rendered_lines.is_empty() {
                changed |= self.panels.remove(&state.plugin_name).is_some();
            } else {
                changed |= self.panels.get(&state.plugin_name) != Some(&state.rendered_lines);
                self.panels.insert(state.plugin_name, state.rendered_lines);
            }
        }
        changed
    }

    /// Rows to draw for a `width` x `height` terminal: title, panel blocks
    /// clipped to fit, and the input line on the last row.
    pub fn layout(&self, width: usize, height: usize, input: &str) -> Vec<String> {
        if height == 0 {
            return Vec::new();
        }
        let body = height.saturating_sub(2);
        let mut rows = vec![clip(&format!(" {} ", self.title), width)];

        'panels: for (name, lines) in &self.panels {
            for line in std::iter::once(format!("[{name}]")).chain(lines.iter().map(|l| format!("  {l}"))) {
                if rows.len() > body {
                    break 'panels;
                }
                rows.push(clip(&line, width));
            }
        }

        rows.truncate(height - 1);
        rows.resize(height - 1, String::new());
        rows.push(clip(&format!("{PROMPT}{input}"), width));
        rows
    }

    fn draw<W: Write>(&self, out: &mut W, input: &str) -> io::Result<()> {
        let (width, height) = terminal::size()?;
        queue!(out, Clear(ClearType::All))?;
        for (row, line) in (0..height).zip(self.layout(width.into(), height.into(), input)) {
            queue!(out, MoveTo(0, row), Print(line))?;
        }
        out.flush()
    }
}

fn clip(line: &str, width: usize) -> String {
    line.chars().take(width).collect()
}

/// Raw mode and the alternate screen, for as long as this value lives.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = Self;
        execute!(io::stdout(), EnterAlternateScreen, Hide)?;
        Ok(guard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

fn restore_terminal() {
    let _ = terminal::disable_raw_mode();
    let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
}

/// Panics on the terminal thread restore the terminal before the default
/// report. Panics elsewhere (caught plugin handlers included) go to the log
/// only, so they do not tear down the screen.
fn install_panic_hook() {
    let terminal_thread = thread::current().id();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if thread::current().id() == terminal_thread {
            restore_terminal();
            default_hook(info);
        } else {
            error!(panic = %info, "panic off the terminal thread");
        }
    }));
}

pub async fn run(bus: CommandBus, panels: PanelStore, title: String) -> io::Result<()> {
    install_panic_hook();
    let _guard = RawModeGuard::enter()?;
    let mut stdout = io::stdout();
    let shutdown = bus.shutdown_signal();
    let mut events = EventStream::new();
    let mut editor = LineEditor::default();
    let mut screen = Screen::new(title);
    let mut ticker = tokio::time::interval(REDRAW_INTERVAL);

    screen.absorb(panels.snapshot());
    screen.draw(&mut stdout, editor.input())?;
    info!("gui adapter running");

    loop {
        let redraw = tokio::select! {
            _ = shutdown.fired() => break,
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) => apply(&bus, &mut editor, key),
                Some(Ok(Event::Resize(..))) => true,
                Some(Ok(_)) => false,
                Some(Err(err)) => {
                    error!(error = %err, "terminal input failed");
                    bus.broadcast_shutdown();
                    break;
                }
                None => {
                    bus.broadcast_shutdown();
                    break;
                }
            },
            _ = ticker.tick() => screen.absorb(panels.drain_dirty()),
        };
        if redraw {
            screen.draw(&mut stdout, editor.input())?;
        }
    }

    info!("gui adapter stopped");
    Ok(())
}

/// Applies one key press. Returns whether the screen needs redrawing.
fn apply(bus: &CommandBus, editor: &mut LineEditor, key: KeyEvent) -> bool {
    match editor.handle(key) {
        EditorAction::Ignore => false,
        EditorAction::Edited => true,
        EditorAction::Submit(line) => {
            publish(bus, line);
            true
        }
        EditorAction::Forward(key) => {
            publish(bus, key_command(key));
            false
        }
        EditorAction::Quit => {
            info!("ctrl-c pressed");
            bus.broadcast_shutdown();
            false
        }
    }
}

fn publish(bus: &CommandBus, line: String) {
    let Ok(command) = Command::parse(CommandSource::Gui, line) else {
        return;
    };
    match bus.publish(command) {
        Ok(id) => debug!(command_id = %id, "gui command queued"),
        Err(BusError::Busy) => warn!("command queue full; input dropped"),
        Err(BusError::Closed) => debug!("bus closed; input dropped"),
    }
}

#[cfg(test)]
#[path = "tests/gui_tests.rs"]
mod tests;
