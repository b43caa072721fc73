/// Ratatui-based TUI for chatgate.
///
/// Architecture:
///   main loop:    crossterm keyboard events + mpsc UiEvent drain + ticker
///   work tasks:   tokio::spawn — model listing, file lookup, dispatch;
///                 each reports back once over the UiEvent channel
///
/// All session state lives in `AppState::session` and is only touched on
/// the main loop, so spawned work never races the controller.
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  conversation history (scrollable, Min(0))     │
///   ├────────────────────────────────────────────────┤
///   │  approval prompt (only while pending)          │
///   ├────────────────────────────────────────────────┤
///   │  status bar (1 line)                           │
///   ├────────────────────────────────────────────────┤
///   │  input box (3 lines, fixed)                    │
///   └────────────────────────────────────────────────┘
pub mod render;

use std::io;
use std::time::Instant;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::approval::ApprovalInput;
use crate::client::{Client, DispatchError};
use crate::config::ResolvedConfig;
use crate::enrich::{self, Enrichment};
use crate::exit::{ExitDebouncer, ExitKey, ExitSignal};
use crate::input_log::InputLog;
use crate::recall::InputRecall;
use crate::session::{Session, Step};

// ── UiEvent — results of spawned work ─────────────────────────────────────────

#[derive(Debug)]
pub enum UiEvent {
    /// Startup model listing finished
    Models(Result<Vec<String>, DispatchError>),
    /// File lookup for a submission finished
    Enriched { original: String, enrichment: Enrichment },
    /// The in-flight completion finished
    DispatchDone(Result<String, DispatchError>),
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    pub session: Session,
    pub input: String,
    pub cursor: usize,        // byte offset in input
    pub scroll: usize,        // lines scrolled up in history
    pub profile: String,
    pub exit: ExitDebouncer,
    /// Incremented every 120ms while busy, for spinner animation
    pub spinner_tick: u32,
    pub recall: InputRecall,
    /// Prompts from earlier sessions, newest first (loaded once)
    persisted_inputs: Vec<String>,
    /// History revision the recall list was last built from
    recall_revision: Option<u64>,
    input_log: InputLog,
    /// Spawned lookup / dispatch task, aborted on exit
    inflight: Option<JoinHandle<()>>,
}

impl AppState {
    pub fn new(resolved: &ResolvedConfig, session: Session, input_log: InputLog) -> Self {
        let persisted_inputs = match input_log.load_newest_first() {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(path = %input_log.path().display(), error = %e, "input log unreadable");
                Vec::new()
            }
        };
        let mut state = Self {
            session,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            profile: resolved.profile_name.clone(),
            exit: ExitDebouncer::default(),
            spinner_tick: 0,
            recall: InputRecall::default(),
            persisted_inputs,
            recall_revision: None,
            input_log,
            inflight: None,
        };
        state.sync_recall();
        state
    }

    /// Rebuild the recall list if history moved since the last build.
    fn sync_recall(&mut self) {
        let rev = self.session.history().revision();
        if self.recall_revision != Some(rev) {
            self.recall.publish(self.session.recall_list(&self.persisted_inputs));
            self.recall_revision = Some(rev);
        }
    }

    fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.cursor = self.input.len();
    }

    fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input)
    }

    fn apply_event(&mut self, ev: UiEvent, client: &Client, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        match ev {
            UiEvent::Models(result) => self.session.apply_models(result),
            UiEvent::Enriched { original, enrichment } => {
                self.inflight = None;
                let step = self.session.apply_enrichment(&original, enrichment);
                self.drive(step, client, ui_tx);
            }
            UiEvent::DispatchDone(result) => {
                self.inflight = None;
                self.session.finish_dispatch(result);
            }
        }
        self.scroll = 0; // auto-scroll to bottom on new content
        self.sync_recall();
    }

    /// Start whatever slow work the step calls for.
    fn drive(&mut self, step: Step, client: &Client, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        match step {
            Step::Enrich { original } => {
                let opts = self.session.enrich_options().clone();
                let token = self.session.request_token();
                let tx = ui_tx.clone();
                self.inflight = Some(tokio::spawn(async move {
                    let enrichment = enrich::enrich(&original, &opts, &token).await;
                    let _ = tx.send(UiEvent::Enriched { original, enrichment });
                }));
            }
            Step::Dispatch(request) => {
                let Some(ticket) = self.session.begin_dispatch(request) else { return };
                let client = client.clone();
                let tx = ui_tx.clone();
                self.inflight = Some(tokio::spawn(async move {
                    let result = client.chat(&ticket.model, &ticket.prompt).await;
                    let _ = tx.send(UiEvent::DispatchDone(result));
                }));
            }
            Step::AwaitApproval | Step::Done => {}
        }
    }

    fn submit(&mut self, text: String, client: &Client, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        if !self.session.is_busy() {
            if let Err(e) = self.input_log.append(&text) {
                tracing::warn!(error = %e, "input log append failed");
            }
        }
        let step = self.session.submit(&text);
        self.drive(step, client, ui_tx);
    }

    fn shutdown(&mut self) {
        self.session.shutdown();
        if let Some(task) = self.inflight.take() {
            task.abort();
        }
    }
}

// ── Slash commands ────────────────────────────────────────────────────────────

const HELP: &str = "keys: Enter send · ↑/↓ recall · Ctrl+T autopilot · Ctrl+C twice quit\n\
commands: /model <id> · /models · /autopilot · /clear · /help · /quit";

/// Returns false when the command asks to quit.
fn handle_slash(cmd: &str, state: &mut AppState) -> bool {
    let mut parts = cmd.splitn(2, ' ');
    let name = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();
    match name {
        "/quit" | "/exit" => return false,
        "/clear" => state.session.clear_history(),
        "/autopilot" => {
            state.session.toggle_autopilot();
        }
        "/model" if arg.is_empty() => {
            let current = state
                .session
                .config()
                .selected_model
                .clone()
                .unwrap_or_else(|| "(none)".to_string());
            state.session.notice(format!("model: {current}"));
        }
        "/model" => state.session.select_model(arg),
        "/models" => {
            let models = state.session.available_models();
            let msg = if models.is_empty() {
                "no models listed by the backend".to_string()
            } else {
                format!("models: {}", models.join(", "))
            };
            state.session.notice(msg);
        }
        "/help" => state.session.notice(HELP),
        other => state.session.notice(format!("unknown command: {other} (try /help)")),
    }
    true
}

// ── Key handling ──────────────────────────────────────────────────────────────

/// Returns false when the session should end.
fn handle_key(
    key: KeyEvent,
    state: &mut AppState,
    client: &Client,
    ui_tx: &mpsc::UnboundedSender<UiEvent>,
) -> Result<bool> {
    if key.kind == KeyEventKind::Release {
        return Ok(true);
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // ── Exit chords (debounced) and mode toggles ──────────────────────────────
    if ctrl {
        let exit_key = match key.code {
            KeyCode::Char('c') => Some(ExitKey::Interrupt),
            KeyCode::Char('d') => Some(ExitKey::Eof),
            _ => None,
        };
        if let Some(exit_key) = exit_key {
            return Ok(state.exit.press(exit_key, Instant::now()) != ExitSignal::Confirmed);
        }
        if key.code == KeyCode::Char('t') {
            state.session.toggle_autopilot();
            return Ok(true);
        }
    }

    // ── Approval gate intercepts everything else while pending ────────────────
    if state.session.pending_approval().is_some() {
        let answer = match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => ApprovalInput::Yes,
            KeyCode::Char('n') | KeyCode::Char('N') => ApprovalInput::No,
            KeyCode::Enter => ApprovalInput::AcceptDefault,
            _ => ApprovalInput::Other,
        };
        let step = state.session.respond(answer);
        state.drive(step, client, ui_tx);
        return Ok(true);
    }

    match key.code {
        KeyCode::Enter => {
            let trimmed = state.input.trim();
            if trimmed.is_empty() {
                state.take_input();
                return Ok(true);
            }
            if trimmed.starts_with('/') {
                let cmd = trimmed.to_string();
                state.take_input();
                return Ok(handle_slash(&cmd, state));
            }
            if state.session.is_busy() {
                // Rejected with a notice; the draft stays in the box
                let draft = state.input.clone();
                state.session.submit(&draft);
                return Ok(true);
            }
            let text = state.take_input();
            state.submit(text, client, ui_tx);
            state.recall.reset();
        }
        KeyCode::Up => {
            if let Some(text) = state.recall.older().map(str::to_string) {
                state.set_input(&text);
            }
        }
        KeyCode::Down if state.recall.is_browsing() => {
            let text = state.recall.newer().map(str::to_string).unwrap_or_default();
            state.set_input(&text);
        }
        KeyCode::Char(c) => {
            state.input.insert(state.cursor, c);
            state.cursor += c.len_utf8();
        }
        KeyCode::Backspace => {
            if state.cursor > 0 {
                let prev = state.input[..state.cursor]
                    .chars()
                    .next_back()
                    .map(char::len_utf8)
                    .unwrap_or(0);
                state.cursor -= prev;
                state.input.remove(state.cursor);
            }
        }
        KeyCode::Left => {
            if let Some(c) = state.input[..state.cursor].chars().next_back() {
                state.cursor -= c.len_utf8();
            }
        }
        KeyCode::Right => {
            if let Some(c) = state.input[state.cursor..].chars().next() {
                state.cursor += c.len_utf8();
            }
        }
        KeyCode::Home => state.cursor = 0,
        KeyCode::End => state.cursor = state.input.len(),
        KeyCode::PageUp => state.scroll = state.scroll.saturating_add(10),
        KeyCode::PageDown => state.scroll = state.scroll.saturating_sub(10),
        KeyCode::Esc => {
            state.take_input();
            state.recall.reset();
        }
        _ => {}
    }
    Ok(true)
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(resolved: ResolvedConfig, session: Session, client: Client, input_log: InputLog) -> Result<()> {
    let mut terminal = setup_terminal()?;

    // Panic hook — restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let mut state = AppState::new(&resolved, session, input_log);
    let result = event_loop(&mut terminal, &mut state, &client).await;
    state.shutdown();

    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    client: &Client,
) -> Result<()> {
    // Channel: spawned work → TUI
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();

    {
        let client = client.clone();
        let tx = ui_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(UiEvent::Models(client.list_models().await));
        });
    }

    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    terminal.draw(|f| render::draw(f, state))?;

    loop {
        tokio::select! {
            // ── Animation tick + exit window expiry ───────────────────────────
            _ = ticker.tick() => {
                let expired = state.exit.expire(Instant::now());
                let busy = state.session.status().is_responding() || state.session.is_enriching();
                if busy {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                }
                if busy || expired {
                    terminal.draw(|f| render::draw(f, state))?;
                }
            }

            // ── Drain results from spawned work ───────────────────────────────
            Some(ev) = ui_rx.recv() => {
                state.apply_event(ev, client, &ui_tx);
                terminal.draw(|f| render::draw(f, state))?;
            }

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => {
                if let Event::Key(key) = ev {
                    let keep = handle_key(key, state, client, &ui_tx)?;
                    if !keep { break; }
                    state.sync_recall();
                }
                terminal.draw(|f| render::draw(f, state))?;
            }
        }
    }

    Ok(())
}
