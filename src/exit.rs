/// "Press again to exit" debouncing.
///
/// Each monitored key has its own two-state machine. The first press arms it
/// with a 1000 ms deadline; a second press before the deadline confirms.
/// `expire` disarms keys whose deadline has passed, and a press that arrives
/// after the deadline counts as a fresh first press even if `expire` has not
/// run yet. Callers pass `now` explicitly so the machine stays clock-free.
use std::time::{Duration, Instant};

pub const CONFIRM_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKey {
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D
    Eof,
}

impl ExitKey {
    pub fn label(self) -> &'static str {
        match self {
            ExitKey::Interrupt => "Ctrl+C",
            ExitKey::Eof => "Ctrl+D",
        }
    }

    fn index(self) -> usize {
        match self {
            ExitKey::Interrupt => 0,
            ExitKey::Eof => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    /// First press — show "press again to exit"
    Armed,
    /// Second press within the window — terminate
    Confirmed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExitPressState {
    pub pressed_once: bool,
    pub deadline: Option<Instant>,
}

#[derive(Debug)]
pub struct ExitDebouncer {
    window: Duration,
    keys: [ExitPressState; 2],
}

impl Default for ExitDebouncer {
    fn default() -> Self {
        Self::new(CONFIRM_WINDOW)
    }
}

impl ExitDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            keys: [ExitPressState::default(); 2],
        }
    }

    pub fn press(&mut self, key: ExitKey, now: Instant) -> ExitSignal {
        let slot = &mut self.keys[key.index()];
        let live = slot.pressed_once && slot.deadline.is_some_and(|d| now <= d);
        if live {
            *slot = ExitPressState::default();
            tracing::info!(key = key.label(), "exit confirmed");
            ExitSignal::Confirmed
        } else {
            *slot = ExitPressState {
                pressed_once: true,
                deadline: Some(now + self.window),
            };
            ExitSignal::Armed
        }
    }

    /// Disarm any key whose window has elapsed. Returns true if something
    /// changed, so the caller knows to redraw.
    pub fn expire(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for slot in &mut self.keys {
            if slot.deadline.is_some_and(|d| now > d) {
                *slot = ExitPressState::default();
                changed = true;
            }
        }
        changed
    }

    pub fn is_armed(&self, key: ExitKey) -> bool {
        self.keys[key.index()].pressed_once
    }

    /// First armed key, for the status bar hint.
    pub fn armed_key(&self) -> Option<ExitKey> {
        [ExitKey::Interrupt, ExitKey::Eof]
            .into_iter()
            .find(|k| self.is_armed(*k))
    }
}
