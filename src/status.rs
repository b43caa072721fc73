/// Streaming state — whether a model request is in flight.
///
/// Readable by anyone; only the session's dispatch envelope writes it.
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamingState {
    #[default]
    Idle,
    Responding,
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    state: StreamingState,
    since: Option<Instant>,
}

impl StatusTracker {
    pub fn state(&self) -> StreamingState {
        self.state
    }

    pub fn is_responding(&self) -> bool {
        self.state == StreamingState::Responding
    }

    /// Seconds spent in the current Responding stretch (0 when idle).
    pub fn elapsed_secs(&self) -> u64 {
        self.since.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub(crate) fn set_responding(&mut self) {
        self.state = StreamingState::Responding;
        self.since = Some(Instant::now());
    }

    pub(crate) fn set_idle(&mut self) {
        self.state = StreamingState::Idle;
        self.since = None;
    }
}
