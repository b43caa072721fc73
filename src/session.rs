/// Session controller — owns history, streaming state, the approval gate and
/// the session config, and is the only thing that mutates them.
///
/// Every transition is a synchronous method returning the next [`Step`];
/// the slow parts (file search, HTTP) are run by the caller between steps.
/// The TUI runs them as spawned tasks and feeds results back in; the
/// plain-stdout mode and the tests just `.await` them inline via
/// [`Session::run_step`].
///
///   submit ─▶ Enrich ─▶ apply_enrichment ─▶ AwaitApproval ─▶ respond ─┐
///      │                      │                                        │
///      └──────────────────────┴──────────▶ Dispatch ◀──────────────────┘
///                                            │
///                        begin_dispatch ─▶ (request) ─▶ finish_dispatch
use tokio_util::sync::CancellationToken;

use crate::approval::{
    ApprovalGate, ApprovalInput, ApprovalRequest, ApprovedAction, DeniedAction, Resolution,
};
use crate::budget;
use crate::client::{CompletionBackend, DispatchError};
use crate::enrich::{self, EnrichOptions, Enrichment};
use crate::history::{EntryKind, HistoryStore};
use crate::recall;
use crate::status::{StatusTracker, StreamingState};

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Set once from the model listing, or from an explicit override
    pub selected_model: Option<String>,
    /// Skip the approval gate for file reads. Only the user toggles this.
    pub autopilot: bool,
}

// ── Steps ─────────────────────────────────────────────────────────────────────

/// Text to send, plus the line the user actually typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub original: String,
    pub prompt: String,
}

/// A dispatch the session has committed to: status is Responding until
/// [`Session::finish_dispatch`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTicket {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing more to do for this submission
    Done,
    /// Run the enrichment pipeline on `original`, then call `apply_enrichment`
    Enrich { original: String },
    /// Waiting on the approval gate
    AwaitApproval,
    Dispatch(DispatchRequest),
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    history: HistoryStore,
    status: StatusTracker,
    gate: ApprovalGate,
    config: SessionConfig,
    enrich_opts: EnrichOptions,
    /// A submission is between `Step::Enrich` and `apply_enrichment`
    enriching: bool,
    available_models: Vec<String>,
    /// Parent of every per-request cancellation token
    shutdown: CancellationToken,
}

impl Session {
    pub fn new(config: SessionConfig, enrich_opts: EnrichOptions) -> Self {
        Self {
            history: HistoryStore::default(),
            status: StatusTracker::default(),
            gate: ApprovalGate::default(),
            config,
            enrich_opts,
            enriching: false,
            available_models: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    // ── Read access ───────────────────────────────────────────────────────────

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    pub fn streaming_state(&self) -> StreamingState {
        self.status.state()
    }

    pub fn pending_approval(&self) -> Option<&ApprovalRequest> {
        self.gate.pending()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn enrich_options(&self) -> &EnrichOptions {
        &self.enrich_opts
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    pub fn is_enriching(&self) -> bool {
        self.enriching
    }

    /// True while any part of a submission is outstanding.
    pub fn is_busy(&self) -> bool {
        self.status.is_responding() || self.gate.is_pending() || self.enriching
    }

    /// Deduplicated input-recall list, oldest first.
    pub fn recall_list(&self, persisted_newest_first: &[String]) -> Vec<String> {
        recall::recall_from_history(&self.history, persisted_newest_first)
    }

    /// Token for one request; cancelled when the session shuts down.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ── User-driven settings ──────────────────────────────────────────────────

    pub fn toggle_autopilot(&mut self) -> bool {
        self.config.autopilot = !self.config.autopilot;
        let state = if self.config.autopilot { "on" } else { "off" };
        tracing::info!(autopilot = self.config.autopilot, "autopilot toggled");
        self.history.info(format!("autopilot {state}"));
        self.config.autopilot
    }

    pub fn select_model(&mut self, model: &str) {
        let model = model.trim();
        if model.is_empty() {
            self.history.error(DispatchError::NoModelSelected.to_string());
            return;
        }
        self.config.selected_model = Some(model.to_string());
        self.history.info(format!("model set to {model}"));
    }

    pub fn clear_history(&mut self) {
        tracing::info!(turns = self.history.count(EntryKind::User), "history cleared");
        self.history.clear();
    }

    /// Record a free-form notice (slash-command output and the like).
    pub fn notice(&mut self, text: impl Into<String>) {
        self.history.info(text);
    }

    /// Fold in the startup model listing. An explicit model override wins;
    /// otherwise the first listed model is selected.
    pub fn apply_models(&mut self, result: Result<Vec<String>, DispatchError>) {
        match result {
            Ok(models) if models.is_empty() => {
                self.history.error("backend reported no models");
            }
            Ok(models) => {
                if self.config.selected_model.is_none() {
                    self.config.selected_model = models.first().cloned();
                }
                tracing::info!(count = models.len(), selected = ?self.config.selected_model, "models listed");
                self.available_models = models;
            }
            Err(e) => {
                tracing::warn!(error = %e, "model listing failed");
                self.history.error(format!("could not list models: {e}"));
            }
        }
    }

    // ── Submission pipeline ───────────────────────────────────────────────────

    /// Accept a line of user text. Rejected while anything is in flight.
    /// Blank input is dropped; anything else is kept exactly as typed.
    pub fn submit(&mut self, text: &str) -> Step {
        if text.trim().is_empty() {
            return Step::Done;
        }
        if self.is_busy() {
            self.history.info("busy — wait for the current request to finish");
            return Step::Done;
        }
        self.history.user(text);
        if enrich::detect_file_name(text).is_some() {
            self.enriching = true;
            Step::Enrich { original: text.to_string() }
        } else {
            Step::Dispatch(DispatchRequest {
                original: text.to_string(),
                prompt: text.to_string(),
            })
        }
    }

    /// Route the enrichment result: dispatch now, or gate on approval.
    pub fn apply_enrichment(&mut self, original: &str, enrichment: Enrichment) -> Step {
        self.enriching = false;
        tracing::debug!(needs_file_access = enrichment.needs_file_access(), "enrich: done");
        let prompt = enrichment.dispatch_text(original);
        match enrichment {
            Enrichment::Passthrough => Step::Dispatch(DispatchRequest {
                original: original.to_string(),
                prompt,
            }),
            Enrichment::Cancelled => {
                self.history.info("file lookup cancelled");
                Step::Done
            }
            Enrichment::NotFound { file_name, .. } => {
                tracing::info!(file = %file_name, "enrich: file not found");
                Step::Dispatch(DispatchRequest {
                    original: original.to_string(),
                    prompt,
                })
            }
            Enrichment::Resolved { file_name, path, fragment, budget, .. } => {
                let shown = enrich::display_path(&path, &self.enrich_opts.root);
                tracing::info!(file = %file_name, path = %shown, "enrich: resolved");
                if fragment.truncated {
                    self.history.info(format!(
                        "{shown} truncated to {budget} of {} chars to fit the context budget",
                        fragment.total_chars
                    ));
                }
                let request = DispatchRequest {
                    original: original.to_string(),
                    prompt,
                };
                if self.config.autopilot {
                    self.history.info(format!("autopilot: reading {shown}"));
                    return Step::Dispatch(request);
                }
                let approval = ApprovalRequest {
                    message: format!("Allow reading {shown} into the prompt?"),
                    on_approve: ApprovedAction::Dispatch {
                        original: request.original,
                        prompt: request.prompt,
                    },
                    on_deny: DeniedAction::Notice(format!("request cancelled — {shown} was not read")),
                };
                match self.gate.request(approval) {
                    Ok(()) => Step::AwaitApproval,
                    Err(e) => {
                        self.history.info(e.to_string());
                        Step::Done
                    }
                }
            }
        }
    }

    /// Feed an answer to a pending approval request.
    pub fn respond(&mut self, input: ApprovalInput) -> Step {
        match self.gate.respond(input) {
            Resolution::Approved(ApprovedAction::Dispatch { original, prompt }) => {
                Step::Dispatch(DispatchRequest { original, prompt })
            }
            Resolution::Denied(DeniedAction::Notice(notice)) => {
                self.history.info(notice);
                Step::Done
            }
            Resolution::Ignored if self.gate.is_pending() => Step::AwaitApproval,
            Resolution::Ignored => Step::Done,
        }
    }

    // ── Dispatch envelope ─────────────────────────────────────────────────────

    /// Commit to a dispatch. Returns `None` — with the reason recorded in
    /// history and status left Idle — when it can't go ahead.
    pub fn begin_dispatch(&mut self, request: DispatchRequest) -> Option<DispatchTicket> {
        if self.status.is_responding() {
            self.history.info("busy — a request is already in flight");
            return None;
        }
        if self.gate.is_pending() {
            self.history.info("busy — answer the pending approval first");
            return None;
        }
        let model = match self.config.selected_model.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => {
                self.history.error(DispatchError::NoModelSelected.to_string());
                return None;
            }
        };
        if !self.user_line_is_latest(&request.original) {
            self.history.user(request.original.clone());
        }
        self.status.set_responding();
        tracing::info!(
            model = %model,
            prompt_tokens = budget::estimate_tokens(&request.prompt),
            "dispatch: start"
        );
        Some(DispatchTicket { model, prompt: request.prompt })
    }

    /// Close the envelope opened by `begin_dispatch`. Always leaves Idle.
    pub fn finish_dispatch(&mut self, result: Result<String, DispatchError>) {
        match result {
            Ok(reply) => {
                tracing::info!(reply_chars = reply.chars().count(), "dispatch: done");
                self.history.assistant(reply);
            }
            Err(e) => {
                tracing::warn!(error = %e, "dispatch: failed");
                self.history.error(e.to_string());
            }
        }
        self.status.set_idle();
    }

    /// Full envelope for callers that can simply await.
    pub async fn dispatch<B: CompletionBackend>(&mut self, backend: &B, request: DispatchRequest) {
        let Some(ticket) = self.begin_dispatch(request) else { return };
        let result = backend.complete(&ticket.model, &ticket.prompt).await;
        self.finish_dispatch(result);
    }

    /// Drive a step to the next point that needs the user (approval) or to
    /// completion, awaiting enrichment and dispatch inline.
    pub async fn run_step<B: CompletionBackend>(&mut self, backend: &B, mut step: Step) -> Step {
        loop {
            step = match step {
                Step::Enrich { original } => {
                    let token = self.request_token();
                    let enrichment = enrich::enrich(&original, &self.enrich_opts, &token).await;
                    self.apply_enrichment(&original, enrichment)
                }
                Step::Dispatch(request) => {
                    self.dispatch(backend, request).await;
                    Step::Done
                }
                done_or_waiting => return done_or_waiting,
            };
        }
    }

    /// The user line for this turn is already on record if the newest
    /// non-notice entry is that same user text. Info notices (truncation,
    /// autopilot) may sit between the line and the dispatch.
    fn user_line_is_latest(&self, text: &str) -> bool {
        self.history
            .entries()
            .iter()
            .rev()
            .find(|e| e.kind != EntryKind::Info)
            .is_some_and(|e| e.kind == EntryKind::User && e.text == text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double that counts calls and replies from a fixed result.
    struct FakeBackend {
        calls: AtomicUsize,
        reply: Result<String, DispatchError>,
        last_prompt: std::sync::Mutex<Option<String>>,
    }

    impl FakeBackend {
        fn ok(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Ok(reply.to_string()),
                last_prompt: std::sync::Mutex::new(None),
            }
        }

        fn failing(err: DispatchError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Err(err),
                last_prompt: std::sync::Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_prompt(&self) -> Option<String> {
            self.last_prompt.lock().unwrap().clone()
        }
    }

    impl CompletionBackend for FakeBackend {
        async fn complete(&self, _model: &str, prompt: &str) -> Result<String, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            self.reply.clone()
        }
    }

    fn session_in(root: &Path, autopilot: bool) -> Session {
        Session::new(
            SessionConfig {
                selected_model: Some("test-model".to_string()),
                autopilot,
            },
            EnrichOptions {
                root: root.to_path_buf(),
                ..EnrichOptions::default()
            },
        )
    }

    fn kinds(s: &Session) -> Vec<EntryKind> {
        s.history().entries().iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn test_plain_prompt_dispatched_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("hi there");

        let step = s.submit("hello model");
        let end = s.run_step(&backend, step).await;

        assert_eq!(end, Step::Done);
        assert_eq!(backend.last_prompt().as_deref(), Some("hello model"));
        assert_eq!(kinds(&s), vec![EntryKind::User, EntryKind::Assistant]);
        assert_eq!(s.streaming_state(), StreamingState::Idle);
    }

    #[tokio::test]
    async fn test_padded_prompt_dispatched_as_typed() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("hi");

        let step = s.submit("  hello model  ");
        s.run_step(&backend, step).await;

        assert_eq!(backend.last_prompt().as_deref(), Some("  hello model  "));
        assert_eq!(s.history().count(EntryKind::User), 1);
        assert_eq!(s.history().entries()[0].text, "  hello model  ");
        assert_eq!(s.submit("   "), Step::Done);
    }

    #[tokio::test]
    async fn test_file_reference_waits_for_approval_then_dispatches_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("todo.md"), "- ship it").unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("done");

        let step = s.submit("what is in todo.md");
        assert_eq!(s.run_step(&backend, step).await, Step::AwaitApproval);
        assert_eq!(backend.calls(), 0);
        assert!(s.is_busy());

        // Noise while pending is swallowed
        assert_eq!(s.respond(ApprovalInput::Other), Step::AwaitApproval);

        let step = s.respond(ApprovalInput::Yes);
        assert!(matches!(step, Step::Dispatch(_)));
        s.run_step(&backend, step).await;
        assert_eq!(backend.calls(), 1);
        assert!(backend.last_prompt().unwrap().contains("- ship it"));

        // Approval already consumed — a second yes does nothing
        let again = s.respond(ApprovalInput::Yes);
        s.run_step(&backend, again).await;
        assert_eq!(backend.calls(), 1);

        // User line recorded exactly once even though dispatch came later
        assert_eq!(s.history().count(EntryKind::User), 1);
        assert_eq!(s.history().count(EntryKind::Assistant), 1);
    }

    #[tokio::test]
    async fn test_denied_request_never_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.env"), "KEY=1").unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("nope");

        let step = s.submit("print secret.env");
        s.run_step(&backend, step).await;
        let step = s.respond(ApprovalInput::No);
        assert_eq!(s.run_step(&backend, step).await, Step::Done);

        assert_eq!(backend.calls(), 0);
        assert!(!s.is_busy());
        let last = s.history().last().unwrap();
        assert_eq!(last.kind, EntryKind::Info);
        assert!(last.text.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_autopilot_skips_gate_and_notes_access() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print(1)").unwrap();
        let mut s = session_in(dir.path(), true);
        let backend = FakeBackend::ok("it prints 1");

        let step = s.submit("explain main.py");
        assert_eq!(s.run_step(&backend, step).await, Step::Done);
        assert_eq!(backend.calls(), 1);
        assert_eq!(
            kinds(&s),
            vec![EntryKind::User, EntryKind::Info, EntryKind::Assistant]
        );
        assert!(s.history().entries()[1].text.contains("autopilot"));
    }

    #[tokio::test]
    async fn test_missing_file_skips_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("not found, sorry");

        let step = s.submit("open missing.txt");
        assert_eq!(s.run_step(&backend, step).await, Step::Done);
        assert_eq!(backend.calls(), 1);
        assert!(backend.last_prompt().unwrap().contains("could not be found"));
        assert!(s.pending_approval().is_none());
    }

    #[tokio::test]
    async fn test_truncation_noted_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("huge.txt"), "q".repeat(40_000)).unwrap();
        let mut s = session_in(dir.path(), true);
        let backend = FakeBackend::ok("ok");

        let step = s.submit("skim huge.txt");
        s.run_step(&backend, step).await;

        let notices = s
            .history()
            .entries()
            .iter()
            .filter(|e| e.kind == EntryKind::Info && e.text.contains("truncated"))
            .count();
        assert_eq!(notices, 1);
        assert_eq!(s.history().count(EntryKind::User), 1);
    }

    #[tokio::test]
    async fn test_no_model_records_one_error_and_skips_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::new(
            SessionConfig { selected_model: Some(String::new()), autopilot: false },
            EnrichOptions { root: dir.path().to_path_buf(), ..EnrichOptions::default() },
        );
        let backend = FakeBackend::ok("unused");

        let step = s.submit("hello");
        s.run_step(&backend, step).await;

        assert_eq!(backend.calls(), 0);
        assert_eq!(s.history().count(EntryKind::Error), 1);
        assert_eq!(s.streaming_state(), StreamingState::Idle);
    }

    #[tokio::test]
    async fn test_failed_dispatch_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::failing(DispatchError::Status { status: 503, body: "down".to_string() });

        let step = s.submit("ping");
        s.run_step(&backend, step).await;

        assert_eq!(s.streaming_state(), StreamingState::Idle);
        let last = s.history().last().unwrap();
        assert_eq!(last.kind, EntryKind::Error);
        assert!(last.text.contains("503"));
    }

    #[test]
    fn test_second_submission_rejected_while_responding() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);

        let Step::Dispatch(req) = s.submit("first") else { panic!("expected dispatch") };
        let ticket = s.begin_dispatch(req).unwrap();
        assert_eq!(ticket.model, "test-model");
        assert_eq!(s.streaming_state(), StreamingState::Responding);

        assert_eq!(s.submit("second"), Step::Done);
        assert_eq!(s.history().count(EntryKind::User), 1);

        s.finish_dispatch(Ok("reply".to_string()));
        assert_eq!(s.streaming_state(), StreamingState::Idle);
    }

    #[tokio::test]
    async fn test_no_second_approval_while_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("x");

        let step = s.submit("read a.rs");
        s.run_step(&backend, step).await;
        assert!(s.pending_approval().is_some());

        // Submitting again is rejected outright, so no second request is built
        assert_eq!(s.submit("read b.rs"), Step::Done);
        assert!(s.pending_approval().unwrap().message.contains("a.rs"));
    }

    #[tokio::test]
    async fn test_dispatch_refused_while_approval_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let mut s = session_in(dir.path(), false);
        let backend = FakeBackend::ok("x");

        let step = s.submit("read a.rs");
        s.run_step(&backend, step).await;
        let req = DispatchRequest { original: "other".to_string(), prompt: "other".to_string() };
        assert!(s.begin_dispatch(req).is_none());
        assert_eq!(s.streaming_state(), StreamingState::Idle);
        assert!(s.pending_approval().is_some());
    }

    #[test]
    fn test_user_line_recorded_by_dispatch_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        let req = DispatchRequest { original: "direct".to_string(), prompt: "direct".to_string() };
        s.begin_dispatch(req).unwrap();
        assert_eq!(kinds(&s), vec![EntryKind::User]);
        s.finish_dispatch(Err(DispatchError::Timeout(std::time::Duration::from_secs(600))));
        assert!(s.history().last().unwrap().text.contains("timed out"));
    }

    #[test]
    fn test_apply_models() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::new(SessionConfig::default(), EnrichOptions {
            root: dir.path().to_path_buf(),
            ..EnrichOptions::default()
        });
        s.apply_models(Ok(vec!["m1".to_string(), "m2".to_string()]));
        assert_eq!(s.config().selected_model.as_deref(), Some("m1"));
        assert_eq!(s.available_models().len(), 2);

        let mut pinned = session_in(dir.path(), false);
        pinned.apply_models(Ok(vec!["other".to_string()]));
        assert_eq!(pinned.config().selected_model.as_deref(), Some("test-model"));

        let mut broken = Session::new(SessionConfig::default(), EnrichOptions::default());
        broken.apply_models(Err(DispatchError::Transport("refused".to_string())));
        assert!(broken.config().selected_model.is_none());
        assert_eq!(broken.history().count(EntryKind::Error), 1);
    }

    #[test]
    fn test_toggle_autopilot_records_notice() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        assert!(s.toggle_autopilot());
        assert!(!s.toggle_autopilot());
        assert_eq!(s.history().count(EntryKind::Info), 2);
    }

    #[test]
    fn test_recall_list_tracks_live_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session_in(dir.path(), false);
        s.submit("a");
        s.finish_dispatch(Ok("r".to_string()));
        s.submit("b");
        s.finish_dispatch(Ok("r".to_string()));
        s.submit("a");
        s.finish_dispatch(Ok("r".to_string()));
        let persisted = vec!["a".to_string(), "c".to_string()];
        assert_eq!(s.recall_list(&persisted), vec!["c", "a", "b", "a"]);
    }
}
