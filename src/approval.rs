/// Approval gate — a single-slot consent state machine.
///
/// `Idle → Pending(request) → Idle`. While a request is pending, input is
/// classified into yes / default-accept / no; anything else is swallowed.
/// The continuations are plain data rather than captured closures: approving
/// hands back the payload to act on, denying hands back the notice to record.
use thiserror::Error;

// ── Request ───────────────────────────────────────────────────────────────────

/// What to do once the user approves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovedAction {
    /// Dispatch `prompt`, recording `original` as the user's line
    Dispatch { original: String, prompt: String },
}

/// What to do when the user declines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeniedAction {
    /// Record an informational notice, nothing else
    Notice(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub message: String,
    pub on_approve: ApprovedAction,
    pub on_deny: DeniedAction,
}

// ── Input classification ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalInput {
    Yes,
    /// Bare Enter — accepts
    AcceptDefault,
    No,
    Other,
}

impl ApprovalInput {
    /// Classify a typed token. Case-insensitive; surrounding whitespace ignored.
    pub fn from_text(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "" => ApprovalInput::AcceptDefault,
            "y" | "yes" => ApprovalInput::Yes,
            "n" | "no" => ApprovalInput::No,
            _ => ApprovalInput::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Approved(ApprovedAction),
    Denied(DeniedAction),
    /// No request pending, or the input was not an answer
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("an approval request is already pending")]
    AlreadyPending,
}

// ── Gate ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ApprovalGate {
    pending: Option<ApprovalRequest>,
}

impl ApprovalGate {
    /// Raise a request. Fails if one is already outstanding.
    pub fn request(&mut self, request: ApprovalRequest) -> Result<(), GateError> {
        if self.pending.is_some() {
            return Err(GateError::AlreadyPending);
        }
        tracing::debug!(message = %request.message, "approval: pending");
        self.pending = Some(request);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&ApprovalRequest> {
        self.pending.as_ref()
    }

    /// Feed one input. Yes / AcceptDefault approve, No denies; the slot is
    /// cleared on either. Other input leaves the request pending.
    pub fn respond(&mut self, input: ApprovalInput) -> Resolution {
        if self.pending.is_none() {
            return Resolution::Ignored;
        }
        match input {
            ApprovalInput::Other => Resolution::Ignored,
            ApprovalInput::Yes | ApprovalInput::AcceptDefault => match self.pending.take() {
                Some(req) => {
                    tracing::info!("approval: granted");
                    Resolution::Approved(req.on_approve)
                }
                None => Resolution::Ignored,
            },
            ApprovalInput::No => match self.pending.take() {
                Some(req) => {
                    tracing::info!("approval: denied");
                    Resolution::Denied(req.on_deny)
                }
                None => Resolution::Ignored,
            },
        }
    }
}
