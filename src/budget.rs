//! Token budget for file content embedded in a prompt.
//!
//! Tokens are approximated at a fixed 4 chars each — the same cheap
//! estimate used everywhere else we size context — so the ceiling is a
//! plain character count. All lengths here are in `char`s, never bytes,
//! so a cut can't land inside a multi-byte sequence.

/// Token ceiling for an enriched prompt.
pub const MAX_PROMPT_TOKENS: usize = 4096;
/// Average characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens: MAX_PROMPT_TOKENS,
            chars_per_token: CHARS_PER_TOKEN,
        }
    }
}

impl TokenBudget {
    pub fn max_chars(&self) -> usize {
        self.max_tokens * self.chars_per_token
    }

    /// Characters left for the content slot of a template.
    ///
    /// `template_len` is the template as it will be sent, still holding the
    /// placeholder; `placeholder_len` is the placeholder's own length, which
    /// the content replaces. Saturates at zero for oversized templates.
    pub fn available(&self, template_len: usize, placeholder_len: usize) -> usize {
        let fixed = template_len.saturating_sub(placeholder_len);
        self.max_chars().saturating_sub(fixed)
    }
}

/// Estimate tokens for a string (1 token ≈ 4 chars).
pub fn estimate_tokens(s: &str) -> usize {
    s.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Keep at most `max_chars` characters. Returns the kept slice and whether
/// anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> (&str, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&s[..byte_idx], true),
        None => (s, false),
    }
}
