/// UI helpers shared between the TUI and plain-stdout modes.
use crate::history::EntryKind;

// ── Entry glyphs ──────────────────────────────────────────────────────────────

pub fn entry_glyph(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::User      => "❯",
        EntryKind::Assistant => "◆",
        EntryKind::Info      => "·",
        EntryKind::Error     => "✗",
    }
}

/// Plain-text rendering of one entry for stdout.
pub fn plain_line(kind: EntryKind, text: &str) -> String {
    let glyph = entry_glyph(kind);
    match kind {
        EntryKind::Assistant => format!("\n{text}\n"),
        _ => format!("  {glyph} {text}"),
    }
}
