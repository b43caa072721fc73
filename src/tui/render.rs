/// Ratatui draw entry-point for chatgate.
use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::AppState;
use crate::history::{EntryKind, HistoryEntry};
use crate::status::StreamingState;
use crate::ui::entry_glyph;

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub fn draw(f: &mut Frame, state: &AppState) {
    let area = f.area();
    let pending = state.session.pending_approval().is_some();

    let constraints = if pending {
        vec![
            Constraint::Min(0),     // history
            Constraint::Length(3),  // approval prompt
            Constraint::Length(1),  // status bar
            Constraint::Length(3),  // input box
        ]
    } else {
        vec![
            Constraint::Min(0),     // history
            Constraint::Length(1),  // status bar
            Constraint::Length(3),  // input box
        ]
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    draw_history(f, state, chunks[0]);
    if pending {
        draw_approval(f, state, chunks[1]);
        draw_status_bar(f, state, chunks[2]);
        draw_input(f, state, chunks[3]);
    } else {
        draw_status_bar(f, state, chunks[1]);
        draw_input(f, state, chunks[2]);
    }
}

// ── History ───────────────────────────────────────────────────────────────────

fn entry_style(kind: EntryKind) -> (Style, Style) {
    match kind {
        EntryKind::User => (
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        EntryKind::Assistant => (
            Style::default().fg(Color::Rgb(100, 180, 220)),
            Style::default().fg(Color::Rgb(220, 220, 230)),
        ),
        EntryKind::Info => (
            Style::default().fg(Color::DarkGray),
            Style::default().fg(Color::Rgb(120, 120, 140)),
        ),
        EntryKind::Error => (
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            Style::default().fg(Color::Rgb(230, 110, 110)),
        ),
    }
}

/// Lead column before entry text: "  ❯ " on the first row, blanks after.
const LEAD_WIDTH: usize = 4;

/// Word-wrap one source line to `max_width` columns. Leading indentation is
/// kept on the first row; a word wider than the row is split by chars.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let indent: String = text.chars().take_while(|c| *c == ' ').collect();
    let mut lines = Vec::new();
    let mut current = indent.clone();
    let mut current_width = indent.width().min(max_width - 1);
    let mut has_word = false;

    for word in text.split_whitespace() {
        let word_width = word.width();
        if has_word && current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
            continue;
        }
        if has_word {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        if current_width + word_width <= max_width {
            current.push_str(word);
            current_width += word_width;
        } else {
            // Too wide for any row: hard-split
            for c in word.chars() {
                let cw = c.to_string().width();
                if current_width + cw > max_width && current_width > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                current.push(c);
                current_width += cw;
            }
        }
        has_word = true;
    }
    if has_word || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// One display row per returned line, pre-wrapped to `width` columns, so the
/// caller's row count is exact.
fn entry_lines(entry: &HistoryEntry, width: u16) -> Vec<Line<'static>> {
    let (glyph_style, text_style) = entry_style(entry.kind);
    let glyph = entry_glyph(entry.kind);
    let text_width = (width as usize).saturating_sub(LEAD_WIDTH);
    let mut lines: Vec<Line<'static>> = Vec::new();
    for raw in entry.text.lines() {
        for row in wrap_text(raw, text_width) {
            let lead = if lines.is_empty() { format!("  {glyph} ") } else { " ".repeat(LEAD_WIDTH) };
            lines.push(Line::from(vec![
                Span::styled(lead, glyph_style),
                Span::styled(row, text_style),
            ]));
        }
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(format!("  {glyph}"), glyph_style)));
    }
    if entry.kind == EntryKind::User {
        let stamp = entry.created_at.with_timezone(&Local).format("  %H:%M").to_string();
        let used: usize = lines[0].spans.iter().map(|s| s.content.width()).sum();
        if used + stamp.width() <= width as usize {
            lines[0].spans.push(Span::styled(stamp, Style::default().fg(Color::Rgb(60, 60, 80))));
        }
    }
    // Breathing room after each exchange
    if entry.kind == EntryKind::Assistant {
        lines.push(Line::default());
    }
    lines
}

fn draw_history(f: &mut Frame, state: &AppState, area: Rect) {
    let history = state.session.history();
    let lines: Vec<Line> = if history.is_empty() {
        vec![
            Line::default(),
            Line::from(Span::styled(
                "  Ask anything. Mention a file like notes.md and it will be found and read in.",
                Style::default().fg(Color::Rgb(70, 70, 90)),
            )),
        ]
    } else {
        history.entries().iter().flat_map(|e| entry_lines(e, area.width)).collect()
    };

    // Stick to the bottom; PageUp scrolls back by `state.scroll` rows
    let visible = area.height as usize;
    let bottom = lines.len().saturating_sub(visible);
    let offset = bottom.saturating_sub(state.scroll);

    let paragraph = Paragraph::new(lines)
        .scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));
    f.render_widget(paragraph, area);
}

// ── Approval prompt ───────────────────────────────────────────────────────────

fn draw_approval(f: &mut Frame, state: &AppState, area: Rect) {
    let Some(request) = state.session.pending_approval() else { return };
    let line = Line::from(vec![
        Span::styled("  ? ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled(request.message.clone(), Style::default().fg(Color::White)),
        Span::styled("   [Y/n]", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(Span::styled(" approval ", Style::default().fg(Color::Yellow)));
    f.render_widget(Paragraph::new(line).block(block), area);
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let session = &state.session;
    let spinner = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];

    let (status_glyph, status_color, activity) = if session.pending_approval().is_some() {
        ("?", Color::Yellow, "waiting for approval".to_string())
    } else if session.is_enriching() {
        (spinner, Color::Cyan, "looking for file…".to_string())
    } else if session.streaming_state() == StreamingState::Responding {
        (spinner, Color::Cyan, format!("responding… {}s", session.status().elapsed_secs()))
    } else {
        ("▲", Color::White, "idle".to_string())
    };

    let model = session
        .config()
        .selected_model
        .clone()
        .unwrap_or_else(|| "no model".to_string());
    let (pilot_label, pilot_color) = if session.config().autopilot {
        ("autopilot on", Color::Rgb(220, 160, 0))
    } else {
        ("autopilot off", Color::DarkGray)
    };

    let mut spans = vec![
        Span::raw(" "),
        Span::styled(status_glyph, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::styled(" chatgate", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(state.profile.clone(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(model, Style::default().fg(Color::Rgb(100, 180, 220))),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(pilot_label, Style::default().fg(pilot_color)),
        Span::styled("  ", Style::default()),
        Span::styled(activity, Style::default().fg(status_color)),
    ];

    if let Some(key) = state.exit.armed_key() {
        spans.push(Span::styled(
            format!("  press {} again to exit", key.label()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(10, 10, 18))),
        area,
    );
}

// ── Input box ─────────────────────────────────────────────────────────────────

fn draw_input(f: &mut Frame, state: &AppState, area: Rect) {
    let session = &state.session;
    let pending = session.pending_approval().is_some();
    let busy = session.is_busy();

    let (border_color, prompt_color, prompt_char) = if pending {
        (Color::Yellow, Color::Yellow, "?")
    } else if busy {
        (Color::Rgb(40, 40, 60), Color::DarkGray, "·")
    } else {
        (Color::Rgb(60, 60, 80), Color::Cyan, "❯")
    };

    let prompt_span = Span::styled(
        format!("  {prompt_char} "),
        Style::default().fg(prompt_color).add_modifier(Modifier::BOLD),
    );

    let content_span = if pending {
        Span::styled(
            "y approve · n deny · Enter accepts the default (yes)",
            Style::default().fg(Color::Rgb(180, 140, 40)),
        )
    } else if state.input.is_empty() {
        let hint = if busy { "waiting for the model…" } else { "message · ↑ recall · /help" };
        Span::styled(hint, Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(state.input.clone(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    let paragraph = Paragraph::new(Line::from(vec![prompt_span, content_span]))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);

    if !pending {
        // prompt is "  ❯ " — 4 visible cols
        let prompt_width: u16 = 4;
        let before = &state.input[..state.cursor.min(state.input.len())];
        let cursor_x = area
            .x
            .saturating_add(prompt_width)
            .saturating_add(u16::try_from(before.width()).unwrap_or(u16::MAX));
        let cursor_y = area.y + 1; // +1 for top border
        if cursor_x < area.x.saturating_add(area.width) {
            f.set_cursor_position((cursor_x, cursor_y));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, Overrides, ResolvedConfig};
    use crate::enrich::EnrichOptions;
    use crate::history::HistoryStore;
    use crate::input_log::InputLog;
    use crate::session::{Session, SessionConfig};
    use ratatui::{Terminal, backend::TestBackend};

    fn state_in(dir: &std::path::Path) -> AppState {
        let session = Session::new(
            SessionConfig { selected_model: Some("m".to_string()), autopilot: false },
            EnrichOptions { root: dir.to_path_buf(), ..EnrichOptions::default() },
        );
        let resolved = ResolvedConfig::resolve(&ConfigFile::default(), &Overrides::default());
        AppState::new(&resolved, session, InputLog::new(dir.join("inputs.log")))
    }

    fn screen_rows(terminal: &Terminal<TestBackend>) -> Vec<String> {
        let buf = terminal.backend().buffer();
        (0..buf.area.height)
            .map(|y| (0..buf.area.width).map(|x| buf[(x, y)].symbol()).collect::<String>())
            .collect()
    }

    #[test]
    fn test_wrap_text_on_word_boundaries() {
        assert_eq!(wrap_text("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap_text("", 10), vec![""]);
        assert_eq!(wrap_text("  indented code", 40), vec!["  indented code"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        for row in wrap_text("x y zzzzzzzzzzzz w", 5) {
            assert!(row.width() <= 5, "{row:?} too wide");
        }
    }

    #[test]
    fn test_newest_reply_tail_visible_after_wrapping() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let mut reply = (0..6)
            .map(|p| {
                (0..60)
                    .map(|i| format!("word{:03}xx", p * 60 + i))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n");
        reply.push_str(" FINAL_MARKER");
        state.session.finish_dispatch(Ok(reply));

        let mut terminal = Terminal::new(TestBackend::new(37, 20)).unwrap();
        terminal.draw(|f| draw(f, &state)).unwrap();

        // history pane = 20 rows minus status bar (1) and input box (3)
        let rows = screen_rows(&terminal);
        assert!(
            rows[..16].iter().any(|r| r.contains("FINAL_MARKER")),
            "newest line not on screen:\n{}",
            rows.join("\n")
        );
    }

    #[test]
    fn test_long_input_does_not_overflow_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        state.input = "x".repeat(70_000);
        state.cursor = state.input.len();
        let mut terminal = Terminal::new(TestBackend::new(40, 10)).unwrap();
        terminal.draw(|f| draw(f, &state)).unwrap();
    }

    #[test]
    fn test_entry_lines_indent_continuations() {
        let mut h = HistoryStore::default();
        h.assistant("one\ntwo");
        let lines = entry_lines(&h.entries()[0], 80);
        // two text lines plus the trailing spacer
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].spans[0].content, "  ◆ ");
        assert_eq!(lines[1].spans[0].content, "    ");
    }
}
