use chrono::{DateTime, Local, Utc};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use hirelink_core::{Conversation, Reply};

use super::{App, Focus, SyncStatus, format_size};
use crate::sync_mod::sync_status_label;

const LIST_PERCENT: u16 = 35;
const UNREAD_BADGE: &str = "●";

pub(crate) fn ui(frame: &mut Frame, app: &mut App) {
    let area = frame.area();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_status_bar(frame, layout[0], app);
    render_main(frame, layout[1], app);
    render_help_bar(frame, layout[2], app);

    if app.focus == Focus::AttachPrompt {
        render_attach_prompt(frame, area, app);
    }
}

fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(" hirelink ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            " {} ",
            sync_status_label(&app.sync_status, app.spinner())
        )),
    ];
    let unread = app.unread_count();
    if unread > 0 {
        spans.push(Span::styled(
            format!(" {} unread ", unread),
            Style::default().fg(Color::Yellow),
        ));
    }
    if app.sending > 0 {
        spans.push(Span::raw(format!(" {} sending ", app.spinner())));
    }
    if let Some(msg) = &app.status_message {
        spans.push(Span::raw(format!(" | {}", msg)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

fn render_main(frame: &mut Frame, area: Rect, app: &mut App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(LIST_PERCENT),
            Constraint::Percentage(100 - LIST_PERCENT),
        ])
        .split(area);
    render_conversation_list(frame, columns[0], app);
    render_thread_pane(frame, columns[1], app);
}

fn render_conversation_list(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::RIGHT)
        .title("CONVERSATIONS");
    if app.conversations.is_empty() {
        let hint = match app.sync_status {
            SyncStatus::Synced(_) => "No conversations yet",
            _ => "",
        };
        frame.render_widget(Paragraph::new(hint).block(block), area);
        return;
    }

    // Two lines per entry.
    let rows_visible = (area.height.saturating_sub(1) / 2).max(1) as usize;
    let total = app.conversations.len();
    let mut start = app.list_index.saturating_sub(rows_visible.saturating_sub(1));
    if start + rows_visible > total {
        start = total.saturating_sub(rows_visible);
    }
    let end = (start + rows_visible).min(total);

    let mut lines = Vec::with_capacity((end - start) * 2);
    for (offset, conversation) in app.conversations[start..end].iter().enumerate() {
        let highlighted = start + offset == app.list_index;
        let mut title_style = if highlighted {
            if app.focus == Focus::List {
                Style::default().bg(Color::Blue).fg(Color::White)
            } else {
                Style::default().fg(Color::Cyan)
            }
        } else {
            Style::default()
        };
        if !conversation.is_read {
            title_style = title_style.add_modifier(Modifier::BOLD);
        }
        let badge = if conversation.is_read { " " } else { UNREAD_BADGE };
        lines.push(Line::from(vec![
            Span::styled(badge.to_string(), Style::default().fg(Color::Yellow)),
            Span::raw(" "),
            Span::styled(conversation_title(conversation), title_style),
            Span::styled(
                format!("  {}", short_time(conversation.last_message_at)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
        lines.push(Line::from(Span::styled(
            format!("  {}", conversation.last_message),
            Style::default().fg(Color::Gray),
        )));
    }
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_thread_pane(frame: &mut Frame, area: Rect, app: &mut App) {
    let Some(conversation) = app.selected_conversation() else {
        frame.render_widget(
            Paragraph::new("Select a conversation (Enter)").block(Block::default().title("THREAD")),
            area,
        );
        return;
    };

    let compose_visible = matches!(app.focus, Focus::Compose | Focus::AttachPrompt)
        || (!app.compose.is_empty()
            && app.compose_target.as_deref() == Some(conversation.id.as_str()));
    let compose_height = if compose_visible {
        to_u16(app.compose.text.lines().count().max(1))
            .saturating_add(3)
            .min(area.height / 2)
    } else {
        0
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(compose_height)])
        .split(area);

    let lines = thread_lines(&conversation, app.my_user_id.as_deref());
    let inner_width = rows[0].width.max(1) as usize;
    let inner_height = rows[0].height.saturating_sub(1) as usize;
    let content_height: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(inner_width))
        .sum();
    let max_scroll = to_u16(content_height.saturating_sub(inner_height));
    if app.thread_scroll > max_scroll {
        app.thread_scroll = max_scroll;
    }
    let offset = max_scroll - app.thread_scroll;

    let mut title = conversation_title(&conversation);
    if let Some(job) = &conversation.reference.job_title {
        title.push_str(&format!(" | {}", job));
    }
    let paragraph = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    frame.render_widget(paragraph, rows[0]);

    if compose_height > 0 {
        render_composer(frame, rows[1], app);
    }
}

fn render_composer(frame: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Compose;
    let mut lines: Vec<Line> = app
        .compose
        .text
        .split('\n')
        .map(|l| Line::from(l.to_string()))
        .collect();
    if !app.compose.files.is_empty() {
        let chips: Vec<Span> = app
            .compose
            .files
            .iter()
            .map(|f| {
                Span::styled(
                    format!("[{} {}] ", f.name, format_size(f.data.len() as u64)),
                    Style::default().fg(Color::Cyan),
                )
            })
            .collect();
        lines.push(Line::from(chips));
    }
    let border_style = if focused {
        Style::default().fg(Color::Blue)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("REPLY")
        .border_style(border_style);
    frame.render_widget(Paragraph::new(lines).block(block), area);

    if focused {
        let (row, col) = cursor_row_col(&app.compose.text, app.compose_cursor);
        if let Some(position) = cursor_cell(area, row, col) {
            frame.set_cursor_position(position);
        }
    }
}

fn render_attach_prompt(frame: &mut Frame, area: Rect, app: &App) {
    let width = area.width.saturating_sub(8).min(70);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + area.height / 2,
        width,
        height: 3,
    };
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(app.attach_input.as_str())
            .block(Block::default().borders(Borders::ALL).title("Attach file path")),
        popup,
    );
    if let Some(position) = cursor_cell(popup, 0, app.attach_input.chars().count()) {
        frame.set_cursor_position(position);
    }
}

fn render_help_bar(frame: &mut Frame, area: Rect, app: &App) {
    let help = match app.focus {
        Focus::List => "j/k move  Enter open  r refresh  q quit",
        Focus::Thread => "Esc back  i reply  PgUp/PgDn scroll  r refresh  q quit",
        Focus::Compose => {
            "Enter send  Shift+Enter newline  Ctrl+O attach  Ctrl+R drop file  Esc close"
        }
        Focus::AttachPrompt => "Enter attach  Esc cancel",
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

fn conversation_title(conversation: &Conversation) -> String {
    match &conversation.reference.company_name {
        Some(company) if !company.is_empty() => {
            format!("{} ({})", conversation.participant_name, company)
        }
        _ => conversation.participant_name.clone(),
    }
}

fn short_time(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return String::new();
    };
    let local = at.with_timezone(&Local);
    if local.date_naive() == Local::now().date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%b %d").to_string()
    }
}

/// ✓ delivered, ✓✓ read. Only shown on the user's own replies.
pub(crate) fn receipt_marker(reply: &Reply) -> &'static str {
    if reply.read_at.is_some() {
        "✓✓"
    } else if reply.delivered_at.is_some() {
        "✓"
    } else {
        ""
    }
}

pub(crate) fn thread_lines(
    conversation: &Conversation,
    my_user_id: Option<&str>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for reply in &conversation.replies {
        let mine = my_user_id.is_some_and(|id| id == reply.sender_id);
        let author = if mine {
            "You".to_string()
        } else {
            conversation.participant_name.clone()
        };
        let mut header = vec![
            Span::styled(
                author,
                Style::default()
                    .fg(if mine { Color::Green } else { Color::Cyan })
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", short_time(reply.created_at)),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        if mine {
            let marker = receipt_marker(reply);
            if !marker.is_empty() {
                header.push(Span::styled(
                    format!(" {}", marker),
                    Style::default().fg(Color::Blue),
                ));
            }
        }
        lines.push(Line::from(header));

        let envelope = hirelink_content::decode(&reply.content);
        for text_line in envelope.text.lines() {
            lines.push(Line::from(text_line.to_string()));
        }
        for attachment in &envelope.attachments {
            lines.push(Line::from(Span::styled(
                format!(
                    "  [{}] {} ({})",
                    envelope.kind.map(|k| k.as_str()).unwrap_or("file"),
                    attachment.name,
                    format_size(attachment.size)
                ),
                Style::default().fg(Color::Magenta),
            )));
        }
        lines.push(Line::default());
    }
    lines
}

fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Terminal cell for a text cursor inside a bordered box, if it is visible.
fn cursor_cell(area: Rect, row: usize, col: usize) -> Option<(u16, u16)> {
    let x = area.x.saturating_add(1).saturating_add(to_u16(col));
    let y = area.y.saturating_add(1).saturating_add(to_u16(row));
    let inside_x = x < area.right().saturating_sub(1);
    let inside_y = y < area.bottom().saturating_sub(1);
    (inside_x && inside_y).then_some((x, y))
}

fn cursor_row_col(text: &str, cursor: usize) -> (usize, usize) {
    let mut row = 0;
    let mut col = 0;
    for c in text.chars().take(cursor) {
        if c == '\n' {
            row += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (row, col)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use hirelink_content::MessageEnvelope;
    use hirelink_core::{Attachment, Conversation, ConversationRef, Reply};

    use ratatui::layout::Rect;

    use super::{cursor_cell, cursor_row_col, receipt_marker, thread_lines, to_u16};

    fn reply(id: &str, sender: &str, content: &str) -> Reply {
        Reply {
            id: id.to_string(),
            sender_id: sender.to_string(),
            content: content.to_string(),
            created_at: None,
            delivered_at: None,
            read_at: None,
        }
    }

    fn line_text(line: &ratatui::text::Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn receipts_progress_from_delivered_to_read() {
        let mut r = reply("1", "me", "hi");
        assert_eq!(receipt_marker(&r), "");
        r.delivered_at = Some(Utc::now());
        assert_eq!(receipt_marker(&r), "✓");
        r.read_at = Some(Utc::now());
        assert_eq!(receipt_marker(&r), "✓✓");
    }

    #[test]
    fn thread_labels_own_replies_and_lists_attachments() {
        let wire = MessageEnvelope {
            text: "See attached".to_string(),
            kind: None,
            attachments: vec![Attachment {
                name: "cv.pdf".to_string(),
                mime: "application/pdf".to_string(),
                size: 2048,
                data_url: "data:application/pdf;base64,AAAA".to_string(),
            }],
        }
        .to_wire();
        let mut mine = reply("2", "7", &wire.content);
        mine.read_at = Some(Utc::now());
        let conversation = Conversation {
            id: "c".to_string(),
            participant_name: "Grace".to_string(),
            reference: ConversationRef::default(),
            replies: vec![reply("1", "9", "Hello there"), mine],
            is_read: true,
            last_message: String::new(),
            last_message_at: None,
        };

        let text: Vec<String> = thread_lines(&conversation, Some("7"))
            .iter()
            .map(line_text)
            .collect();
        assert!(text[0].starts_with("Grace"));
        assert_eq!(text[1], "Hello there");
        let own_header = text.iter().find(|l| l.starts_with("You")).unwrap();
        assert!(own_header.ends_with("✓✓"));
        assert!(text.iter().any(|l| l.contains("cv.pdf (2 KB)")));
        assert!(!text.iter().any(|l| l.contains("base64")));
    }

    #[test]
    fn unknown_user_sees_no_own_label() {
        let conversation = Conversation {
            id: "c".to_string(),
            participant_name: "Grace".to_string(),
            reference: ConversationRef::default(),
            replies: vec![reply("1", "7", "hi")],
            is_read: true,
            last_message: String::new(),
            last_message_at: None,
        };
        let lines = thread_lines(&conversation, None);
        assert!(line_text(&lines[0]).starts_with("Grace"));
    }

    #[test]
    fn huge_drafts_do_not_overflow_the_cursor() {
        let area = Rect::new(10, 5, 40, 6);
        assert_eq!(cursor_cell(area, 0, 3), Some((14, 6)));
        assert_eq!(cursor_cell(area, 0, 38), None);
        assert_eq!(cursor_cell(area, 4, 0), None);
        assert_eq!(cursor_cell(area, 0, 200_000), None);
        assert_eq!(cursor_cell(Rect::new(u16::MAX - 2, 0, 2, 3), 0, 5), None);
        assert_eq!(to_u16(1_000_000), u16::MAX);
        assert_eq!(to_u16(12), 12);
    }

    #[test]
    fn cursor_tracks_newlines() {
        assert_eq!(cursor_row_col("ab\ncd", 4), (1, 1));
        assert_eq!(cursor_row_col("ab", 9), (0, 2));
    }
}
