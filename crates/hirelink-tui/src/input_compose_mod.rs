use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use hirelink_content::MAX_ATTACHMENTS;

use super::{App, Focus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComposeAction {
    Send,
    Cancel,
    OpenAttach,
    RemoveAttachment,
    Insert(char),
    Newline,
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Ignore,
}

pub(crate) fn compose_key_action(key: KeyEvent) -> ComposeAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let newline_mod = key
        .modifiers
        .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT);
    match key.code {
        KeyCode::Enter if newline_mod => ComposeAction::Newline,
        KeyCode::Enter => ComposeAction::Send,
        KeyCode::Esc => ComposeAction::Cancel,
        KeyCode::Char('o') | KeyCode::Char('O') if ctrl => ComposeAction::OpenAttach,
        KeyCode::Char('r') | KeyCode::Char('R') if ctrl => ComposeAction::RemoveAttachment,
        KeyCode::Char('j') if ctrl => ComposeAction::Newline,
        KeyCode::Char(_) if ctrl => ComposeAction::Ignore,
        KeyCode::Char(c) => ComposeAction::Insert(c),
        KeyCode::Backspace => ComposeAction::Backspace,
        KeyCode::Delete => ComposeAction::Delete,
        KeyCode::Left => ComposeAction::Left,
        KeyCode::Right => ComposeAction::Right,
        KeyCode::Home => ComposeAction::Home,
        KeyCode::End => ComposeAction::End,
        _ => ComposeAction::Ignore,
    }
}

fn byte_index(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Applies an editing action to `text` and returns the new cursor, in chars.
pub(crate) fn apply_edit(text: &mut String, cursor: usize, action: ComposeAction) -> usize {
    let len = text.chars().count();
    let cursor = cursor.min(len);
    match action {
        ComposeAction::Insert(c) => {
            text.insert(byte_index(text, cursor), c);
            cursor + 1
        }
        ComposeAction::Newline => {
            text.insert(byte_index(text, cursor), '\n');
            cursor + 1
        }
        ComposeAction::Backspace if cursor > 0 => {
            text.remove(byte_index(text, cursor - 1));
            cursor - 1
        }
        ComposeAction::Delete if cursor < len => {
            text.remove(byte_index(text, cursor));
            cursor
        }
        ComposeAction::Left => cursor.saturating_sub(1),
        ComposeAction::Right => (cursor + 1).min(len),
        ComposeAction::Home => line_start(text, cursor),
        ComposeAction::End => line_end(text, cursor),
        _ => cursor,
    }
}

fn line_start(text: &str, cursor: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = cursor;
    while idx > 0 && chars[idx - 1] != '\n' {
        idx -= 1;
    }
    idx
}

fn line_end(text: &str, cursor: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = cursor;
    while idx < chars.len() && chars[idx] != '\n' {
        idx += 1;
    }
    idx
}

impl App {
    pub(crate) fn open_compose(&mut self) {
        let Some(conversation) = self.selected_conversation() else {
            self.status_message = Some("Open a conversation first".to_string());
            return;
        };
        if self.compose_target.as_deref() != Some(conversation.id.as_str()) {
            if !self.compose.is_empty() {
                tracing::debug!(
                    from = ?self.compose_target,
                    to = %conversation.id,
                    "draft dropped on conversation switch"
                );
            }
            self.compose.clear();
            self.compose_cursor = 0;
            self.compose_target = Some(conversation.id.clone());
        }
        self.focus = Focus::Compose;
    }

    pub(crate) fn on_key_compose(&mut self, key: KeyEvent) -> bool {
        match compose_key_action(key) {
            ComposeAction::Send => self.send_compose(),
            ComposeAction::Cancel => self.focus = Focus::Thread,
            ComposeAction::OpenAttach => {
                if self.compose.files.len() >= MAX_ATTACHMENTS {
                    self.status_message =
                        Some(format!("At most {} attachments per reply", MAX_ATTACHMENTS));
                } else {
                    self.attach_input.clear();
                    self.focus = Focus::AttachPrompt;
                }
            }
            ComposeAction::RemoveAttachment => match self.compose.files.pop() {
                Some(file) => {
                    self.status_message = Some(format!("Removed attachment {}", file.name))
                }
                None => self.status_message = Some("No attachments to remove".to_string()),
            },
            ComposeAction::Ignore => {}
            edit => {
                self.compose_cursor = apply_edit(&mut self.compose.text, self.compose_cursor, edit);
            }
        }
        false
    }

    fn send_compose(&mut self) {
        let Some(target) = self.compose_target.clone() else {
            self.focus = Focus::Thread;
            return;
        };
        if self.compose.is_empty() {
            return;
        }
        let draft = std::mem::take(&mut self.compose);
        self.compose_cursor = 0;
        self.session.spawn_send(&target, draft);
        self.focus = Focus::Thread;
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::{ComposeAction, apply_edit, compose_key_action};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn enter_sends_and_shift_enter_breaks_line() {
        assert_eq!(
            compose_key_action(key(KeyCode::Enter, KeyModifiers::NONE)),
            ComposeAction::Send
        );
        assert_eq!(
            compose_key_action(key(KeyCode::Enter, KeyModifiers::SHIFT)),
            ComposeAction::Newline
        );
        assert_eq!(
            compose_key_action(key(KeyCode::Enter, KeyModifiers::ALT)),
            ComposeAction::Newline
        );
    }

    #[test]
    fn control_chords_do_not_type() {
        assert_eq!(
            compose_key_action(key(KeyCode::Char('o'), KeyModifiers::CONTROL)),
            ComposeAction::OpenAttach
        );
        assert_eq!(
            compose_key_action(key(KeyCode::Char('r'), KeyModifiers::CONTROL)),
            ComposeAction::RemoveAttachment
        );
        assert_eq!(
            compose_key_action(key(KeyCode::Char('x'), KeyModifiers::CONTROL)),
            ComposeAction::Ignore
        );
        assert_eq!(
            compose_key_action(key(KeyCode::Char('X'), KeyModifiers::SHIFT)),
            ComposeAction::Insert('X')
        );
    }

    #[test]
    fn edits_respect_multibyte_chars() {
        let mut text = String::new();
        let mut cursor = 0;
        for c in "héllo".chars() {
            cursor = apply_edit(&mut text, cursor, ComposeAction::Insert(c));
        }
        cursor = apply_edit(&mut text, cursor, ComposeAction::Left);
        cursor = apply_edit(&mut text, cursor, ComposeAction::Left);
        cursor = apply_edit(&mut text, cursor, ComposeAction::Backspace);
        assert_eq!(text, "hélo");
        assert_eq!(cursor, 2);
        cursor = apply_edit(&mut text, cursor, ComposeAction::Delete);
        assert_eq!(text, "héo");
        assert_eq!(cursor, 2);
    }

    #[test]
    fn home_and_end_stay_on_the_current_line() {
        let mut text = "first\nsecond".to_string();
        let cursor = apply_edit(&mut text, 9, ComposeAction::Home);
        assert_eq!(cursor, 6);
        let cursor = apply_edit(&mut text, cursor, ComposeAction::End);
        assert_eq!(cursor, 12);
        assert_eq!(apply_edit(&mut text, 2, ComposeAction::End), 5);
    }

    #[test]
    fn backspace_at_start_is_a_no_op() {
        let mut text = "ab".to_string();
        assert_eq!(apply_edit(&mut text, 0, ComposeAction::Backspace), 0);
        assert_eq!(text, "ab");
    }
}
