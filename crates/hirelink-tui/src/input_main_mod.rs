use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use hirelink_content::FileInput;

use super::{App, Focus, format_size};

const THREAD_SCROLL_PAGE: u16 = 10;

impl App {
    /// Returns true when the app should exit.
    pub(crate) fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        match self.focus {
            Focus::List => self.on_key_list(key),
            Focus::Thread => self.on_key_thread(key),
            Focus::Compose => self.on_key_compose(key),
            Focus::AttachPrompt => self.on_key_attach_prompt(key),
        }
    }

    fn on_key_list(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.list_index + 1 < self.conversations.len() {
                    self.list_index += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.list_index = self.list_index.saturating_sub(1);
            }
            KeyCode::Char('g') | KeyCode::Home => self.list_index = 0,
            KeyCode::Char('G') | KeyCode::End => {
                self.list_index = self.conversations.len().saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => self.open_highlighted(),
            KeyCode::Char('r') => {
                self.status_message = Some("Refreshing...".to_string());
                self.session.spawn_refresh();
            }
            _ => {}
        }
        false
    }

    fn open_highlighted(&mut self) {
        let Some(id) = self.highlighted_conversation().map(|c| c.id.clone()) else {
            return;
        };
        if self.session.select(&id).is_none() {
            return;
        }
        self.session.spawn_mark_read(&id);
        self.thread_scroll = 0;
        self.status_message = None;
        self.focus = Focus::Thread;
    }

    fn on_key_thread(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => {
                self.session.deselect();
                self.focus = Focus::List;
            }
            KeyCode::Char('i') | KeyCode::Char('c') | KeyCode::Tab => self.open_compose(),
            KeyCode::Char('k') | KeyCode::Up => {
                self.thread_scroll = self.thread_scroll.saturating_add(1);
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.thread_scroll = self.thread_scroll.saturating_sub(1);
            }
            KeyCode::PageUp => {
                self.thread_scroll = self.thread_scroll.saturating_add(THREAD_SCROLL_PAGE);
            }
            KeyCode::PageDown => {
                self.thread_scroll = self.thread_scroll.saturating_sub(THREAD_SCROLL_PAGE);
            }
            KeyCode::Char('r') => self.session.spawn_refresh(),
            _ => {}
        }
        false
    }

    fn on_key_attach_prompt(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => {
                self.attach_input.clear();
                self.focus = Focus::Compose;
            }
            KeyCode::Enter => {
                let raw = self.attach_input.trim().to_string();
                if !raw.is_empty() {
                    self.attach_file(expand_home(&raw));
                }
                self.attach_input.clear();
                self.focus = Focus::Compose;
            }
            KeyCode::Backspace => {
                self.attach_input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.attach_input.push(c);
            }
            _ => {}
        }
        false
    }

    fn attach_file(&mut self, path: PathBuf) {
        match self.runtime().block_on(FileInput::from_path(&path)) {
            Ok(file) => {
                self.status_message = Some(format!(
                    "Attached {} ({})",
                    file.name,
                    format_size(file.data.len() as u64)
                ));
                self.compose.files.push(file);
            }
            Err(err) => {
                tracing::debug!(%err, path = %path.display(), "attach failed");
                self.status_message = Some(format!("Attach failed: {}", err));
            }
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
