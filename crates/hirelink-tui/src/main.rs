use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;

use hirelink_api::{ApiConfig, ConversationFetcher, HttpConversationApi};
use hirelink_core::{
    Conversation, KeyValueStore, SqliteKvStore, USER_KEY, xdg_config_dir, xdg_state_dir,
};
use hirelink_sync::{ComposeDraft, MessagingEvent, MessagingSession};

mod app_lifecycle_mod;
mod cli;
mod input_compose_mod;
mod input_main_mod;
mod render_mod;
mod sync_mod;

use crate::cli::{Cli, load_app_config, output_error, run_cli};
use crate::render_mod::ui;

const TICK_RATE: Duration = Duration::from_millis(200);
const CLI_SCHEMA_VERSION: &str = "hirelink.cli.v1";
const LOADING_SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppConfig {
    pub(crate) api: ApiConfig,
    pub(crate) poll_interval: Duration,
    pub(crate) db_path: String,
    pub(crate) load_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
    List,
    Thread,
    Compose,
    AttachPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SyncStatus {
    Starting,
    Loading,
    Synced(DateTime<Utc>),
    Offline(String),
    SignedOut(String),
}

pub(crate) struct App {
    runtime: Arc<tokio::runtime::Runtime>,
    pub(crate) session: MessagingSession,
    events: mpsc::Receiver<MessagingEvent>,
    pub(crate) conversations: Vec<Arc<Conversation>>,
    pub(crate) list_index: usize,
    pub(crate) focus: Focus,
    pub(crate) compose: ComposeDraft,
    pub(crate) compose_cursor: usize,
    pub(crate) compose_target: Option<String>,
    pub(crate) attach_input: String,
    pub(crate) sending: usize,
    pub(crate) sync_status: SyncStatus,
    pub(crate) status_message: Option<String>,
    pub(crate) my_user_id: Option<String>,
    pub(crate) thread_scroll: u16,
    pub(crate) spinner_frame: usize,
    pub(crate) last_tick: Instant,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    hirelink_core::init_logging();
    if let Err(err) = ensure_default_config_exists() {
        tracing::debug!(%err, "config bootstrap failed");
    }
    let config = load_app_config();
    if let Some(err) = &config.load_error {
        tracing::warn!(error = %err, "config unreadable, using defaults");
    }
    let rt = Arc::new(tokio::runtime::Runtime::new()?);

    if let Some(command) = cli.command {
        if let Err(err) = run_cli(&rt, command, &config) {
            return output_error(&err.to_string());
        }
        return Ok(());
    }

    let (fetcher, kv) = rt.block_on(build_fetcher(&config))?;
    let my_user_id = rt.block_on(load_user_id(kv.as_ref()));
    let (session, events) = {
        let _guard = rt.enter();
        MessagingSession::mount(fetcher, config.poll_interval)
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(rt.clone(), session, events, my_user_id);
    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, mut app: App) -> Result<()> {
    loop {
        app.refresh_snapshot();
        terminal.draw(|frame| ui(frame, &mut app))?;

        app.drain_events();

        let timeout = TICK_RATE.saturating_sub(app.last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if app.on_key(key) {
                    app.shutdown();
                    return Ok(());
                }
            }
        }

        if app.last_tick.elapsed() >= TICK_RATE {
            app.last_tick = Instant::now();
            app.on_tick();
        }
    }
}

pub(crate) async fn build_fetcher(
    config: &AppConfig,
) -> Result<(ConversationFetcher, Arc<SqliteKvStore>)> {
    let kv = SqliteKvStore::connect(&resolve_db_path(&config.db_path)).await?;
    kv.init().await?;
    let kv = Arc::new(kv);
    let api = Arc::new(HttpConversationApi::new(config.api.clone())?);
    Ok((ConversationFetcher::new(api, kv.clone()), kv))
}

/// The logged-in user's id from the stored profile, used to label own replies.
pub(crate) async fn load_user_id(kv: &dyn KeyValueStore) -> Option<String> {
    let raw = kv.get(USER_KEY).await.ok().flatten()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    match value.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn config_path_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("hirelink.toml"),
        xdg_config_dir().join("hirelink").join("hirelink.toml"),
    ]
}

pub(crate) fn load_config_text() -> Option<String> {
    for path in config_path_candidates() {
        if let Ok(content) = std::fs::read_to_string(&path) {
            return Some(content);
        }
    }
    None
}

fn default_config_template() -> &'static str {
    r#"# Auto-generated by hirelink on first run.

[api]
base_url = "http://localhost:3000"
conversations_path = "/api/trpc/messages.getAll"
reply_path = "/api/trpc/messages.reply"
mark_read_path = "/api/trpc/messages.markAsRead"
login_path = "/api/auth/login/"
timeout_secs = 15

[poll]
interval_ms = 1000

[store]
# Relative paths live under $XDG_STATE_HOME/hirelink.
db_path = "hirelink.db"
"#
}

fn ensure_default_config_exists() -> Result<()> {
    if load_config_text().is_some() {
        return Ok(());
    }
    let path = xdg_config_dir().join("hirelink").join("hirelink.toml");
    write_text_atomic(&path, default_config_template())
}

fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    // Keep ownership of a file the user already has.
    if path.exists() {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        return Ok(());
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn default_db_dir() -> PathBuf {
    let dir = xdg_state_dir().join("hirelink");
    let _ = std::fs::create_dir_all(&dir);
    dir
}

pub(crate) fn resolve_db_path(raw: &str) -> String {
    let path = Path::new(raw);
    if path.is_absolute() {
        raw.to_string()
    } else {
        default_db_dir().join(path).to_string_lossy().to_string()
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else if b >= KB {
        format!("{:.0} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}
