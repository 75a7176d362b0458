use std::io::Read;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::json;
use tokio::sync::mpsc;

use hirelink_content::FileInput;
use hirelink_core::Credentials;
use hirelink_sync::{
    ComposeDraft, ConversationStore, EVENT_QUEUE_CAPACITY, MessagingEvent, MessagingSession,
    PollTarget, ReadOutcome, ReadStateTracker, RefreshCycle, SendOutcome, SendPipeline, Tick,
    store,
};

use super::{
    AppConfig, AttachmentCommand, CliCommand, ConversationCommand, ConversationsCommand,
    build_fetcher, conversation_detail_to_json, conversation_summary_to_json, envelope_to_json,
    output_error, output_ok,
};

pub(crate) fn run_cli(
    rt: &Arc<tokio::runtime::Runtime>,
    command: CliCommand,
    config: &AppConfig,
) -> Result<()> {
    let (fetcher, _kv) = rt.block_on(build_fetcher(config))?;

    match command {
        CliCommand::Login(args) => {
            let credentials = Credentials {
                email: args.email,
                password: args.password,
            };
            let session = rt.block_on(fetcher.login(&credentials))?;
            output_ok(json!({
                "email": credentials.email,
                "token_stored": true,
                "user": session.user,
            }))
        }
        CliCommand::Conversations(cmd) => match cmd.command {
            ConversationsCommand::List(args) => {
                let conversations = rt.block_on(fetcher.fetch_all())?;
                let out: Vec<_> = conversations
                    .iter()
                    .filter(|c| !args.unread || !c.is_read)
                    .take(args.limit)
                    .map(conversation_summary_to_json)
                    .collect();
                output_ok(json!(out))
            }
        },
        CliCommand::Conversation(cmd) => match cmd.command {
            ConversationCommand::Show(args) => {
                let conversations = rt.block_on(fetcher.fetch_all())?;
                let Some(conversation) = conversations.iter().find(|c| c.id == args.id) else {
                    return output_error("Conversation not found");
                };
                output_ok(conversation_detail_to_json(conversation))
            }
        },
        CliCommand::Send(args) => rt.block_on(async move {
            let mut draft = ComposeDraft::new(args.text);
            for path in &args.attach {
                draft.files.push(FileInput::from_path(path).await?);
            }
            let (tx, _rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
            let cycle = Arc::new(RefreshCycle::new(
                fetcher.clone(),
                store::shared(ConversationStore::new()),
                tx,
            ));
            let pipeline = SendPipeline::new(fetcher.clone(), cycle);
            match pipeline.send(&args.id, &mut draft).await? {
                SendOutcome::Sent {
                    attachments,
                    oversized,
                } => output_ok(json!({
                    "sent": true,
                    "attachments": attachments,
                    "oversized": oversized,
                })),
                SendOutcome::Skipped => output_ok(json!({ "sent": false, "reason": "empty" })),
            }
        }),
        CliCommand::MarkRead(args) => rt.block_on(async move {
            let (tx, _rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
            let shared = store::shared(ConversationStore::new());
            let cycle = RefreshCycle::new(fetcher.clone(), shared.clone(), tx);
            cycle.poll(Tick::Forced).await;
            let tracker = ReadStateTracker::new(fetcher.clone(), shared);
            match tracker.mark_read(&args.id).await {
                ReadOutcome::AlreadyRead => output_ok(json!({ "status": "already_read" })),
                ReadOutcome::Unknown => output_error("Conversation not found"),
                ReadOutcome::Marked { confirmation: None } => {
                    output_ok(json!({ "status": "marked", "confirmed": true }))
                }
                ReadOutcome::Marked {
                    confirmation: Some(err),
                } => output_ok(json!({
                    "status": "marked",
                    "confirmed": false,
                    "error": err.to_string(),
                })),
            }
        }),
        CliCommand::Attachment(cmd) => match cmd.command {
            AttachmentCommand::Save(args) => {
                let conversations = rt.block_on(fetcher.fetch_all())?;
                let reply = conversations
                    .iter()
                    .find(|c| c.id == args.id)
                    .and_then(|c| c.reply(&args.reply))
                    .ok_or_else(|| anyhow!("Reply not found"))?;
                let envelope = hirelink_content::decode(&reply.content);
                let attachment = envelope
                    .attachments
                    .get(args.index)
                    .ok_or_else(|| anyhow!("Attachment index out of range"))?;
                let bytes = hirelink_content::attachment_bytes(attachment)?;
                let target = if args.path.is_dir() {
                    args.path.join(safe_filename(&attachment.name))
                } else {
                    args.path.clone()
                };
                std::fs::write(&target, &bytes)?;
                output_ok(json!({
                    "path": target.display().to_string(),
                    "name": attachment.name,
                    "type": attachment.mime,
                    "bytes": bytes.len(),
                }))
            }
        },
        CliCommand::Decode(args) => {
            let content = match &args.file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            output_ok(envelope_to_json(&hirelink_content::decode(&content)))
        }
        CliCommand::Watch(args) => rt.block_on(async move {
            let (mut session, mut events) =
                MessagingSession::mount(fetcher.clone(), config.poll_interval);
            let mut seen = 0;
            while seen < args.ticks {
                let Some(event) = events.recv().await else {
                    break;
                };
                match event {
                    MessagingEvent::Refreshed {
                        conversations,
                        unread,
                        synced_at,
                        ..
                    } => {
                        seen += 1;
                        output_ok(json!({
                            "tick": seen,
                            "conversations": conversations,
                            "unread": unread,
                            "synced_at": synced_at.to_rfc3339(),
                        }))?;
                    }
                    MessagingEvent::FetchFailed { reason, auth } => {
                        seen += 1;
                        output_error(&format!(
                            "{} fetch failed: {}",
                            if auth { "auth" } else { "transport" },
                            reason
                        ))?;
                    }
                    _ => {}
                }
            }
            session.unmount().await;
            Ok::<(), anyhow::Error>(())
        }),
    }
}

fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches('.').trim();
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}
