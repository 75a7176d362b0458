use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::{AppConfig, CLI_SCHEMA_VERSION, build_fetcher, load_config_text};

#[path = "cli_command_handlers.rs"]
mod cli_command_handlers;
#[path = "cli_config.rs"]
mod cli_config;
#[path = "cli_runtime_helpers.rs"]
mod cli_runtime_helpers;

pub(crate) use cli_command_handlers::run_cli;
pub(crate) use cli_config::load_app_config;
pub(crate) use cli_runtime_helpers::{
    conversation_detail_to_json, conversation_summary_to_json, envelope_to_json, output_error,
    output_ok,
};

#[derive(Parser, Debug)]
#[command(name = "hirelink", version, about = "Recruitment conversations in the terminal")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Log in and store the token and credentials for re-authentication.
    Login(LoginCmd),
    Conversations(ConversationsCmd),
    Conversation(ConversationCmd),
    /// Append a reply, optionally with attachments.
    Send(SendCmd),
    MarkRead(MarkReadCmd),
    Attachment(AttachmentCmd),
    /// Decode a stored reply body from stdin or a file.
    Decode(DecodeCmd),
    /// Poll and print one line per refresh.
    Watch(WatchCmd),
}

#[derive(Args, Debug)]
pub(crate) struct LoginCmd {
    #[arg(long)]
    pub(crate) email: String,
    #[arg(long, env = "HIRELINK_PASSWORD")]
    pub(crate) password: String,
}

#[derive(Args, Debug)]
pub(crate) struct ConversationsCmd {
    #[command(subcommand)]
    pub(crate) command: ConversationsCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConversationsCommand {
    List(ConversationsList),
}

#[derive(Args, Debug)]
pub(crate) struct ConversationsList {
    #[arg(long)]
    pub(crate) unread: bool,
    #[arg(long, default_value_t = 50)]
    pub(crate) limit: usize,
}

#[derive(Args, Debug)]
pub(crate) struct ConversationCmd {
    #[command(subcommand)]
    pub(crate) command: ConversationCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConversationCommand {
    Show(ConversationShow),
}

#[derive(Args, Debug)]
pub(crate) struct ConversationShow {
    #[arg(long)]
    pub(crate) id: String,
}

#[derive(Args, Debug)]
pub(crate) struct SendCmd {
    #[arg(long)]
    pub(crate) id: String,
    #[arg(long, default_value = "")]
    pub(crate) text: String,
    #[arg(long = "attach")]
    pub(crate) attach: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct MarkReadCmd {
    #[arg(long)]
    pub(crate) id: String,
}

#[derive(Args, Debug)]
pub(crate) struct AttachmentCmd {
    #[command(subcommand)]
    pub(crate) command: AttachmentCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum AttachmentCommand {
    Save(AttachmentSave),
}

#[derive(Args, Debug)]
pub(crate) struct AttachmentSave {
    #[arg(long)]
    pub(crate) id: String,
    #[arg(long)]
    pub(crate) reply: String,
    #[arg(long, default_value_t = 0)]
    pub(crate) index: usize,
    /// Target file, or a directory to save under the attachment's own name.
    #[arg(long)]
    pub(crate) path: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct DecodeCmd {
    #[arg(long)]
    pub(crate) file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct WatchCmd {
    #[arg(long, default_value_t = 3)]
    pub(crate) ticks: usize,
}
