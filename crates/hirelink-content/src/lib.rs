//! Inline attachment codec.
//!
//! The conversation transport only carries text, so attachments travel inside
//! the reply body:
//!
//! ```text
//! <free-text>?__FILETYPE:<kind>__<free-text>?__ATTACHMENTS__<json-array>__ATTACHMENTS_END__
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STD;
use thiserror::Error;

use hirelink_core::Attachment;

mod transform;

pub use transform::{FileInput, IMAGE_QUALITY, MAX_IMAGE_EDGE, compress_image, data_url};

pub const MAX_ATTACHMENTS: usize = 5;
pub const MAX_CONTENT_CHARS: usize = 20_000_000;
pub const OVERSIZED_PLACEHOLDER: &str = "sent file(s) too large to display";

const FILETYPE_OPEN: &str = "__FILETYPE:";
const MARKER_CLOSE: &str = "__";
const ATTACHMENTS_OPEN: &str = "__ATTACHMENTS__";
const ATTACHMENTS_CLOSE: &str = "__ATTACHMENTS_END__";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("attachment block has no end marker")]
    Unterminated,
    #[error("attachment block is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("content exceeds the size cap")]
    Oversized,
    #[error("not a base64 data url")]
    DataUrl,
    #[error("data url payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Ordered by marker priority: a mixed batch is labelled with its highest kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentKind {
    File,
    Pdf,
    Video,
    Image,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::File => "file",
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Video => "video",
            AttachmentKind::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(AttachmentKind::File),
            "pdf" => Some(AttachmentKind::Pdf),
            "video" => Some(AttachmentKind::Video),
            "image" => Some(AttachmentKind::Image),
            _ => None,
        }
    }

    pub fn for_mime(value: &str) -> Self {
        let Ok(parsed) = value.parse::<mime::Mime>() else {
            return AttachmentKind::File;
        };
        if parsed.type_() == mime::IMAGE {
            AttachmentKind::Image
        } else if parsed.type_() == mime::VIDEO {
            AttachmentKind::Video
        } else if parsed.essence_str() == mime::APPLICATION_PDF.essence_str() {
            AttachmentKind::Pdf
        } else {
            AttachmentKind::File
        }
    }

    pub fn for_batch(attachments: &[Attachment]) -> Option<Self> {
        attachments.iter().map(|a| Self::for_mime(&a.mime)).max()
    }
}

/// A reply body split into prose and structured attachments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageEnvelope {
    pub text: String,
    pub kind: Option<AttachmentKind>,
    pub attachments: Vec<Attachment>,
}

impl MessageEnvelope {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: None,
            attachments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    pub fn to_wire(&self) -> EncodedBlock {
        let text = self.text.trim();
        if self.attachments.is_empty() {
            if exceeds_cap(text) {
                return oversized_block("");
            }
            return EncodedBlock {
                content: text.to_string(),
                kind: None,
                attachment_count: 0,
                oversized: false,
            };
        }

        let payload_len: usize = self.attachments.iter().map(|a| a.data_url.len()).sum();
        if payload_len > MAX_CONTENT_CHARS {
            return oversized_block(text);
        }
        let json = match serde_json::to_string(&self.attachments) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(%err, "attachment list could not be serialized");
                return oversized_block(text);
            }
        };
        let kind = self
            .kind
            .or_else(|| AttachmentKind::for_batch(&self.attachments))
            .unwrap_or(AttachmentKind::File);

        let mut content = String::with_capacity(text.len() + json.len() + 64);
        if !text.is_empty() {
            content.push_str(text);
            content.push_str("\n\n");
        }
        content.push_str(FILETYPE_OPEN);
        content.push_str(kind.as_str());
        content.push_str(MARKER_CLOSE);
        content.push_str(ATTACHMENTS_OPEN);
        content.push_str(&json);
        content.push_str(ATTACHMENTS_CLOSE);

        if exceeds_cap(&content) {
            return oversized_block(text);
        }
        EncodedBlock {
            content,
            kind: Some(kind),
            attachment_count: self.attachments.len(),
            oversized: false,
        }
    }
}

/// Outbound reply body ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    pub content: String,
    pub kind: Option<AttachmentKind>,
    pub attachment_count: usize,
    pub oversized: bool,
}

impl EncodedBlock {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Builds the wire body for `text` plus up to `MAX_ATTACHMENTS` files; extra files are dropped.
pub async fn encode(text: &str, files: Vec<FileInput>) -> EncodedBlock {
    let mut attachments = Vec::new();
    for file in files.into_iter().take(MAX_ATTACHMENTS) {
        if let Some(attachment) = transform::file_to_attachment(file).await {
            attachments.push(attachment);
        }
    }
    MessageEnvelope {
        text: text.to_string(),
        kind: None,
        attachments,
    }
    .to_wire()
}

/// Never fails: malformed blocks fall back to the raw content as text.
pub fn decode(content: &str) -> MessageEnvelope {
    match try_decode(content) {
        Ok(envelope) => envelope,
        Err(DecodeError::Oversized) => {
            tracing::warn!(len = content.len(), "stored content over size cap");
            MessageEnvelope::plain(OVERSIZED_PLACEHOLDER)
        }
        Err(err) => {
            tracing::warn!(%err, "attachment block decode failed");
            MessageEnvelope::plain(content)
        }
    }
}

pub fn try_decode(content: &str) -> Result<MessageEnvelope, DecodeError> {
    if exceeds_cap(content) {
        return Err(DecodeError::Oversized);
    }
    let Some(open) = content.find(ATTACHMENTS_OPEN) else {
        return Ok(MessageEnvelope::plain(content));
    };
    let body_start = open + ATTACHMENTS_OPEN.len();
    let body_len = content[body_start..]
        .find(ATTACHMENTS_CLOSE)
        .ok_or(DecodeError::Unterminated)?;
    let body_end = body_start + body_len;
    let attachments: Vec<Attachment> = serde_json::from_str(&content[body_start..body_end])?;

    let mut prose = String::with_capacity(open + content.len() - body_end);
    prose.push_str(&content[..open]);
    prose.push_str(&content[body_end + ATTACHMENTS_CLOSE.len()..]);
    let (prose, marked_kind) = strip_filetype_marker(&prose);

    Ok(MessageEnvelope {
        text: prose.trim().to_string(),
        kind: marked_kind.or_else(|| AttachmentKind::for_batch(&attachments)),
        attachments,
    })
}

/// One-line summary for conversation lists, truncated like the server preview.
pub fn preview_text(content: &str, max_chars: usize) -> String {
    let envelope = decode(content);
    let text = envelope.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return match envelope.kind {
            Some(kind) => format!("📎 {}", kind.as_str()),
            None => String::new(),
        };
    }
    if text.chars().count() > max_chars {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

pub fn attachment_bytes(attachment: &Attachment) -> Result<Vec<u8>, DecodeError> {
    let rest = attachment
        .data_url
        .strip_prefix("data:")
        .ok_or(DecodeError::DataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DecodeError::DataUrl)?;
    if !header.ends_with(";base64") {
        return Err(DecodeError::DataUrl);
    }
    Ok(BASE64_STD.decode(payload)?)
}

fn strip_filetype_marker(text: &str) -> (String, Option<AttachmentKind>) {
    let Some(start) = text.find(FILETYPE_OPEN) else {
        return (text.to_string(), None);
    };
    let kind_start = start + FILETYPE_OPEN.len();
    let Some(kind_len) = text[kind_start..].find(MARKER_CLOSE) else {
        return (text.to_string(), None);
    };
    let kind = AttachmentKind::parse(&text[kind_start..kind_start + kind_len]);
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(&text[kind_start + kind_len + MARKER_CLOSE.len()..]);
    (out, kind)
}

fn exceeds_cap(content: &str) -> bool {
    content.len() > MAX_CONTENT_CHARS && content.chars().count() > MAX_CONTENT_CHARS
}

fn oversized_block(text: &str) -> EncodedBlock {
    let content = if text.is_empty() {
        OVERSIZED_PLACEHOLDER.to_string()
    } else {
        format!("{}\n\n{}", text, OVERSIZED_PLACEHOLDER)
    };
    EncodedBlock {
        content,
        kind: None,
        attachment_count: 0,
        oversized: true,
    }
}
