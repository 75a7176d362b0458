use anyhow::Result;
use serde_json::{Value as JsonValue, json};

use hirelink_content::MessageEnvelope;
use hirelink_core::{Conversation, Reply};

use super::CLI_SCHEMA_VERSION;

pub(crate) fn output_ok(value: JsonValue) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": true,
            "result": value
        }))?
    );
    Ok(())
}

pub(crate) fn output_error(message: &str) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": false,
            "error": message
        }))?
    );
    Ok(())
}

pub(crate) fn conversation_summary_to_json(conversation: &Conversation) -> JsonValue {
    json!({
        "id": conversation.id,
        "participant": conversation.participant_name,
        "unread": !conversation.is_read,
        "last_message": conversation.last_message,
        "last_message_at": conversation.last_message_at.map(|t| t.to_rfc3339()),
        "replies": conversation.reply_count(),
        "company": conversation.reference.company_name,
        "job": conversation.reference.job_title,
    })
}

pub(crate) fn envelope_to_json(envelope: &MessageEnvelope) -> JsonValue {
    let attachments: Vec<JsonValue> = envelope
        .attachments
        .iter()
        .enumerate()
        .map(|(index, a)| {
            json!({
                "index": index,
                "name": a.name,
                "type": a.mime,
                "size": a.size,
            })
        })
        .collect();
    json!({
        "text": envelope.text,
        "kind": envelope.kind.map(|k| k.as_str()),
        "attachments": attachments,
    })
}

fn reply_to_json(reply: &Reply) -> JsonValue {
    let envelope = hirelink_content::decode(&reply.content);
    let mut value = envelope_to_json(&envelope);
    if let JsonValue::Object(map) = &mut value {
        map.insert("id".to_string(), json!(reply.id));
        map.insert("sender_id".to_string(), json!(reply.sender_id));
        map.insert(
            "created_at".to_string(),
            json!(reply.created_at.map(|t| t.to_rfc3339())),
        );
        map.insert(
            "delivered_at".to_string(),
            json!(reply.delivered_at.map(|t| t.to_rfc3339())),
        );
        map.insert(
            "read_at".to_string(),
            json!(reply.read_at.map(|t| t.to_rfc3339())),
        );
    }
    value
}

pub(crate) fn conversation_detail_to_json(conversation: &Conversation) -> JsonValue {
    let mut value = conversation_summary_to_json(conversation);
    if let JsonValue::Object(map) = &mut value {
        map.insert(
            "reference".to_string(),
            json!({
                "company_id": conversation.reference.company_id,
                "job_id": conversation.reference.job_id,
                "application_id": conversation.reference.application_id,
            }),
        );
        map.insert(
            "messages".to_string(),
            JsonValue::Array(conversation.replies.iter().map(reply_to_json).collect()),
        );
    }
    value
}
