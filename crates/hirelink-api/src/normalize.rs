use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use hirelink_core::{Conversation, ConversationRef, Reply};

pub const PREVIEW_CHARS: usize = 50;

/// Accepts every list envelope the backends have produced; anything else is empty.
pub fn conversations_from_value(value: &Value) -> Vec<Conversation> {
    let Some(items) = conversation_list(value) else {
        tracing::debug!("conversation payload has no recognizable list");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let parsed = conversation_from_value(item);
            if parsed.is_none() {
                tracing::debug!("skipping conversation entry without id");
            }
            parsed
        })
        .collect()
}

fn conversation_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => {
            // tRPC batch responses wrap each call in its own envelope.
            match items.first() {
                Some(first) if first.get("result").is_some() => conversation_list(first),
                _ => Some(items),
            }
        }
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                let data = result.get("data")?;
                return match data.get("json") {
                    Some(json) => json.as_array(),
                    None => data.as_array(),
                };
            }
            if let Some(list) = map.get("conversations") {
                return list.as_array();
            }
            map.get("json").and_then(Value::as_array)
        }
        _ => None,
    }
}

pub fn conversation_from_value(value: &Value) -> Option<Conversation> {
    let id = id_field(value, &["id", "conversationId", "conversation_id"])?;
    let participant_name = str_field(
        value,
        &[
            "participantName",
            "participant_name",
            "displayName",
            "display_name",
            "name",
        ],
    )
    .unwrap_or_default();

    let replies: Vec<Reply> = array_field(value, &["replies", "messages"])
        .map(|items| items.iter().filter_map(reply_from_value).collect())
        .unwrap_or_default();

    let is_read = match bool_field(value, &["isRead", "is_read"]) {
        Some(flag) => flag,
        None => match int_field(value, &["unreadCount", "unread_count"]) {
            Some(count) => count == 0,
            None => true,
        },
    };

    let last_message = str_field(value, &["lastMessage", "last_message"])
        .or_else(|| {
            replies
                .last()
                .map(|r| hirelink_content::preview_text(&r.content, PREVIEW_CHARS))
        })
        .unwrap_or_default();
    let last_message_at = time_field(
        value,
        &[
            "lastMessageAt",
            "lastMessageTime",
            "last_message_time",
            "updatedAt",
            "updated_at",
        ],
    )
    .or_else(|| replies.last().and_then(|r| r.created_at));

    Some(Conversation {
        id,
        participant_name,
        reference: reference_from_value(value),
        replies,
        is_read,
        last_message,
        last_message_at,
    })
}

fn reference_from_value(value: &Value) -> ConversationRef {
    let nested = value
        .get("reference")
        .or_else(|| value.get("metadata"))
        .filter(|v| v.is_object());
    let pick_id = |keys: &[&str]| {
        nested
            .and_then(|n| id_field(n, keys))
            .or_else(|| id_field(value, keys))
    };
    let pick_str = |keys: &[&str]| {
        nested
            .and_then(|n| str_field(n, keys))
            .or_else(|| str_field(value, keys))
    };
    ConversationRef {
        company_id: pick_id(&["companyId", "company_id"]),
        company_name: pick_str(&["companyName", "company_name"]),
        job_id: pick_id(&["jobId", "job_id"]),
        job_title: pick_str(&["jobTitle", "job_title"]),
        application_id: pick_id(&["applicationId", "application_id"]),
    }
}

pub fn reply_from_value(value: &Value) -> Option<Reply> {
    let id = id_field(value, &["id", "replyId", "reply_id"])?;
    let created_at = time_field(value, &["createdAt", "created_at", "timestamp"]);
    let mut read_at = time_field(value, &["readAt", "read_at"]);
    if read_at.is_none() && bool_field(value, &["isRead", "is_read"]) == Some(true) {
        read_at = created_at;
    }
    let mut reply = Reply {
        id,
        sender_id: id_field(value, &["senderId", "sender_id", "sender"]).unwrap_or_default(),
        content: str_field(value, &["content", "text", "body"]).unwrap_or_default(),
        created_at,
        delivered_at: time_field(value, &["deliveredAt", "delivered_at"]),
        read_at,
    };
    reply.normalize_receipts();
    Some(reply)
}

fn first<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null())
}

fn id_field(value: &Value, keys: &[&str]) -> Option<String> {
    match first(value, keys)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    first(value, keys)?.as_str().map(str::to_string)
}

fn bool_field(value: &Value, keys: &[&str]) -> Option<bool> {
    match first(value, keys)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn int_field(value: &Value, keys: &[&str]) -> Option<i64> {
    match first(value, keys)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn array_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    first(value, keys)?.as_array()
}

fn time_field(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    match first(value, keys)? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{conversations_from_value, parse_timestamp};

    fn sample() -> serde_json::Value {
        json!([{
            "id": 12,
            "participantName": "Ada Lovelace",
            "companyId": 3,
            "jobId": "job-9",
            "isRead": false,
            "replies": [
                {"id": 1, "senderId": 7, "content": "Hello", "createdAt": "2024-05-01T09:00:00Z"},
                {"id": 2, "senderId": 8, "content": "Hi back", "createdAt": "2024-05-01T09:05:00Z",
                 "readAt": "2024-05-01T09:06:00Z"}
            ]
        }])
    }

    #[test]
    fn all_envelope_shapes_yield_the_same_list() {
        let shapes = vec![
            json!({"result": {"data": {"json": sample()}}}),
            json!({"result": {"data": sample()}}),
            sample(),
            json!([{"result": {"data": {"json": sample()}}}]),
        ];
        for shape in shapes {
            let list = conversations_from_value(&shape);
            assert_eq!(list.len(), 1, "shape {}", shape);
            assert_eq!(list[0].id, "12");
            assert_eq!(list[0].reply_count(), 2);
        }
    }

    #[test]
    fn unknown_shapes_are_empty() {
        assert!(conversations_from_value(&json!({"error": "nope"})).is_empty());
        assert!(conversations_from_value(&json!("text")).is_empty());
        assert!(conversations_from_value(&json!({"result": {"data": {"json": 5}}})).is_empty());
    }

    #[test]
    fn conversation_fields_are_mapped() {
        let list = conversations_from_value(&sample());
        let conv = &list[0];
        assert_eq!(conv.participant_name, "Ada Lovelace");
        assert_eq!(conv.reference.company_id.as_deref(), Some("3"));
        assert_eq!(conv.reference.job_id.as_deref(), Some("job-9"));
        assert!(!conv.is_read);
        assert_eq!(conv.last_message, "Hi back");
        assert_eq!(
            conv.last_message_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap())
        );
        let second = &conv.replies[1];
        assert_eq!(second.sender_id, "8");
        assert!(second.is_read());
        assert_eq!(second.delivered_at, second.read_at);
    }

    #[test]
    fn django_shape_uses_snake_case_and_unread_count() {
        let payload = json!({
            "success": true,
            "conversations": [{
                "id": "c-1",
                "display_name": "Grace Hopper",
                "last_message": "Looking forward to it...",
                "last_message_time": "2024-06-02 10:00:00",
                "unread_count": 2,
                "metadata": {"company_name": "Navy", "job_title": "Compiler Engineer"}
            }]
        });
        let list = conversations_from_value(&payload);
        let conv = &list[0];
        assert_eq!(conv.participant_name, "Grace Hopper");
        assert!(!conv.is_read);
        assert_eq!(conv.last_message, "Looking forward to it...");
        assert_eq!(conv.reference.company_name.as_deref(), Some("Navy"));
        assert_eq!(conv.reference.job_title.as_deref(), Some("Compiler Engineer"));
        assert!(conv.last_message_at.is_some());
        assert!(conv.replies.is_empty());
    }

    #[test]
    fn entries_without_id_are_skipped() {
        let list = conversations_from_value(&json!([{"name": "ghost"}, {"id": "x"}]));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "x");
        assert!(list[0].is_read);
    }

    #[test]
    fn attachment_only_reply_gets_label_preview() {
        let content = "__FILETYPE:pdf____ATTACHMENTS__[]__ATTACHMENTS_END__";
        let list = conversations_from_value(&json!([{
            "id": 1,
            "messages": [{"id": 4, "content": content}]
        }]));
        assert_eq!(list[0].last_message, "📎 pdf");
    }

    #[test]
    fn timestamps_accept_rfc3339_naive_and_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T09:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 09:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);

        let list = conversations_from_value(&json!([{
            "id": 1,
            "replies": [{"id": 1, "createdAt": expected.timestamp_millis()}]
        }]));
        assert_eq!(list[0].replies[0].created_at, Some(expected));
    }
}
