//! Transcript export.
//!
//! Serializes already-assembled store data; no conversation logic lives
//! here. JSON round-trips through the same serde types the store uses,
//! Markdown is a human-readable transcript, CSV is one row per message.

use crate::core::message::Role;
use crate::core::store::Conversation;

pub fn to_json(conversations: &[Conversation]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(conversations)
}

pub fn from_json(data: &str) -> Result<Vec<Conversation>, serde_json::Error> {
    serde_json::from_str(data)
}

pub fn to_markdown(conversations: &[Conversation]) -> String {
    let mut out = String::new();
    for conversation in conversations {
        out.push_str(&format!("# {}\n\n", conversation.title()));
        for message in conversation.messages() {
            let speaker = match message.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            out.push_str(&format!("**{}**: {}\n\n", speaker, message.content));
        }
        out.push_str("---\n\n");
    }
    out
}

pub fn to_csv(conversations: &[Conversation]) -> String {
    let mut out = String::from("Conversation,Timestamp,Role,Content\n");
    for conversation in conversations {
        for message in conversation.messages() {
            out.push_str(&format!(
                "{},{},{},{}\n",
                csv_field(conversation.title()),
                csv_field(&message.created_at.to_rfc3339()),
                message.role.as_str(),
                csv_field(&message.content),
            ));
        }
    }
    out
}

/// Minimal RFC 4180 quoting: wrap when the field contains a comma, quote,
/// or newline; double any embedded quotes.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::ConversationStore;

    fn sample_conversation() -> Conversation {
        let mut store = ConversationStore::new();
        let id = store.active_id().to_string();
        store
            .append_message(&id, Role::User, "What is Rust?")
            .unwrap();
        store
            .append_message(&id, Role::Assistant, "A systems language, with \"fearless\" concurrency.")
            .unwrap();
        store.get(&id).unwrap().clone()
    }

    #[test]
    fn json_round_trip_preserves_ordered_role_content_pairs() {
        let conversation = sample_conversation();
        let json = to_json(std::slice::from_ref(&conversation)).expect("serialize");
        let restored = from_json(&json).expect("deserialize");

        assert_eq!(restored.len(), 1);
        let original: Vec<(Role, &str)> = conversation
            .messages()
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        let round_tripped: Vec<(Role, &str)> = restored[0]
            .messages()
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(round_tripped, original);
        assert_eq!(restored[0].title(), conversation.title());
    }

    #[test]
    fn markdown_transcript_shape() {
        let conversation = sample_conversation();
        let markdown = to_markdown(std::slice::from_ref(&conversation));

        assert!(markdown.starts_with("# What is Rust?\n"));
        assert!(markdown.contains("**User**: What is Rust?"));
        assert!(markdown.contains("**Assistant**: A systems language"));
        assert!(markdown.ends_with("---\n\n"));
    }

    #[test]
    fn csv_quotes_embedded_commas_and_quotes() {
        let conversation = sample_conversation();
        let csv = to_csv(std::slice::from_ref(&conversation));

        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Conversation,Timestamp,Role,Content"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with(",user,What is Rust?"));
        // Comma and quotes force quoting with doubled inner quotes.
        assert!(rows[1]
            .ends_with(",assistant,\"A systems language, with \"\"fearless\"\" concurrency.\""));
    }

    #[test]
    fn csv_field_passthrough_when_no_special_chars() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }
}
