//! In-memory conversation store.
//!
//! The store owns every conversation for the lifetime of the process and a
//! pointer to the active one. Two invariants hold at all times: the store is
//! never empty, and the active pointer names an existing conversation.
//! Message logs are append-only apart from edit-in-place and
//! truncate-on-regenerate.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::message::{generate_id, Message, Role};

const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 50;

/// Handle for sharing one store across tasks. The mutex serializes mutations
/// and gives readers a consistent snapshot.
pub type SharedStore = Arc<Mutex<ConversationStore>>;

pub fn shared(store: ConversationStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

#[derive(Debug)]
pub enum StoreError {
    ConversationNotFound(String),
    MessageNotFound(String),
    /// Deleting the last remaining conversation would empty the store.
    LastConversation,
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConversationNotFound(id) => write!(f, "no conversation with id '{id}'"),
            StoreError::MessageNotFound(id) => write!(f, "no message with id '{id}'"),
            StoreError::LastConversation => {
                write!(f, "cannot delete the only remaining conversation")
            }
            StoreError::IndexOutOfRange { index, len } => {
                write!(f, "message index {index} out of range for {len} messages")
            }
        }
    }
}

impl StdError for StoreError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    title: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl Conversation {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_modified: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub conversation_id: String,
    pub conversation_title: String,
    pub message: Message,
}

pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
    active_id: String,
}

impl ConversationStore {
    /// A store is born with one empty conversation so the "never empty"
    /// invariant holds from the start.
    pub fn new() -> Self {
        let conversation = Conversation::new(new_conversation_id());
        let active_id = conversation.id.clone();
        let mut conversations = HashMap::new();
        conversations.insert(active_id.clone(), conversation);
        Self {
            conversations,
            active_id,
        }
    }

    pub fn create_conversation(&mut self) -> String {
        let conversation = Conversation::new(new_conversation_id());
        let id = conversation.id.clone();
        self.conversations.insert(id.clone(), conversation);
        self.active_id = id.clone();
        id
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active(&self) -> &Conversation {
        // Invariant: active_id always names an existing conversation.
        self.conversations
            .get(&self.active_id)
            .expect("active conversation exists")
    }

    pub fn get(&self, id: &str) -> Result<&Conversation, StoreError> {
        self.conversations
            .get(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    pub fn select(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.conversations.contains_key(id) {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        self.active_id = id.to_string();
        Ok(())
    }

    /// Delete a conversation. Rejects deleting the last remaining one; when
    /// the active conversation is deleted, the most recently modified
    /// survivor becomes active.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.conversations.contains_key(id) {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        if self.conversations.len() == 1 {
            return Err(StoreError::LastConversation);
        }
        self.conversations.remove(id);
        if self.active_id == id {
            self.active_id = self
                .conversations
                .values()
                .max_by_key(|conversation| conversation.last_modified)
                .map(|conversation| conversation.id.clone())
                .expect("store is never empty");
        }
        Ok(())
    }

    pub fn append_message(
        &mut self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let conversation = self.get_mut(conversation_id)?;
        let message = Message::new(role, content);
        conversation.messages.push(message.clone());
        conversation.last_modified = Utc::now();
        if conversation.messages.len() == 1 {
            conversation.title = derive_title(content);
        }
        Ok(message)
    }

    /// Replace a message's content in place. Id, timestamp, and position are
    /// untouched; later messages are unaffected.
    pub fn edit_message(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        new_content: &str,
    ) -> Result<(), StoreError> {
        let conversation = self.get_mut(conversation_id)?;
        let message = conversation
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
        message.content = new_content.to_string();
        Ok(())
    }

    /// Drop every message at and after `index`, leaving exactly `index`
    /// messages. `index == len` is a no-op.
    pub fn truncate_after(
        &mut self,
        conversation_id: &str,
        index: usize,
    ) -> Result<(), StoreError> {
        let conversation = self.get_mut(conversation_id)?;
        let len = conversation.messages.len();
        if index > len {
            return Err(StoreError::IndexOutOfRange { index, len });
        }
        conversation.messages.truncate(index);
        conversation.last_modified = Utc::now();
        Ok(())
    }

    /// Case-insensitive substring search over every conversation's messages,
    /// in conversation-then-message order (most recently modified
    /// conversation first).
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for summary in self.list() {
            let conversation = &self.conversations[&summary.id];
            for message in &conversation.messages {
                if message.content.to_lowercase().contains(&needle) {
                    hits.push(SearchHit {
                        conversation_id: conversation.id.clone(),
                        conversation_title: conversation.title.clone(),
                        message: message.clone(),
                    });
                }
            }
        }
        hits
    }

    /// Conversation summaries, most recently modified first.
    pub fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .values()
            .map(|conversation| ConversationSummary {
                id: conversation.id.clone(),
                title: conversation.title.clone(),
                message_count: conversation.messages.len(),
                created_at: conversation.created_at,
                last_modified: conversation.last_modified,
            })
            .collect();
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified).then(a.id.cmp(&b.id)));
        summaries
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_conversation_id() -> String {
    format!("chat_{}", generate_id())
}

/// First user message becomes the title: up to 50 characters, with an
/// ellipsis when truncated. Char-based so multibyte text never splits.
fn derive_title(content: &str) -> String {
    let char_count = content.chars().count();
    if char_count > TITLE_MAX_CHARS {
        let truncated: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_messages(contents: &[(&str, Role)]) -> (ConversationStore, String) {
        let mut store = ConversationStore::new();
        let id = store.active_id().to_string();
        for (content, role) in contents {
            store.append_message(&id, *role, content).expect("append");
        }
        (store, id)
    }

    #[test]
    fn new_store_is_never_empty_and_active_points_at_entry() {
        let store = ConversationStore::new();
        assert_eq!(store.len(), 1);
        assert_eq!(store.active().id(), store.active_id());
        assert_eq!(store.active().title(), "New Chat");
    }

    #[test]
    fn append_order_equals_call_order() {
        let (store, id) = store_with_messages(&[
            ("first", Role::User),
            ("second", Role::Assistant),
            ("third", Role::User),
            ("fourth", Role::Assistant),
        ]);

        let contents: Vec<&str> = store
            .get(&id)
            .unwrap()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["first", "second", "third", "fourth"]);
    }

    #[test]
    fn title_derived_from_first_message_with_ellipsis() {
        let long = "x".repeat(80);
        let (store, id) = store_with_messages(&[(long.as_str(), Role::User)]);
        let title = store.get(&id).unwrap().title().to_string();
        assert_eq!(title.len(), 53);
        assert!(title.ends_with("..."));
        assert!(title.starts_with(&"x".repeat(50)));
    }

    #[test]
    fn short_first_message_is_title_unchanged() {
        let (store, id) = store_with_messages(&[("What is the capital of France?", Role::User)]);
        assert_eq!(
            store.get(&id).unwrap().title(),
            "What is the capital of France?"
        );
    }

    #[test]
    fn multibyte_title_truncates_on_char_boundary() {
        let long = "é".repeat(60);
        let (store, id) = store_with_messages(&[(long.as_str(), Role::User)]);
        let title = store.get(&id).unwrap().title().to_string();
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn second_message_does_not_retitle() {
        let (store, id) =
            store_with_messages(&[("original", Role::User), ("a reply", Role::Assistant)]);
        assert_eq!(store.get(&id).unwrap().title(), "original");
    }

    #[test]
    fn select_missing_conversation_fails() {
        let mut store = ConversationStore::new();
        assert!(matches!(
            store.select("nope"),
            Err(StoreError::ConversationNotFound(_))
        ));
    }

    #[test]
    fn deleting_sole_conversation_is_rejected() {
        let mut store = ConversationStore::new();
        let id = store.active_id().to_string();
        assert!(matches!(
            store.delete(&id),
            Err(StoreError::LastConversation)
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deleting_active_reassigns_to_most_recently_modified() {
        let mut store = ConversationStore::new();
        let first = store.active_id().to_string();
        store.append_message(&first, Role::User, "old").unwrap();

        let second = store.create_conversation();
        store.append_message(&second, Role::User, "newer").unwrap();

        let third = store.create_conversation();
        assert_eq!(store.active_id(), third);

        store.delete(&third).expect("delete active");
        assert_eq!(store.active_id(), second);
        assert!(store.get(&third).is_err());
    }

    #[test]
    fn deleting_inactive_conversation_keeps_active_pointer() {
        let mut store = ConversationStore::new();
        let first = store.active_id().to_string();
        let second = store.create_conversation();
        store.delete(&first).expect("delete inactive");
        assert_eq!(store.active_id(), second);
    }

    #[test]
    fn edit_changes_content_only() {
        let (mut store, id) = store_with_messages(&[
            ("hello", Role::User),
            ("hi there", Role::Assistant),
            ("bye", Role::User),
        ]);
        let target = store.get(&id).unwrap().messages()[1].clone();

        store
            .edit_message(&id, &target.id, "edited reply")
            .expect("edit");

        let messages = store.get(&id).unwrap().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].id, target.id);
        assert_eq!(messages[1].content, "edited reply");
        assert_eq!(messages[1].created_at, target.created_at);
        assert_eq!(messages[2].content, "bye");
    }

    #[test]
    fn edit_missing_message_fails() {
        let (mut store, id) = store_with_messages(&[("hello", Role::User)]);
        assert!(matches!(
            store.edit_message(&id, "deadbeef", "x"),
            Err(StoreError::MessageNotFound(_))
        ));
    }

    #[test]
    fn truncate_leaves_exactly_k_messages() {
        let (mut store, id) = store_with_messages(&[
            ("one", Role::User),
            ("two", Role::Assistant),
            ("three", Role::User),
            ("four", Role::Assistant),
        ]);

        store.truncate_after(&id, 2).expect("truncate");
        let messages = store.get(&id).unwrap().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "two");
    }

    #[test]
    fn truncate_past_len_fails() {
        let (mut store, id) = store_with_messages(&[("one", Role::User)]);
        assert!(matches!(
            store.truncate_after(&id, 2),
            Err(StoreError::IndexOutOfRange { index: 2, len: 1 })
        ));
        // index == len is a permitted no-op
        store.truncate_after(&id, 1).expect("no-op truncate");
        assert_eq!(store.get(&id).unwrap().messages().len(), 1);
    }

    #[test]
    fn regenerate_tail_is_fully_discarded() {
        let (mut store, id) = store_with_messages(&[
            ("question", Role::User),
            ("first answer", Role::Assistant),
        ]);

        store.truncate_after(&id, 1).expect("truncate");
        store
            .append_message(&id, Role::Assistant, "second answer")
            .expect("append");

        let messages = store.get(&id).unwrap().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "second answer");
    }

    #[test]
    fn search_is_case_insensitive_substring_match() {
        let mut store = ConversationStore::new();
        let first = store.active_id().to_string();
        store
            .append_message(&first, Role::User, "Tell me about Rust")
            .unwrap();
        let second = store.create_conversation();
        store
            .append_message(&second, Role::Assistant, "rust prevents data races")
            .unwrap();
        store
            .append_message(&second, Role::User, "unrelated")
            .unwrap();

        let hits = store.search("RUST");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|hit| hit.conversation_id == first));
        assert!(hits.iter().any(|hit| hit.conversation_id == second));

        assert!(store.search("zebra").is_empty());
    }

    #[test]
    fn list_sorts_most_recently_modified_first() {
        let mut store = ConversationStore::new();
        let first = store.active_id().to_string();
        let second = store.create_conversation();
        store.append_message(&second, Role::User, "hello").unwrap();
        store.append_message(&first, Role::User, "latest").unwrap();

        let summaries = store.list();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, first);
        assert_eq!(summaries[0].message_count, 1);
    }
}
