//! Chat and message collections
//!
//! The process-wide conversation state: every chat, every message, the
//! active-chat pointer, and the single generation flag. All mutations are
//! synchronous and persist a fresh snapshot before returning.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::message::{now_millis, Message, MessageDraft};
use crate::storage::{Storage, CHATS_NAMESPACE};

/// How much of a message's content is kept as the chat-list preview.
pub const LAST_MESSAGE_PREVIEW_CHARS: usize = 100;

/// A conversation thread. `last_message` is a write-through cache of the
/// most recent *append*: editing or deleting messages later leaves it
/// stale, which list display accepts in exchange for an O(1) preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    /// Ordered; the engine currently drives exactly one character.
    pub character_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// Partial chat update; unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub name: Option<String>,
    pub character_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatStore {
    chats: Vec<Chat>,
    messages: Vec<Message>,
    active_chat_id: Option<String>,
    #[serde(skip)]
    is_generating: bool,
    #[serde(skip)]
    storage: Option<Storage>,
}

impl ChatStore {
    pub fn load(storage: Storage) -> Self {
        let mut store: Self = storage.load_or_default(CHATS_NAMESPACE);
        store.storage = Some(storage);
        store
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn get_chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn active_chat_id(&self) -> Option<&str> {
        self.active_chat_id.as_deref()
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat_id
            .as_deref()
            .and_then(|id| self.get_chat(id))
    }

    /// Create a chat and atomically make it the active one. The default
    /// name is positional: "Chat 1", "Chat 2", ...
    pub fn create_chat(&mut self, character_ids: Vec<String>, name: Option<String>) -> Chat {
        let now = now_millis();
        let chat = Chat {
            id: format!("chat-{}", Uuid::new_v4()),
            name: name.unwrap_or_else(|| format!("Chat {}", self.chats.len() + 1)),
            character_ids,
            created_at: now,
            updated_at: now,
            last_message: None,
        };
        self.chats.push(chat.clone());
        self.active_chat_id = Some(chat.id.clone());
        self.persist();
        chat
    }

    /// Remove a chat and every message that belonged to it. When the
    /// deleted chat was active the pointer is cleared; no other chat is
    /// auto-selected.
    pub fn delete_chat(&mut self, id: &str) {
        self.chats.retain(|c| c.id != id);
        self.messages.retain(|m| m.chat_id != id);
        if self.active_chat_id.as_deref() == Some(id) {
            self.active_chat_id = None;
        }
        self.persist();
    }

    /// Pure pointer swap; callers guarantee the id exists.
    pub fn set_active_chat(&mut self, id: Option<String>) {
        self.active_chat_id = id;
        self.persist();
    }

    /// Merge the patch into an existing chat and refresh `updated_at`.
    /// No-op when the id is unknown.
    pub fn update_chat(&mut self, id: &str, patch: ChatPatch) {
        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == id) {
            if let Some(name) = patch.name {
                chat.name = name;
            }
            if let Some(character_ids) = patch.character_ids {
                chat.character_ids = character_ids;
            }
            chat.updated_at = now_millis();
            self.persist();
        }
    }

    /// Append a message, stamping a fresh id and timestamp, and refresh the
    /// owning chat's preview and `updated_at`.
    pub fn add_message(&mut self, draft: MessageDraft) -> Message {
        let message = Message {
            id: format!("msg-{}", Uuid::new_v4()),
            chat_id: draft.chat_id,
            role: draft.role,
            content: draft.content,
            character_id: draft.character_id,
            timestamp: now_millis(),
            is_edited: false,
        };

        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == message.chat_id) {
            chat.last_message = Some(message.content.chars().take(LAST_MESSAGE_PREVIEW_CHARS).collect());
            chat.updated_at = now_millis();
        }

        self.messages.push(message.clone());
        self.persist();
        message
    }

    /// Replace a message's content in place. The edited flag latches true
    /// even when the new content equals the old.
    pub fn update_message(&mut self, id: &str, content: impl Into<String>) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.content = content.into();
            message.is_edited = true;
            self.persist();
        }
    }

    /// Remove a message. The owning chat's `last_message` is deliberately
    /// left as-is (see [`Chat::last_message`]).
    pub fn delete_message(&mut self, id: &str) {
        self.messages.retain(|m| m.id != id);
        self.persist();
    }

    pub fn get_message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Every message of a chat in append order, which is chronological
    /// order because ids and timestamps are stamped monotonically at append
    /// time.
    pub fn get_chat_messages(&self, chat_id: &str) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    /// Drop a chat's messages while keeping the chat itself.
    pub fn clear_chat_messages(&mut self, chat_id: &str) {
        self.messages.retain(|m| m.chat_id != chat_id);
        self.persist();
    }

    /// The process-wide busy flag: while set, the whole system refuses new
    /// generations, whichever chat the running one belongs to.
    pub fn set_generating(&mut self, is_generating: bool) {
        self.is_generating = is_generating;
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    fn persist(&self) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.save(CHATS_NAMESPACE, self) {
                tracing::warn!(error = %err, "failed to persist chat store");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use tempfile::TempDir;

    #[test]
    fn create_chat_activates_and_names_positionally() {
        let mut store = ChatStore::default();

        let first = store.create_chat(vec!["char-1".to_string()], None);
        assert_eq!(first.name, "Chat 1");
        assert_eq!(store.active_chat_id(), Some(first.id.as_str()));
        assert_eq!(first.created_at, first.updated_at);

        let second = store.create_chat(vec!["char-1".to_string()], Some("Chiều mưa".to_string()));
        assert_eq!(second.name, "Chiều mưa");
        assert_eq!(store.active_chat_id(), Some(second.id.as_str()));
    }

    #[test]
    fn delete_chat_cascades_to_messages_and_clears_active_pointer() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);
        let other = store.create_chat(vec!["char-1".to_string()], None);

        for i in 0..3 {
            store.add_message(MessageDraft::user(&chat.id, format!("tin nhắn {i}")));
        }
        store.add_message(MessageDraft::user(&other.id, "giữ lại"));

        store.set_active_chat(Some(chat.id.clone()));
        store.delete_chat(&chat.id);

        assert!(store.get_chat(&chat.id).is_none());
        assert!(store.get_chat_messages(&chat.id).is_empty());
        assert!(store.active_chat_id().is_none());
        // Unrelated chats and messages survive.
        assert_eq!(store.get_chat_messages(&other.id).len(), 1);
    }

    #[test]
    fn deleting_inactive_chat_keeps_the_pointer() {
        let mut store = ChatStore::default();
        let first = store.create_chat(vec!["char-1".to_string()], None);
        let second = store.create_chat(vec!["char-1".to_string()], None);

        store.delete_chat(&first.id);
        assert_eq!(store.active_chat_id(), Some(second.id.as_str()));
    }

    #[test]
    fn add_message_updates_owner_preview() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);

        let long = "x".repeat(250);
        store.add_message(MessageDraft::user(&chat.id, long));

        let preview = store.get_chat(&chat.id).unwrap().last_message.clone().unwrap();
        assert_eq!(preview.chars().count(), LAST_MESSAGE_PREVIEW_CHARS);
    }

    #[test]
    fn preview_goes_stale_after_edits_and_deletes() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);
        let message = store.add_message(MessageDraft::user(&chat.id, "bản gốc"));

        store.update_message(&message.id, "đã sửa");
        assert_eq!(
            store.get_chat(&chat.id).unwrap().last_message.as_deref(),
            Some("bản gốc")
        );

        store.delete_message(&message.id);
        assert_eq!(
            store.get_chat(&chat.id).unwrap().last_message.as_deref(),
            Some("bản gốc")
        );
    }

    #[test]
    fn update_message_always_latches_the_edit_flag() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);
        let message = store.add_message(MessageDraft::user(&chat.id, "nội dung"));
        assert!(!store.get_message(&message.id).unwrap().is_edited);

        // Same content still counts as an edit.
        store.update_message(&message.id, "nội dung");
        assert!(store.get_message(&message.id).unwrap().is_edited);
    }

    #[test]
    fn messages_come_back_in_append_order() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);

        store.add_message(MessageDraft::user(&chat.id, "một"));
        store.add_message(MessageDraft::assistant(&chat.id, "hai", None));
        store.add_message(MessageDraft::user(&chat.id, "ba"));

        let contents: Vec<&str> = store
            .get_chat_messages(&chat.id)
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["một", "hai", "ba"]);
        assert!(store.get_chat_messages(&chat.id)[1].role == Role::Assistant);
    }

    #[test]
    fn update_chat_merges_and_refreshes_timestamp() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);

        store.update_chat(
            &chat.id,
            ChatPatch {
                name: Some("Đổi tên".to_string()),
                ..Default::default()
            },
        );
        let updated = store.get_chat(&chat.id).unwrap();
        assert_eq!(updated.name, "Đổi tên");
        assert_eq!(updated.character_ids, vec!["char-1".to_string()]);

        // Unknown ids are ignored.
        store.update_chat("chat-missing", ChatPatch::default());
        assert_eq!(store.chats().len(), 1);
    }

    #[test]
    fn generating_flag_is_not_persisted() {
        let dir = TempDir::new().unwrap();

        let mut store = ChatStore::load(Storage::with_dir(dir.path()));
        store.create_chat(vec!["char-1".to_string()], None);
        store.set_generating(true);

        let reloaded = ChatStore::load(Storage::with_dir(dir.path()));
        assert!(!reloaded.is_generating());
        assert_eq!(reloaded.chats().len(), 1);
    }

    #[test]
    fn store_state_survives_a_reload() {
        let dir = TempDir::new().unwrap();

        let chat_id = {
            let mut store = ChatStore::load(Storage::with_dir(dir.path()));
            let chat = store.create_chat(vec!["char-1".to_string()], None);
            store.add_message(MessageDraft::user(&chat.id, "xin chào"));
            chat.id
        };

        let reloaded = ChatStore::load(Storage::with_dir(dir.path()));
        assert_eq!(reloaded.active_chat_id(), Some(chat_id.as_str()));
        let messages = reloaded.get_chat_messages(&chat_id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "xin chào");
    }

    #[test]
    fn clear_chat_messages_keeps_the_chat() {
        let mut store = ChatStore::default();
        let chat = store.create_chat(vec!["char-1".to_string()], None);
        store.add_message(MessageDraft::user(&chat.id, "một"));
        store.add_message(MessageDraft::user(&chat.id, "hai"));

        store.clear_chat_messages(&chat.id);
        assert!(store.get_chat_messages(&chat.id).is_empty());
        assert!(store.get_chat(&chat.id).is_some());
    }
}
