//! Generation orchestration
//!
//! [`ChatEngine`] ties the stores, the prompt builder, and the completion
//! backend together to drive one generation cycle at a time:
//! Idle → Sending → Streaming → Idle, guarded by the store's single
//! generating flag. Fragments are applied to the store strictly in arrival
//! order; every fragment produces a visible partial update.

use std::error::Error as StdError;
use std::fmt;

use crate::api::client::{ClientCache, CompletionBackend};
use crate::api::error::ChatError;
use crate::api::models::context_length_for;
use crate::api::ChatMessage;
use crate::core::character::{Character, CharacterStore};
use crate::core::conversation::{Chat, ChatStore};
use crate::core::message::{Message, MessageDraft};
use crate::core::prompt::{build_messages, truncate_to_fit};
use crate::core::settings::SettingsStore;
use crate::storage::Storage;

/// Why a send/regenerate was refused before any network traffic or state
/// change. The caller decides how to surface these; `MissingApiKey` should
/// route the user to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRefused {
    EmptyInput,
    NoActiveChat,
    NoCharacter,
    /// A generation is already in flight; the request is rejected, not
    /// queued.
    Busy,
    MissingApiKey,
    /// Regenerate needs at least one message in the chat.
    NoMessages,
}

impl fmt::Display for GenerationRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            GenerationRefused::EmptyInput => "message input is empty",
            GenerationRefused::NoActiveChat => "no chat is active",
            GenerationRefused::NoCharacter => "the chat's character could not be resolved",
            GenerationRefused::Busy => "a generation is already in progress",
            GenerationRefused::MissingApiKey => "no API key is configured",
            GenerationRefused::NoMessages => "the chat has no messages",
        };
        f.write_str(reason)
    }
}

impl StdError for GenerationRefused {}

/// The conversation engine: three stores plus a completion backend.
///
/// Display code reads through the public store fields and mutates through
/// the store methods; `send`, `regenerate`, and chat activation go through
/// the engine so prompts, streaming, and first-message seeding stay
/// coordinated.
pub struct ChatEngine {
    pub characters: CharacterStore,
    pub chats: ChatStore,
    pub settings: SettingsStore,
    backend: Box<dyn CompletionBackend>,
}

impl ChatEngine {
    pub fn new(storage: Storage) -> Self {
        Self::with_backend(storage, Box::new(ClientCache::new()))
    }

    pub fn with_backend(storage: Storage, backend: Box<dyn CompletionBackend>) -> Self {
        Self {
            characters: CharacterStore::load(storage.clone()),
            chats: ChatStore::load(storage.clone()),
            settings: SettingsStore::load(storage),
            backend,
        }
    }

    /// The character replies are attributed to: the active chat's first
    /// character, or the selection pointer when no chat is active. `None`
    /// when the reference dangles (deleted character).
    pub fn resolve_character(&self) -> Option<&Character> {
        if let Some(chat) = self.chats.active_chat() {
            chat.character_ids
                .first()
                .and_then(|id| self.characters.get_character(id))
        } else {
            self.characters
                .selected_character_id()
                .and_then(|id| self.characters.get_character(id))
        }
    }

    /// Create a chat, make it active, and seed the character's first
    /// message into it.
    pub fn create_chat(&mut self, character_ids: Vec<String>, name: Option<String>) -> Chat {
        let chat = self.chats.create_chat(character_ids, name);
        self.seed_first_message();
        self.chats.get_chat(&chat.id).cloned().unwrap_or(chat)
    }

    /// Switch the active chat and seed its first message when it is brand
    /// new.
    pub fn set_active_chat(&mut self, id: Option<String>) {
        self.chats.set_active_chat(id);
        self.seed_first_message();
    }

    /// Append the character's first message to the active chat, once.
    /// Gated on the chat having zero messages, so re-activation can never
    /// duplicate the greeting.
    pub fn seed_first_message(&mut self) {
        let Some(chat_id) = self.chats.active_chat_id().map(str::to_string) else {
            return;
        };
        if !self.chats.get_chat_messages(&chat_id).is_empty() {
            return;
        }
        let Some(character) = self.resolve_character().cloned() else {
            return;
        };
        if character.first_message.is_empty() {
            return;
        }

        self.chats.add_message(MessageDraft::assistant(
            chat_id,
            character.first_message.clone(),
            Some(character.id),
        ));
    }

    /// Send a user message and stream the character's reply into the
    /// transcript.
    ///
    /// The user message is appended first, then an empty placeholder
    /// assistant message that fills in fragment by fragment. A failure
    /// mid-stream leaves the placeholder with whatever partial content
    /// arrived and appends a separate assistant message carrying the cause;
    /// the generating flag is cleared on every path.
    pub async fn send(&mut self, input: &str) -> Result<(), GenerationRefused> {
        let content = input.trim().to_string();
        if content.is_empty() {
            return Err(GenerationRefused::EmptyInput);
        }
        let Some(chat_id) = self.chats.active_chat_id().map(str::to_string) else {
            return Err(GenerationRefused::NoActiveChat);
        };
        let Some(character) = self.resolve_character().cloned() else {
            return Err(GenerationRefused::NoCharacter);
        };
        if self.chats.is_generating() {
            return Err(GenerationRefused::Busy);
        }
        if self.settings.settings().api_key.is_empty() {
            return Err(GenerationRefused::MissingApiKey);
        }

        self.chats
            .add_message(MessageDraft::user(chat_id.as_str(), content));

        self.chats.set_generating(true);
        let outcome = self.stream_fresh_reply(&chat_id, &character).await;
        if let Err(err) = outcome {
            tracing::error!(error = %err, chat_id = %chat_id, "reply generation failed");
            self.chats.add_message(MessageDraft::assistant(
                chat_id.as_str(),
                format!("❌ Lỗi: {err}"),
                Some(character.id.clone()),
            ));
        }
        self.chats.set_generating(false);

        Ok(())
    }

    /// Re-stream the most recent assistant message in place.
    ///
    /// The prompt is rebuilt from the history strictly before that message;
    /// its content is overwritten fragment by fragment. When the stream
    /// never yields a fragment the residual content stays visible. Failures
    /// are reported to the diagnostic channel only — no error message is
    /// appended to the conversation.
    pub async fn regenerate(&mut self) -> Result<(), GenerationRefused> {
        let Some(chat_id) = self.chats.active_chat_id().map(str::to_string) else {
            return Err(GenerationRefused::NoActiveChat);
        };
        let Some(character) = self.resolve_character().cloned() else {
            return Err(GenerationRefused::NoCharacter);
        };
        if self.chats.is_generating() {
            return Err(GenerationRefused::Busy);
        }

        let target = {
            let history = self.chats.get_chat_messages(&chat_id);
            if history.is_empty() {
                return Err(GenerationRefused::NoMessages);
            }
            history
                .iter()
                .rposition(|m| m.role.is_assistant())
                .map(|index| (index, history[index].id.clone()))
        };
        // No assistant turn yet: nothing to regenerate.
        let Some((target_index, target_id)) = target else {
            return Ok(());
        };

        self.chats.set_generating(true);
        let api_messages = self.build_prompt(&chat_id, &character, Some(target_index));
        if let Err(err) = self.stream_into(&target_id, api_messages).await {
            tracing::error!(error = %err, chat_id = %chat_id, "regeneration failed");
        }
        self.chats.set_generating(false);

        Ok(())
    }

    /// Prompt for the chat's history, optionally cut off before
    /// `before_index`, truncated to the active model's context budget.
    fn build_prompt(
        &self,
        chat_id: &str,
        character: &Character,
        before_index: Option<usize>,
    ) -> Vec<ChatMessage> {
        let history: Vec<Message> = self
            .chats
            .get_chat_messages(chat_id)
            .into_iter()
            .cloned()
            .collect();
        let history = match before_index {
            Some(end) => &history[..end],
            None => &history[..],
        };

        let settings = self.settings.settings();
        let pronoun_pair = self.settings.pronoun_pair();
        let built = build_messages(history, character, &pronoun_pair, &settings.system_prompt);
        truncate_to_fit(&built, context_length_for(&settings.model))
    }

    async fn stream_fresh_reply(
        &mut self,
        chat_id: &str,
        character: &Character,
    ) -> Result<(), ChatError> {
        let api_messages = self.build_prompt(chat_id, character, None);
        let placeholder = self.chats.add_message(MessageDraft::assistant(
            chat_id,
            "",
            Some(character.id.clone()),
        ));
        self.stream_into(&placeholder.id, api_messages).await
    }

    /// Open a stream for the prompt and write the accumulated reply into
    /// the target message after every fragment.
    async fn stream_into(
        &mut self,
        message_id: &str,
        api_messages: Vec<ChatMessage>,
    ) -> Result<(), ChatError> {
        let api_key = self.settings.settings().api_key.clone();
        let model = self.settings.settings().model.clone();
        let params = self.settings.generation_params();

        let mut stream = self
            .backend
            .open_stream(&api_key, &model, api_messages, params)
            .await?;

        let mut accumulated = String::new();
        while let Some(fragment) = stream.next_fragment().await? {
            accumulated.push_str(&fragment);
            self.chats.update_message(message_id, accumulated.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ChatError;
    use crate::api::GenerationParams;
    use crate::core::character::CharacterDraft;
    use crate::core::chat_stream::CompletionStream;
    use crate::core::message::Role;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct RecordedCall {
        api_key: String,
        model: String,
        messages: Vec<ChatMessage>,
    }

    type ScriptedResponse = Result<Vec<Result<Vec<u8>, ChatError>>, ChatError>;

    /// Backend that replays scripted response bodies and records every
    /// request it sees.
    struct ScriptedBackend {
        responses: VecDeque<ScriptedResponse>,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<ScriptedResponse>) -> (Self, Arc<Mutex<Vec<RecordedCall>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    responses: responses.into(),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn open_stream(
            &mut self,
            api_key: &str,
            model: &str,
            messages: Vec<ChatMessage>,
            _params: GenerationParams,
        ) -> Result<CompletionStream, ChatError> {
            self.calls.lock().unwrap().push(RecordedCall {
                api_key: api_key.to_string(),
                model: model.to_string(),
                messages,
            });
            match self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new())) {
                Ok(chunks) => Ok(CompletionStream::new(stream::iter(chunks))),
                Err(err) => Err(err),
            }
        }
    }

    /// A well-formed streaming body delivering the given fragments.
    fn reply_body(fragments: &[&str]) -> ScriptedResponse {
        let mut body = String::new();
        for fragment in fragments {
            body.push_str(&format!(
                "data: {}\n",
                serde_json::json!({"choices":[{"delta":{"content": fragment}}]})
            ));
        }
        body.push_str("data: [DONE]\n");
        Ok(vec![Ok(body.into_bytes())])
    }

    /// A body that yields one fragment and then dies mid-stream.
    fn broken_body(fragment: &str) -> ScriptedResponse {
        let line = format!(
            "data: {}\n",
            serde_json::json!({"choices":[{"delta":{"content": fragment}}]})
        );
        Ok(vec![
            Ok(line.into_bytes()),
            Err(ChatError::Transport("connection reset".to_string())),
        ])
    }

    struct TestSetup {
        engine: ChatEngine,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
        chat_id: String,
        character_id: String,
        _dir: TempDir,
    }

    fn setup(first_message: &str, responses: Vec<ScriptedResponse>) -> TestSetup {
        let dir = TempDir::new().unwrap();
        let (backend, calls) = ScriptedBackend::new(responses);
        let mut engine = ChatEngine::with_backend(Storage::with_dir(dir.path()), Box::new(backend));

        engine.settings.set_api_key("sk-or-test");
        let character = engine.characters.import_character(CharacterDraft {
            name: Some("Sakura".to_string()),
            persona: Some("Sinh viên ngành Văn học".to_string()),
            scenario: Some("Quán cà phê chiều mưa".to_string()),
            first_message: Some(first_message.to_string()),
            ..Default::default()
        });
        let chat = engine.create_chat(vec![character.id.clone()], None);

        TestSetup {
            engine,
            calls,
            chat_id: chat.id,
            character_id: character.id,
            _dir: dir,
        }
    }

    fn transcript(engine: &ChatEngine, chat_id: &str) -> Vec<(Role, String)> {
        engine
            .chats
            .get_chat_messages(chat_id)
            .into_iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn send_streams_the_reply_into_a_placeholder() {
        let mut t = setup("", vec![reply_body(&["Xin ", "chào ", "bạn!"])]);

        t.engine.send("  Chào Sakura  ").await.unwrap();

        let messages = transcript(&t.engine, &t.chat_id);
        assert_eq!(
            messages,
            vec![
                (Role::User, "Chào Sakura".to_string()),
                (Role::Assistant, "Xin chào bạn!".to_string()),
            ]
        );
        assert!(!t.engine.chats.is_generating());

        // The reply is attributed to the character.
        let reply = &t.engine.chats.get_chat_messages(&t.chat_id)[1];
        assert_eq!(reply.character_id.as_deref(), Some(t.character_id.as_str()));
    }

    #[tokio::test]
    async fn send_prompt_carries_system_entry_and_updated_history() {
        let mut t = setup("", vec![reply_body(&["ừ"])]);

        t.engine.send("Chào Sakura").await.unwrap();

        let calls = t.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].api_key, "sk-or-test");
        assert_eq!(calls[0].model, "anthropic/claude-3.5-sonnet");

        let prompt = &calls[0].messages;
        assert_eq!(prompt[0].role, "system");
        assert!(prompt[0].content.contains("Tên: Sakura"));
        // The just-sent user message is already part of the prompt.
        assert_eq!(prompt.last().unwrap().role, "user");
        assert_eq!(prompt.last().unwrap().content, "Chào Sakura");
    }

    #[tokio::test]
    async fn send_refusals_leave_the_store_untouched() {
        let mut t = setup("", Vec::new());

        assert_eq!(
            t.engine.send("   ").await.unwrap_err(),
            GenerationRefused::EmptyInput
        );

        t.engine.settings.set_api_key("");
        assert_eq!(
            t.engine.send("chào").await.unwrap_err(),
            GenerationRefused::MissingApiKey
        );
        t.engine.settings.set_api_key("sk-or-test");

        t.engine.chats.set_generating(true);
        assert_eq!(
            t.engine.send("chào").await.unwrap_err(),
            GenerationRefused::Busy
        );
        t.engine.chats.set_generating(false);

        t.engine.set_active_chat(None);
        assert_eq!(
            t.engine.send("chào").await.unwrap_err(),
            GenerationRefused::NoActiveChat
        );

        assert!(transcript(&t.engine, &t.chat_id).is_empty());
        assert!(t.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_with_dangling_character_is_refused() {
        let mut t = setup("", Vec::new());

        t.engine.characters.delete_character(&t.character_id);
        assert_eq!(
            t.engine.send("chào").await.unwrap_err(),
            GenerationRefused::NoCharacter
        );
    }

    #[tokio::test]
    async fn send_failure_appends_error_message_and_keeps_partial_content() {
        let mut t = setup("", vec![broken_body("Xin ")]);

        t.engine.send("Chào").await.unwrap();

        let messages = transcript(&t.engine, &t.chat_id);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], (Role::Assistant, "Xin ".to_string()));
        assert_eq!(messages[2].0, Role::Assistant);
        assert!(messages[2].1.starts_with("❌ Lỗi: "));
        assert!(messages[2].1.contains("connection reset"));
        assert!(!t.engine.chats.is_generating());
    }

    #[tokio::test]
    async fn send_failure_before_any_fragment_reports_the_cause() {
        let mut t = setup(
            "",
            vec![Err(ChatError::Auth("invalid api key".to_string()))],
        );

        t.engine.send("Chào").await.unwrap();

        let messages = transcript(&t.engine, &t.chat_id);
        // User message, empty placeholder, then the error message.
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], (Role::Assistant, String::new()));
        assert!(messages[2].1.contains("invalid api key"));
    }

    #[tokio::test]
    async fn regenerate_overwrites_the_last_assistant_message_in_place() {
        let mut t = setup(
            "",
            vec![reply_body(&["bản một"]), reply_body(&["bản ", "hai"])],
        );

        t.engine.send("Chào").await.unwrap();
        let before = t.engine.chats.get_chat_messages(&t.chat_id)[1].id.clone();

        t.engine.regenerate().await.unwrap();

        let messages = t.engine.chats.get_chat_messages(&t.chat_id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, before);
        assert_eq!(messages[1].content, "bản hai");
    }

    #[tokio::test]
    async fn regenerate_prompt_excludes_the_target_and_everything_after() {
        let mut t = setup("", vec![reply_body(&["đáp"]), reply_body(&["lại"])]);

        t.engine.send("Câu hỏi").await.unwrap();
        t.engine.regenerate().await.unwrap();

        let calls = t.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        // Send saw system + user; regenerate rebuilds the same prefix, not
        // the assistant turn being replaced.
        let regen_prompt = &calls[1].messages;
        assert_eq!(regen_prompt.len(), 2);
        assert_eq!(regen_prompt[0].role, "system");
        assert_eq!(regen_prompt[1].role, "user");
        assert_eq!(regen_prompt[1].content, "Câu hỏi");
    }

    #[tokio::test]
    async fn regenerate_without_fragments_leaves_residual_content() {
        let mut t = setup("", vec![reply_body(&["giữ nguyên"]), reply_body(&[])]);

        t.engine.send("Chào").await.unwrap();
        t.engine.regenerate().await.unwrap();

        let messages = transcript(&t.engine, &t.chat_id);
        assert_eq!(messages[1].1, "giữ nguyên");
        assert!(!t.engine.chats.is_generating());
    }

    #[tokio::test]
    async fn regenerate_failure_is_silent_in_the_transcript() {
        let mut t = setup(
            "",
            vec![
                reply_body(&["một"]),
                Err(ChatError::Api("model overloaded".to_string())),
            ],
        );

        t.engine.send("Chào").await.unwrap();
        let before = transcript(&t.engine, &t.chat_id);

        t.engine.regenerate().await.unwrap();

        assert_eq!(transcript(&t.engine, &t.chat_id), before);
        assert!(!t.engine.chats.is_generating());
    }

    #[tokio::test]
    async fn regenerate_with_no_assistant_turn_is_a_no_op() {
        let mut t = setup("", Vec::new());

        t.engine
            .chats
            .add_message(MessageDraft::user(t.chat_id.as_str(), "chỉ có user"));
        t.engine.regenerate().await.unwrap();

        assert_eq!(transcript(&t.engine, &t.chat_id).len(), 1);
        assert!(t.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn regenerate_on_empty_chat_is_refused() {
        let mut t = setup("", Vec::new());
        assert_eq!(
            t.engine.regenerate().await.unwrap_err(),
            GenerationRefused::NoMessages
        );
    }

    #[tokio::test]
    async fn first_message_is_seeded_exactly_once() {
        let t = setup("Xin chào, trời mưa quá nhỉ?", Vec::new());

        let messages = transcript(&t.engine, &t.chat_id);
        assert_eq!(
            messages,
            vec![(Role::Assistant, "Xin chào, trời mưa quá nhỉ?".to_string())]
        );

        // Re-activating the same, now non-empty, chat must not re-seed.
        let mut t = t;
        t.engine.set_active_chat(None);
        t.engine.set_active_chat(Some(t.chat_id.clone()));
        assert_eq!(transcript(&t.engine, &t.chat_id).len(), 1);
    }

    #[tokio::test]
    async fn seeded_greeting_feeds_the_next_prompt_as_history() {
        let mut t = setup("Xin chào!", vec![reply_body(&["ừ"])]);

        t.engine.send("Chào Sakura").await.unwrap();

        let calls = t.calls.lock().unwrap();
        let prompt = &calls[0].messages;
        // system + seeded greeting + user message.
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt[1].role, "assistant");
        assert_eq!(prompt[1].content, "Xin chào!");
    }

    #[tokio::test]
    async fn generation_state_survives_reload_through_storage() {
        let dir = TempDir::new().unwrap();
        let (backend, _calls) = ScriptedBackend::new(vec![reply_body(&["chào lại"])]);
        let chat_id = {
            let mut engine =
                ChatEngine::with_backend(Storage::with_dir(dir.path()), Box::new(backend));
            engine.settings.set_api_key("sk-or-test");
            let character = engine.characters.import_character(CharacterDraft {
                name: Some("Sakura".to_string()),
                ..Default::default()
            });
            let chat = engine.create_chat(vec![character.id], None);
            engine.send("Chào").await.unwrap();
            chat.id
        };

        let reloaded = ChatStore::load(Storage::with_dir(dir.path()));
        let messages = reloaded.get_chat_messages(&chat_id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "chào lại");
    }
}
