use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::message::now_millis;
use crate::storage::{Storage, CHARACTERS_NAMESPACE};

/// A persona definition used to condition generated replies.
///
/// Characters are referenced by id from chats and messages, never embedded;
/// deleting one leaves those references dangling and readers resolve them
/// through [`CharacterStore::get_character`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    /// Stable description of who the character is.
    pub persona: String,
    /// Situational framing for the conversation.
    pub scenario: String,
    /// Seed assistant turn appended when a fresh chat becomes active.
    pub first_message: String,
    /// Optional few-shot dialogue excerpts.
    pub example_dialogues: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial character data for imports and in-place edits.
#[derive(Debug, Clone, Default)]
pub struct CharacterDraft {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub persona: Option<String>,
    pub scenario: Option<String>,
    pub first_message: Option<String>,
    pub example_dialogues: Option<String>,
}

/// The character collection plus the selection pointer used when no chat is
/// active.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterStore {
    characters: Vec<Character>,
    selected_character_id: Option<String>,
    #[serde(skip)]
    storage: Option<Storage>,
}

impl CharacterStore {
    /// Load the persisted collection, falling back to an empty store when no
    /// snapshot exists yet.
    pub fn load(storage: Storage) -> Self {
        let mut store: Self = storage.load_or_default(CHARACTERS_NAMESPACE);
        store.storage = Some(storage);
        store
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn selected_character_id(&self) -> Option<&str> {
        self.selected_character_id.as_deref()
    }

    pub fn get_character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn add_character(&mut self, character: Character) {
        self.characters.push(character);
        self.persist();
    }

    /// Merge the draft's set fields into an existing character and refresh
    /// `updated_at`. No-op when the id is unknown.
    pub fn update_character(&mut self, id: &str, draft: CharacterDraft) {
        if let Some(character) = self.characters.iter_mut().find(|c| c.id == id) {
            if let Some(name) = draft.name {
                character.name = name;
            }
            if let Some(avatar) = draft.avatar {
                character.avatar = avatar;
            }
            if let Some(persona) = draft.persona {
                character.persona = persona;
            }
            if let Some(scenario) = draft.scenario {
                character.scenario = scenario;
            }
            if let Some(first_message) = draft.first_message {
                character.first_message = first_message;
            }
            if let Some(example_dialogues) = draft.example_dialogues {
                character.example_dialogues = example_dialogues;
            }
            character.updated_at = now_millis();
            self.persist();
        }
    }

    /// Remove a character, clearing the selection pointer when it pointed at
    /// the removed entry. Chats and messages referencing the id are left
    /// untouched.
    pub fn delete_character(&mut self, id: &str) {
        self.characters.retain(|c| c.id != id);
        if self.selected_character_id.as_deref() == Some(id) {
            self.selected_character_id = None;
        }
        self.persist();
    }

    pub fn select_character(&mut self, id: Option<String>) {
        self.selected_character_id = id;
        self.persist();
    }

    /// Create a character from partial data, filling defaults and stamping a
    /// fresh id and timestamps.
    pub fn import_character(&mut self, draft: CharacterDraft) -> Character {
        let now = now_millis();
        let character = Character {
            id: format!("char-{}", Uuid::new_v4()),
            name: draft.name.unwrap_or_else(|| "Unnamed Character".to_string()),
            avatar: draft.avatar.unwrap_or_default(),
            persona: draft.persona.unwrap_or_default(),
            scenario: draft.scenario.unwrap_or_default(),
            first_message: draft.first_message.unwrap_or_default(),
            example_dialogues: draft.example_dialogues.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.characters.push(character.clone());
        self.persist();
        character
    }

    fn persist(&self) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.save(CHARACTERS_NAMESPACE, self) {
                tracing::warn!(error = %err, "failed to persist character store");
            }
        }
    }
}
