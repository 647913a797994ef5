use serde::{Deserialize, Serialize};

use crate::api::{GenerationParams, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::core::pronoun::{default_pronoun_pair, find_builtin_pair, PronounPair};
use crate::storage::{Storage, SETTINGS_NAMESPACE};

pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Base roleplay instructions prepended to every system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Bạn là một nhân vật trong cuộc roleplay. Hãy nhập vai hoàn toàn và phản hồi một cách tự nhiên bằng tiếng Việt.\n\nQuy tắc:\n- Luôn ở trong nhân vật, không bao giờ phá vỡ vai\n- Sử dụng *hành động* cho mô tả hành động và \"lời nói\" cho đối thoại\n- Phản hồi sáng tạo và chi tiết\n- Giữ nguyên cách xưng hô đã được thiết lập";

/// Process-wide configuration singleton. Initialized to defaults on first
/// run, persisted, never deleted — only reset back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    /// Which built-in pronoun convention to use.
    pub pronoun_pair_id: String,
    /// A single user-authored convention that overrides the catalog choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_pronoun_pair: Option<PronounPair>,
    pub dark_mode: bool,
    pub system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            pronoun_pair_id: "neutral".to_string(),
            custom_pronoun_pair: None,
            dark_mode: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// A partial settings update; unset fields keep their current value. The
/// custom pronoun pair is doubly optional so a patch can also clear it.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub pronoun_pair_id: Option<String>,
    pub custom_pronoun_pair: Option<Option<PronounPair>>,
    pub dark_mode: Option<bool>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: Settings,
    storage: Option<Storage>,
}

impl SettingsStore {
    pub fn load(storage: Storage) -> Self {
        Self {
            settings: storage.load_or_default(SETTINGS_NAMESPACE),
            storage: Some(storage),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn update(&mut self, patch: SettingsPatch) {
        if let Some(api_key) = patch.api_key {
            self.settings.api_key = api_key;
        }
        if let Some(model) = patch.model {
            self.settings.model = model;
        }
        if let Some(temperature) = patch.temperature {
            self.settings.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.settings.max_tokens = max_tokens;
        }
        if let Some(top_p) = patch.top_p {
            self.settings.top_p = top_p;
        }
        if let Some(pronoun_pair_id) = patch.pronoun_pair_id {
            self.settings.pronoun_pair_id = pronoun_pair_id;
        }
        if let Some(custom_pronoun_pair) = patch.custom_pronoun_pair {
            self.settings.custom_pronoun_pair = custom_pronoun_pair;
        }
        if let Some(dark_mode) = patch.dark_mode {
            self.settings.dark_mode = dark_mode;
        }
        if let Some(system_prompt) = patch.system_prompt {
            self.settings.system_prompt = system_prompt;
        }
        self.persist();
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.settings.api_key = api_key.into();
        self.persist();
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.settings.model = model.into();
        self.persist();
    }

    /// The active convention: the custom override when present, else the
    /// catalog entry named by the settings, else the catalog default.
    pub fn pronoun_pair(&self) -> PronounPair {
        if let Some(custom) = &self.settings.custom_pronoun_pair {
            return custom.clone();
        }
        find_builtin_pair(&self.settings.pronoun_pair_id).unwrap_or_else(default_pronoun_pair)
    }

    /// The per-request sampling knobs as configured.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            top_p: Some(self.settings.top_p),
        }
    }

    pub fn reset(&mut self) {
        self.settings = Settings::default();
        self.persist();
    }

    fn persist(&self) {
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.save(SETTINGS_NAMESPACE, &self.settings) {
                tracing::warn!(error = %err, "failed to persist settings");
            }
        }
    }
}
