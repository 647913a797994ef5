//! Built-in model catalog
//!
//! The models offered in the picker, with the context window sizes the
//! prompt truncation pass budgets against.

/// A selectable model on the completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub id: &'static str,
    pub name: &'static str,
    pub context_length: u32,
    pub pricing: &'static str,
}

/// Context budget assumed for models that are not in the catalog.
pub const FALLBACK_CONTEXT_TOKENS: u32 = 8192;

pub const AVAILABLE_MODELS: &[ModelOption] = &[
    ModelOption {
        id: "anthropic/claude-3.5-sonnet",
        name: "Claude 3.5 Sonnet",
        context_length: 200_000,
        pricing: "$3/$15 per 1M tokens",
    },
    ModelOption {
        id: "anthropic/claude-3-haiku",
        name: "Claude 3 Haiku",
        context_length: 200_000,
        pricing: "$0.25/$1.25 per 1M tokens",
    },
    ModelOption {
        id: "openai/gpt-4o",
        name: "GPT-4o",
        context_length: 128_000,
        pricing: "$2.50/$10 per 1M tokens",
    },
    ModelOption {
        id: "openai/gpt-4o-mini",
        name: "GPT-4o Mini",
        context_length: 128_000,
        pricing: "$0.15/$0.60 per 1M tokens",
    },
    ModelOption {
        id: "google/gemini-pro-1.5",
        name: "Gemini Pro 1.5",
        context_length: 1_000_000,
        pricing: "$2.50/$7.50 per 1M tokens",
    },
    ModelOption {
        id: "meta-llama/llama-3.1-70b-instruct",
        name: "Llama 3.1 70B",
        context_length: 131_072,
        pricing: "$0.52/$0.75 per 1M tokens",
    },
    ModelOption {
        id: "mistralai/mistral-large",
        name: "Mistral Large",
        context_length: 128_000,
        pricing: "$2/$6 per 1M tokens",
    },
    ModelOption {
        id: "qwen/qwen-2.5-72b-instruct",
        name: "Qwen 2.5 72B",
        context_length: 131_072,
        pricing: "$0.35/$0.40 per 1M tokens",
    },
];

/// Find a catalog entry by model id.
pub fn find_model(id: &str) -> Option<&'static ModelOption> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

/// Context window for the given model id, falling back to a conservative
/// budget for models the catalog does not know about.
pub fn context_length_for(id: &str) -> u32 {
    find_model(id)
        .map(|m| m.context_length)
        .unwrap_or(FALLBACK_CONTEXT_TOKENS)
}
