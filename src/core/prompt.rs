//! Prompt assembly
//!
//! Pure functions that turn a transcript, a character, and a pronoun
//! convention into the role-tagged message list sent to the completion
//! endpoint. No I/O, no shared state; identical inputs always produce
//! byte-identical output.

use crate::api::ChatMessage;
use crate::core::character::Character;
use crate::core::message::{Message, Role};
use crate::core::pronoun::PronounPair;

/// Share of the context window the prompt may occupy; the rest is headroom
/// for the response.
const PROMPT_BUDGET_SHARE: f64 = 0.8;

/// Build the single system entry: base instructions, then the pronoun
/// convention with its four labeled address terms, then the character block.
/// The example-dialogue section is only present when the character defines
/// one.
pub fn build_system_prompt(
    character: &Character,
    pronoun_pair: &PronounPair,
    base_instructions: &str,
) -> String {
    let pronoun_block = format!(
        "\nQuy tắc xưng hô trong cuộc trò chuyện này:\n\
         - User tự xưng: \"{}\"\n\
         - User gọi bạn (nhân vật): \"{}\"\n\
         - Bạn (nhân vật) tự xưng: \"{}\"\n\
         - Bạn gọi User: \"{}\"\n\
         \n\
         Hãy tuân thủ nghiêm ngặt cách xưng hô này trong suốt cuộc trò chuyện.",
        pronoun_pair.user_pronoun,
        pronoun_pair.char_by_user,
        pronoun_pair.char_pronoun,
        pronoun_pair.user_by_char,
    );

    let dialogue_block = if character.example_dialogues.is_empty() {
        String::new()
    } else {
        format!(
            "Ví dụ đối thoại tham khảo:\n{}",
            character.example_dialogues
        )
    };

    let character_block = format!(
        "\nThông tin nhân vật bạn đang nhập vai:\nTên: {}\n\n\
         Mô tả nhân vật (Persona):\n{}\n\n\
         Bối cảnh (Scenario):\n{}\n\n\
         {}",
        character.name, character.persona, character.scenario, dialogue_block
    );

    format!("{base_instructions}\n\n{pronoun_block}\n\n{character_block}")
}

/// Assemble the full prompt: exactly one system entry authored here, then
/// the user/assistant turns of `history` in original order.
///
/// System-role entries found in the history are dropped; the builder is the
/// sole author of the system entry. An empty history for a character with a
/// first message yields only the system entry: the greeting lives in the
/// persisted transcript, not in the prompt.
pub fn build_messages(
    history: &[Message],
    character: &Character,
    pronoun_pair: &PronounPair,
    base_instructions: &str,
) -> Vec<ChatMessage> {
    let system_prompt = build_system_prompt(character, pronoun_pair, base_instructions);
    let mut messages = vec![ChatMessage::new("system", system_prompt)];

    if history.is_empty() && !character.first_message.is_empty() {
        return messages;
    }

    for msg in history {
        match msg.role {
            Role::User | Role::Assistant => {
                messages.push(ChatMessage::new(msg.role.as_str(), msg.content.clone()));
            }
            Role::System => {}
        }
    }

    messages
}

/// Rough token estimate: one token per four characters. Good enough for
/// mixed Vietnamese/English budgeting; never exact.
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Drop the oldest turns until the estimated prompt cost fits inside the
/// prompt's share of `max_tokens`.
///
/// The leading system entry is always kept and its cost is counted first.
/// The remaining entries are scanned newest to oldest and either kept whole
/// or dropped whole; the result is back in chronological order.
pub fn truncate_to_fit(messages: &[ChatMessage], max_tokens: u32) -> Vec<ChatMessage> {
    let Some((system, history)) = messages.split_first() else {
        return Vec::new();
    };

    let budget = f64::from(max_tokens) * PROMPT_BUDGET_SHARE;
    let mut total = estimate_token_count(&system.content) as f64;
    let mut kept = Vec::new();

    for msg in history.iter().rev() {
        let cost = estimate_token_count(&msg.content) as f64;
        if total + cost > budget {
            break;
        }
        total += cost;
        kept.push(msg.clone());
    }

    let mut result = Vec::with_capacity(kept.len() + 1);
    result.push(system.clone());
    result.extend(kept.into_iter().rev());
    result
}

/// Replace the card placeholder markers for display.
pub fn format_message_for_display(content: &str) -> String {
    content
        .replace("{{user}}", "Bạn")
        .replace("{{char}}", "Nhân vật")
}
