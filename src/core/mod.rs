pub mod character;
pub mod chat_stream;
pub mod conversation;
pub mod engine;
pub mod message;
pub mod prompt;
pub mod pronoun;
pub mod settings;
