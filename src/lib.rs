//! VietRP is a client-side conversation engine for Vietnamese roleplay chat
//! against the OpenRouter chat-completion API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the domain model (characters, chats, messages, pronoun
//!   conventions, settings), prompt assembly, stream decoding, and the
//!   generation orchestrator that drives one reply at a time.
//! - [`api`] defines the wire payloads, the completion client with its
//!   one-shot and streaming calls, and the credential-keyed client cache.
//! - [`storage`] persists each store as a JSON snapshot in the platform
//!   data directory, rewritten on every mutation.
//!
//! Display code sits outside the crate: it reads the stores through
//! [`core::engine::ChatEngine`]'s public fields and calls `send`,
//! `regenerate`, and the store mutation methods. There is no binary, no
//! server, and no CLI surface here.

pub mod api;
pub mod core;
pub mod logging;
pub mod storage;
pub mod utils;
