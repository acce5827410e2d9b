//! LLM integration module.
//!
//! Provides an OpenAI-compatible client, the [`ChatProvider`] seam the rest
//! of the crate talks to, and the prompts used for answer generation.

mod client;
mod prompts;
mod provider;

pub use client::{LlmClient, LlmResponse, Message, Role};
pub use prompts::Prompts;
pub use provider::{ChatProvider, ProviderRouter, resolve_endpoint};
