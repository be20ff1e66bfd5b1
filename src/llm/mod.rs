//! Generative model access through the Anthropic Messages API.
//!
//! - [`AnthropicClient`]: HTTP client implementing [`crate::traits::ModelClient`]
//! - [`prompts`]: diagnosis and fix prompts with few-shot examples
//! - [`parsers`]: JSON extraction and answer validation

mod client;
pub mod parsers;
pub mod prompts;
mod types;

pub use client::{AnthropicClient, Completion, MAX_CONTENT_LENGTH};
pub use types::{ApiMessage, ApiRequest, ApiResponse, ApiUsage, ContentBlock};
