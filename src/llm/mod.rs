//! LLM integration for swe-crew.
//!
//! The agents talk to the model through the [`LlmProvider`] trait. The
//! production implementation is [`LiteLlmClient`], an OpenAI-compatible
//! chat-completions client (typically pointed at a LiteLLM proxy).
//!
//! ```ignore
//! use swe_crew::llm::{LiteLlmClient, GenerationRequest, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env(Duration::from_secs(120))?;
//! let request = GenerationRequest::new("gpt-4o-mini", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL,
};
