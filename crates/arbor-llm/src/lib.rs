//! LLM provider abstraction used for digest summarization, query classification
//! and embeddings.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod rate_limit;
pub(crate) mod retry;
#[cfg(test)]
mod test_server;

pub use any::AnyProvider;
pub use error::LlmError;
#[cfg(feature = "mock")]
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use provider::{GenerationParams, LlmProvider, Message, Role};
pub use rate_limit::{RateLimitConfig, RateLimiter};
