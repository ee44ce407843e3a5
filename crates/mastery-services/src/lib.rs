//! Concrete collaborators for the mastery loop.
//!
//! - [`ChatCompletionsClient`]: content generation over an OpenAI-compatible API
//! - [`WebSearchClient`]: ranked web snippets for outline and lesson generation

pub mod chat;
pub mod queries;
pub mod search;

pub use chat::ChatCompletionsClient;
pub use queries::{build_lesson_queries, build_structure_queries, current_year};
pub use search::{SearchResult, WebSearchClient};
