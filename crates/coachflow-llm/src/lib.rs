//! Coachflow LLM - Text-understanding collaborators that turn free text into structured fields

pub mod anthropic;
pub mod extractor;
pub mod mock;
pub mod types;

pub use anthropic::AnthropicExtractor;
pub use extractor::{ExtractError, ExtractResult, Extractor};
pub use mock::{ExtractCall, ScriptedExtractor};
pub use types::*;
