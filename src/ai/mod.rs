//! AI collaborator client
//!
//! Completion backends behind the [`AiBackend`] trait, plus extraction of
//! structured JSON from free-form model output.

pub mod extract;
pub mod openai;
pub mod traits;

pub use extract::{extract_json, extract_json_or, first_json_object, Extracted};
pub use openai::OpenAiBackend;
pub use traits::{AiBackend, CompletionRequest};
