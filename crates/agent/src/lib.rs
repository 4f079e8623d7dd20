//! LLM-backed section generation.
//!
//! Adapts the core [`SectionGenerator`](rfqbrief_core::SectionGenerator) seam
//! to a text-completion [`LlmClient`]. The model only phrases the closed fact
//! list it is given; which facts exist, what is redacted and whether the
//! report is released are decided in the core pipeline.

pub mod generator;
pub mod llm;
pub mod prompt;

pub use generator::{sanitize_section_output, LlmSectionGenerator};
pub use llm::{ClientSettings, LlmClient};
pub use prompt::PromptRenderer;
