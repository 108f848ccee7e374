//! Service layer
//!
//! Recipe import (fetch, sanitize, extract, draft storage) and the
//! meal-planning assistant (language model, tools, proposals).

pub mod chat_agent;
pub mod draft_store;
pub mod html_fetcher;
pub mod html_sanitizer;
pub mod llm;
pub mod proposals;
pub mod recipe_extractor;
pub mod structured_recipe;
pub mod tools;

pub use chat_agent::{AgentError, ChatAgent};
pub use draft_store::{DraftError, DraftStore};
pub use html_fetcher::{FetchedPage, HttpPageFetcher, PageFetcher};
pub use llm::{DisabledModel, LanguageModel, LlmError, OpenAiCompatibleModel};
pub use proposals::ProposalError;
pub use recipe_extractor::RecipeExtractor;
