//! Shared types, error model, and configuration for kbanswer.
//!
//! This crate is the foundation depended on by all other kbanswer crates.
//! It provides:
//! - [`KbAnswerError`]: the unified error type
//! - Domain types ([`KbRecord`], [`RetrievedDocument`], [`TokenUsage`])
//! - Configuration ([`AppConfig`], config loading, API key lookup)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DocumentsConfig, LlmConfig, LookupConfig, PromptConfig, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, read_api_key,
};
pub use error::{KbAnswerError, Result};
pub use types::{KbRecord, RetrievedDocument, TokenUsage};
