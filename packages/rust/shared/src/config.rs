//! Application configuration for kbanswer.
//!
//! User config lives at `~/.kbanswer/kbanswer.toml`.
//! CLI flags and environment variables override config file values, which
//! override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{KbAnswerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbanswer.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbanswer";

// ---------------------------------------------------------------------------
// Config structs (matching kbanswer.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Search API settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Language model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Local document store.
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Answer prompt template.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Source-id to KB-code lookup table.
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the semantic-search API.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Name of the env var holding the search API key (optional at runtime).
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,

    /// Index to query.
    #[serde(default = "default_index_id")]
    pub index_id: String,

    /// Number of results requested.
    #[serde(default = "default_quantity")]
    pub quantity: u32,

    /// Minimum similarity for a chunk to be returned.
    #[serde(default = "default_threshold_similarity")]
    pub threshold_similarity: f64,

    /// Ask the API to follow chunk chains.
    #[serde(default)]
    pub use_chunk_chain: bool,

    /// Maximum chunk-chain links when `use_chunk_chain` is on.
    #[serde(default)]
    pub max_chunk_chain_link: u32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key_env: default_search_api_key_env(),
            index_id: default_index_id(),
            quantity: default_quantity(),
            threshold_similarity: default_threshold_similarity(),
            use_chunk_chain: false,
            max_chunk_chain_link: 0,
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://libindexr.dev.saiapplications.com".into()
}
fn default_search_api_key_env() -> String {
    "LIBINDEXR_API_KEY".into()
}
fn default_index_id() -> String {
    "0211f006-78fe-4df2-9b48-9471b0cbf70e".into()
}
fn default_quantity() -> u32 {
    3
}
fn default_threshold_similarity() -> f64 {
    0.4
}
fn default_search_timeout() -> u64 {
    30
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Model used for answer synthesis.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_llm_api_key_env() -> String {
    "N1_OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[documents]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Directory holding one `.txt` file per KB article.
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
        }
    }
}

fn default_docs_dir() -> String {
    "documento_busca".into()
}

/// `[prompt]` section. Without a file the built-in template is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// `[lookup]` section. Without a file the demo table is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl AppConfig {
    /// Check that both base URLs parse and the search parameters are sane.
    pub fn validate(&self) -> Result<()> {
        for (section, raw) in [("search", &self.search.base_url), ("llm", &self.llm.base_url)] {
            Url::parse(raw).map_err(|e| {
                KbAnswerError::config(format!("[{section}] base_url '{raw}' is not a URL: {e}"))
            })?;
        }

        if self.search.quantity == 0 {
            return Err(KbAnswerError::config("[search] quantity must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.search.threshold_similarity) {
            return Err(KbAnswerError::config(format!(
                "[search] threshold_similarity {} is outside 0.0..=1.0",
                self.search.threshold_similarity
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbanswer/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KbAnswerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbanswer/kbanswer.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbAnswerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KbAnswerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbAnswerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbAnswerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbAnswerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the named env var. Empty values count as unset.
pub fn read_api_key(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}
