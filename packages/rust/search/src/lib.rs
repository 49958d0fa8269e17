//! Client for the remote semantic-search API.
//!
//! The search API ranks text chunks of indexed documents against a free-text
//! query. kbanswer only needs one endpoint, `POST /api/index/search`, and from
//! its answer a single winner: the chunk with the highest similarity score
//! (see [`select_best`]).

mod select;

use kbanswer_shared::{KbAnswerError, Result, SearchConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

pub use select::{BestMatch, MAX_SNIPPET_CHARS, Selection, build_snippet, select_best};

/// Default timeout in seconds for search requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "ApiKey";

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("kbanswer/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /api/index/search`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    index_id: &'a str,
    search_query: &'a str,
    quantity: u32,
    threshold_similarity: f64,
    use_chunk_chain: bool,
    max_chunk_chain_link: u32,
}

/// Decoded search response. Every field is optional on the wire; missing
/// pieces decode to empty values so one odd entry never sinks the whole call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResultGroup>,
}

/// One ranked document with its matching chunks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultGroup {
    #[serde(default)]
    pub from_document: Option<String>,
    #[serde(default)]
    pub chunks: Vec<ScoredChunk>,
}

/// A chunk together with its similarity to the query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    #[serde(default)]
    pub chunk: Option<Chunk>,
    #[serde(default)]
    pub similarity_score: Option<f64>,
}

/// Chunk payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,
}

// ---------------------------------------------------------------------------
// Options & parameters
// ---------------------------------------------------------------------------

/// Connection settings for the search client.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// API base URL, without the `/api/...` path.
    pub base_url: String,
    /// Sent as the `ApiKey` header when present.
    pub api_key: Option<String>,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl SearchOptions {
    /// Options for `base_url` with no key and the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Per-query parameters forwarded to the API.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub index_id: String,
    pub quantity: u32,
    pub threshold_similarity: f64,
    pub use_chunk_chain: bool,
    pub max_chunk_chain_link: u32,
}

impl From<&SearchConfig> for SearchParams {
    fn from(config: &SearchConfig) -> Self {
        Self {
            index_id: config.index_id.clone(),
            quantity: config.quantity,
            threshold_similarity: config.threshold_similarity,
            use_chunk_chain: config.use_chunk_chain,
            max_chunk_chain_link: config.max_chunk_chain_link,
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin async client over the search endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl SearchClient {
    /// Build a client from connection options.
    pub fn new(opts: &SearchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| KbAnswerError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/api/index/search", opts.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            api_key: opts.api_key.clone(),
        })
    }

    /// Run a search and decode the ranked results.
    #[instrument(skip_all, fields(index_id = %params.index_id))]
    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<SearchResponse> {
        if query.trim().is_empty() {
            return Err(KbAnswerError::validation("search query must not be empty"));
        }

        let body = SearchRequest {
            index_id: &params.index_id,
            search_query: query,
            quantity: params.quantity,
            threshold_similarity: params.threshold_similarity,
            use_chunk_chain: params.use_chunk_chain,
            max_chunk_chain_link: params.max_chunk_chain_link,
        };

        debug!(endpoint = %self.endpoint, quantity = params.quantity, "sending search request");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KbAnswerError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KbAnswerError::Network(format!(
                "{}: HTTP {status}: {}",
                self.endpoint,
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| KbAnswerError::parse(format!("invalid search response: {e}")))?;

        info!(results = parsed.results.len(), "search complete");

        Ok(parsed)
    }
}
