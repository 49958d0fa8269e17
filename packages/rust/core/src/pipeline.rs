//! End-to-end `ask` pipeline: question → search → lookup → local file → answer → route.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, instrument};

use kbanswer_llm::{LlmClient, LlmOptions};
use kbanswer_lookup::LookupTable;
use kbanswer_search::{SearchClient, SearchOptions, SearchParams};
use kbanswer_shared::{AppConfig, Result, read_api_key};

use crate::graph::Node;
use crate::identify::call_search;
use crate::retrieve::fetch_local_document;
use crate::route::{decide_next, run_terminal};
use crate::state::PipelineState;
use crate::synthesize::{AnswerContext, generate_answer};

/// Everything the pipeline needs, resolved from config and environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search: SearchOptions,
    pub search_params: SearchParams,
    /// `None` when the LLM key env var is unset; synthesis then escalates.
    pub llm: Option<LlmOptions>,
    /// Env var the LLM key is read from, named in the missing-key answer.
    pub llm_api_key_env: String,
    pub docs_dir: PathBuf,
    pub prompt_file: Option<PathBuf>,
}

impl PipelineConfig {
    /// Build from the app config, reading API keys from the environment.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let search = SearchOptions {
            base_url: config.search.base_url.clone(),
            api_key: read_api_key(&config.search.api_key_env),
            timeout_secs: config.search.timeout_secs,
        };

        let llm = read_api_key(&config.llm.api_key_env)
            .map(|key| LlmOptions::from_config(&config.llm, key));

        Self {
            search,
            search_params: SearchParams::from(&config.search),
            llm,
            llm_api_key_env: config.llm.api_key_env.clone(),
            docs_dir: PathBuf::from(&config.documents.docs_dir),
            prompt_file: config.prompt.file.as_ref().map(PathBuf::from),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new step.
    fn phase(&self, name: &str);
    /// Called once the terminal step has run.
    fn done(&self, state: &PipelineState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _state: &PipelineState) {}
}

/// Clients and settings for answering questions. Build once, run many times.
pub struct Pipeline {
    search: SearchClient,
    search_params: SearchParams,
    llm: Option<LlmClient>,
    llm_api_key_env: String,
    lookup: Box<dyn LookupTable>,
    docs_dir: PathBuf,
    prompt_file: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, lookup: Box<dyn LookupTable>) -> Result<Self> {
        let search = SearchClient::new(&config.search)?;
        let llm = config.llm.as_ref().map(LlmClient::new).transpose()?;

        Ok(Self {
            search,
            search_params: config.search_params.clone(),
            llm,
            llm_api_key_env: config.llm_api_key_env.clone(),
            lookup,
            docs_dir: config.docs_dir.clone(),
            prompt_file: config.prompt_file.clone(),
        })
    }

    /// Build from the app config, opening the configured lookup table.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let lookup = kbanswer_lookup::open(config.lookup.file.as_deref().map(Path::new))?;
        Self::new(&PipelineConfig::from_app_config(config), Box::new(lookup))
    }

    /// The lookup table this pipeline resolves source ids with.
    pub fn lookup(&self) -> &dyn LookupTable {
        self.lookup.as_ref()
    }

    /// Answer `question`. Never fails: every problem ends up in the returned
    /// state and routes the ticket to an attendant.
    #[instrument(skip_all)]
    pub async fn run(&self, question: &str, progress: &dyn ProgressReporter) -> PipelineState {
        let start = Instant::now();
        let mut state = PipelineState::new(question);
        info!(run_id = %state.run_id, "starting ask pipeline");

        progress.phase(Node::CallSearch.label());
        let update = call_search(&state, &self.search, &self.search_params).await;
        state.apply(update);

        progress.phase(Node::FetchLocalDocument.label());
        let update = fetch_local_document(&state, self.lookup.as_ref(), &self.docs_dir);
        state.apply(update);

        progress.phase(Node::GenerateAnswer.label());
        let ctx = AnswerContext {
            llm: self.llm.as_ref(),
            prompt_file: self.prompt_file.as_deref(),
            api_key_env: &self.llm_api_key_env,
        };
        let update = generate_answer(&state, &ctx).await;
        state.apply(update);

        let route = decide_next(&state);
        progress.phase(Node::from(route).label());
        let update = run_terminal(route, &state);
        state.apply(update);

        info!(
            run_id = %state.run_id,
            %route,
            kb_id = state.kb_id.as_deref().unwrap_or("<none>"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ask pipeline complete"
        );

        progress.done(&state);
        state
    }

    /// Run only the search step.
    pub async fn identify(&self, question: &str) -> PipelineState {
        let mut state = PipelineState::new(question);
        let update = call_search(&state, &self.search, &self.search_params).await;
        state.apply(update);
        state
    }

    /// Resolve `source_id` and read its local document, skipping the search.
    pub fn retrieve(&self, source_id: &str) -> PipelineState {
        let mut state = PipelineState::new("");
        state.doc_reference = Some(source_id.to_string());
        let update = fetch_local_document(&state, self.lookup.as_ref(), &self.docs_dir);
        state.apply(update);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Route;
    use kbanswer_lookup::InMemoryLookup;
    use kbanswer_shared::KbRecord;
    use std::sync::Mutex;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SOURCE_ID: &str = "c7539b23-a266-4797-ab0c-7018c739c6ce";

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn done(&self, _state: &PipelineState) {
            self.phases.lock().unwrap().push("done".to_string());
        }
    }

    fn docs_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kbanswer_pipeline_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("KB0034986 - Valuation type expansion.txt"),
            "To check the valuation type expansion, open MM03, select the plant and the Accounting 1 view.",
        )
        .unwrap();
        dir
    }

    fn config(server: &MockServer, docs_dir: &Path, with_llm: bool) -> PipelineConfig {
        PipelineConfig {
            search: SearchOptions {
                base_url: server.uri(),
                api_key: Some("search-key".into()),
                timeout_secs: 5,
            },
            search_params: SearchParams::default(),
            llm: with_llm.then(|| LlmOptions {
                base_url: server.uri(),
                api_key: "sk-test".into(),
                model: "gpt-4o".into(),
                temperature: 0.0,
                timeout_secs: 5,
            }),
            llm_api_key_env: "N1_OPENAI_API_KEY".into(),
            docs_dir: docs_dir.to_path_buf(),
            prompt_file: None,
        }
    }

    async fn mount_search(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/api/index/search"))
            .and(header("ApiKey", "search-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_llm(server: &MockServer, reply: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [ { "message": { "content": reply } } ],
                "usage": { "prompt_tokens": 300, "completion_tokens": 25 }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn one_hit() -> serde_json::Value {
        serde_json::json!({
            "results": [{
                "fromDocument": "1308ef44-e6e2-4cd2-b2f3-d2a0a1c1d9e1",
                "chunks": [
                    { "chunk": { "sourceId": "542846e4-380a-41b7-b6f9-b190810f2c26", "rawContent": "Missing valuation type" }, "similarityScore": 0.61 },
                    { "chunk": { "sourceId": SOURCE_ID, "rawContent": "Valuation type expansion KB0034986" }, "similarityScore": 0.87 }
                ]
            }]
        })
    }

    #[tokio::test]
    async fn test_ask_relevant_answer_end_to_end() {
        let server = MockServer::start().await;
        mount_search(&server, one_hit()).await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-4o", "temperature": 0.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [ { "message": { "content": "Open MM03, pick the plant and check Accounting 1.\nRELEVANT" } } ],
                "usage": { "prompt_tokens": 300, "completion_tokens": 25 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = docs_dir();
        let pipeline =
            Pipeline::new(&config(&server, &dir, true), Box::new(InMemoryLookup::demo())).unwrap();
        let progress = RecordingProgress::default();

        let state = pipeline
            .run("How do I check the valuation type expansion?", &progress)
            .await;

        assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
        assert_eq!(state.doc_reference.as_deref(), Some(SOURCE_ID));
        assert_eq!(state.best_similarity_score, Some(0.87));
        assert_eq!(state.kb_id.as_deref(), Some("KB0034986"));
        assert_eq!(
            state.final_response.as_deref(),
            Some("Open MM03, pick the plant and check Accounting 1.")
        );
        assert_eq!(state.is_kb_relevant, Some(true));
        assert_eq!(state.needs_consultant, Some(false));
        assert_eq!(state.route, Some(Route::ForwardToUser));
        assert_eq!(state.token_usage.unwrap().total_tokens, 325);

        let doc = state.retrieved_document.unwrap();
        assert_eq!(doc.doc_title, "KB0034986 - Valuation type expansion");
        assert_eq!(doc.snippet.as_deref(), Some("Missing valuation type Valuation type expansion KB0034986"));

        let phases = progress.phases.lock().unwrap().clone();
        assert_eq!(
            phases,
            vec![
                "Searching index",
                "Loading local document",
                "Generating answer",
                "Forward to user",
                "done"
            ]
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_ask_irrelevant_answer_goes_to_attendant() {
        let server = MockServer::start().await;
        mount_search(&server, one_hit()).await;
        mount_llm(&server, "The article covers MM03 only.\nIRRELEVANT", 1).await;

        let dir = docs_dir();
        let pipeline =
            Pipeline::new(&config(&server, &dir, true), Box::new(InMemoryLookup::demo())).unwrap();

        let state = pipeline.run("How do I post a goods receipt?", &SilentProgress).await;

        assert_eq!(state.final_response.as_deref(), Some("The article covers MM03 only."));
        assert_eq!(state.is_kb_relevant, Some(false));
        assert_eq!(state.needs_consultant, Some(true));
        assert_eq!(state.route, Some(Route::ForwardToAttendant));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_ask_without_search_results() {
        let server = MockServer::start().await;
        mount_search(&server, serde_json::json!({ "results": [] })).await;
        mount_llm(&server, "unused", 0).await;

        let dir = docs_dir();
        let pipeline =
            Pipeline::new(&config(&server, &dir, true), Box::new(InMemoryLookup::demo())).unwrap();

        let state = pipeline.run("Completely unrelated question", &SilentProgress).await;

        let response = state.final_response.unwrap();
        assert!(response.starts_with("Unable to generate an answer: no document found"));
        assert_eq!(state.needs_consultant, Some(true));
        assert_eq!(state.route, Some(Route::ForwardToAttendant));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_ask_unknown_source_id() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            serde_json::json!({
                "results": [{ "chunks": [ { "chunk": { "sourceId": "not-in-table" }, "similarityScore": 0.9 } ] }]
            }),
        )
        .await;
        mount_llm(&server, "unused", 0).await;

        let dir = docs_dir();
        let pipeline =
            Pipeline::new(&config(&server, &dir, true), Box::new(InMemoryLookup::demo())).unwrap();

        let state = pipeline.run("question", &SilentProgress).await;

        assert_eq!(
            state.error.as_deref(),
            Some("no lookup record found for source_id: not-in-table")
        );
        assert!(state.raw_text_content.is_none());
        assert_eq!(state.route, Some(Route::ForwardToAttendant));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_ask_without_llm_key() {
        let server = MockServer::start().await;
        mount_search(&server, one_hit()).await;

        let dir = docs_dir();
        let pipeline =
            Pipeline::new(&config(&server, &dir, false), Box::new(InMemoryLookup::demo())).unwrap();

        let state = pipeline.run("question", &SilentProgress).await;

        assert!(state.raw_text_content.is_some());
        assert!(state.final_response.unwrap().contains("N1_OPENAI_API_KEY"));
        assert_eq!(state.route, Some(Route::ForwardToAttendant));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn retrieve_by_source_id() {
        let dir = docs_dir();
        let lookup = InMemoryLookup::new(vec![KbRecord {
            id: 1,
            kb_id: "KB0034986".into(),
            source_id: "src-1".into(),
            index_id: "idx".into(),
        }]);
        let server_less = PipelineConfig {
            search: SearchOptions::new("http://localhost:1"),
            search_params: SearchParams::default(),
            llm: None,
            llm_api_key_env: "N1_OPENAI_API_KEY".into(),
            docs_dir: dir.clone(),
            prompt_file: None,
        };
        let pipeline = Pipeline::new(&server_less, Box::new(lookup)).unwrap();

        let state = pipeline.retrieve("src-1");
        assert!(state.error.is_none());
        assert_eq!(state.kb_id.as_deref(), Some("KB0034986"));

        let state = pipeline.retrieve("src-2");
        assert!(state.error.is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn from_config_exposes_lookup_table() {
        let mut app = AppConfig::default();
        app.llm.api_key_env = "KBANSWER_TEST_UNSET_LLM_KEY_98765".into();

        let pipeline = Pipeline::from_config(&app).unwrap();
        assert_eq!(pipeline.lookup().all().len(), 9);
        assert_eq!(pipeline.lookup().by_kb_id("KB0018415").len(), 1);
    }

    #[test]
    fn config_from_app_config() {
        let mut app = AppConfig::default();
        app.documents.docs_dir = "/srv/kb".into();
        app.prompt.file = Some("prompt.toml".into());
        app.llm.api_key_env = "KBANSWER_TEST_UNSET_LLM_KEY_98765".into();

        let config = PipelineConfig::from_app_config(&app);
        assert_eq!(config.docs_dir, PathBuf::from("/srv/kb"));
        assert_eq!(config.prompt_file, Some(PathBuf::from("prompt.toml")));
        assert!(config.llm.is_none());
        assert_eq!(config.llm_api_key_env, "KBANSWER_TEST_UNSET_LLM_KEY_98765");
        assert_eq!(config.search_params.quantity, 3);
    }
}
