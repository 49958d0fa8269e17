//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use kbanswer_core::{Pipeline, PipelineState, ProgressReporter, graph};
use kbanswer_shared::{AppConfig, KbRecord, init_config, load_config, load_config_from};
use tracing::info;

/// Question used by `ask` when none is given.
const DEFAULT_QUESTION: &str =
    "How do I check the valuation type expansion of a material for a plant?";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbanswer: answer support questions from a local knowledge base.
#[derive(Parser)]
#[command(
    name = "kbanswer",
    version,
    about = "Answer support questions from KB articles, or hand them to an attendant.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.kbanswer/kbanswer.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Folder holding the KB `.txt` files.
    #[arg(long, env = "KBANSWER_DOCS_DIR", global = true)]
    pub docs_dir: Option<String>,

    /// Search index to query.
    #[arg(long, env = "KBANSWER_INDEX_ID", global = true)]
    pub index_id: Option<String>,

    /// Search API base URL.
    #[arg(long, env = "KBANSWER_SEARCH_URL", global = true)]
    pub search_url: Option<String>,

    /// Model used for answers.
    #[arg(long, env = "KBANSWER_LLM_MODEL", global = true)]
    pub model: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a question end to end.
    Ask {
        /// The question (a sample question is used when omitted).
        question: Option<String>,

        /// Print the final state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run only the search step and show the chosen source id.
    Search {
        question: String,

        #[arg(long)]
        json: bool,
    },

    /// Resolve a source id to its KB code and local file.
    Resolve {
        source_id: String,

        #[arg(long)]
        json: bool,
    },

    /// List lookup table records.
    Lookup {
        /// Only records with this source id.
        #[arg(long)]
        source_id: Option<String>,

        /// Only records with this KB code.
        #[arg(long)]
        kb_id: Option<String>,
    },

    /// Print the pipeline flow as a Mermaid flowchart.
    Graph,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbanswer=info",
        1 => "kbanswer=debug",
        _ => "kbanswer=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Load the config file and apply flag / env overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if let Some(dir) = &cli.docs_dir {
        config.documents.docs_dir = dir.clone();
    }
    if let Some(index_id) = &cli.index_id {
        config.search.index_id = index_id.clone();
    }
    if let Some(url) = &cli.search_url {
        config.search.base_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Ask { question, json } => {
            cmd_ask(&cli, question.as_deref().unwrap_or(DEFAULT_QUESTION), *json).await
        }
        Command::Search { question, json } => cmd_search(&cli, question, *json).await,
        Command::Resolve { source_id, json } => cmd_resolve(&cli, source_id, *json),
        Command::Lookup { source_id, kb_id } => {
            cmd_lookup(&cli, source_id.as_deref(), kb_id.as_deref())
        }
        Command::Graph => {
            print!("{}", graph::mermaid());
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&cli),
        },
    }
}

async fn cmd_ask(cli: &Cli, question: &str, json: bool) -> Result<()> {
    let config = resolve_config(cli)?;
    let pipeline = Pipeline::from_config(&config)?;

    info!(
        question,
        index_id = %config.search.index_id,
        docs_dir = %config.documents.docs_dir,
        "asking"
    );

    let state = if json {
        pipeline.run(question, &kbanswer_core::SilentProgress).await
    } else {
        let reporter = CliProgress::new();
        pipeline.run(question, &reporter).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!();
    println!("  Question: {question}");
    println!("  {}", "-".repeat(60));
    print_document(&state);
    if let Some(usage) = &state.token_usage {
        println!(
            "  Tokens:   {} in + {} out = {} total",
            usage.input_tokens, usage.output_tokens, usage.total_tokens
        );
    }
    println!();
    println!("  Answer:");
    println!(
        "{}",
        indent(state.final_response.as_deref().unwrap_or("(none)"))
    );
    println!();
    if let Some(route) = state.route {
        println!("  Route:    {route}");
    }
    if let Some(err) = &state.error {
        println!("  Error:    {err}");
    }
    println!();

    Ok(())
}

async fn cmd_search(cli: &Cli, question: &str, json: bool) -> Result<()> {
    let config = resolve_config(cli)?;
    let pipeline = Pipeline::from_config(&config)?;
    let state = pipeline.identify(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    if let Some(err) = &state.error {
        return Err(eyre!("{err}"));
    }

    println!();
    match &state.doc_reference {
        Some(source_id) => {
            println!("  Best source id: {source_id}");
            if let Some(score) = state.best_similarity_score {
                println!("  Similarity:     {score:.4}");
            }
            if let Some(from) = &state.from_document {
                println!("  From document:  {from}");
            }
            if let Some(snippet) = &state.best_chunks_snippet {
                println!("  Snippet:        {snippet}");
            }
        }
        None => println!("  No matching chunk."),
    }
    if !state.doc_references.is_empty() {
        println!("  All source ids: {}", state.doc_references.join(", "));
    }
    println!();

    Ok(())
}

fn cmd_resolve(cli: &Cli, source_id: &str, json: bool) -> Result<()> {
    let config = resolve_config(cli)?;
    let pipeline = Pipeline::from_config(&config)?;
    let state = pipeline.retrieve(source_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    if let Some(err) = &state.error {
        return Err(eyre!("{err}"));
    }

    println!();
    print_document(&state);
    if let Some(text) = &state.raw_text_content {
        println!("  Length:   {} characters", text.chars().count());
    }
    println!();

    Ok(())
}

fn cmd_lookup(cli: &Cli, source_id: Option<&str>, kb_id: Option<&str>) -> Result<()> {
    let config = resolve_config(cli)?;
    let pipeline = Pipeline::from_config(&config)?;
    let table = pipeline.lookup();

    let records: Vec<KbRecord> = match (source_id, kb_id) {
        (Some(sid), Some(kb)) => table
            .by_source_id(sid)
            .into_iter()
            .filter(|r| r.kb_id == kb)
            .collect(),
        (Some(sid), None) => table.by_source_id(sid),
        (None, Some(kb)) => table.by_kb_id(kb),
        (None, None) => table.all(),
    };

    if records.is_empty() {
        println!("No lookup records found.");
        return Ok(());
    }

    println!("{:>4}  {:<10}  {:<36}  {}", "ID", "KB", "SOURCE ID", "INDEX ID");
    for r in &records {
        println!(
            "{:>4}  {:<10}  {:<36}  {}",
            r.id, r.kb_id, r.source_id, r.index_id
        );
    }

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_document(state: &PipelineState) {
    match &state.retrieved_document {
        Some(doc) => {
            println!("  Document: {} - {}", doc.kb_id, doc.doc_title);
            println!("  Path:     {}", doc.doc_path);
            if let Some(score) = doc.similarity_score {
                println!("  Similarity: {score:.4}");
            }
        }
        None => println!(
            "  Document: {}",
            state.doc_reference.as_deref().unwrap_or("(none)")
        ),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _state: &PipelineState) {
        self.spinner.finish_and_clear();
    }
}
