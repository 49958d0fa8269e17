//! kbanswer CLI: answer support questions from a local knowledge base.
//!
//! Finds the right KB article through the search API, reads it from the
//! local document folder, and asks a language model to answer from it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
