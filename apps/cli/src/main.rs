//! RepoViz CLI: architecture diagrams for GitHub repositories.
//!
//! Fetches a repository, runs the three-stage generation pipeline, and
//! prints or saves the resulting Mermaid diagram and explanation.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
