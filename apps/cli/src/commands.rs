//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use repoviz_core::{
    PipelineProgress, Stage, StageOutput, VisualizeService, rewrite_click_directives,
};
use repoviz_github::{GithubClient, parse_repo_url};
use repoviz_shared::{
    AppConfig, PromptProfile, VisualizationRequest, init_config, load_config, load_config_from,
};

/// Quota identity for local runs.
const LOCAL_IDENTITY: &str = "local";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RepoViz: architecture diagrams from GitHub repositories.
#[derive(Parser)]
#[command(
    name = "repoviz",
    version,
    about = "Generate architecture diagrams and explanations for GitHub repositories.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.repoviz/repoviz.toml).
    #[arg(long, env = "REPOVIZ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

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
    /// Fetch a repository and generate its diagram and explanation.
    Visualize {
        /// GitHub repository URL.
        url: String,

        /// Write a JSON report here instead of printing to stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Prompt profile: detailed or compact (overrides config).
        #[arg(short, long)]
        profile: Option<PromptProfile>,
    },

    /// Turn path-only click directives in a diagram into GitHub links.
    Rewrite {
        /// Repository URL the paths are relative to.
        #[arg(long)]
        repo_url: String,

        /// Branch to link to.
        #[arg(long, default_value = "main")]
        branch: String,

        /// Diagram file (reads stdin when omitted).
        file: Option<PathBuf>,
    },

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

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// clean for diagrams.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        // Target prefixes: `repoviz` also covers `repoviz_core` and `repoviz_github`.
        0 => "repoviz=info",
        1 => "repoviz=debug",
        _ => "repoviz=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Visualize { url, out, profile } => {
            cmd_visualize(config_path, &url, out.as_deref(), profile).await
        }
        Command::Rewrite {
            repo_url,
            branch,
            file,
        } => cmd_rewrite(&repo_url, &branch, file.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// visualize
// ---------------------------------------------------------------------------

/// JSON report written by `visualize --out`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    id: Uuid,
    name: String,
    html_url: String,
    default_branch: String,
    profile: PromptProfile,
    generated_at: DateTime<Utc>,
    diagram: String,
    explanation: String,
}

async fn cmd_visualize(
    config_path: Option<&Path>,
    url: &str,
    out: Option<&Path>,
    profile: Option<PromptProfile>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(profile) = profile {
        config.pipeline.profile = profile;
    }

    let repo = parse_repo_url(url)?;
    // Fail on a missing API key before any network traffic.
    let service = VisualizeService::from_config(&config)?;
    let github = GithubClient::from_config(&config.github)?;

    info!(%repo, profile = ?config.pipeline.profile, "visualizing repository");

    let progress = CliProgress::new();
    progress.spinner.set_message(format!("Fetching {repo}"));
    let digest = github
        .fetch_repository(&repo)
        .await
        .inspect_err(|_| progress.spinner.finish_and_clear())?;

    let html_url = digest.html_url.clone().unwrap_or_else(|| repo.html_url());
    let default_branch = digest.default_branch.clone();
    let name = digest.name.clone();

    let response = service
        .visualize_with_progress(
            LOCAL_IDENTITY,
            VisualizationRequest {
                repository_data: Some(digest),
            },
            &progress,
        )
        .await;
    progress.spinner.finish_and_clear();
    let response = response?;

    let diagram = rewrite_click_directives(&response.diagram, &html_url, &default_branch);

    match out {
        Some(path) => {
            let report = Report {
                id: Uuid::now_v7(),
                name,
                html_url,
                default_branch,
                profile: config.pipeline.profile,
                generated_at: Utc::now(),
                diagram,
                explanation: response.explanation,
            };
            write_report(path, &report)?;
            println!("Report written to: {}", path.display());
        }
        None => {
            println!("# {name}");
            println!();
            println!("{}", response.explanation);
            println!();
            println!("```mermaid");
            println!("{diagram}");
            println!("```");
        }
    }

    Ok(())
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("cannot create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).wrap_err_with(|| format!("cannot write {}", path.display()))?;
    Ok(())
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl PipelineProgress for CliProgress {
    fn stage_started(&self, stage: Stage, current: usize, total: usize) {
        let label = match stage {
            Stage::Explain => "Explaining architecture",
            Stage::Map => "Mapping components to paths",
            Stage::Diagram => "Drawing diagram",
        };
        self.spinner.set_message(format!("[{current}/{total}] {label}"));
    }

    fn stage_finished(&self, stage: Stage, output: &StageOutput) {
        debug!(%stage, chars = output.extracted.len(), "stage finished");
    }
}

// ---------------------------------------------------------------------------
// rewrite / config
// ---------------------------------------------------------------------------

fn cmd_rewrite(repo_url: &str, branch: &str, file: Option<&Path>) -> Result<()> {
    let diagram = match file {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    if diagram.trim().is_empty() {
        return Err(eyre!("no diagram text to rewrite"));
    }

    print!("{}", rewrite_click_directives(&diagram, repo_url, branch));
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
