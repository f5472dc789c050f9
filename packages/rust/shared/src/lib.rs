//! Shared types, error model, and configuration for RepoViz.
//!
//! This crate is the foundation depended on by all other RepoViz crates.
//! It provides:
//! - [`RepoVizError`], the unified error type
//! - Domain types ([`RepositoryDigest`], [`FileEntry`], boundary payloads)
//! - Configuration ([`AppConfig`], config loading, secret resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GithubConfig, OpenAiConfig, PipelineConfig, QuotaConfig, ServerConfig,
    StageOverride, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key, resolve_github_token,
};
pub use error::{RepoVizError, Result};
pub use types::{
    EntryKind, FileEntry, PromptProfile, ReasoningEffort, RepositoryDigest,
    VisualizationRequest, VisualizationResponse,
};
