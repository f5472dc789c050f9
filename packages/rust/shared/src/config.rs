//! Application configuration for RepoViz.
//!
//! User config lives at `~/.repoviz/repoviz.toml`.
//! CLI flags override config file values, which override defaults.
//! Values are read once at startup and stay fixed for the process lifetime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RepoVizError, Result};
use crate::types::{PromptProfile, ReasoningEffort};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "repoviz.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".repoviz";

// ---------------------------------------------------------------------------
// Config structs (matching repoviz.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language-model provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Repository metadata fetcher settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Request admission limits.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Stage tuning.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[openai]` section. Any OpenAI-compatible chat-completions endpoint works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL, without the `/chat/completions` suffix.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used for every stage.
    #[serde(default = "default_model")]
    pub model: String,

    /// Transport timeout for a single model call.
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_openai_base_url(),
            model: default_model(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "o4-mini".into()
}
fn default_openai_timeout() -> u64 {
    300
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL.
    #[serde(default = "default_github_api")]
    pub api_base: String,

    /// Name of the env var holding an optional access token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            token_env: default_github_token_env(),
            timeout_secs: default_github_timeout(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".into()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_github_timeout() -> u64 {
    30
}

/// `[quota]` section: fixed-window limit per client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Requests admitted per identity per window.
    #[serde(default = "default_quota_limit")]
    pub limit: u32,

    /// Window length in seconds.
    #[serde(default = "default_quota_window")]
    pub window_secs: u64,
}

/// Longest accepted quota window (30 days).
pub const MAX_QUOTA_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Reject limits that would admit nothing or windows that cannot be timed.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(RepoVizError::config("quota.limit must be at least 1"));
        }
        if self.window_secs == 0 || self.window_secs > MAX_QUOTA_WINDOW_SECS {
            return Err(RepoVizError::config(format!(
                "quota.window_secs must be between 1 and {MAX_QUOTA_WINDOW_SECS}"
            )));
        }
        Ok(())
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: default_quota_limit(),
            window_secs: default_quota_window(),
        }
    }
}

fn default_quota_limit() -> u32 {
    5
}
fn default_quota_window() -> u64 {
    1800
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Prompt profile: "detailed" or "compact".
    #[serde(default)]
    pub profile: PromptProfile,

    /// Pause between consecutive stages.
    #[serde(default = "default_inter_stage_delay")]
    pub inter_stage_delay_ms: u64,

    /// Overrides for the explanation stage.
    #[serde(default, skip_serializing_if = "StageOverride::is_empty")]
    pub explain: StageOverride,

    /// Overrides for the component-mapping stage.
    #[serde(default, skip_serializing_if = "StageOverride::is_empty")]
    pub map: StageOverride,

    /// Overrides for the diagram stage.
    #[serde(default, skip_serializing_if = "StageOverride::is_empty")]
    pub diagram: StageOverride,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            profile: PromptProfile::default(),
            inter_stage_delay_ms: default_inter_stage_delay(),
            explain: StageOverride::default(),
            map: StageOverride::default(),
            diagram: StageOverride::default(),
        }
    }
}

fn default_inter_stage_delay() -> u64 {
    500
}

/// Per-stage tuning override; unset fields keep the profile's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl StageOverride {
    pub fn is_empty(&self) -> bool {
        self.effort.is_none() && self.max_output_tokens.is_none()
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.repoviz/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RepoVizError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.repoviz/repoviz.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| RepoVizError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| RepoVizError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.quota.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RepoVizError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RepoVizError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RepoVizError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the model API key from the env var named in the config.
pub fn resolve_api_key(config: &OpenAiConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RepoVizError::config(format!(
            "model API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read the optional GitHub token. Unauthenticated access works with lower rate limits.
pub fn resolve_github_token(config: &GithubConfig) -> Option<String> {
    std::env::var(&config.token_env)
        .ok()
        .filter(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("window_secs"));
        assert!(!toml_str.contains("[pipeline.explain]"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.quota.limit, 5);
        assert_eq!(parsed.quota.window(), Duration::from_secs(1800));
        assert_eq!(parsed.pipeline.inter_stage_delay_ms, 500);
        assert_eq!(parsed.pipeline.profile, PromptProfile::Detailed);
    }

    #[test]
    fn config_with_stage_overrides() {
        let toml_str = r#"
[quota]
limit = 10

[pipeline]
profile = "compact"
inter_stage_delay_ms = 0

[pipeline.diagram]
effort = "high"
max_output_tokens = 8000
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.quota.limit, 10);
        assert_eq!(config.quota.window_secs, 1800);
        assert_eq!(config.pipeline.profile, PromptProfile::Compact);
        assert_eq!(config.pipeline.diagram.effort, Some(ReasoningEffort::High));
        assert_eq!(config.pipeline.diagram.max_output_tokens, Some(8000));
        assert!(config.pipeline.explain.is_empty());
    }

    #[test]
    fn quota_bounds_are_validated() {
        assert!(QuotaConfig::default().validate().is_ok());

        let zero_limit = QuotaConfig {
            limit: 0,
            ..Default::default()
        };
        assert!(zero_limit.validate().unwrap_err().to_string().contains("quota.limit"));

        for window_secs in [0, u64::MAX] {
            let config = QuotaConfig {
                window_secs,
                ..Default::default()
            };
            assert!(config.validate().unwrap_err().to_string().contains("window_secs"));
        }
    }

    #[test]
    fn load_rejects_zero_quota_limit() {
        let path = std::env::temp_dir().join(format!("repoviz-quota-{}.toml", std::process::id()));
        std::fs::write(&path, "[quota]\nlimit = 0\n").expect("write temp config");

        let result = load_config_from(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(RepoVizError::Config { .. })));
    }

    #[test]
    fn api_key_validation() {
        let config = OpenAiConfig {
            // Unique env var name to avoid interfering with other tests
            api_key_env: "RV_TEST_NONEXISTENT_KEY_12345".into(),
            ..Default::default()
        };
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn missing_github_token_is_none() {
        let config = GithubConfig {
            token_env: "RV_TEST_NONEXISTENT_TOKEN_12345".into(),
            ..Default::default()
        };
        assert!(resolve_github_token(&config).is_none());
    }
}
