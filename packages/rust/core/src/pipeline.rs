//! Three-stage generation pipeline: explanation → component mapping → diagram.
//!
//! Stages are plain [`StageDescriptor`] values run in order by one generic
//! sequencer. Each stage's extracted output is recorded in a [`StageContext`]
//! that later prompt builders read from, so stages can never overlap.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use repoviz_shared::{PipelineConfig, PromptProfile, ReasoningEffort, RepoVizError, Result, StageOverride};

use crate::extract::{extract_tagged_block, find_tagged_block, strip_diagram_fences};
use crate::llm::{ChatRequest, StageRunner};
use crate::prompts::{self, COMPONENT_MAPPING_TAG, EXPLANATION_TAG, PromptPair};
use crate::truncate::TruncatedDigest;

// ---------------------------------------------------------------------------
// Stage types
// ---------------------------------------------------------------------------

/// Identifies a stage in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Explain,
    Map,
    Diagram,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Map => "map",
            Self::Diagram => "diagram",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage's raw completion is reduced to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Content of the named tagged block, falling back to the trimmed text.
    Tagged(&'static str),
    /// Diagram text with fences and init directives removed.
    Diagram,
}

/// Builds the prompt pair for a stage from the profile and earlier outputs.
pub type PromptBuilder = fn(PromptProfile, &StageContext<'_>) -> PromptPair;

/// Everything the sequencer needs to run one stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub effort: Option<ReasoningEffort>,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
    pub output: OutputFormat,
    pub build_prompts: PromptBuilder,
}

impl StageDescriptor {
    fn apply(mut self, overrides: &StageOverride) -> Self {
        if let Some(effort) = overrides.effort {
            self.effort = Some(effort);
        }
        if let Some(tokens) = overrides.max_output_tokens {
            self.max_output_tokens = tokens;
        }
        self
    }
}

/// Verbatim model text and what was extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub raw: String,
    pub extracted: String,
}

/// The two artifacts handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    /// Mermaid text without fences or init directives.
    pub diagram_text: String,
    pub explanation_text: String,
}

/// Repository view plus outputs of the stages run so far.
#[derive(Debug)]
pub struct StageContext<'a> {
    pub digest: &'a TruncatedDigest,
    outputs: Vec<(Stage, StageOutput)>,
}

impl<'a> StageContext<'a> {
    pub fn new(digest: &'a TruncatedDigest) -> Self {
        Self {
            digest,
            outputs: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, raw: String, extracted: String) {
        self.outputs.push((stage, StageOutput { raw, extracted }));
    }

    pub fn stage_output(&self, stage: Stage) -> Option<&StageOutput> {
        self.outputs.iter().find(|(s, _)| *s == stage).map(|(_, o)| o)
    }

    /// Extracted output of `stage`, or `""` if it has not run.
    pub fn output(&self, stage: Stage) -> &str {
        self.stage_output(stage).map_or("", |o| o.extracted.as_str())
    }

    fn into_result(self) -> Result<PipelineResult> {
        let explanation_text = self.required(Stage::Explain)?;
        let diagram_text = self.required(Stage::Diagram)?;
        Ok(PipelineResult {
            diagram_text,
            explanation_text,
        })
    }

    fn required(&self, stage: Stage) -> Result<String> {
        self.stage_output(stage)
            .map(|o| o.extracted.clone())
            .ok_or_else(|| RepoVizError::config(format!("stage list has no {stage} stage")))
    }
}

// ---------------------------------------------------------------------------
// Stage lists
// ---------------------------------------------------------------------------

/// The stage list for a profile, with its default effort and budgets.
pub fn default_stages(profile: PromptProfile) -> Vec<StageDescriptor> {
    match profile {
        PromptProfile::Detailed => vec![
            StageDescriptor {
                stage: Stage::Explain,
                effort: Some(ReasoningEffort::Medium),
                max_output_tokens: 2000,
                temperature: None,
                output: OutputFormat::Tagged(EXPLANATION_TAG),
                build_prompts: prompts::explain,
            },
            StageDescriptor {
                stage: Stage::Map,
                effort: Some(ReasoningEffort::Low),
                max_output_tokens: 2000,
                temperature: None,
                output: OutputFormat::Tagged(COMPONENT_MAPPING_TAG),
                build_prompts: prompts::map,
            },
            StageDescriptor {
                stage: Stage::Diagram,
                effort: Some(ReasoningEffort::Low),
                max_output_tokens: 5000,
                temperature: None,
                output: OutputFormat::Diagram,
                build_prompts: prompts::diagram,
            },
        ],
        PromptProfile::Compact => vec![
            StageDescriptor {
                stage: Stage::Explain,
                effort: None,
                max_output_tokens: 2000,
                temperature: Some(0.2),
                output: OutputFormat::Tagged(EXPLANATION_TAG),
                build_prompts: prompts::explain,
            },
            StageDescriptor {
                stage: Stage::Map,
                effort: None,
                max_output_tokens: 1000,
                temperature: Some(0.2),
                output: OutputFormat::Tagged(COMPONENT_MAPPING_TAG),
                build_prompts: prompts::map,
            },
            StageDescriptor {
                stage: Stage::Diagram,
                effort: None,
                max_output_tokens: 3000,
                temperature: Some(0.3),
                output: OutputFormat::Diagram,
                build_prompts: prompts::diagram,
            },
        ],
    }
}

/// Runtime pipeline settings, merged from the config file.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub profile: PromptProfile,
    pub inter_stage_delay: Duration,
    pub stages: Vec<StageDescriptor>,
}

impl PipelineOptions {
    /// Defaults for `profile` with no inter-stage delay.
    pub fn for_profile(profile: PromptProfile) -> Self {
        Self {
            profile,
            inter_stage_delay: Duration::ZERO,
            stages: default_stages(profile),
        }
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        let stages = default_stages(config.profile)
            .into_iter()
            .map(|d| match d.stage {
                Stage::Explain => d.apply(&config.explain),
                Stage::Map => d.apply(&config.map),
                Stage::Diagram => d.apply(&config.diagram),
            })
            .collect();

        Self {
            profile: config.profile,
            inter_stage_delay: Duration::from_millis(config.inter_stage_delay_ms),
            stages,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for pipeline runs.
pub trait PipelineProgress: Send + Sync {
    /// Called before a stage's model call; `current` is 1-based.
    fn stage_started(&self, stage: Stage, current: usize, total: usize);
    /// Called after a stage's output has been extracted.
    fn stage_finished(&self, stage: Stage, output: &StageOutput);
}

/// No-op progress for headless/test usage.
pub struct SilentProgress;

impl PipelineProgress for SilentProgress {
    fn stage_started(&self, _stage: Stage, _current: usize, _total: usize) {}
    fn stage_finished(&self, _stage: Stage, _output: &StageOutput) {}
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Runs the stage list against one model.
#[derive(Clone)]
pub struct Pipeline {
    runner: StageRunner,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(runner: StageRunner, options: PipelineOptions) -> Self {
        Self { runner, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every stage in order. The first failure aborts the run and
    /// nothing produced before it is returned.
    #[instrument(skip_all, fields(repo = %digest.name, profile = ?self.options.profile))]
    pub async fn run(
        &self,
        digest: &TruncatedDigest,
        progress: &dyn PipelineProgress,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        let total = self.options.stages.len();
        let mut ctx = StageContext::new(digest);

        info!(
            files = digest.file_entries.len(),
            model = self.runner.model_id(),
            "starting pipeline"
        );

        for (i, desc) in self.options.stages.iter().enumerate() {
            if i > 0 && !self.options.inter_stage_delay.is_zero() {
                tokio::time::sleep(self.options.inter_stage_delay).await;
            }

            progress.stage_started(desc.stage, i + 1, total);
            let output = self.run_stage(desc, &ctx).await?;
            progress.stage_finished(desc.stage, &output);
            ctx.record(desc.stage, output.raw, output.extracted);
        }

        let result = ctx.into_result()?;

        info!(
            diagram_chars = result.diagram_text.len(),
            explanation_chars = result.explanation_text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline complete"
        );

        Ok(result)
    }

    async fn run_stage(&self, desc: &StageDescriptor, ctx: &StageContext<'_>) -> Result<StageOutput> {
        let PromptPair { system, user } = (desc.build_prompts)(self.options.profile, ctx);

        let request = ChatRequest {
            system_prompt: system,
            user_prompt: user,
            effort: desc.effort,
            max_output_tokens: desc.max_output_tokens,
            temperature: desc.temperature,
        };

        let raw = self
            .runner
            .run_request(&request)
            .await
            .inspect_err(|e| warn!(stage = %desc.stage, error = %e, "stage failed, aborting pipeline"))?;

        let extracted = match desc.output {
            OutputFormat::Tagged(tag) => {
                if find_tagged_block(&raw, tag).is_none_or(str::is_empty) {
                    warn!(stage = %desc.stage, tag, "tagged block missing, using raw output");
                }
                extract_tagged_block(&raw, tag)
            }
            OutputFormat::Diagram => {
                let diagram = strip_diagram_fences(&raw);
                if diagram.is_empty() {
                    warn!(stage = %desc.stage, "completion held no diagram text, aborting pipeline");
                    return Err(RepoVizError::upstream("diagram stage produced no diagram text"));
                }
                diagram
            }
        };

        Ok(StageOutput { raw, extracted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatModel;
    use crate::truncate::truncate;
    use async_trait::async_trait;
    use repoviz_shared::{FileEntry, RepositoryDigest};
    use std::sync::{Arc, Mutex};

    /// Replies with canned answers in order and records each request.
    struct ScriptedModel {
        replies: Mutex<Vec<Result<Option<String>>>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<Option<String>>>) -> Arc<Self> {
            let mut replies = replies;
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn ok(replies: &[&str]) -> Arc<Self> {
            Self::new(replies.iter().map(|r| Ok(Some(r.to_string()))).collect())
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> Result<Option<String>> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| panic!("unexpected extra model call"))
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl PipelineProgress for RecordingProgress {
        fn stage_started(&self, stage: Stage, current: usize, total: usize) {
            self.events.lock().unwrap().push(format!("start {stage} {current}/{total}"));
        }

        fn stage_finished(&self, stage: Stage, _output: &StageOutput) {
            self.events.lock().unwrap().push(format!("done {stage}"));
        }
    }

    fn three_file_digest() -> TruncatedDigest {
        truncate(&RepositoryDigest {
            name: "demo".into(),
            default_branch: "main".into(),
            file_entries: vec![
                FileEntry::directory("src"),
                FileEntry::file("src/main.rs"),
                FileEntry::file("src/lib.rs"),
                FileEntry::file("Cargo.toml"),
            ],
            readme_text: Some("A tiny demo tool.".into()),
            ..Default::default()
        })
    }

    fn pipeline(model: Arc<ScriptedModel>, profile: PromptProfile) -> Pipeline {
        Pipeline::new(StageRunner::new(model), PipelineOptions::for_profile(profile))
    }

    const MAPPING: &str = "1. Entry Point: src/main.rs\n2. Core Library: src/lib.rs\n3. Manifest: Cargo.toml";

    fn mapped_paths(mapping: &str) -> Vec<&str> {
        mapping
            .lines()
            .filter_map(|l| l.split_once(':').map(|(_, p)| p.trim()))
            .collect()
    }

    #[tokio::test]
    async fn runs_three_stages_in_order() {
        let mapping_reply = format!("<component_mapping>\n{MAPPING}\n</component_mapping>");
        let model = ScriptedModel::ok(&[
            "Thinking...\n<explanation>A CLI with a library core.</explanation>",
            mapping_reply.as_str(),
            "```mermaid\nflowchart TD\n  Main[\"Entry Point\"] --> Lib[\"Core Library\"]\n  Lib --> Manifest\n  \
             click Main \"src/main.rs\"\n  click Lib \"src/lib.rs\"\n  click Manifest \"Cargo.toml\"\n```",
        ]);
        let digest = three_file_digest();
        let progress = RecordingProgress {
            events: Mutex::new(Vec::new()),
        };

        let result = pipeline(model.clone(), PromptProfile::Detailed)
            .run(&digest, &progress)
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].system_prompt.contains("<explanation>"));
        assert!(requests[1].system_prompt.contains("<component_mapping>"));
        assert!(requests[2].system_prompt.contains("Mermaid"));

        // Outputs are threaded forward.
        assert!(requests[1].user_prompt.contains("A CLI with a library core."));
        assert!(requests[2].user_prompt.contains(MAPPING));

        assert_eq!(result.explanation_text, "A CLI with a library core.");
        assert!(result.diagram_text.starts_with("flowchart TD"));
        assert!(!result.diagram_text.contains("```"));
        for path in mapped_paths(MAPPING) {
            assert_eq!(
                result.diagram_text.matches(&format!("\"{path}\"")).count(),
                1,
                "one click directive for {path}"
            );
        }

        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                "start explain 1/3",
                "done explain",
                "start map 2/3",
                "done map",
                "start diagram 3/3",
                "done diagram"
            ]
        );
    }

    #[tokio::test]
    async fn detailed_profile_budgets() {
        let model = ScriptedModel::ok(&["e", "m", "flowchart TD"]);
        pipeline(model.clone(), PromptProfile::Detailed)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests[0].effort, Some(ReasoningEffort::Medium));
        assert_eq!(requests[1].effort, Some(ReasoningEffort::Low));
        let budgets: Vec<u32> = requests.iter().map(|r| r.max_output_tokens).collect();
        assert_eq!(budgets, vec![2000, 2000, 5000]);
        assert!(requests.iter().all(|r| r.temperature.is_none()));
    }

    #[tokio::test]
    async fn compact_profile_uses_temperature() {
        let model = ScriptedModel::ok(&["e", "m", "flowchart TD"]);
        pipeline(model.clone(), PromptProfile::Compact)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap();

        let requests = model.requests();
        assert!(requests.iter().all(|r| r.effort.is_none()));
        let budgets: Vec<u32> = requests.iter().map(|r| r.max_output_tokens).collect();
        assert_eq!(budgets, vec![2000, 1000, 3000]);
        assert_eq!(requests[2].temperature, Some(0.3));
    }

    #[tokio::test]
    async fn missing_tags_fall_back_to_raw_text() {
        let model = ScriptedModel::ok(&["  plain explanation  ", "Entry: src/main.rs", "flowchart TD"]);
        let result = pipeline(model.clone(), PromptProfile::Detailed)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.explanation_text, "plain explanation");
        assert!(model.requests()[2].user_prompt.contains("Entry: src/main.rs"));
    }

    #[tokio::test]
    async fn stage_failure_aborts_without_later_calls() {
        let model = ScriptedModel::new(vec![
            Ok(Some("<explanation>x</explanation>".into())),
            Err(RepoVizError::upstream("provider down")),
            Ok(Some("never".into())),
        ]);
        let err = pipeline(model.clone(), PromptProfile::Detailed)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoVizError::UpstreamGeneration(_)));
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_completion_aborts() {
        let model = ScriptedModel::new(vec![Ok(None)]);
        let err = pipeline(model.clone(), PromptProfile::Detailed)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoVizError::UpstreamGeneration(_)));
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn diagram_without_content_is_upstream_error() {
        for reply in ["```mermaid\n```", "```mermaid\n", "%%{init: {'theme':'dark'}}%%"] {
            let model = ScriptedModel::ok(&["e", "m", reply]);
            let err = pipeline(model.clone(), PromptProfile::Detailed)
                .run(&three_file_digest(), &SilentProgress)
                .await
                .unwrap_err();

            assert!(
                matches!(err, RepoVizError::UpstreamGeneration(_)),
                "{reply:?} gave {err:?}"
            );
            assert!(err.to_string().contains("no diagram text"));
            assert_eq!(model.requests().len(), 3);
        }
    }

    #[tokio::test]
    async fn inter_stage_delay_is_applied_between_stages() {
        let model = ScriptedModel::ok(&["e", "m", "flowchart TD"]);
        let mut options = PipelineOptions::for_profile(PromptProfile::Detailed);
        options.inter_stage_delay = Duration::from_millis(20);

        let start = Instant::now();
        Pipeline::new(StageRunner::new(model), options)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn options_apply_config_overrides() {
        let config = PipelineConfig {
            inter_stage_delay_ms: 250,
            diagram: StageOverride {
                effort: Some(ReasoningEffort::High),
                max_output_tokens: Some(9000),
            },
            ..Default::default()
        };
        let options = PipelineOptions::from(&config);

        assert_eq!(options.inter_stage_delay, Duration::from_millis(250));
        assert_eq!(options.stages[0].max_output_tokens, 2000);
        assert_eq!(options.stages[2].effort, Some(ReasoningEffort::High));
        assert_eq!(options.stages[2].max_output_tokens, 9000);
    }

    #[tokio::test]
    async fn stage_list_without_diagram_is_rejected() {
        let model = ScriptedModel::ok(&["e"]);
        let mut options = PipelineOptions::for_profile(PromptProfile::Detailed);
        options.stages.truncate(1);

        let err = Pipeline::new(StageRunner::new(model), options)
            .run(&three_file_digest(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no diagram stage"));
    }
}
