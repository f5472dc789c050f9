//! Request-level entry point: quota, validation, then the pipeline.

use std::sync::Arc;

use tracing::{info, instrument};

use repoviz_shared::{
    AppConfig, RepoVizError, RepositoryDigest, Result, VisualizationRequest,
    VisualizationResponse,
};

use crate::llm::{OpenAiChatModel, StageRunner};
use crate::pipeline::{Pipeline, PipelineOptions, PipelineProgress, SilentProgress};
use crate::quota::{QuotaGate, QuotaPolicy};
use crate::truncate::truncate;

/// Serves visualization requests for many callers.
pub struct VisualizeService {
    gate: QuotaGate,
    pipeline: Pipeline,
}

impl VisualizeService {
    pub fn new(gate: QuotaGate, pipeline: Pipeline) -> Self {
        Self { gate, pipeline }
    }

    /// Wire up an OpenAI-backed service with an in-memory quota store.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let model = OpenAiChatModel::from_config(&config.openai)?;
        let pipeline = Pipeline::new(
            StageRunner::new(Arc::new(model)),
            PipelineOptions::from(&config.pipeline),
        );
        let gate = QuotaGate::in_memory(QuotaPolicy::from(&config.quota));
        Ok(Self::new(gate, pipeline))
    }

    pub fn gate(&self) -> &QuotaGate {
        &self.gate
    }

    pub async fn visualize(
        &self,
        identity: &str,
        request: VisualizationRequest,
    ) -> Result<VisualizationResponse> {
        self.visualize_with_progress(identity, request, &SilentProgress)
            .await
    }

    /// Admit, validate and run. Quota and validation failures happen before
    /// any model call.
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn visualize_with_progress(
        &self,
        identity: &str,
        request: VisualizationRequest,
        progress: &dyn PipelineProgress,
    ) -> Result<VisualizationResponse> {
        self.gate.require(identity)?;

        let digest = validate(request)?;
        let view = truncate(&digest);
        let result = self.pipeline.run(&view, progress).await?;

        info!(repo = %digest.name, "visualization generated");

        Ok(VisualizationResponse {
            analysis: analysis_html(&result.explanation_text),
            diagram: result.diagram_text,
            explanation: result.explanation_text,
        })
    }
}

fn validate(request: VisualizationRequest) -> Result<RepositoryDigest> {
    let digest = request
        .repository_data
        .ok_or_else(|| RepoVizError::invalid_input("repositoryData is required"))?;

    if digest.name.trim().is_empty() {
        return Err(RepoVizError::invalid_input("repositoryData.name must not be empty"));
    }
    Ok(digest)
}

/// HTML block shown next to the diagram.
pub fn analysis_html(explanation: &str) -> String {
    format!(
        "<h3>Architecture Explanation</h3><div>{}</div>",
        explanation.replace('\n', "<br/>")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatModel, ChatRequest};
    use async_trait::async_trait;
    use repoviz_shared::{FileEntry, PromptProfile};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers each stage by looking at its system prompt.
    struct StageAwareModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for StageAwareModel {
        async fn complete(&self, request: &ChatRequest) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = if request.system_prompt.contains("Mermaid") {
                "```mermaid\nflowchart TD\n  Api\n  click Api \"src/api.rs\"\n```"
            } else if request.system_prompt.contains("<component_mapping>") {
                "<component_mapping>\n1. Api: src/api.rs\n</component_mapping>"
            } else {
                "<explanation>Line one.\nLine two.</explanation>"
            };
            Ok(Some(reply.to_string()))
        }

        fn model_id(&self) -> &str {
            "stage-aware"
        }
    }

    fn service(limit: u32) -> (VisualizeService, Arc<StageAwareModel>) {
        let model = Arc::new(StageAwareModel {
            calls: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::new(
            StageRunner::new(model.clone()),
            PipelineOptions::for_profile(PromptProfile::Detailed),
        );
        let gate = QuotaGate::in_memory(QuotaPolicy {
            limit,
            window: Duration::from_secs(1800),
        });
        (VisualizeService::new(gate, pipeline), model)
    }

    fn request() -> VisualizationRequest {
        VisualizationRequest {
            repository_data: Some(RepositoryDigest {
                name: "demo".into(),
                file_entries: vec![FileEntry::file("src/api.rs")],
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn produces_diagram_explanation_and_analysis() {
        let (svc, model) = service(5);
        let resp = svc.visualize("1.2.3.4", request()).await.unwrap();

        assert_eq!(resp.explanation, "Line one.\nLine two.");
        assert_eq!(
            resp.analysis,
            "<h3>Architecture Explanation</h3><div>Line one.<br/>Line two.</div>"
        );
        assert_eq!(resp.diagram, "flowchart TD\n  Api\n  click Api \"src/api.rs\"");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn quota_rejection_happens_before_model_calls() {
        let (svc, model) = service(1);
        svc.visualize("client", request()).await.unwrap();

        let err = svc.visualize("client", request()).await.unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);

        // Other callers are unaffected.
        svc.visualize("other", request()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_repository_data_is_invalid() {
        let (svc, model) = service(5);
        let err = svc
            .visualize("x", VisualizationRequest { repository_data: None })
            .await
            .unwrap_err();

        assert!(matches!(err, RepoVizError::InvalidInput { .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_name_is_invalid() {
        let (svc, _) = service(5);
        let mut req = request();
        if let Some(d) = req.repository_data.as_mut() {
            d.name = "  ".into();
        }
        let err = svc.visualize("x", req).await.unwrap_err();
        assert!(matches!(err, RepoVizError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn invalid_requests_still_consume_quota() {
        let (svc, _) = service(1);
        let _ = svc
            .visualize("x", VisualizationRequest { repository_data: None })
            .await;
        let err = svc.visualize("x", request()).await.unwrap_err();
        assert!(err.is_quota_exceeded());
    }
}
