//! Core generation pipeline and domain logic for RepoViz.
//!
//! This crate takes a [`RepositoryDigest`](repoviz_shared::RepositoryDigest),
//! bounds it, runs the three model stages and hands back diagram text plus an
//! explanation (`VisualizeService::visualize`). Link rewriting happens later,
//! at presentation time.

pub mod extract;
pub mod links;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod quota;
pub mod service;
pub mod truncate;

pub use links::rewrite_click_directives;
pub use llm::{ChatModel, ChatRequest, OpenAiChatModel, StageRunner};
pub use pipeline::{
    Pipeline, PipelineOptions, PipelineProgress, PipelineResult, SilentProgress, Stage,
    StageOutput,
};
pub use quota::{Admission, MemoryQuotaStore, QuotaGate, QuotaPolicy, QuotaStore};
pub use service::VisualizeService;
pub use truncate::{TruncatedDigest, truncate};
