//! Stage Pipeline — research → gap analysis → compose.
//!
//! Flow: each stage builds its prompt from a fixed template, the run's
//! preferences and the verbatim outputs of every earlier stage, then makes one
//! model call. Stages run strictly in order; the first failure ends the run and
//! discards everything produced so far.
//!
//! No model, search or HTTP details live here: collaborators arrive as trait
//! objects, which keeps this module deterministic under test.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::LlmError;
use crate::search::{PageFetcher, SearchError, SearchProvider};

pub mod preferences;
pub mod prompts;
pub mod research;

pub use preferences::{ExperienceLevel, SalaryBand, SearchPreferences, WorkArrangement};

// ────────────────────────────────────────────────────────────────────────────
// Stages
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    GapAnalysis,
    Compose,
}

impl Stage {
    /// Execution order. Later stages depend on the outputs of earlier ones.
    pub const ALL: [Stage; 3] = [Stage::Research, Stage::GapAnalysis, Stage::Compose];

    pub fn key(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::GapAnalysis => "gap_analysis",
            Stage::Compose => "compose",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Research => "Job Opportunities",
            Stage::GapAnalysis => "Resume Match Analysis",
            Stage::Compose => "Application Documents",
        }
    }

    /// 1-based position in the run.
    pub fn number(self) -> usize {
        match self {
            Stage::Research => 1,
            Stage::GapAnalysis => 2,
            Stage::Compose => 3,
        }
    }

    pub fn from_key(key: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outputs
// ────────────────────────────────────────────────────────────────────────────

/// The full text produced by one stage. Consumed verbatim by later stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub stage: Stage,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub research: StageOutput,
    pub gap_analysis: StageOutput,
    pub compose: StageOutput,
    /// Report title followed by every stage output, in stage order.
    pub full_text: String,
    /// Informational: whether pages were fetched during research.
    pub deep_search: bool,
}

impl PipelineResult {
    pub fn output(&self, stage: Stage) -> &StageOutput {
        match stage {
            Stage::Research => &self.research,
            Stage::GapAnalysis => &self.gap_analysis,
            Stage::Compose => &self.compose,
        }
    }
}

/// Append-only record of the outputs produced so far in one run.
#[derive(Debug, Default)]
pub struct StageContext {
    outputs: Vec<StageOutput>,
}

impl StageContext {
    pub fn outputs(&self) -> &[StageOutput] {
        &self.outputs
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn push(&mut self, output: StageOutput) {
        debug_assert_eq!(
            output.stage,
            Stage::ALL[self.outputs.len()],
            "stages must complete in order"
        );
        self.outputs.push(output);
    }
}

fn synthesize_full_text<'a>(
    topic: &str,
    outputs: impl IntoIterator<Item = &'a StageOutput>,
) -> String {
    let mut text = format!("# Job Search Report: {topic}\n");
    for output in outputs {
        text.push_str(&format!(
            "\n## {}\n\n{}\n\n---\n",
            output.stage.label(),
            output.text.trim_end()
        ));
    }
    text
}

// ────────────────────────────────────────────────────────────────────────────
// Collaborator seams
// ────────────────────────────────────────────────────────────────────────────

/// A fully assembled prompt for one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompt {
    /// Persona and output rules.
    pub system: String,
    /// Task instructions, preferences, evidence and prior-stage context.
    pub task: String,
}

/// Hosted LLM completion service.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &StagePrompt) -> Result<String, LlmError>;
}

/// Handles for the external services used by one run.
pub struct Collaborators {
    pub model: Box<dyn CompletionModel>,
    pub search: Box<dyn SearchProvider>,
    pub fetcher: Box<dyn PageFetcher>,
}

/// Receives coarse progress; never sees partial stage content.
pub trait ProgressSink: Send + Sync {
    fn stage_started(&self, stage: Stage);
}

/// Progress sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage_started(&self, _stage: Stage) {}
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: search error: {source}")]
    Search {
        stage: Stage,
        #[source]
        source: SearchError,
    },

    #[error("{stage} stage failed: model error: {source}")]
    Model {
        stage: Stage,
        #[source]
        source: LlmError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Search { stage, .. } | PipelineError::Model { stage, .. } => *stage,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs all three stages and returns the finished result, or the first error.
pub async fn run_pipeline(
    preferences: &SearchPreferences,
    resume_text: &str,
    collaborators: &Collaborators,
    progress: &dyn ProgressSink,
) -> Result<PipelineResult, PipelineError> {
    let mut context = StageContext::default();

    let research = run_stage(
        Stage::Research,
        preferences,
        resume_text,
        collaborators,
        &context,
        progress,
    )
    .await?;
    context.push(research.clone());

    let gap_analysis = run_stage(
        Stage::GapAnalysis,
        preferences,
        resume_text,
        collaborators,
        &context,
        progress,
    )
    .await?;
    context.push(gap_analysis.clone());

    let compose = run_stage(
        Stage::Compose,
        preferences,
        resume_text,
        collaborators,
        &context,
        progress,
    )
    .await?;

    Ok(PipelineResult {
        full_text: synthesize_full_text(&preferences.topic, [&research, &gap_analysis, &compose]),
        research,
        gap_analysis,
        compose,
        deep_search: preferences.deep_search,
    })
}

async fn run_stage(
    stage: Stage,
    preferences: &SearchPreferences,
    resume_text: &str,
    collaborators: &Collaborators,
    context: &StageContext,
    progress: &dyn ProgressSink,
) -> Result<StageOutput, PipelineError> {
    progress.stage_started(stage);
    info!(
        "Stage {}/{}: {} for topic {:?}",
        stage.number(),
        Stage::ALL.len(),
        stage,
        preferences.topic
    );

    match stage {
        Stage::Research => research::run(preferences, collaborators, context).await,
        Stage::GapAnalysis | Stage::Compose => {
            let prompt =
                prompts::build_stage_prompt(stage, preferences, resume_text, None, context);
            invoke_stage(stage, &prompt, collaborators.model.as_ref()).await
        }
    }
}

/// The single generic stage call: one prompt in, one output (or error) out.
pub(crate) async fn invoke_stage(
    stage: Stage,
    prompt: &StagePrompt,
    model: &dyn CompletionModel,
) -> Result<StageOutput, PipelineError> {
    let text = model.complete(prompt).await.map_err(|source| {
        warn!("{stage} stage model call failed: {source}");
        PipelineError::Model { stage, source }
    })?;

    if text.trim().is_empty() {
        return Err(PipelineError::Model {
            stage,
            source: LlmError::EmptyContent,
        });
    }

    Ok(StageOutput { stage, text })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::testing::*;
    use super::*;
    use crate::search::FetchFailure;

    struct RecordingProgress(Arc<Mutex<Vec<Stage>>>);

    impl ProgressSink for RecordingProgress {
        fn stage_started(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    #[tokio::test]
    async fn test_backend_remote_run_populates_every_stage() {
        let model = RecordingModel::default();
        let collab = collaborators(
            model.clone(),
            FixedSearch::with_postings(3),
            FailingFetcher::new(FetchFailure::Forbidden),
        );

        let result = run_pipeline(&backend_remote(false), RESUME, &collab, &NoProgress)
            .await
            .unwrap();

        for stage in Stage::ALL {
            assert_eq!(result.output(stage).stage, stage);
            assert!(!result.output(stage).text.trim().is_empty());
        }
        assert!(!result.full_text.is_empty());
        assert!(!result.deep_search);
        assert_eq!(model.recorded().len(), 3);
    }

    #[tokio::test]
    async fn test_later_stages_see_all_prior_outputs_verbatim() {
        let model = RecordingModel::default();
        let collab = collaborators(
            model.clone(),
            FixedSearch::with_postings(2),
            FailingFetcher::new(FetchFailure::Forbidden),
        );

        let result = run_pipeline(&backend_remote(false), RESUME, &collab, &NoProgress)
            .await
            .unwrap();
        let prompts = model.recorded();

        // Research sees no stage output at all.
        assert!(!prompts[0].task.contains("marker-"));
        // Gap analysis sees research only.
        assert!(prompts[1].task.contains(&result.research.text));
        assert!(!prompts[1].task.contains(&result.compose.text));
        // Compose sees research and gap analysis.
        assert!(prompts[2].task.contains(&result.research.text));
        assert!(prompts[2].task.contains(&result.gap_analysis.text));
    }

    #[tokio::test]
    async fn test_identical_inputs_produce_identical_prompts() {
        let first = RecordingModel::default();
        let second = RecordingModel::default();
        for model in [&first, &second] {
            let collab = collaborators(
                model.clone(),
                FixedSearch::with_postings(2),
                FailingFetcher::new(FetchFailure::Timeout),
            );
            run_pipeline(&backend_remote(true), RESUME, &collab, &NoProgress)
                .await
                .unwrap();
        }
        assert_eq!(first.recorded(), second.recorded());
    }

    #[tokio::test]
    async fn test_failing_stage_yields_one_error_and_stops_the_run() {
        let model = RecordingModel::failing_on(2);
        let collab = collaborators(
            model.clone(),
            FixedSearch::with_postings(2),
            FailingFetcher::new(FetchFailure::Forbidden),
        );

        let err = run_pipeline(&backend_remote(false), RESUME, &collab, &NoProgress)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::GapAnalysis);
        assert!(err.to_string().contains("model exploded"));
        // Compose never ran.
        assert_eq!(model.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_search_ends_the_run_before_any_model_call() {
        let model = RecordingModel::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collab = Collaborators {
            model: Box::new(model.clone()),
            search: Box::new(FailingSearch),
            fetcher: Box::new(FailingFetcher::new(FetchFailure::Forbidden)),
        };

        let err = run_pipeline(
            &backend_remote(true),
            RESUME,
            &collab,
            &RecordingProgress(seen.clone()),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Search {
                stage: Stage::Research,
                source: SearchError::Api { status: 403, .. },
            }
        ));
        assert!(model.recorded().is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![Stage::Research]);
    }

    #[tokio::test]
    async fn test_deep_search_forbidden_everywhere_still_completes() {
        let model = RecordingModel::default();
        let fetcher = FailingFetcher::new(FetchFailure::Forbidden);
        let collab = collaborators(
            model.clone(),
            FixedSearch::with_postings(4),
            fetcher.clone(),
        );

        let result = run_pipeline(&backend_remote(true), RESUME, &collab, &NoProgress)
            .await
            .unwrap();

        assert!(result.deep_search);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 4);
        for i in 1..=4 {
            let notice = format!(
                "[Full posting unavailable for https://jobs.example.com/{i}: 403 Forbidden. Using search snippet only.]"
            );
            assert_eq!(result.research.text.matches(&notice).count(), 1);
        }
        assert_eq!(model.recorded().len(), 3);
        assert!(!result.compose.text.is_empty());
    }

    #[tokio::test]
    async fn test_progress_reports_each_stage_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collab = collaborators(
            RecordingModel::default(),
            FixedSearch::with_postings(1),
            FailingFetcher::new(FetchFailure::NotFound),
        );

        run_pipeline(
            &backend_remote(false),
            RESUME,
            &collab,
            &RecordingProgress(seen.clone()),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), Stage::ALL.to_vec());
    }

    #[test]
    fn test_full_text_lists_stages_in_order() {
        let outputs: Vec<StageOutput> = Stage::ALL
            .into_iter()
            .map(|stage| StageOutput {
                stage,
                text: format!("body of {stage}"),
            })
            .collect();
        let text = synthesize_full_text("Backend Engineer", &outputs);

        assert!(text.starts_with("# Job Search Report: Backend Engineer\n"));
        let research = text.find("body of research").unwrap();
        let gap = text.find("body of gap_analysis").unwrap();
        let compose = text.find("body of compose").unwrap();
        assert!(research < gap && gap < compose);
    }

    #[test]
    fn test_stage_keys_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_key(stage.key()), Some(stage));
        }
        assert_eq!(Stage::from_key("full"), None);
    }
}
