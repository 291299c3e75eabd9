use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::coordinator::ItemProcessor;
use crate::generation::{GenerationError, GenerationPort, structured};
use crate::pipeline::{
    AnalysisStage, Draft, Evaluation, FormatReview, GlossaryExtraction, LanguageCheck, PipelineSpec,
    prompts,
};
use crate::router::{ContentRouter, FormatRouter, Verdict};
use crate::state_machine::{ItemDelta, Stage, Step, WorkItem};

/// Iteration ceilings for the two correction loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationLimits {
    pub max_content_iterations: u32,
    pub max_format_iterations: u32,
}

impl Default for IterationLimits {
    fn default() -> Self {
        Self {
            max_content_iterations: 3,
            max_format_iterations: 1,
        }
    }
}

/// A stage failed after its immediate retry. Carries the item as it stood
/// so the failure log can show how far it got.
#[derive(Debug, Error)]
#[error("item {} failed at {stage}: {source}", .partial.index())]
pub struct ExecutionError {
    pub stage: Stage,
    #[source]
    pub source: GenerationError,
    pub partial: Box<WorkItem>,
}

/// Drives one work item through the stage graph to a terminal status.
pub struct StageGraphExecutor<'a, P> {
    port: &'a P,
    spec: &'a PipelineSpec,
    limits: IterationLimits,
    call_timeout: Duration,
}

impl<'a, P: GenerationPort> StageGraphExecutor<'a, P> {
    pub fn new(
        port: &'a P,
        spec: &'a PipelineSpec,
        limits: IterationLimits,
        call_timeout: Duration,
    ) -> Self {
        Self {
            port,
            spec,
            limits,
            call_timeout,
        }
    }

    fn content_router(&self) -> ContentRouter {
        ContentRouter {
            max_iterations: self.limits.max_content_iterations,
            require_format: !self.spec.graph().separate_format_loop,
        }
    }

    fn format_router(&self) -> FormatRouter {
        FormatRouter {
            max_iterations: self.limits.max_format_iterations,
        }
    }

    /// Run the item to acceptance (possibly forced) or to the first stage
    /// that fails twice in a row.
    pub async fn run(&self, mut item: WorkItem) -> Result<WorkItem, ExecutionError> {
        match self.drive(&mut item).await {
            Ok(()) => {
                item.accept();
                info!(
                    item = item.index(),
                    id = %item.id(),
                    forced = item.forced(),
                    content_iteration = item.content_iteration(),
                    format_iteration = item.format_iteration(),
                    versions = item.artifact_history().len(),
                    grade = ?item.final_verdict().map(|v| v.grade),
                    "item accepted"
                );
                Ok(item)
            }
            Err((stage, source)) => {
                warn!(item = item.index(), %stage, error = %source, "item execution failed");
                Err(ExecutionError {
                    stage,
                    source,
                    partial: Box::new(item),
                })
            }
        }
    }

    async fn drive(&self, item: &mut WorkItem) -> Result<(), (Stage, GenerationError)> {
        let graph = self.spec.graph();
        let mut stage = graph.entry(item);

        while stage != Stage::Done {
            item.record_stage(stage);
            debug!(item = item.index(), %stage, "entering stage");
            let step = self.execute(stage, item).await.map_err(|e| (stage, e))?;
            stage = graph.next(stage, step);
        }
        Ok(())
    }

    async fn execute(&self, stage: Stage, item: &mut WorkItem) -> Result<Step, GenerationError> {
        let step = match stage {
            Stage::FanOut => {
                let delta = self.fan_out(item).await?;
                if delta.is_empty() {
                    debug!(item = item.index(), "all analyses supplied");
                }
                item.apply(delta);
                Step::Advance
            }
            Stage::Aggregate => {
                let delta = self.aggregate(item).await?;
                item.apply(delta);
                Step::Advance
            }
            Stage::Synthesize => {
                let delta = self.synthesize(item).await?;
                item.apply(delta);
                Step::Advance
            }
            Stage::Evaluate => {
                let verdict = self.evaluate(item).await?;
                let route = self.content_router().route(item, verdict);
                debug!(item = item.index(), %route, iteration = item.content_iteration(), "content routed");
                Step::Routed(route)
            }
            Stage::FormatEvaluate => {
                let review = self.review_format(item).await?;
                let route = self
                    .format_router()
                    .route(item, review.format_matched, &review.feedback);
                debug!(item = item.index(), %route, iteration = item.format_iteration(), "format routed");
                Step::Routed(route)
            }
            Stage::FormatRepair => {
                let delta = self.repair_format(item).await?;
                item.apply(delta);
                Step::Advance
            }
            Stage::Enrich => {
                let delta = self.enrich(item).await;
                item.apply(delta);
                Step::Advance
            }
            Stage::Done => Step::Advance,
        };
        Ok(step)
    }

    /// Generate every missing analysis in one batched call. Supplied
    /// analyses pass through untouched.
    async fn fan_out(&self, item: &WorkItem) -> Result<ItemDelta, GenerationError> {
        let pending: Vec<&AnalysisStage> = self
            .spec
            .analyses
            .iter()
            .filter(|stage| stage.generated && !item.has_analysis(stage.key))
            .collect();
        if pending.is_empty() {
            return Ok(ItemDelta::default());
        }

        let batch: Vec<String> = pending
            .iter()
            .map(|stage| prompts::analysis(stage, item))
            .collect();
        let batch = batch.as_slice();
        let outputs = self.call(move || self.port.generate_batch(batch)).await?;
        if outputs.len() != pending.len() {
            return Err(GenerationError::malformed(
                "analysis batch",
                format!("expected {} outputs, got {}", pending.len(), outputs.len()),
            ));
        }

        let mut delta = ItemDelta::default();
        for (stage, text) in pending.into_iter().zip(outputs) {
            delta.analyses.insert(stage.key.to_string(), text);
        }
        Ok(delta)
    }

    /// Fan-in. None contributed: derive from the source alone. One: pass it
    /// through. Several: one combination call.
    async fn aggregate(&self, item: &WorkItem) -> Result<ItemDelta, GenerationError> {
        let contributions: Vec<(&AnalysisStage, &str)> = self
            .spec
            .analyses
            .iter()
            .filter_map(|stage| {
                item.analysis(stage.key)
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| (stage, text))
            })
            .collect();

        let merged = match contributions.as_slice() {
            [] => {
                let prompt = prompts::derive_from_source(self.spec.kind, item);
                let prompt = prompt.as_str();
                self.call(move || self.port.generate(prompt)).await?
            }
            [(_, only)] => only.to_string(),
            many => {
                let prompt = prompts::combine(self.spec.kind, item, many);
                let prompt = prompt.as_str();
                self.call(move || self.port.generate(prompt)).await?
            }
        };
        debug!(item = item.index(), contributions = contributions.len(), "aggregated analyses");
        Ok(ItemDelta::aggregate(merged))
    }

    async fn synthesize(&self, item: &WorkItem) -> Result<ItemDelta, GenerationError> {
        let kind = self.spec.kind;
        let (Some(latest), Some(feedback)) = (item.current_artifact(), item.feedback_history().last())
        else {
            let prompt = prompts::initial(kind, self.spec.plain_variant, item);
            let prompt = prompt.as_str();
            if self.spec.plain_variant {
                let draft = self.call(move || self.generate_draft(prompt)).await?;
                return Ok(ItemDelta {
                    artifact: Some(draft.translation.trim().to_string()),
                    plain_artifact: Some(draft.plaintext_translation.trim().to_string()),
                    ..Default::default()
                });
            }
            let text = self.call(move || self.generate_artifact(prompt)).await?;
            return Ok(ItemDelta::artifact(text));
        };

        let prompt = prompts::revise(kind, item, latest, feedback);
        let prompt = prompt.as_str();
        let text = self.call(move || self.generate_artifact(prompt)).await?;
        Ok(ItemDelta::artifact(text))
    }

    /// Language identity first; a mismatch short-circuits into a rejection.
    async fn evaluate(&self, item: &WorkItem) -> Result<Verdict, GenerationError> {
        let artifact = item.current_artifact().unwrap_or_default();

        let prompt = prompts::language_check(item, artifact);
        let prompt = prompt.as_str();
        let check: LanguageCheck = self.call(move || structured(self.port, prompt)).await?;
        if !check.is_target_language {
            debug!(item = item.index(), issues = %check.language_issues, "artifact not in target language");
            return Ok(Verdict::language_mismatch(
                item.target_language(),
                &check.language_issues,
            ));
        }

        let prompt = prompts::evaluation(self.spec.kind, item, artifact);
        let prompt = prompt.as_str();
        let evaluation: Evaluation = self.call(move || structured(self.port, prompt)).await?;
        Ok(evaluation.into())
    }

    async fn review_format(&self, item: &WorkItem) -> Result<FormatReview, GenerationError> {
        let artifact = item.current_artifact().unwrap_or_default();
        let prompt = prompts::format_review(item, artifact);
        let prompt = prompt.as_str();
        self.call(move || structured(self.port, prompt)).await
    }

    async fn repair_format(&self, item: &WorkItem) -> Result<ItemDelta, GenerationError> {
        let artifact = item.current_artifact().unwrap_or_default();
        let feedback = item
            .format_feedback_history()
            .last()
            .map(String::as_str)
            .unwrap_or_default();
        let prompt = prompts::format_repair(item, artifact, feedback);
        let prompt = prompt.as_str();
        let text = self.call(move || self.generate_artifact(prompt)).await?;
        Ok(ItemDelta::artifact(text))
    }

    /// Glossary extraction. Never fails the item: errors leave an empty glossary.
    async fn enrich(&self, item: &WorkItem) -> ItemDelta {
        let artifact = item.current_artifact().unwrap_or_default();
        let prompt = prompts::glossary(item, artifact);
        let prompt = prompt.as_str();
        match self
            .call(move || structured::<GlossaryExtraction, _>(self.port, prompt))
            .await
        {
            Ok(extraction) => {
                debug!(item = item.index(), entries = extraction.entries.len(), "glossary extracted");
                ItemDelta::enrichment(extraction.entries)
            }
            Err(error) => {
                warn!(item = item.index(), %error, "glossary extraction failed, continuing without it");
                ItemDelta::enrichment(Vec::new())
            }
        }
    }

    async fn generate_draft(&self, prompt: &str) -> Result<Draft, GenerationError> {
        let draft: Draft = structured(self.port, prompt).await?;
        non_empty("Draft", &draft.translation)?;
        Ok(draft)
    }

    async fn generate_artifact(&self, prompt: &str) -> Result<String, GenerationError> {
        let text = self.port.generate(prompt).await?;
        non_empty("artifact", &text)?;
        Ok(text.trim().to_string())
    }

    /// One service call with a timeout, retried once immediately on any failure.
    async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        match self.attempt(op()).await {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!(%error, kind = %error.kind(), "generation call failed, retrying once");
                self.attempt(op()).await
            }
        }
    }

    async fn attempt<T>(
        &self,
        fut: impl Future<Output = Result<T, GenerationError>>,
    ) -> Result<T, GenerationError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.call_timeout)),
        }
    }
}

fn non_empty(schema: &'static str, text: &str) -> Result<(), GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::malformed(schema, "empty output"))
    } else {
        Ok(())
    }
}

impl<P: GenerationPort> ItemProcessor for StageGraphExecutor<'_, P> {
    async fn process(&self, item: WorkItem) -> Result<WorkItem, ExecutionError> {
        self.run(item).await
    }
}
