use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::Stage;
use crate::pipeline::GlossaryEntry;
use crate::router::Verdict;

/// Lifecycle status of a work item. Transitions are one-directional:
/// `InProgress` → `Accepted` | `PermanentlyFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    InProgress,
    Accepted,
    PermanentlyFailed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemStatus::InProgress)
    }
}

/// The fields a single stage contributes. Merged into the item by
/// [`WorkItem::apply`]; histories are only ever appended to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDelta {
    pub analyses: BTreeMap<String, String>,
    pub aggregate_input: Option<String>,
    pub artifact: Option<String>,
    pub plain_artifact: Option<String>,
    pub enrichment: Option<Vec<GlossaryEntry>>,
}

impl ItemDelta {
    pub fn artifact(text: impl Into<String>) -> Self {
        Self {
            artifact: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn aggregate(text: impl Into<String>) -> Self {
        Self {
            aggregate_input: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn enrichment(entries: Vec<GlossaryEntry>) -> Self {
        Self {
            enrichment: Some(entries),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One document moving through the stage graph.
///
/// Owned by exactly one executor at a time. The iteration counters and the
/// feedback channels are advanced only by the routers in [`crate::router`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    id: Uuid,
    index: usize,
    source: String,
    target_language: String,
    #[serde(default)]
    analyses: BTreeMap<String, String>,
    aggregate_input: Option<String>,
    artifact_history: Vec<String>,
    plain_artifact: Option<String>,
    feedback_history: Vec<String>,
    format_feedback_history: Vec<String>,
    content_iteration: u32,
    format_iteration: u32,
    final_verdict: Option<Verdict>,
    status: ItemStatus,
    forced: bool,
    enrichment: Option<Vec<GlossaryEntry>>,
    stage_trail: Vec<Stage>,
    created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(index: usize, source: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            source: source.into(),
            target_language: target_language.into(),
            analyses: BTreeMap::new(),
            aggregate_input: None,
            artifact_history: Vec::new(),
            plain_artifact: None,
            feedback_history: Vec::new(),
            format_feedback_history: Vec::new(),
            content_iteration: 0,
            format_iteration: 0,
            final_verdict: None,
            status: ItemStatus::InProgress,
            forced: false,
            enrichment: None,
            stage_trail: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Pre-supplies an analysis so the fan-out stage passes it through.
    pub fn with_analysis(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.analyses.insert(key.into(), value.into());
        self
    }

    /// Pre-supplies the aggregate, resuming the item at synthesis.
    pub fn with_aggregate_input(mut self, value: impl Into<String>) -> Self {
        self.aggregate_input = Some(value.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn analysis(&self, key: &str) -> Option<&str> {
        self.analyses.get(key).map(String::as_str)
    }

    pub fn has_analysis(&self, key: &str) -> bool {
        self.analysis(key).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn aggregate_input(&self) -> Option<&str> {
        self.aggregate_input.as_deref()
    }

    pub fn artifact_history(&self) -> &[String] {
        &self.artifact_history
    }

    /// The latest artifact, if any generation has run.
    pub fn current_artifact(&self) -> Option<&str> {
        self.artifact_history.last().map(String::as_str)
    }

    pub fn plain_artifact(&self) -> Option<&str> {
        self.plain_artifact.as_deref()
    }

    pub fn feedback_history(&self) -> &[String] {
        &self.feedback_history
    }

    pub fn format_feedback_history(&self) -> &[String] {
        &self.format_feedback_history
    }

    pub fn content_iteration(&self) -> u32 {
        self.content_iteration
    }

    pub fn format_iteration(&self) -> u32 {
        self.format_iteration
    }

    pub fn final_verdict(&self) -> Option<&Verdict> {
        self.final_verdict.as_ref()
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// True when acceptance came from an iteration ceiling rather than a passing grade.
    pub fn forced(&self) -> bool {
        self.forced
    }

    pub fn enrichment(&self) -> Option<&[GlossaryEntry]> {
        self.enrichment.as_deref()
    }

    pub fn stage_trail(&self) -> &[Stage] {
        &self.stage_trail
    }

    /// Merge a stage's contribution. Existing analyses and an existing
    /// aggregate are never overwritten.
    pub fn apply(&mut self, delta: ItemDelta) {
        for (key, value) in delta.analyses {
            self.analyses.entry(key).or_insert(value);
        }
        if self.aggregate_input.is_none() {
            self.aggregate_input = delta.aggregate_input;
        }
        if let Some(artifact) = delta.artifact {
            self.artifact_history.push(artifact);
        }
        if delta.plain_artifact.is_some() {
            self.plain_artifact = delta.plain_artifact;
        }
        if delta.enrichment.is_some() {
            self.enrichment = delta.enrichment;
        }
    }

    pub(crate) fn record_stage(&mut self, stage: Stage) {
        self.stage_trail.push(stage);
    }

    pub(crate) fn record_content_retry(&mut self, feedback: String, format_feedback: Option<String>) {
        self.content_iteration += 1;
        self.feedback_history.push(feedback);
        if let Some(format_feedback) = format_feedback {
            self.format_feedback_history.push(format_feedback);
        }
    }

    pub(crate) fn record_format_retry(&mut self, feedback: String) {
        self.format_iteration += 1;
        self.format_feedback_history.push(feedback);
    }

    pub(crate) fn set_final_verdict(&mut self, verdict: Verdict) {
        self.final_verdict = Some(verdict);
    }

    pub(crate) fn mark_forced(&mut self) {
        self.forced = true;
    }

    /// Moves an in-progress item to `Accepted`. Returns false if the item
    /// already had a terminal status.
    pub fn accept(&mut self) -> bool {
        self.finish(ItemStatus::Accepted)
    }

    /// Moves an in-progress item to `PermanentlyFailed`. Returns false if the
    /// item already had a terminal status.
    pub fn fail(&mut self) -> bool {
        self.finish(ItemStatus::PermanentlyFailed)
    }

    fn finish(&mut self, status: ItemStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}
