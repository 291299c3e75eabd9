//! Pipeline shapes.
//!
//! Content translation, semantic-graph refinement and word-level glossing
//! share one executor; a [`PipelineSpec`] says which analyses feed the
//! aggregator and which optional stages run.

mod outputs;
pub mod prompts;

use serde::{Deserialize, Serialize};

use crate::state_machine::StageGraph;

pub use outputs::{Draft, Evaluation, FormatReview, GlossaryEntry, GlossaryExtraction, LanguageCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    #[default]
    Translation,
    SemanticGraph,
    Glossing,
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineKind::Translation => write!(f, "translation"),
            PipelineKind::SemanticGraph => write!(f, "semantic-graph"),
            PipelineKind::Glossing => write!(f, "glossing"),
        }
    }
}

/// Whether format is judged inside the content evaluation or by its own loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatLoop {
    #[default]
    Integrated,
    Separate,
}

/// One fan-out stage feeding the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisStage {
    /// Key in the item's analyses and in input records.
    pub key: &'static str,
    /// Heading used when the aggregator combines contributions.
    pub label: &'static str,
    /// Generated when the input did not supply it; otherwise pass-through only.
    pub generated: bool,
}

impl AnalysisStage {
    const fn generated(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            generated: true,
        }
    }

    const fn supplied(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            generated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub kind: PipelineKind,
    pub analyses: Vec<AnalysisStage>,
    /// Iteration 0 also produces a plain-language variant.
    pub plain_variant: bool,
    pub format_loop: FormatLoop,
    /// Run glossary extraction after acceptance.
    pub enrichment: bool,
}

impl PipelineSpec {
    pub fn for_kind(kind: PipelineKind, format_loop: FormatLoop) -> Self {
        let spec = match kind {
            PipelineKind::Translation => Self::translation(),
            PipelineKind::SemanticGraph => Self::semantic_graph(),
            PipelineKind::Glossing => Self::glossing(),
        };
        Self { format_loop, ..spec }
    }

    pub fn translation() -> Self {
        Self {
            kind: PipelineKind::Translation,
            analyses: vec![
                AnalysisStage::generated("ucca", "UCCA Analysis"),
                AnalysisStage::generated("word_by_word", "Word-by-Word Translation"),
                AnalysisStage::supplied("multilevel_summary", "Multi-Level Summary"),
                AnalysisStage::supplied("commentary", "Commentary"),
                AnalysisStage::supplied("commentary_1", "Commentary 1"),
                AnalysisStage::supplied("commentary_2", "Commentary 2"),
                AnalysisStage::supplied("commentary_3", "Commentary 3"),
            ],
            plain_variant: true,
            format_loop: FormatLoop::Integrated,
            enrichment: true,
        }
    }

    pub fn semantic_graph() -> Self {
        Self {
            kind: PipelineKind::SemanticGraph,
            analyses: vec![
                AnalysisStage::supplied("commentary_1", "Commentary 1"),
                AnalysisStage::supplied("commentary_2", "Commentary 2"),
                AnalysisStage::supplied("commentary_3", "Commentary 3"),
            ],
            plain_variant: false,
            format_loop: FormatLoop::Integrated,
            enrichment: false,
        }
    }

    pub fn glossing() -> Self {
        Self {
            kind: PipelineKind::Glossing,
            analyses: vec![AnalysisStage::generated("ucca", "UCCA Interpretation")],
            plain_variant: false,
            format_loop: FormatLoop::Integrated,
            enrichment: false,
        }
    }

    pub fn graph(&self) -> StageGraph {
        StageGraph {
            separate_format_loop: self.format_loop == FormatLoop::Separate,
            enrichment: self.enrichment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_defaults() {
        let spec = PipelineSpec::translation();
        assert!(spec.plain_variant);
        assert!(spec.enrichment);
        let generated: Vec<&str> = spec.analyses.iter().filter(|a| a.generated).map(|a| a.key).collect();
        assert_eq!(generated, ["ucca", "word_by_word"]);
        assert!(spec.analyses.iter().any(|a| a.key == "multilevel_summary"));
        assert!(spec.analyses.iter().any(|a| a.key == "commentary_3"));
    }

    #[test]
    fn for_kind_applies_format_loop() {
        let spec = PipelineSpec::for_kind(PipelineKind::Translation, FormatLoop::Separate);
        assert_eq!(spec.format_loop, FormatLoop::Separate);
        assert!(spec.graph().separate_format_loop);
        assert!(spec.graph().enrichment);
    }

    #[test]
    fn glossing_has_single_analysis_and_no_enrichment() {
        let spec = PipelineSpec::for_kind(PipelineKind::Glossing, FormatLoop::Integrated);
        assert_eq!(spec.analyses.len(), 1);
        assert!(!spec.graph().enrichment);
    }

    #[test]
    fn kind_serde_uses_kebab_case() {
        let kind: PipelineKind = serde_json::from_str("\"semantic-graph\"").unwrap();
        assert_eq!(kind, PipelineKind::SemanticGraph);
        assert_eq!(kind.to_string(), "semantic-graph");
        let fl: FormatLoop = serde_json::from_str("\"separate\"").unwrap();
        assert_eq!(fl, FormatLoop::Separate);
    }
}
