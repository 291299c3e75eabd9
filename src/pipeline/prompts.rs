//! Prompt text for each stage. Kept deliberately plain; output-format
//! instructions for structured calls are appended by the schema.

use super::{AnalysisStage, PipelineKind};
use crate::state_machine::WorkItem;

fn artifact_noun(kind: PipelineKind) -> &'static str {
    match kind {
        PipelineKind::Translation => "translation",
        PipelineKind::SemanticGraph => "UCCA semantic graph",
        PipelineKind::Glossing => "word-by-word glossary",
    }
}

pub fn analysis(stage: &AnalysisStage, item: &WorkItem) -> String {
    match stage.key {
        "ucca" => format!(
            "You are an expert in UCCA (Universal Conceptual Cognitive Annotation).\n\
             Produce a UCCA analysis of the text below: identify parallel scenes, participants, \
             processes and their relations, one node per line with indentation showing nesting.\n\n\
             Text:\n{}",
            item.source()
        ),
        "word_by_word" => format!(
            "Give a word-by-word gloss of the text below in {}. One source word or particle per \
             line followed by its literal meaning.\n\nText:\n{}",
            item.target_language(),
            item.source()
        ),
        _ => format!(
            "Write a short {} for the text below, in {}.\n\nText:\n{}",
            stage.label.to_lowercase(),
            item.target_language(),
            item.source()
        ),
    }
}

/// Used by the aggregator when no analysis contributed anything.
pub fn derive_from_source(kind: PipelineKind, item: &WorkItem) -> String {
    format!(
        "No commentary is available for the text below. Write, in {}, a concise explanatory \
         commentary that clarifies its meaning, key terms and structure so that a {} can be \
         produced from it.\n\nText:\n{}",
        item.target_language(),
        artifact_noun(kind),
        item.source()
    )
}

pub fn combine(kind: PipelineKind, item: &WorkItem, contributions: &[(&AnalysisStage, &str)]) -> String {
    let mut inputs = String::new();
    for (stage, text) in contributions {
        inputs.push_str(&format!("{}:\n{}\n\n", stage.label, text.trim()));
    }
    format!(
        "Combine the analyses below into one coherent commentary in {} that will guide the \
         production of a {}. Resolve disagreements explicitly and keep every substantive \
         point.\n\nSource text:\n{}{}\n\n{}",
        item.target_language(),
        artifact_noun(kind),
        item.source(),
        parallel(item),
        inputs.trim_end()
    )
}

fn context(item: &WorkItem) -> &str {
    item.aggregate_input().unwrap_or("Not available.")
}

/// Key of the optional Sanskrit parallel. Quoted next to the source, never aggregated.
pub const SANSKRIT_KEY: &str = "sanskrit";

fn parallel(item: &WorkItem) -> String {
    match item.analysis(SANSKRIT_KEY).map(str::trim) {
        Some(text) if !text.is_empty() => format!("\n\nSanskrit text:\n{text}"),
        _ => String::new(),
    }
}

/// First synthesis. With `plain_variant` the response is a [`super::Draft`].
pub fn initial(kind: PipelineKind, plain_variant: bool, item: &WorkItem) -> String {
    let variant = if plain_variant {
        "\nAlso give a plain-language rendering that reads naturally for a modern reader \
         in `plaintext_translation`; put the faithful version in `translation`."
    } else {
        "\nReturn only the result, with no preamble."
    };
    format!(
        "Produce a {} of the source text in {}, guided by the commentary. Preserve the \
         source's line breaks and verse structure.{}\n\nSource text:\n{}{}\n\nCommentary:\n{}",
        artifact_noun(kind),
        item.target_language(),
        variant,
        item.source(),
        parallel(item),
        context(item)
    )
}

pub fn revise(kind: PipelineKind, item: &WorkItem, latest: &str, feedback: &str) -> String {
    format!(
        "Improve the {} below so that it addresses every point of the feedback. Keep it in {} \
         and preserve the source's structure. Return only the improved {}.\n\n\
         Source text:\n{}{}\n\nCommentary:\n{}\n\nCurrent {}:\n{}\n\nFeedback:\n{}",
        artifact_noun(kind),
        item.target_language(),
        artifact_noun(kind),
        item.source(),
        parallel(item),
        context(item),
        artifact_noun(kind),
        latest,
        feedback
    )
}

pub fn language_check(item: &WorkItem, artifact: &str) -> String {
    format!(
        "Is the text below written in {}? Set `is_target_language` accordingly and describe \
         any problem in `language_issues`.\n\nText:\n{}",
        item.target_language(),
        artifact
    )
}

pub fn evaluation(kind: PipelineKind, item: &WorkItem, artifact: &str) -> String {
    let previous = if item.feedback_history().is_empty() {
        "No prior feedback.".to_string()
    } else {
        item.feedback_history().join("\n")
    };
    format!(
        "Evaluate the {} below against the source and commentary.\n\
         - `grade`: one of \"bad\", \"okay\", \"good\", \"great\"\n\
         - `format_matched`: whether line breaks and structure match the source\n\
         - `feedback`: specific, actionable corrections\n\
         - `format_issues`: structural problems, empty if none\n\n\
         Source text:\n{}\n\nCommentary:\n{}\n\n{} ({}):\n{}\n\nPrevious feedback:\n{}",
        artifact_noun(kind),
        item.source(),
        context(item),
        artifact_noun(kind),
        item.target_language(),
        artifact,
        previous
    )
}

pub fn format_review(item: &WorkItem, artifact: &str) -> String {
    format!(
        "Compare the structure of the two texts below: line breaks, verse boundaries and \
         punctuation groupings. Set `format_matched` and explain mismatches in `feedback`.\n\n\
         Source text:\n{}\n\nCandidate:\n{}",
        item.source(),
        artifact
    )
}

pub fn format_repair(item: &WorkItem, artifact: &str, feedback: &str) -> String {
    format!(
        "Reformat the candidate so that its structure mirrors the source exactly. Do not change \
         its wording or language. Return only the reformatted text.\n\n\
         Source text:\n{}\n\nCandidate:\n{}\n\nIssues:\n{}",
        item.source(),
        artifact,
        feedback
    )
}

pub fn glossary(item: &WorkItem, artifact: &str) -> String {
    format!(
        "Extract the technical and philosophical terms from the source text with the exact \
         rendering used in the {} translation. For each entry give `source_term`, \
         `translation`, `context`, `entity_category` (blank when not an entity), \
         `commentary_reference` and `category`, all written in {}.\n\n\
         Source text:\n{}\n\nCommentary:\n{}\n\nTranslation:\n{}",
        item.target_language(),
        item.target_language(),
        item.source(),
        context(item),
        artifact
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_labels_each_contribution() {
        let item = WorkItem::new(0, "src", "English");
        let a = AnalysisStage {
            key: "ucca",
            label: "UCCA Analysis",
            generated: true,
        };
        let b = AnalysisStage {
            key: "commentary",
            label: "Commentary",
            generated: false,
        };
        let prompt = combine(PipelineKind::Translation, &item, &[(&a, "graph "), (&b, "notes")]);
        assert!(prompt.contains("UCCA Analysis:\ngraph"));
        assert!(prompt.contains("Commentary:\nnotes"));
    }

    #[test]
    fn evaluation_includes_previous_feedback() {
        let mut item = WorkItem::new(0, "src", "English");
        assert!(evaluation(PipelineKind::Translation, &item, "draft").contains("No prior feedback."));
        item.record_content_retry("Iteration 0 - Grade: bad".into(), None);
        assert!(evaluation(PipelineKind::Translation, &item, "draft").contains("Iteration 0 - Grade: bad"));
    }

    #[test]
    fn sanskrit_parallel_is_quoted_when_present() {
        let item = WorkItem::new(0, "src", "English").with_aggregate_input("notes");
        assert!(!initial(PipelineKind::Translation, true, &item).contains("Sanskrit text:"));

        let item = item.with_analysis(SANSKRIT_KEY, "bodhicitta");
        assert!(initial(PipelineKind::Translation, true, &item).contains("Sanskrit text:\nbodhicitta"));
        assert!(revise(PipelineKind::Translation, &item, "draft", "fix").contains("Sanskrit text:\nbodhicitta"));
    }

    #[test]
    fn initial_mentions_plain_variant_only_when_requested() {
        let item = WorkItem::new(0, "src", "German").with_aggregate_input("notes");
        assert!(initial(PipelineKind::Translation, true, &item).contains("plaintext_translation"));
        assert!(!initial(PipelineKind::Glossing, false, &item).contains("plaintext_translation"));
    }
}
