//! Structured records requested from the generation service.

use serde::{Deserialize, Serialize};

use crate::generation::{Field, FieldKind, Schema, StructuredOutput};
use crate::router::{Grade, Verdict};

/// First synthesis: the primary artifact plus its plain-language variant.
#[derive(Debug, Clone, Deserialize)]
pub struct Draft {
    pub translation: String,
    pub plaintext_translation: String,
}

impl StructuredOutput for Draft {
    const SCHEMA: Schema = Schema {
        name: "Draft",
        fields: &[
            Field::new("translation", FieldKind::String),
            Field::new("plaintext_translation", FieldKind::String),
        ],
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageCheck {
    pub is_target_language: bool,
    #[serde(default)]
    pub language_issues: String,
}

impl StructuredOutput for LanguageCheck {
    const SCHEMA: Schema = Schema {
        name: "LanguageCheck",
        fields: &[Field::new("is_target_language", FieldKind::Bool)],
    };
}

/// Combined content and structure grading.
#[derive(Debug, Clone, Deserialize)]
pub struct Evaluation {
    pub grade: Grade,
    pub format_matched: bool,
    pub feedback: String,
    #[serde(default)]
    pub format_issues: String,
}

impl StructuredOutput for Evaluation {
    const SCHEMA: Schema = Schema {
        name: "Evaluation",
        fields: &[
            Field::new("grade", FieldKind::String),
            Field::new("format_matched", FieldKind::Bool),
            Field::new("feedback", FieldKind::String),
        ],
    };
}

impl From<Evaluation> for Verdict {
    fn from(e: Evaluation) -> Self {
        let format_feedback = Some(e.format_issues).filter(|s| !s.trim().is_empty());
        Verdict {
            in_target_language: true,
            grade: e.grade,
            format_matched: e.format_matched,
            content_feedback: e.feedback,
            format_feedback,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatReview {
    pub format_matched: bool,
    #[serde(default)]
    pub feedback: String,
}

impl StructuredOutput for FormatReview {
    const SCHEMA: Schema = Schema {
        name: "FormatReview",
        fields: &[Field::new("format_matched", FieldKind::Bool)],
    };
}

/// A term extracted from an accepted translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    #[serde(alias = "tibetan_term")]
    pub source_term: String,
    pub translation: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub entity_category: String,
    #[serde(default)]
    pub commentary_reference: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlossaryExtraction {
    pub entries: Vec<GlossaryEntry>,
}

impl StructuredOutput for GlossaryExtraction {
    const SCHEMA: Schema = Schema {
        name: "GlossaryExtraction",
        fields: &[Field::new("entries", FieldKind::Array)],
    };
}
