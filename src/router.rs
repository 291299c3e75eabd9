use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state_machine::WorkItem;

/// Content grade assigned by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Bad,
    Okay,
    Good,
    Great,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Bad => write!(f, "bad"),
            Grade::Okay => write!(f, "okay"),
            Grade::Good => write!(f, "good"),
            Grade::Great => write!(f, "great"),
        }
    }
}

/// Structured result of evaluating the current artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub in_target_language: bool,
    pub grade: Grade,
    pub format_matched: bool,
    pub content_feedback: String,
    #[serde(default)]
    pub format_feedback: Option<String>,
}

impl Verdict {
    /// Forced rejection used when the artifact is not in the target language.
    pub fn language_mismatch(language: &str, issues: &str) -> Self {
        Self {
            in_target_language: false,
            grade: Grade::Bad,
            format_matched: false,
            content_feedback: format!("WRONG LANGUAGE: Translation is not in {language}. {issues}")
                .trim_end()
                .to_string(),
            format_feedback: None,
        }
    }

    /// Human-readable history entry for this verdict at `iteration`.
    pub fn feedback_entry(&self, iteration: u32) -> String {
        if !self.in_target_language {
            return format!(
                "Iteration {iteration} - LANGUAGE ERROR\n\
                 In Target Language: false\n\
                 Language Issues: {}\n",
                self.content_feedback
            );
        }
        let mut entry = format!(
            "Iteration {iteration} - Grade: {}\n\
             In Target Language: true\n\
             Format Matched: {}\n",
            self.grade, self.format_matched
        );
        if let Some(issues) = self.format_issues() {
            entry.push_str(&format!("Format Issues: {issues}\n"));
        }
        entry.push_str(&format!("Content Feedback: {}\n", self.content_feedback));
        entry
    }

    fn format_issues(&self) -> Option<&str> {
        self.format_feedback
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Decision produced after each evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Accept,
    Retry,
    ForceAccept,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Accept => write!(f, "Accepted"),
            Route::Retry => write!(f, "Rejected + Feedback"),
            Route::ForceAccept => write!(f, "Force accepted"),
        }
    }
}

/// The shared decision table: a passing evaluation accepts, otherwise the
/// iteration ceiling decides between another attempt and a forced accept.
pub fn decide(passed: bool, iteration: u32, max_iterations: u32) -> Route {
    if passed {
        Route::Accept
    } else if iteration >= max_iterations {
        Route::ForceAccept
    } else {
        Route::Retry
    }
}

/// Routes content evaluations. When format is judged by a separate loop the
/// content router ignores `format_matched`.
#[derive(Debug, Clone, Copy)]
pub struct ContentRouter {
    pub max_iterations: u32,
    pub require_format: bool,
}

impl ContentRouter {
    pub fn passes(&self, verdict: &Verdict) -> bool {
        verdict.in_target_language
            && verdict.grade == Grade::Great
            && (verdict.format_matched || !self.require_format)
    }

    /// Decide and apply: on `Retry` the item's content iteration is bumped
    /// and exactly one feedback entry appended. Accepting verdicts are kept
    /// as the item's final verdict instead.
    pub fn route(&self, item: &mut WorkItem, verdict: Verdict) -> Route {
        let iteration = item.content_iteration();
        let route = decide(self.passes(&verdict), iteration, self.max_iterations);
        match route {
            Route::Retry => {
                let entry = verdict.feedback_entry(iteration);
                let format_feedback = if self.require_format {
                    verdict.format_issues().map(str::to_string)
                } else {
                    None
                };
                item.record_content_retry(entry, format_feedback);
            }
            Route::ForceAccept => {
                item.mark_forced();
                item.set_final_verdict(verdict);
            }
            Route::Accept => item.set_final_verdict(verdict),
        }
        route
    }
}

/// Routes structural-only reviews in pipelines with a separate format loop.
#[derive(Debug, Clone, Copy)]
pub struct FormatRouter {
    pub max_iterations: u32,
}

impl FormatRouter {
    pub fn route(&self, item: &mut WorkItem, format_matched: bool, feedback: &str) -> Route {
        let route = decide(format_matched, item.format_iteration(), self.max_iterations);
        match route {
            Route::Retry => item.record_format_retry(format!("Formatting issue: {}", feedback.trim())),
            Route::ForceAccept => item.mark_forced(),
            Route::Accept => {}
        }
        route
    }
}
