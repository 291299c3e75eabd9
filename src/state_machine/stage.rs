use std::fmt;

use serde::{Deserialize, Serialize};

use super::item::WorkItem;
use crate::router::Route;

/// The nodes of the stage graph.
///
/// A full run flows: FAN_OUT → AGGREGATE → SYNTHESIZE → EVALUATE, looping
/// back to SYNTHESIZE on rejection, then through the optional format loop and
/// enrichment to DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    FanOut,
    Aggregate,
    Synthesize,
    Evaluate,
    FormatEvaluate,
    FormatRepair,
    Enrich,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::FanOut => write!(f, "FAN_OUT"),
            Stage::Aggregate => write!(f, "AGGREGATE"),
            Stage::Synthesize => write!(f, "SYNTHESIZE"),
            Stage::Evaluate => write!(f, "EVALUATE"),
            Stage::FormatEvaluate => write!(f, "FORMAT_EVALUATE"),
            Stage::FormatRepair => write!(f, "FORMAT_REPAIR"),
            Stage::Enrich => write!(f, "ENRICH"),
            Stage::Done => write!(f, "DONE"),
        }
    }
}

/// What a stage reports back to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The stage finished; follow its single outgoing edge.
    Advance,
    /// An evaluating stage produced a routing decision.
    Routed(Route),
}

/// Edge table for one pipeline shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGraph {
    pub separate_format_loop: bool,
    pub enrichment: bool,
}

impl StageGraph {
    /// First stage for an item. Items that already carry an aggregate resume
    /// at synthesis.
    pub fn entry(&self, item: &WorkItem) -> Stage {
        if item.aggregate_input().is_some() {
            Stage::Synthesize
        } else {
            Stage::FanOut
        }
    }

    /// Compute the stage that follows `from` given what it reported.
    ///
    /// An evaluating stage that reports `Advance` is treated as accepted.
    pub fn next(&self, from: Stage, step: Step) -> Stage {
        let route = match step {
            Step::Advance => Route::Accept,
            Step::Routed(route) => route,
        };
        match from {
            Stage::FanOut => Stage::Aggregate,
            Stage::Aggregate => Stage::Synthesize,
            Stage::Synthesize => Stage::Evaluate,
            Stage::Evaluate => match route {
                Route::Retry => Stage::Synthesize,
                Route::Accept | Route::ForceAccept if self.separate_format_loop => {
                    Stage::FormatEvaluate
                }
                Route::Accept | Route::ForceAccept => self.finish(),
            },
            Stage::FormatEvaluate => match route {
                Route::Retry => Stage::FormatRepair,
                Route::Accept | Route::ForceAccept => self.finish(),
            },
            Stage::FormatRepair => Stage::FormatEvaluate,
            Stage::Enrich | Stage::Done => Stage::Done,
        }
    }

    fn finish(&self) -> Stage {
        if self.enrichment {
            Stage::Enrich
        } else {
            Stage::Done
        }
    }
}
