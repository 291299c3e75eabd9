mod item;
mod stage;

pub use item::{ItemDelta, ItemStatus, WorkItem};
pub use stage::{Stage, StageGraph, Step};
