//! Timeline construction: the common item model, per-platform normalizers,
//! and the assembler that turns items into date-grouped entries.

pub mod assemble;
pub mod item;
pub mod normalize;

pub use assemble::assemble;
pub use item::{
    CommitGroup, DateGroup, ItemPayload, TimelineArtifact, TimelineEntry, TimelineItem,
};
pub use normalize::normalize;
