//! Entity identity: caller-owned store plus fuzzy linker
//!
//! The store is an explicit handle with caller-owned lifecycle (create it
//! per document, per session, or keep it across documents for tenant-wide
//! dedup). The linker assigns a stable entity id to each incoming surface,
//! merging variants of the same real-world entity.

mod judgment;
mod linker;
mod store;

pub use judgment::{Judgment, JudgmentCall, NoJudgment};
pub use linker::{EntityLinker, LabelThresholds, LinkInput, LinkedSurface, LinkerConfig};
pub use store::{EntityRecord, EntityStore, StoreStats};
