// reconstep/src/patch/mod.rs

//! Minimal optimistic persistence of a mutation: merge-patch diffing of a
//! resource's main fields and its status subtree.

pub mod engine;
pub mod merge;

pub use engine::{patch, PatchCycle, Patched};
pub use merge::{apply_merge_patch, create_merge_patch, FieldSnapshot};
