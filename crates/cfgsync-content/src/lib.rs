//! Text-preserving manifest editing and record diffing for cfgsync
//!
//! - [`list_block`]: merge entries into a top-level YAML list while keeping
//!   the rest of the file byte-for-byte
//! - [`diff`]: path-level and textual diffs between two records, used to
//!   preview pending changes

pub mod diff;
pub mod error;
pub mod list_block;

pub use diff::{SemanticChange, SemanticDiff, unified_yaml_diff};
pub use error::{Error, Result};
pub use list_block::{ListBlock, ListMerge, locate_list_block, merge_list_entries};
