//! Local File Manager: `safeJoin`, multi-strategy patch matching, and the
//! non-sandbox backend for the file action family.

pub mod manager;
pub mod patch;
pub mod safe_path;

pub use manager::{
    EditOutcome, LocalFileManager, SearchHit, TreeEntry, DEFAULT_TREE_DEPTH, MAX_PATCH_BYTES,
    MAX_READ_BYTES, MAX_SEARCH_HITS, MAX_TREE_ENTRIES,
};
pub use patch::{extract_patch_target_paths, is_blocked_patch_path, match_and_replace, MatchAndReplaceResult, MatchKind};
pub use safe_path::safe_join;
