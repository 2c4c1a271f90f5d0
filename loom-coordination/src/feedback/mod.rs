//! Feedback Formatter: renders an `ActionResult` into the next user turn.

pub mod format;
pub mod hints;
pub mod truncate;

pub use format::format_observation;
pub use hints::remediation_hints;
pub use truncate::{truncate_bytes, truncate_build_output, BUILD_OUTPUT_LIMIT, COMMAND_STREAM_LIMIT, FILE_CONTENT_LIMIT};
