mod correction;
mod json;
mod recovery;
mod subtask;

pub use correction::{CorrectionReport, DropReason};
pub use json::extract_json;
pub use recovery::{extract_candidates, recover_batch};
pub use subtask::{Subtask, SubtaskBatch, SubtaskStatus};
