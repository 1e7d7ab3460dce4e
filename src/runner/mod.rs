mod classify;
mod orchestrator;
mod retry;
mod roles;

pub use orchestrator::{GenerationRequest, GenerationResult, OutputChannel, UnifiedRunner};
pub use roles::build_attempt_sequence;
