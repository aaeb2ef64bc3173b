//! Run execution for shipit.
//!
//! Evaluates the trigger, runs the setup stage (source checkout and version
//! derivation), then executes one build-and-push job per component. The
//! component jobs depend only on setup's completion and run concurrently.

pub mod checkout;
pub mod orchestrator;

pub use checkout::SourceTree;
pub use orchestrator::{ComponentOutcome, JobState, Orchestrator, RunEvent, RunResult};
