//! AG-UI event model and the per-run sequencer that turns provider stream
//! parts into a well-formed event sequence.
//!
//! Every run emits exactly one `RUN_STARTED` first and exactly one
//! `RUN_FINISHED` last, optionally preceded by a single `RUN_ERROR`. Text and
//! tool-call spans never overlap, and tool call ids are numbered `tc-1`,
//! `tc-2`, ... within a run.

mod events;
mod run_driver;
mod sequencer;

pub use events::{AssistantRole, ProtocolEvent};
pub use run_driver::{drive_run, RunOutcome, RunReport, RUN_TIMEOUT_CODE};
pub use sequencer::{RunEventSequencer, RunPhase};
