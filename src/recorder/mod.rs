//! Execution recording: steps, commands, checks, notes and the finalized
//! report model.

pub mod clock;
pub mod model;
#[allow(clippy::module_inception)]
pub mod recorder;

pub use clock::Clock;
pub use model::{CheckRecord, ExecutionReport, Note, NoteLevel, SetRecord, Step};
pub use recorder::ExecutionRecorder;
