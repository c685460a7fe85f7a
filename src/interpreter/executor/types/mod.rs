//! Type definitions for the executor

pub mod control;
pub mod phase;

pub use control::{Control, Frame, FrameKind};
pub use phase::{ForEachPhase, IfPhase, WhilePhase};
