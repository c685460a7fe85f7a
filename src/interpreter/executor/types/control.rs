//! Control flow and execution frame types

use super::phase::{ForEachPhase, IfPhase, WhilePhase};
use crate::interpreter::compiler::ast::NodeId;
use crate::interpreter::value::ArrayHandle;

/* ===================== Control Flow ===================== */

/// Pending control request raised by a command.
///
/// When control != None the interpreter unwinds frames before executing anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    #[default]
    None,
    Break,
    Continue,
    Return,
}

/* ===================== Frames ===================== */

/// Frame kind - the type and state of a node being executed
#[derive(Debug, Clone)]
pub enum FrameKind {
    /// Runs the children of a Begin, If, ElseIf or Else node in order.
    Block { idx: usize },
    Expr,
    If { phase: IfPhase },
    While { phase: WhilePhase },
    ForEach {
        phase: ForEachPhase,
        collection: Option<ArrayHandle>,
        position: usize,
    },
}

impl FrameKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, FrameKind::While { .. } | FrameKind::ForEach { .. })
    }
}

/// Execution frame - one per active node
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub node: NodeId,
}
