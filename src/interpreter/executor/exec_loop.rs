//! Core execution loop
//!
//! `step()` processes one frame at a time, advancing execution phases and managing the frame
//! stack. The drivers call it until the run completes or a step budget is used up.
//!
//! ## Function Organization
//! 1. run_until_done() / run_with_budget() - drivers (call step repeatedly)
//! 2. step() - dispatches the top frame to its statement handler
//! 3. unwind() - applies pending Break/Continue/Return requests

use std::rc::Rc;

use super::context::ExecutionContext;
use super::statements::{
    execute_block, execute_expression, execute_foreach, execute_if, execute_while, Step,
};
use super::types::{Control, ForEachPhase, FrameKind, WhilePhase};
use crate::interpreter::compiler::ast::{NodeKind, SyntaxTree};
use crate::interpreter::errors::{EngineFault, RuntimeError, VmError};
use crate::interpreter::vm::Vm;

/// How a driver call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The run completed; the return value (if any) is waiting in the context.
    Finished,
    /// The step budget ran out; the context resumes on the next call.
    Parked,
}

/* ===================== Public API ===================== */

/// Run the context's current run to completion.
pub fn run_until_done(vm: &mut Vm, ctx: &mut ExecutionContext) -> Result<(), VmError> {
    run_with_budget(vm, ctx, 0).map(|_| ())
}

/// Run at most `budget` steps (0 means unlimited).
///
/// A failing step aborts the run, leaving the context ready for a fresh `begin_run`.
pub fn run_with_budget(
    vm: &mut Vm,
    ctx: &mut ExecutionContext,
    budget: usize,
) -> Result<RunState, VmError> {
    let mut steps = 0usize;
    loop {
        match step(vm, ctx) {
            Ok(Step::Continue) => {
                steps += 1;
                if budget > 0 && steps >= budget {
                    return Ok(RunState::Parked);
                }
            }
            Ok(Step::Done) => {
                ctx.finish_run();
                return Ok(RunState::Finished);
            }
            Err(e) => {
                ctx.abort();
                return Err(e);
            }
        }
    }
}

/// Execute one step of the context
///
/// 1. Stops if a global exception was raised anywhere in the call chain
/// 2. Unwinds if a control request is pending
/// 3. Otherwise dispatches the top frame on its kind and node
pub fn step(vm: &mut Vm, ctx: &mut ExecutionContext) -> Result<Step, VmError> {
    if vm.global_exception_raised() {
        return Err(VmError::GlobalException(ctx.program().name().to_string()));
    }

    let program = Rc::clone(ctx.program());
    let tree = program
        .tree()
        .ok_or_else(|| EngineFault::new("program has no syntax tree"))?;

    if ctx.control != Control::None {
        return unwind(ctx, tree);
    }

    let Some(frame) = ctx.frames.last().cloned() else {
        return Ok(Step::Done);
    };
    let node = tree
        .get(frame.node)
        .ok_or_else(|| EngineFault::new(format!("node {} does not exist", frame.node.0)))?;

    match (frame.kind, &node.kind) {
        (
            FrameKind::Block { idx },
            NodeKind::Begin | NodeKind::If { .. } | NodeKind::ElseIf | NodeKind::Else,
        ) => execute_block(ctx, tree, node, idx),

        (FrameKind::Expr, NodeKind::Expression) => execute_expression(vm, ctx, node),

        (
            FrameKind::If { phase },
            NodeKind::If {
                else_ifs,
                else_branch,
            },
        ) => execute_if(vm, ctx, tree, frame.node, phase, else_ifs, *else_branch),

        (FrameKind::While { phase }, NodeKind::While) => {
            execute_while(vm, ctx, tree, node, phase)
        }

        (
            FrameKind::ForEach {
                phase,
                collection,
                position,
            },
            NodeKind::ForEach { slot, .. },
        ) => execute_foreach(vm, ctx, tree, node, *slot, phase, collection, position),

        (kind, node_kind) => Err(EngineFault::new(format!(
            "frame {:?} does not match node {:?} at line {}",
            kind, node_kind, node.line
        ))
        .into()),
    }
}

/* ===================== Control Flow ===================== */

/// Apply the pending control request.
///
/// - Return: drops every frame and ends the run
/// - Break: pops frames up to and including the innermost loop
/// - Continue: pops frames above the innermost loop and restarts its next iteration
fn unwind(ctx: &mut ExecutionContext, tree: &SyntaxTree) -> Result<Step, VmError> {
    match ctx.control {
        Control::None => Err(EngineFault::new("unwind called without a control request").into()),

        Control::Return => {
            ctx.frames.clear();
            Ok(Step::Done)
        }

        Control::Break | Control::Continue => {
            let Some(idx) = ctx.frames.iter().rposition(|f| f.kind.is_loop()) else {
                let line = ctx
                    .frames
                    .last()
                    .and_then(|f| tree.get(f.node))
                    .map_or(0, |n| n.line);
                let name = if ctx.control == Control::Break {
                    "Break"
                } else {
                    "Continue"
                };
                return Err(VmError::Runtime {
                    program: ctx.program().name().to_string(),
                    error: RuntimeError::new(line, format!("{} called outside a loop", name)),
                });
            };

            if ctx.control == Control::Break {
                ctx.frames.truncate(idx);
            } else {
                ctx.frames.truncate(idx + 1);
                let frame = &mut ctx.frames[idx];
                frame.kind = match std::mem::replace(&mut frame.kind, FrameKind::Expr) {
                    FrameKind::While { .. } => FrameKind::While {
                        phase: WhilePhase::Test,
                    },
                    FrameKind::ForEach {
                        collection,
                        position,
                        ..
                    } => FrameKind::ForEach {
                        phase: ForEachPhase::Next,
                        collection,
                        position,
                    },
                    other => other,
                };
            }
            ctx.control = Control::None;
            Ok(Step::Continue)
        }
    }
}
