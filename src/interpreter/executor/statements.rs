//! Statement execution handlers
//!
//! Each handler performs one micro-step of its node and updates the frame stack.

use super::context::ExecutionContext;
use super::evaluate_node;
use super::types::{ForEachPhase, Frame, FrameKind, IfPhase, WhilePhase};
use crate::interpreter::compiler::ast::{Node, NodeId, NodeKind, SyntaxTree};
use crate::interpreter::errors::{EngineFault, RuntimeError, VmError};
use crate::interpreter::value::{ArrayHandle, Value};
use crate::interpreter::vm::Vm;

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/* ===================== Frame Management ===================== */

/// Push a frame for `id` with its initial phase.
pub fn push_node(
    ctx: &mut ExecutionContext,
    tree: &SyntaxTree,
    id: NodeId,
) -> Result<(), EngineFault> {
    let node = tree
        .get(id)
        .ok_or_else(|| EngineFault::new(format!("node {} does not exist", id.0)))?;

    let kind = match node.kind {
        NodeKind::Begin | NodeKind::ElseIf | NodeKind::Else => FrameKind::Block { idx: 0 },
        NodeKind::Expression => FrameKind::Expr,
        NodeKind::If { .. } => FrameKind::If {
            phase: IfPhase::Test { branch: 0 },
        },
        NodeKind::While => FrameKind::While {
            phase: WhilePhase::Test,
        },
        NodeKind::ForEach { .. } => FrameKind::ForEach {
            phase: ForEachPhase::Init,
            collection: None,
            position: 0,
        },
    };
    ctx.frames.push(Frame { kind, node: id });
    Ok(())
}

fn set_top(ctx: &mut ExecutionContext, kind: FrameKind) {
    if let Some(frame) = ctx.frames.last_mut() {
        frame.kind = kind;
    }
}

fn replace_top(ctx: &mut ExecutionContext, frame: Frame) {
    ctx.frames.pop();
    ctx.frames.push(frame);
}

fn condition(value: &Value, node: &Node, ctx: &ExecutionContext) -> Result<bool, VmError> {
    value.truth().ok_or_else(|| VmError::Runtime {
        program: ctx.program().name().to_string(),
        error: RuntimeError::new(
            node.line,
            format!("condition must be numeric, found {}", value.data_type()),
        ),
    })
}

/* ===================== Statement Handlers ===================== */

/// Run the next child of a Begin/If/ElseIf/Else body.
pub fn execute_block(
    ctx: &mut ExecutionContext,
    tree: &SyntaxTree,
    node: &Node,
    idx: usize,
) -> Result<Step, VmError> {
    let Some(&child) = node.children.get(idx) else {
        ctx.frames.pop();
        return Ok(Step::Continue);
    };

    set_top(ctx, FrameKind::Block { idx: idx + 1 });
    push_node(ctx, tree, child)?;
    Ok(Step::Continue)
}

pub fn execute_expression(
    vm: &mut Vm,
    ctx: &mut ExecutionContext,
    node: &Node,
) -> Result<Step, VmError> {
    evaluate_node(vm, ctx, node)?;
    ctx.frames.pop();
    Ok(Step::Continue)
}

/// Test one branch condition per step; the first true branch replaces the If frame.
pub fn execute_if(
    vm: &mut Vm,
    ctx: &mut ExecutionContext,
    tree: &SyntaxTree,
    if_id: NodeId,
    phase: IfPhase,
    else_ifs: &[NodeId],
    else_branch: Option<NodeId>,
) -> Result<Step, VmError> {
    let IfPhase::Test { branch } = phase;

    if branch > else_ifs.len() {
        match else_branch {
            Some(id) => replace_top(
                ctx,
                Frame {
                    kind: FrameKind::Block { idx: 0 },
                    node: id,
                },
            ),
            None => {
                ctx.frames.pop();
            }
        }
        return Ok(Step::Continue);
    }

    let branch_id = match branch {
        0 => if_id,
        k => else_ifs[k - 1],
    };
    let node = tree.node(branch_id);
    let value = evaluate_node(vm, ctx, node)?;

    if condition(&value, node, ctx)? {
        replace_top(
            ctx,
            Frame {
                kind: FrameKind::Block { idx: 0 },
                node: branch_id,
            },
        );
    } else {
        set_top(
            ctx,
            FrameKind::If {
                phase: IfPhase::Test { branch: branch + 1 },
            },
        );
    }
    Ok(Step::Continue)
}

pub fn execute_while(
    vm: &mut Vm,
    ctx: &mut ExecutionContext,
    tree: &SyntaxTree,
    node: &Node,
    phase: WhilePhase,
) -> Result<Step, VmError> {
    match phase {
        WhilePhase::Test => {
            let value = evaluate_node(vm, ctx, node)?;
            if condition(&value, node, ctx)? {
                set_top(
                    ctx,
                    FrameKind::While {
                        phase: WhilePhase::Body { idx: 0 },
                    },
                );
            } else {
                ctx.frames.pop();
            }
        }
        WhilePhase::Body { idx } => match node.children.get(idx) {
            Some(&child) => {
                set_top(
                    ctx,
                    FrameKind::While {
                        phase: WhilePhase::Body { idx: idx + 1 },
                    },
                );
                push_node(ctx, tree, child)?;
            }
            None => set_top(
                ctx,
                FrameKind::While {
                    phase: WhilePhase::Test,
                },
            ),
        },
    }
    Ok(Step::Continue)
}

/// ForEach over a shared array. Elements appended during iteration are visited.
#[allow(clippy::too_many_arguments)]
pub fn execute_foreach(
    vm: &mut Vm,
    ctx: &mut ExecutionContext,
    tree: &SyntaxTree,
    node: &Node,
    slot: usize,
    phase: ForEachPhase,
    collection: Option<ArrayHandle>,
    position: usize,
) -> Result<Step, VmError> {
    match phase {
        ForEachPhase::Init => {
            let value = evaluate_node(vm, ctx, node)?;
            let Some(array) = value.array().cloned() else {
                return Err(VmError::Runtime {
                    program: ctx.program().name().to_string(),
                    error: RuntimeError::new(
                        node.line,
                        format!("ForEach expects an array, found {}", value.data_type()),
                    ),
                });
            };
            set_top(
                ctx,
                FrameKind::ForEach {
                    phase: ForEachPhase::Next,
                    collection: Some(array),
                    position: 0,
                },
            );
        }
        ForEachPhase::Next => {
            let array = collection
                .ok_or_else(|| EngineFault::new("ForEach frame lost its collection"))?;
            let Some(element) = array.at(position) else {
                ctx.frames.pop();
                return Ok(Step::Continue);
            };

            let local = ctx
                .local_mut(slot)
                .ok_or_else(|| EngineFault::new(format!("iterator slot {} out of range", slot)))?;
            local.assign(&element);
            set_top(
                ctx,
                FrameKind::ForEach {
                    phase: ForEachPhase::Body { idx: 0 },
                    collection: Some(array),
                    position: position + 1,
                },
            );
        }
        ForEachPhase::Body { idx } => {
            let next = match node.children.get(idx) {
                Some(_) => ForEachPhase::Body { idx: idx + 1 },
                None => ForEachPhase::Next,
            };
            set_top(
                ctx,
                FrameKind::ForEach {
                    phase: next,
                    collection,
                    position,
                },
            );
            if let Some(&child) = node.children.get(idx) {
                push_node(ctx, tree, child)?;
            }
        }
    }
    Ok(Step::Continue)
}
