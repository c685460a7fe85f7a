//! Background scheduling
//!
//! Backgrounded contexts are resumed once per [`Vm::tick`](crate::interpreter::vm::Vm::tick).
//! A context starts a new run when its program's polling interval has elapsed since its
//! previous run started, then executes at most `step_budget` steps before parking until the
//! next tick.

use serde::Serialize;

use super::context::{ContextId, ExecutionContext};
use super::exec_loop::{run_with_budget, RunState};
use crate::interpreter::value::Value;
use crate::interpreter::vm::Vm;

/// Why a context left the background set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RetireReason {
    /// The script returned with its halt flag set.
    Halted,
    /// A runtime error, engine fault or global exception ended the run.
    Failed(String),
}

/// Outcome of one scheduler tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// Contexts whose run completed this tick, with the run's return value.
    pub completed: Vec<(ContextId, Option<Value>)>,
    /// Contexts that used up their step budget mid-run.
    pub parked: Vec<ContextId>,
    /// Contexts removed from the background set.
    pub retired: Vec<(ContextId, RetireReason)>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.completed.is_empty() && self.parked.is_empty() && self.retired.is_empty()
    }
}

/* ===================== Daemon ===================== */

/// Owner of every backgrounded context
#[derive(Debug, Default)]
pub struct BackgroundDaemon {
    contexts: Vec<ExecutionContext>,
}

impl BackgroundDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, context: ExecutionContext) {
        self.contexts.push(context);
    }

    pub fn remove(&mut self, id: ContextId) -> Option<ExecutionContext> {
        let idx = self.contexts.iter().position(|c| c.id() == id)?;
        Some(self.contexts.remove(idx))
    }

    pub fn get(&self, id: ContextId) -> Option<&ExecutionContext> {
        self.contexts.iter().find(|c| c.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionContext> {
        self.contexts.iter()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Moves the contexts out for a tick.
    pub(crate) fn take(&mut self) -> Vec<ExecutionContext> {
        std::mem::take(&mut self.contexts)
    }

    /// Puts ticked contexts back ahead of any added during the tick.
    pub(crate) fn restore(&mut self, mut contexts: Vec<ExecutionContext>) {
        contexts.append(&mut self.contexts);
        self.contexts = contexts;
    }
}

/* ===================== Tick ===================== */

fn is_due(ctx: &ExecutionContext) -> bool {
    ctx.runs() == 0 || ctx.elapsed() >= ctx.program().polling_interval()
}

/// Advance every context by `elapsed` seconds, running those that are due.
pub fn run_tick(vm: &mut Vm, contexts: &mut Vec<ExecutionContext>, elapsed: f64) -> TickReport {
    let mut report = TickReport::default();
    let budget = vm.config().step_budget;

    contexts.retain_mut(|ctx| {
        ctx.accumulate(elapsed);
        let id = ctx.id();

        if !ctx.is_running() && !is_due(ctx) {
            return true;
        }
        // Parked runs are checked too: their bytecode may have been invalidated since
        if !ctx.program().is_valid() {
            tracing::warn!(
                script = ctx.program().name(),
                resumed = ctx.is_running(),
                "Background script needs recompiling"
            );
            report.retired.push((
                id,
                RetireReason::Failed("program is no longer valid".to_string()),
            ));
            return false;
        }
        if !ctx.is_running() {
            if let Err(e) = ctx.begin_run() {
                tracing::error!(script = ctx.program().name(), "Couldn't start run: {}", e);
                report.retired.push((id, RetireReason::Failed(e.to_string())));
                return false;
            }
        }

        vm.enter_call();
        let outcome = run_with_budget(vm, ctx, budget);
        vm.leave_call();

        match outcome {
            Ok(RunState::Parked) => {
                report.parked.push(id);
                true
            }
            Ok(RunState::Finished) => {
                let value = ctx.take_return_value();
                if ctx.halt_requested() {
                    tracing::debug!(script = ctx.program().name(), "Background script halted");
                    report.retired.push((id, RetireReason::Halted));
                    false
                } else {
                    report.completed.push((id, value));
                    true
                }
            }
            Err(e) => {
                tracing::error!(
                    script = ctx.program().name(),
                    "Background script retired: {}",
                    e
                );
                report.retired.push((id, RetireReason::Failed(e.to_string())));
                false
            }
        }
    });

    report
}
