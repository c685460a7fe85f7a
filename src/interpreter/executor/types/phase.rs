//! Execution phase enums for structural statements
//!
//! A phase records which micro-step of a statement runs next, so a parked context resumes
//! exactly where it stopped.

/// Execution phase for If statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfPhase {
    /// Evaluating a branch condition. 0 is the If itself, `k` is the k-th ElseIf.
    Test { branch: usize },
}

/// Execution phase for While statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhilePhase {
    Test,
    Body { idx: usize },
}

/// Execution phase for ForEach statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachPhase {
    /// Evaluate the collection expression.
    Init,
    /// Bind the next element or finish.
    Next,
    Body { idx: usize },
}
