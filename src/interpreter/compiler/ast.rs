//! Abstract Syntax Tree node types
//!
//! Nodes live in an arena owned by the [`SyntaxTree`] and refer to each other by [`NodeId`].
//! Interpreter frames hold ids rather than references, which keeps a parked execution context
//! free of borrows into its program.

use serde::Serialize;

use crate::interpreter::engine::ByteCode;

/// Index of a node inside its [`SyntaxTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Node kind together with its structural links
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t")]
pub enum NodeKind {
    /// Program entry. Unique per program.
    Begin,
    /// Leaf statement handed to the expression engine.
    Expression,
    /// `children` hold the body of the leading condition.
    If {
        else_ifs: Vec<NodeId>,
        else_branch: Option<NodeId>,
    },
    ElseIf,
    Else,
    While,
    ForEach {
        iterator: String,
        /// Variable slot the iterator is bound to.
        slot: usize,
    },
}

/// Executable AST node
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Raw source line the node was created from.
    pub source: String,
    /// Text handed to the expression engine. `None` for nodes without an expression.
    pub expression: Option<String>,
    pub line: u32,
    pub children: Vec<NodeId>,
    #[serde(skip)]
    pub bytecode: Option<ByteCode>,
}

impl Node {
    pub fn new(kind: NodeKind, source: &str, expression: Option<String>, line: u32) -> Self {
        Self {
            kind,
            source: source.to_string(),
            expression,
            line,
            children: Vec::new(),
            bytecode: None,
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, NodeKind::While | NodeKind::ForEach { .. })
    }
}

/// Immutable program tree: the Begin root plus synthetic initializer statements
#[derive(Debug, Clone, Serialize)]
pub struct SyntaxTree {
    pub nodes: Vec<Node>,
    pub root: NodeId,
    /// Variable initializers, in declaration order. Not reachable from `root`.
    pub initializers: Vec<NodeId>,
}

impl SyntaxTree {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> &Node {
        self.node(self.root)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
