//! Structural parser
//!
//! Builds the syntax tree from preprocessed lines while validating block nesting. Two stacks
//! drive it:
//! - the block stack tracks which keyword opened each enclosing block
//! - the code stack tracks the node new statements attach to
//!
//! Errors are accumulated as diagnostics. After the first error the parser keeps validating
//! structure, so later mistakes are reported too, but it stops creating nodes.

use super::ast::{Node, NodeId, NodeKind, SyntaxTree};
use super::program::{Program, ProgramState, Variable, MAX_PARAMETERS};
use crate::interpreter::errors::{Diagnostic, EngineFault};
use crate::interpreter::globals::GlobalTable;
use crate::interpreter::preprocessor::SourceLines;
use crate::interpreter::tokenizer::{
    remainder_after_keyword, sanitize, tokenize, Keyword, SanitizeOps, TokenizedLine,
};

/// Keyword that opened the innermost block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockContext {
    /// Outside any block.
    Invalid,
    Begin,
    Loop,
    If,
    /// Inside an If that already has an ElseIf or Else branch.
    IfElseIf,
}

impl BlockContext {
    fn closing_keyword(self) -> &'static str {
        match self {
            BlockContext::Invalid => "",
            BlockContext::Begin => "end",
            BlockContext::Loop => "loop",
            BlockContext::If | BlockContext::IfElseIf => "endif",
        }
    }
}

/// Parses `lines` into `program`, leaving it `Parsed` or `CompileError`.
///
/// Only internal inconsistencies are returned as errors; script mistakes become diagnostics.
pub fn generate_program(
    globals: &GlobalTable,
    program: &mut Program,
    lines: &SourceLines,
) -> Result<(), EngineFault> {
    let mut parser = StructuralParser::new(globals, program);
    let mut lines = lines.iter();

    match lines.next() {
        Some((&number, text)) => parser.parse_header(number, text),
        None => parser.error(1, "Script is empty"),
    }
    for (&number, text) in lines {
        parser.parse_line(number, text)?;
    }

    parser.finish()
}

struct StructuralParser<'p> {
    globals: &'p GlobalTable,
    program: &'p mut Program,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    blocks: Vec<BlockContext>,
    code: Vec<Option<NodeId>>,
    failed: bool,
    last_line: u32,
}

impl<'p> StructuralParser<'p> {
    fn new(globals: &'p GlobalTable, program: &'p mut Program) -> Self {
        Self {
            globals,
            program,
            nodes: Vec::new(),
            root: None,
            blocks: vec![BlockContext::Invalid],
            code: vec![None],
            failed: false,
            last_line: 1,
        }
    }

    fn top(&self) -> BlockContext {
        self.blocks
            .last()
            .copied()
            .unwrap_or(BlockContext::Invalid)
    }

    fn error(&mut self, line: u32, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(script = self.program.name(), line, "{}", message);
        self.program.push_diagnostic(Diagnostic::new(line, message));
        self.failed = true;
    }

    /* ===================== Lines ===================== */

    fn parse_header(&mut self, line: u32, text: &str) {
        self.last_line = line;
        let tokens = tokenize(&sanitize(text, SanitizeOps::ALL));

        if tokens.keyword() != Some(Keyword::ScriptName) {
            self.error(line, "Scripts should start with a script name declaration");
            return;
        }
        let Some(name) = tokens.token(1) else {
            self.error(line, "Invalid script name");
            return;
        };
        self.program.set_name(name);

        // `(seconds)`; anything else leaves the interval at 0
        if let Some(interval) = tokens.token(2) {
            let seconds = interval
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .and_then(|s| s.trim().parse::<f64>().ok());
            if let Some(seconds) = seconds.filter(|s| *s > 0.0) {
                self.program.set_polling_interval(seconds);
            }
        }
    }

    fn parse_line(&mut self, line: u32, text: &str) -> Result<(), EngineFault> {
        self.last_line = line;
        let clean = sanitize(text, SanitizeOps::ALL);
        let tokens = tokenize(&clean);

        match tokens.keyword() {
            Some(Keyword::ScriptName) => self.error(line, "Script name already declared"),
            Some(Keyword::Variable) => self.parse_variable(line, &clean, &tokens),
            Some(Keyword::Begin) => self.parse_begin(line, text, &tokens),
            Some(Keyword::End) => self.parse_end(line),
            Some(Keyword::While) => self.parse_while(line, text)?,
            Some(Keyword::ForEach) => self.parse_foreach(line, text, &clean, &tokens)?,
            Some(Keyword::Loop) => self.parse_loop(line),
            Some(Keyword::If) => self.parse_if(line, text)?,
            Some(keyword @ (Keyword::ElseIf | Keyword::Else)) => {
                self.parse_branch(line, text, keyword)?
            }
            Some(Keyword::EndIf) => self.parse_endif(line),
            keyword => self.parse_statement(line, text, keyword)?,
        }
        Ok(())
    }

    fn parse_variable(&mut self, line: u32, clean: &str, tokens: &TokenizedLine) {
        if self.top() != BlockContext::Invalid {
            self.error(line, "Variables must be declared outside of blocks");
            return;
        }
        let Some(name) = tokens.token(1) else {
            self.error(line, "Invalid variable name");
            return;
        };
        if !is_identifier(name) {
            self.error(line, format!("Invalid variable name '{}'", name));
            return;
        }
        if self.program.has_variable(name) {
            self.error(line, format!("Variable '{}' redeclared", name));
            return;
        }
        if self.globals.contains(name) {
            self.error(
                line,
                format!("Variable '{}' collides with a global of the same name", name),
            );
            return;
        }

        let initializer = match tokens.indices.get(1) {
            Some(&start) if tokens.len() > 2 => Some(clean[start..].to_string()),
            _ => None,
        };
        self.program.add_variable(Variable {
            name: name.to_ascii_lowercase(),
            initializer,
            line,
        });
    }

    fn parse_begin(&mut self, line: u32, text: &str, tokens: &TokenizedLine) {
        if self.top() != BlockContext::Invalid {
            self.error(line, "Begin blocks cannot be nested");
            return;
        }
        if self.root.is_some() {
            self.error(line, "Only one Begin block is allowed");
            return;
        }

        let parameters = &tokens.tokens[1..];
        if parameters.len() > MAX_PARAMETERS {
            self.error(
                line,
                format!(
                    "Too many parameters ({}, max {})",
                    parameters.len(),
                    MAX_PARAMETERS
                ),
            );
        } else {
            for parameter in parameters {
                match self.program.variable_slot(parameter) {
                    Some(slot) if self.program.is_parameter(slot) => {
                        self.error(line, format!("Duplicate parameter '{}'", parameter))
                    }
                    Some(slot) => self.program.add_parameter(slot),
                    None => self.error(
                        line,
                        format!(
                            "Couldn't initialize parameter '{}' - non-existent variable",
                            parameter
                        ),
                    ),
                }
            }
        }

        self.blocks.push(BlockContext::Begin);
        if self.failed {
            return;
        }
        let id = self.alloc(Node::new(NodeKind::Begin, text, None, line));
        self.root = Some(id);
        self.code.push(Some(id));
    }

    fn parse_end(&mut self, line: u32) {
        if self.top() != BlockContext::Begin {
            self.error(line, "'End' has no matching 'Begin'");
            return;
        }
        self.blocks.pop();
        self.code.pop();
    }

    fn parse_while(&mut self, line: u32, text: &str) -> Result<(), EngineFault> {
        if self.top() == BlockContext::Invalid {
            self.error(line, "'While' must be inside a Begin block");
            return Ok(());
        }
        self.blocks.push(BlockContext::Loop);

        let condition = remainder_after_keyword(text, Keyword::While);
        if condition.is_empty() {
            self.error(line, "Invalid condition expression");
        }
        if self.failed {
            return Ok(());
        }

        let node = Node::new(NodeKind::While, text, Some(condition.to_string()), line);
        let id = self.attach(line, node)?;
        self.code.push(Some(id));
        Ok(())
    }

    fn parse_foreach(
        &mut self,
        line: u32,
        text: &str,
        clean: &str,
        tokens: &TokenizedLine,
    ) -> Result<(), EngineFault> {
        if self.top() == BlockContext::Invalid {
            self.error(line, "'ForEach' must be inside a Begin block");
            return Ok(());
        }
        self.blocks.push(BlockContext::Loop);

        let well_formed = tokens.len() >= 4
            && tokens
                .token(2)
                .is_some_and(|t| t.eq_ignore_ascii_case("in"));
        let (Some(iterator), Some(&start), true) =
            (tokens.token(1), tokens.indices.get(3), well_formed)
        else {
            self.error(
                line,
                "Invalid ForEach expression, expected 'foreach <variable> in <array>'",
            );
            return Ok(());
        };
        let Some(slot) = self.program.variable_slot(iterator) else {
            self.error(
                line,
                format!("ForEach iterator '{}' is not a declared variable", iterator),
            );
            return Ok(());
        };
        if self.failed {
            return Ok(());
        }

        let kind = NodeKind::ForEach {
            iterator: iterator.to_ascii_lowercase(),
            slot,
        };
        let node = Node::new(kind, text, Some(clean[start..].to_string()), line);
        let id = self.attach(line, node)?;
        self.code.push(Some(id));
        Ok(())
    }

    fn parse_loop(&mut self, line: u32) {
        if self.top() != BlockContext::Loop {
            self.error(line, "'Loop' has no matching 'While' or 'ForEach'");
            return;
        }
        self.blocks.pop();
        self.code.pop();
    }

    fn parse_if(&mut self, line: u32, text: &str) -> Result<(), EngineFault> {
        if self.top() == BlockContext::Invalid {
            self.error(line, "'If' must be inside a Begin block");
            return Ok(());
        }
        self.blocks.push(BlockContext::If);

        let condition = remainder_after_keyword(text, Keyword::If);
        if condition.is_empty() {
            self.error(line, "Invalid condition expression");
        }
        if self.failed {
            return Ok(());
        }

        let kind = NodeKind::If {
            else_ifs: Vec::new(),
            else_branch: None,
        };
        let id = self.attach(line, Node::new(kind, text, Some(condition.to_string()), line))?;
        self.code.push(Some(id));
        Ok(())
    }

    /// `elseif <condition>` or `else`
    fn parse_branch(&mut self, line: u32, text: &str, keyword: Keyword) -> Result<(), EngineFault> {
        let top = self.top();
        if !matches!(top, BlockContext::If | BlockContext::IfElseIf) {
            self.error(line, format!("'{}' has no matching 'If'", keyword.as_str()));
            return Ok(());
        }

        let condition = match keyword {
            Keyword::ElseIf => {
                let condition = remainder_after_keyword(text, keyword);
                if condition.is_empty() {
                    self.error(line, "Invalid condition expression");
                    return Ok(());
                }
                Some(condition.to_string())
            }
            _ => None,
        };

        if let Some(block) = self.blocks.last_mut() {
            *block = BlockContext::IfElseIf;
        }
        if self.failed {
            return Ok(());
        }
        if top == BlockContext::IfElseIf {
            // Close the previous branch
            self.code.pop();
        }

        let if_id = self
            .code
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| EngineFault::new(format!("line {}: branch has no If node", line)))?;
        let NodeKind::If { else_branch, .. } = &self.nodes[if_id.0].kind else {
            return Err(EngineFault::new(format!(
                "line {}: branch parent is not an If node",
                line
            )));
        };
        if else_branch.is_some() {
            let message = match keyword {
                Keyword::ElseIf => "'ElseIf' cannot follow 'Else'",
                _ => "If blocks can only have one 'Else'",
            };
            self.error(line, message);
            return Ok(());
        }

        let branch_kind = match keyword {
            Keyword::ElseIf => NodeKind::ElseIf,
            _ => NodeKind::Else,
        };
        let branch = self.alloc(Node::new(branch_kind, text, condition, line));
        if let NodeKind::If {
            else_ifs,
            else_branch,
        } = &mut self.nodes[if_id.0].kind
        {
            match keyword {
                Keyword::ElseIf => else_ifs.push(branch),
                _ => *else_branch = Some(branch),
            }
        }
        self.code.push(Some(branch));
        Ok(())
    }

    fn parse_endif(&mut self, line: u32) {
        let top = self.top();
        if !matches!(top, BlockContext::If | BlockContext::IfElseIf) {
            self.error(line, "'EndIf' has no matching 'If'");
            return;
        }
        self.blocks.pop();
        if top == BlockContext::IfElseIf {
            self.code.pop();
        }
        self.code.pop();
    }

    fn parse_statement(
        &mut self,
        line: u32,
        text: &str,
        keyword: Option<Keyword>,
    ) -> Result<(), EngineFault> {
        if self.top() == BlockContext::Invalid {
            self.error(line, "Statements must be inside a Begin block");
            return Ok(());
        }
        if let Some(k @ (Keyword::Break | Keyword::Continue)) = keyword {
            if !self.blocks.contains(&BlockContext::Loop) {
                self.error(line, format!("'{}' called outside a loop", k.as_str()));
                return Ok(());
            }
        }
        if self.failed {
            return Ok(());
        }

        let expression = match keyword {
            Some(k) => command_form(text, k),
            None => text.trim().to_string(),
        };
        self.attach(line, Node::new(NodeKind::Expression, text, Some(expression), line))?;
        Ok(())
    }

    /* ===================== Tree ===================== */

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Adds `node` as a child of the node on top of the code stack.
    fn attach(&mut self, line: u32, node: Node) -> Result<NodeId, EngineFault> {
        let parent = self
            .code
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| EngineFault::new(format!("line {}: no node to attach to", line)))?;
        if self.nodes[parent.0].kind == NodeKind::Expression {
            return Err(EngineFault::new(format!(
                "line {}: cannot attach to an expression node",
                line
            )));
        }

        let id = self.alloc(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    fn finish(mut self) -> Result<(), EngineFault> {
        if !self.failed {
            let top = self.top();
            if self.root.is_none() {
                self.error(self.last_line, "Script has no Begin block");
            } else if top != BlockContext::Invalid {
                self.error(
                    self.last_line,
                    format!("Unterminated block, expected '{}'", top.closing_keyword()),
                );
            } else if self.code.len() != 1 {
                return Err(EngineFault::new("code stack unbalanced at end of input"));
            }
        }

        let root = match self.root {
            Some(root) if !self.failed => root,
            _ => {
                self.program.set_tree(None);
                self.program.set_state(ProgramState::CompileError);
                return Ok(());
            }
        };

        let pending: Vec<(String, u32)> = self
            .program
            .variables()
            .iter()
            .enumerate()
            .filter(|(slot, _)| !self.program.is_parameter(*slot))
            .filter_map(|(_, v)| v.initializer.clone().map(|init| (init, v.line)))
            .collect();

        let mut initializers = Vec::with_capacity(pending.len());
        for (init, line) in pending {
            let source = format!("variable {}", init);
            initializers.push(self.alloc(Node::new(NodeKind::Expression, &source, Some(init), line)));
        }

        self.program.set_tree(Some(SyntaxTree {
            nodes: self.nodes,
            root,
            initializers,
        }));
        self.program.set_state(ProgramState::Parsed);
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rewrites a keyword statement into command-call form: `return 42` → `return(42)`.
fn command_form(text: &str, keyword: Keyword) -> String {
    let rest = remainder_after_keyword(text, keyword);
    let name = keyword.as_str();

    if rest.is_empty() {
        format!("{}()", name)
    } else if encloses_whole(rest) {
        format!("{}{}", name, rest)
    } else {
        format!("{}({})", name, rest)
    }
}

/// Whether `text` is one parenthesised group, e.g. `(1, 2)` but not `(1) + (2)`.
fn encloses_whole(text: &str) -> bool {
    if !text.starts_with('(') {
        return false;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}
