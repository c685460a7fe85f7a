//! Standard expression engine
//!
//! Statements are parsed with pest into an [`Expr`] tree in which every identifier is already
//! resolved: variables to their slot, globals to their lowercased key and calls to a registered
//! command. Evaluation walks the tree against the running context.

use std::collections::BTreeSet;

use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::{ByteCode, Compilation, CompileScope, CompilerMetadata, ExpressionEngine};
use crate::interpreter::commands::Arity;
use crate::interpreter::errors::{ExpressionError, RuntimeError};
use crate::interpreter::executor::ExecutionAgent;
use crate::interpreter::value::Value;

#[derive(Parser)]
#[grammar = "interpreter/engine/expression.pest"]
struct StatementParser;

/* ===================== Expression Tree ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    fn parse(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    fn parse(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "=" => AssignOp::Set,
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            "*=" => AssignOp::Mul,
            "/=" => AssignOp::Div,
            _ => return None,
        };
        Some(op)
    }

    /// Operator applied before storing, for compound assignments.
    fn combine(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }
}

/// Compiled statement
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Reference(u32),
    Local(usize),
    Global(String),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        place: Place,
        op: AssignOp,
        value: Box<Expr>,
    },
    Call {
        command: String,
        args: Vec<Expr>,
    },
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Local(usize),
    Global(String),
    Element { base: Box<Expr>, index: Box<Expr> },
}

/// Symbols a program references, kept as its compiler metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolReferences {
    pub commands: BTreeSet<String>,
    pub globals: BTreeSet<String>,
}

/* ===================== Engine ===================== */

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEngine;

impl StandardEngine {
    pub fn new() -> Self {
        StandardEngine
    }
}

impl ExpressionEngine for StandardEngine {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn begin_compilation<'a>(&self, scope: CompileScope<'a>) -> Box<dyn Compilation + 'a> {
        Box::new(StandardCompilation {
            scope,
            references: SymbolReferences::default(),
        })
    }

    fn evaluate(
        &self,
        bytecode: &ByteCode,
        line: u32,
        agent: &mut ExecutionAgent<'_>,
    ) -> Result<Value, RuntimeError> {
        let expr = bytecode
            .downcast_ref::<Expr>()
            .ok_or_else(|| RuntimeError::new(line, "bytecode belongs to another engine"))?;
        eval(expr, line, agent)
    }

    fn depends_on(&self, metadata: &CompilerMetadata, symbol: &str) -> bool {
        let key = symbol.to_ascii_lowercase();
        metadata
            .downcast_ref::<SymbolReferences>()
            .is_some_and(|r| r.commands.contains(&key) || r.globals.contains(&key))
    }
}

/* ===================== Compilation ===================== */

struct StandardCompilation<'a> {
    scope: CompileScope<'a>,
    references: SymbolReferences,
}

impl Compilation for StandardCompilation<'_> {
    fn compile(&mut self, _line: u32, source: &str) -> Result<ByteCode, ExpressionError> {
        let expr = self.compile_statement(source)?;
        Ok(ByteCode::new(expr))
    }

    fn finish(self: Box<Self>) -> Option<CompilerMetadata> {
        Some(CompilerMetadata::new(self.references))
    }
}

impl StandardCompilation<'_> {
    fn compile_statement(&mut self, source: &str) -> Result<Expr, ExpressionError> {
        let mut pairs = StatementParser::parse(Rule::statement, source).map_err(syntax_error)?;
        let statement = next(&mut pairs)?;
        let expression = next(&mut statement.into_inner())?;
        self.build(expression)
    }

    fn build(&mut self, pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
        match pair.as_rule() {
            Rule::expression | Rule::index => self.build(next(&mut pair.into_inner())?),
            Rule::assignment => self.build_assignment(pair),
            Rule::disjunction
            | Rule::conjunction
            | Rule::equality
            | Rule::comparison
            | Rule::sum
            | Rule::product => self.build_chain(pair),
            Rule::unary => self.build_unary(pair),
            Rule::postfix => self.build_postfix(pair),
            Rule::call => self.build_call(pair),
            Rule::identifier => self.resolve(pair.as_str()),
            Rule::number => {
                let text = pair.as_str();
                text.parse::<f64>()
                    .map(Expr::Number)
                    .map_err(|_| ExpressionError::new(format!("invalid number '{}'", text)))
            }
            Rule::reference => {
                let text = pair.as_str();
                u32::from_str_radix(&text[1..], 16)
                    .map(Expr::Reference)
                    .map_err(|_| ExpressionError::new(format!("invalid reference '{}'", text)))
            }
            Rule::string => {
                let text = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                Ok(Expr::Text(unescape(text)))
            }
            rule => Err(ExpressionError::new(format!(
                "unexpected {:?} in expression",
                rule
            ))),
        }
    }

    fn build_chain(&mut self, pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
        let mut inner = pair.into_inner();
        let mut lhs = self.build(next(&mut inner)?)?;

        while let Some(op_pair) = inner.next() {
            let op = BinaryOp::parse(op_pair.as_str()).ok_or_else(|| {
                ExpressionError::new(format!("unknown operator '{}'", op_pair.as_str()))
            })?;
            let rhs = self.build(next(&mut inner)?)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn build_unary(&mut self, pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
        let mut ops = Vec::new();
        let mut operand = None;

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::unary_op if p.as_str() == "-" => ops.push(UnaryOp::Neg),
                Rule::unary_op => ops.push(UnaryOp::Not),
                _ => operand = Some(self.build(p)?),
            }
        }

        let mut expr = operand.ok_or_else(malformed)?;
        for op in ops.into_iter().rev() {
            expr = match (op, expr) {
                (UnaryOp::Neg, Expr::Number(n)) => Expr::Number(-n),
                (op, operand) => Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
            };
        }
        Ok(expr)
    }

    fn build_postfix(&mut self, pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
        let mut inner = pair.into_inner();
        let mut expr = self.build(next(&mut inner)?)?;
        for index in inner {
            expr = Expr::Index {
                target: Box::new(expr),
                index: Box::new(self.build(index)?),
            };
        }
        Ok(expr)
    }

    fn build_assignment(&mut self, pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
        let mut inner = pair.into_inner();
        let place = next(&mut inner)?;
        let op_text = next(&mut inner)?.as_str();
        let op = AssignOp::parse(op_text).ok_or_else(|| {
            ExpressionError::new(format!("unknown assignment operator '{}'", op_text))
        })?;
        let value = self.build(next(&mut inner)?)?;

        Ok(Expr::Assign {
            place: self.build_place(place)?,
            op,
            value: Box::new(value),
        })
    }

    fn build_place(&mut self, pair: Pair<'_, Rule>) -> Result<Place, ExpressionError> {
        let mut inner = pair.into_inner();
        let mut target = self.resolve(next(&mut inner)?.as_str())?;

        let mut indices = Vec::new();
        for index in inner {
            indices.push(self.build(index)?);
        }

        let Some(last) = indices.pop() else {
            return match target {
                Expr::Local(slot) => Ok(Place::Local(slot)),
                Expr::Global(name) => Ok(Place::Global(name)),
                _ => Err(malformed()),
            };
        };

        for index in indices {
            target = Expr::Index {
                target: Box::new(target),
                index: Box::new(index),
            };
        }
        Ok(Place::Element {
            base: Box::new(target),
            index: Box::new(last),
        })
    }

    fn build_call(&mut self, pair: Pair<'_, Rule>) -> Result<Expr, ExpressionError> {
        let mut inner = pair.into_inner();
        let name = next(&mut inner)?.as_str();

        let mut args = Vec::new();
        for arg in inner {
            args.push(self.build(arg)?);
        }

        let command = self
            .scope
            .commands
            .lookup(name)
            .ok_or_else(|| ExpressionError::new(format!("unknown command '{}'", name)))?;
        let info = command.info();

        if let Arity::Fixed(expected) = info.arity() {
            if args.len() != expected {
                return Err(ExpressionError::new(format!(
                    "'{}' expects {} argument(s), found {}",
                    info.name,
                    expected,
                    args.len()
                )));
            }
        }

        self.references
            .commands
            .insert(info.name.to_ascii_lowercase());
        Ok(Expr::Call {
            command: info.name.to_string(),
            args,
        })
    }

    /// Variables shadow nothing: the parser rejects locals named like globals.
    fn resolve(&mut self, name: &str) -> Result<Expr, ExpressionError> {
        if let Some(slot) = self
            .scope
            .variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
        {
            return Ok(Expr::Local(slot));
        }

        if self.scope.globals.contains(name) {
            let key = name.to_ascii_lowercase();
            self.references.globals.insert(key.clone());
            return Ok(Expr::Global(key));
        }

        Err(ExpressionError::new(format!("unknown identifier '{}'", name)))
    }
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>) -> Result<Pair<'i, Rule>, ExpressionError> {
    pairs.next().ok_or_else(malformed)
}

fn malformed() -> ExpressionError {
    ExpressionError::new("malformed expression")
}

fn syntax_error(e: pest::error::Error<Rule>) -> ExpressionError {
    let column = match e.line_col {
        LineColLocation::Pos((_, col)) | LineColLocation::Span((_, col), _) => col,
    };
    ExpressionError::new(format!(
        "syntax error at column {}: {}",
        column,
        e.variant.message()
    ))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/* ===================== Evaluation ===================== */

fn eval(expr: &Expr, line: u32, agent: &mut ExecutionAgent<'_>) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Number(n) => Ok(Value::Numeric(*n)),
        Expr::Text(s) => Ok(Value::String(s.clone())),
        Expr::Reference(r) => Ok(Value::Reference(*r)),
        Expr::Local(slot) => read_local(*slot, line, agent),
        Expr::Global(name) => read_global(name, line, agent),
        Expr::Index { target, index } => {
            let target = eval(target, line, agent)?;
            let index = eval(index, line, agent)?;
            element(&target, &index, line)
        }
        Expr::Unary { op, operand } => {
            let value = eval(operand, line, agent)?;
            match op {
                UnaryOp::Neg => Ok(Value::Numeric(-numeric("-", &value, line)?)),
                UnaryOp::Not => Ok(Value::from(!truth(&value, line)?)),
            }
        }
        Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => {
            if !truth(&eval(lhs, line, agent)?, line)? {
                return Ok(Value::from(false));
            }
            Ok(Value::from(truth(&eval(rhs, line, agent)?, line)?))
        }
        Expr::Binary {
            op: BinaryOp::Or,
            lhs,
            rhs,
        } => {
            if truth(&eval(lhs, line, agent)?, line)? {
                return Ok(Value::from(true));
            }
            Ok(Value::from(truth(&eval(rhs, line, agent)?, line)?))
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, line, agent)?;
            let r = eval(rhs, line, agent)?;
            binary(*op, &l, &r, line)
        }
        Expr::Assign { place, op, value } => assign(place, *op, value, line, agent),
        Expr::Call { command, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, line, agent)?);
            }
            agent.invoke(command, values, line)
        }
    }
}

fn read_local(slot: usize, line: u32, agent: &ExecutionAgent<'_>) -> Result<Value, RuntimeError> {
    agent
        .local(slot)
        .cloned()
        .ok_or_else(|| RuntimeError::new(line, format!("variable slot {} is unbound", slot)))
}

fn read_global(name: &str, line: u32, agent: &ExecutionAgent<'_>) -> Result<Value, RuntimeError> {
    agent
        .global(name)
        .cloned()
        .ok_or_else(|| RuntimeError::new(line, format!("global '{}' no longer exists", name)))
}

fn assign(
    place: &Place,
    op: AssignOp,
    value: &Expr,
    line: u32,
    agent: &mut ExecutionAgent<'_>,
) -> Result<Value, RuntimeError> {
    let rhs = eval(value, line, agent)?;

    match place {
        Place::Local(slot) => {
            let new = match op.combine() {
                None => rhs,
                Some(bop) => binary(bop, &read_local(*slot, line, agent)?, &rhs, line)?,
            };
            let target = agent.local_mut(*slot).ok_or_else(|| {
                RuntimeError::new(line, format!("variable slot {} is unbound", slot))
            })?;
            target.assign(&new);
            Ok(new)
        }
        Place::Global(name) => {
            let new = match op.combine() {
                None => rhs,
                Some(bop) => binary(bop, &read_global(name, line, agent)?, &rhs, line)?,
            };
            if !agent.set_global(name, new.clone()) {
                return Err(RuntimeError::new(
                    line,
                    format!("global '{}' no longer exists", name),
                ));
            }
            Ok(new)
        }
        Place::Element { base, index } => {
            let base = eval(base, line, agent)?;
            let array = base.array().cloned().ok_or_else(|| {
                RuntimeError::new(line, format!("cannot index a {} value", base.data_type()))
            })?;
            let i = array_index(&eval(index, line, agent)?, line)?;

            let new = match op.combine() {
                None => rhs,
                Some(bop) => {
                    let current = array
                        .at(i)
                        .ok_or_else(|| out_of_range(i, array.size(), line))?;
                    binary(bop, &current, &rhs, line)?
                }
            };
            if !array.set(i, new.clone()) {
                return Err(out_of_range(i, array.size(), line));
            }
            Ok(new)
        }
    }
}

fn element(target: &Value, index: &Value, line: u32) -> Result<Value, RuntimeError> {
    let array = target.array().ok_or_else(|| {
        RuntimeError::new(line, format!("cannot index a {} value", target.data_type()))
    })?;
    let i = array_index(index, line)?;
    array.at(i).ok_or_else(|| out_of_range(i, array.size(), line))
}

fn array_index(index: &Value, line: u32) -> Result<usize, RuntimeError> {
    let n = numeric("[]", index, line)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(RuntimeError::new(line, format!("invalid array index {}", n)));
    }
    Ok(n as usize)
}

fn out_of_range(index: usize, size: usize, line: u32) -> RuntimeError {
    RuntimeError::new(
        line,
        format!("array index {} out of range (size {})", index, size),
    )
}

fn numeric(op: &str, value: &Value, line: u32) -> Result<f64, RuntimeError> {
    value.number().ok_or_else(|| {
        RuntimeError::new(
            line,
            format!("operator '{}' expects a number, found {}", op, value.data_type()),
        )
    })
}

fn truth(value: &Value, line: u32) -> Result<bool, RuntimeError> {
    value.truth().ok_or_else(|| {
        RuntimeError::new(
            line,
            format!("expected a condition, found {}", value.data_type()),
        )
    })
}

fn binary(op: BinaryOp, l: &Value, r: &Value, line: u32) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Eq => Ok(Value::from(l == r)),
        BinaryOp::Ne => Ok(Value::from(l != r)),
        BinaryOp::And => Ok(Value::from(truth(l, line)? && truth(r, line)?)),
        BinaryOp::Or => Ok(Value::from(truth(l, line)? || truth(r, line)?)),
        BinaryOp::Add => add(l, r, line),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (l.string(), r.string()) {
                (Some(a), Some(b)) => a.partial_cmp(b),
                _ => numeric(op.symbol(), l, line)?.partial_cmp(&numeric(op.symbol(), r, line)?),
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Le => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                _ => o.is_ge(),
            });
            Ok(Value::from(result))
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let a = numeric(op.symbol(), l, line)?;
            let b = numeric(op.symbol(), r, line)?;
            let n = match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b == 0.0 => return Err(RuntimeError::new(line, "division by zero")),
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            Ok(Value::Numeric(n))
        }
    }
}

fn add(l: &Value, r: &Value, line: u32) -> Result<Value, RuntimeError> {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return Ok(Value::String(format!("{}{}", a, b)));
    }

    match (l.number(), r.number()) {
        (Some(a), Some(b)) => Ok(Value::Numeric(a + b)),
        _ if l.is_string() || r.is_string() => Ok(Value::String(format!("{}{}", l, r))),
        _ => Err(RuntimeError::new(
            line,
            format!(
                "operator '+' cannot combine {} and {}",
                l.data_type(),
                r.data_type()
            ),
        )),
    }
}
