//! Expression tree evaluated by the engine.
//!
//! A tree is produced in two stages. Lowering turns the syntax tree into an `Expr` whose names
//! are still lexical (the "half-compiled" form, independent of any static context). Binding
//! resolves prefixes, variables, function signatures and type names against a
//! [`StaticContext`](crate::engine::runtime::StaticContext) and yields a new tree that can be
//! evaluated. Trees are immutable and shared through `Arc`, so one compiled expression can be
//! evaluated concurrently from many threads, each with its own dynamic context.

use std::sync::Arc;

use crate::engine::compare::ValueOp;
use crate::engine::registry::FunctionSignature;
use crate::engine::runtime::{DynamicContext, Error};
use crate::model::{QName, XdmNode};
use crate::parser::ast;
use crate::xdm::{AtomicType, ExpandedName, NodeTest, Sequence, SequenceType, XdmAtomicValue};

pub use crate::parser::ast::{Axis, SetOp, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::IDiv => "idiv",
            ArithOp::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOp {
    Is,
    Precedes,
    Follows,
}

/// A sequence type as written, or its resolved form.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Lexical(ast::SequenceType),
    Resolved(SequenceType),
}

/// Target of `cast as` / `castable as`, as written or resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicTypeRef {
    Lexical(ast::QName),
    Resolved(AtomicType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Lexical name; `ns_uri` is filled in by binding.
    pub name: QName,
    pub args: Vec<Arc<Expr>>,
    pub span: Option<Span>,
    /// Signature selected during binding.
    pub target: Option<Arc<FunctionSignature>>,
    /// Validate the returned value against the declared return type.
    pub check_return: bool,
}

impl Call {
    pub fn expanded_name(&self) -> ExpandedName {
        expanded(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(XdmAtomicValue),
    Empty,
    Sequence(Vec<Arc<Expr>>),
    ContextItem,
    /// Root of the context node, which must be a document node.
    RootNode,
    VarRef(QName),
    /// One axis step: every node on `axis` from the context node that passes `test`.
    Axis {
        axis: Axis,
        test: NodeTest,
    },
    /// Step expressions, each evaluated once per node produced by the previous one.
    Path(Vec<Arc<Expr>>),
    Filter {
        base: Arc<Expr>,
        predicates: Vec<Arc<Expr>>,
    },
    Arithmetic {
        op: ArithOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    Unary {
        negate: bool,
        operand: Arc<Expr>,
    },
    And(Arc<Expr>, Arc<Expr>),
    Or(Arc<Expr>, Arc<Expr>),
    ValueCompare {
        op: ValueOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    GeneralCompare {
        op: ValueOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    NodeCompare {
        op: NodeOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    Range {
        start: Arc<Expr>,
        end: Arc<Expr>,
    },
    SetOp {
        op: SetOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    If {
        cond: Arc<Expr>,
        then_branch: Arc<Expr>,
        else_branch: Arc<Expr>,
    },
    For {
        var: QName,
        source: Arc<Expr>,
        body: Arc<Expr>,
    },
    Let {
        var: QName,
        value: Arc<Expr>,
        body: Arc<Expr>,
    },
    Quantified {
        every: bool,
        bindings: Vec<(QName, Arc<Expr>)>,
        satisfies: Arc<Expr>,
    },
    InstanceOf {
        operand: Arc<Expr>,
        ty: TypeRef,
    },
    Treat {
        operand: Arc<Expr>,
        ty: TypeRef,
    },
    Cast {
        operand: Arc<Expr>,
        target: AtomicTypeRef,
        optional: bool,
    },
    Castable {
        operand: Arc<Expr>,
        target: AtomicTypeRef,
        optional: bool,
    },
    StringConcat(Arc<Expr>, Arc<Expr>),
    SimpleMap(Arc<Expr>, Arc<Expr>),
    Call(Call),
    NamedFunctionRef {
        name: QName,
        arity: usize,
        span: Option<Span>,
        target: Option<Arc<FunctionSignature>>,
    },
    DynamicCall {
        callee: Arc<Expr>,
        args: Vec<Arc<Expr>>,
    },
}

impl Expr {
    /// Evaluates this (bound) expression in `ctx`.
    pub fn evaluate<N: XdmNode>(self: &Arc<Self>, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
        crate::engine::evaluator::evaluate(self, ctx)
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Arc<Expr>> {
        match self {
            Expr::Literal(_)
            | Expr::Empty
            | Expr::ContextItem
            | Expr::RootNode
            | Expr::VarRef(_)
            | Expr::Axis { .. }
            | Expr::NamedFunctionRef { .. } => Vec::new(),
            Expr::Sequence(items) | Expr::Path(items) => items.iter().collect(),
            Expr::Filter { base, predicates } => std::iter::once(base).chain(predicates).collect(),
            Expr::Arithmetic { left, right, .. }
            | Expr::ValueCompare { left, right, .. }
            | Expr::GeneralCompare { left, right, .. }
            | Expr::NodeCompare { left, right, .. }
            | Expr::SetOp { left, right, .. }
            | Expr::And(left, right)
            | Expr::Or(left, right)
            | Expr::StringConcat(left, right)
            | Expr::SimpleMap(left, right) => vec![left, right],
            Expr::Range { start, end } => vec![start, end],
            Expr::Unary { operand, .. }
            | Expr::InstanceOf { operand, .. }
            | Expr::Treat { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::Castable { operand, .. } => vec![operand],
            Expr::If { cond, then_branch, else_branch } => vec![cond, then_branch, else_branch],
            Expr::For { source, body, .. } => vec![source, body],
            Expr::Let { value, body, .. } => vec![value, body],
            Expr::Quantified { bindings, satisfies, .. } => {
                bindings.iter().map(|(_, e)| e).chain(std::iter::once(satisfies)).collect()
            }
            Expr::Call(call) => call.args.iter().collect(),
            Expr::DynamicCall { callee, args } => std::iter::once(callee).chain(args).collect(),
        }
    }
}

/// Expanded form of a bound name.
pub fn expanded(name: &QName) -> ExpandedName {
    ExpandedName::new(name.ns_uri.clone(), name.local.clone())
}
