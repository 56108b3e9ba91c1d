//! Tree-walking evaluator over bound expression trees.
//!
//! [`evaluate`] dispatches on the expression node. Producers that can stream (axes, filters,
//! ranges, `for`) return lazy [`Sequence`]s; consumers pull only as much as they need.

pub(crate) mod arithmetic;
pub(crate) mod axes;
pub(crate) mod calls;
mod casting;
mod comparison;
mod filter;
mod iteration;
mod path;
mod quantified;
mod set_ops;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::compiler::expr::{Expr, expanded};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::{QName, XdmNode};
use crate::xdm::{Sequence, XdmAtomicValue, XdmItem};

pub use calls::function_conversion;

/// Cancellation flag snapshot carried by cursors that outlive the call that created them.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelPoll(Option<Arc<AtomicBool>>);

impl CancelPoll {
    pub(crate) fn of<N>(ctx: &DynamicContext<N>) -> Self {
        CancelPoll(ctx.cancel_flag.clone())
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        match &self.0 {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                Err(Error::from_code(ErrorCode::FOER0000, "evaluation cancelled"))
            }
            _ => Ok(()),
        }
    }
}

/// Evaluates a bound expression.
pub fn evaluate<N: XdmNode>(expr: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    match &**expr {
        Expr::Literal(v) => Ok(Sequence::singleton(XdmItem::Atomic(v.clone()))),
        Expr::Empty => Ok(Sequence::empty()),
        Expr::Sequence(items) => sequence(items, ctx),
        Expr::ContextItem => Ok(Sequence::singleton(ctx.context_item()?.clone())),
        Expr::RootNode => path::root_node(ctx),
        Expr::VarRef(name) => variable(name, ctx),
        Expr::Axis { axis, test } => axes::axis_step(ctx, *axis, test),
        Expr::Path(steps) => path::evaluate_path(steps, ctx),
        Expr::Filter { base, predicates } => filter::evaluate_filter(base, predicates, ctx),
        Expr::Arithmetic { op, left, right } => arithmetic::binary(*op, left, right, ctx),
        Expr::Unary { negate, operand } => arithmetic::unary(*negate, operand, ctx),
        Expr::And(l, r) => logical(l, r, true, ctx),
        Expr::Or(l, r) => logical(l, r, false, ctx),
        Expr::ValueCompare { op, left, right } => comparison::value(*op, left, right, ctx),
        Expr::GeneralCompare { op, left, right } => comparison::general(*op, left, right, ctx),
        Expr::NodeCompare { op, left, right } => comparison::node(*op, left, right, ctx),
        Expr::Range { start, end } => iteration::range(start, end, ctx),
        Expr::SetOp { op, left, right } => set_ops::evaluate_set_op(*op, left, right, ctx),
        Expr::If { cond, then_branch, else_branch } => conditional(cond, then_branch, else_branch, ctx),
        Expr::For { var, source, body } => iteration::for_each(var, source, body, ctx),
        Expr::Let { var, value, body } => iteration::let_binding(var, value, body, ctx),
        Expr::Quantified { every, bindings, satisfies } => quantified::evaluate_quantified(*every, bindings, satisfies, ctx),
        Expr::InstanceOf { operand, ty } => casting::instance_of(operand, ty, ctx),
        Expr::Treat { operand, ty } => casting::treat(operand, ty, ctx),
        Expr::Cast { operand, target, optional } => casting::cast(operand, target, *optional, ctx),
        Expr::Castable { operand, target, optional } => casting::castable(operand, target, *optional, ctx),
        Expr::StringConcat(l, r) => string_concat(l, r, ctx),
        Expr::SimpleMap(l, r) => iteration::simple_map(l, r, ctx),
        Expr::Call(call) => calls::static_call(call, ctx),
        Expr::NamedFunctionRef { name, arity, target, .. } => calls::function_ref(name, *arity, target.as_ref()),
        Expr::DynamicCall { callee, args } => calls::dynamic_call(callee, args, ctx),
    }
}

fn sequence<N: XdmNode>(items: &[Arc<Expr>], ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let parts = items.iter().map(|e| evaluate(e, ctx)).collect::<Result<Vec<_>, _>>()?;
    Ok(Sequence::concat(parts))
}

fn variable<N: XdmNode>(name: &QName, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    match ctx.lookup(&expanded(name)) {
        Some(binding) => binding.to_sequence(),
        None => Err(Error::from_code(
            ErrorCode::XPST0008,
            format!("no value supplied for variable ${}", name.lexical()),
        )),
    }
}

/// `and` when `all` is set, `or` otherwise; the right operand is only evaluated when needed.
fn logical<N: XdmNode>(l: &Arc<Expr>, r: &Arc<Expr>, all: bool, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let left = evaluate(l, ctx)?.ebv()?;
    let value = if left == all { evaluate(r, ctx)?.ebv()? } else { left };
    Ok(boolean(value))
}

fn conditional<N: XdmNode>(
    cond: &Arc<Expr>,
    then_branch: &Arc<Expr>,
    else_branch: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    if evaluate(cond, ctx)?.ebv()? { evaluate(then_branch, ctx) } else { evaluate(else_branch, ctx) }
}

fn string_concat<N: XdmNode>(l: &Arc<Expr>, r: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let mut out = optional_string(l, ctx)?;
    out.push_str(&optional_string(r, ctx)?);
    Ok(Sequence::singleton(XdmItem::Atomic(XdmAtomicValue::String(out))))
}

pub(crate) fn boolean<N: XdmNode>(value: bool) -> Sequence<N> {
    Sequence::singleton(XdmItem::Atomic(XdmAtomicValue::Boolean(value)))
}

/// Atomized value of an operand that must be empty or a single item.
pub(crate) fn atomize_optional<N: XdmNode>(
    expr: &Arc<Expr>,
    ctx: &DynamicContext<N>,
    what: &str,
) -> Result<Option<XdmAtomicValue>, Error> {
    evaluate(expr, ctx)?.zero_or_one(what)?.map(|item| item.atomize()).transpose()
}

/// Atomizes every item of a sequence.
pub(crate) fn atomize_sequence<N: XdmNode>(seq: Sequence<N>) -> Result<Vec<XdmAtomicValue>, Error> {
    seq.map(|item| item.and_then(|i| i.atomize())).collect()
}

fn optional_string<N: XdmNode>(expr: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<String, Error> {
    Ok(atomize_optional(expr, ctx, "||")?.map(|v| v.string_value()).unwrap_or_default())
}
