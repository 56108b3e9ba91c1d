//! `instance of`, `treat as`, `cast as` and `castable as`.

use std::sync::Arc;

use crate::compiler::expr::{AtomicTypeRef, Expr, TypeRef};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::cast::{cast_atomic, castable as value_castable};
use crate::xdm::{AtomicType, Sequence, SequenceType, XdmAtomicValue, XdmItem};

use super::{boolean, evaluate};

fn unbound(what: &str) -> Error {
    Error::from_code(ErrorCode::XPST0051, format!("type in `{what}` was not resolved; bind the expression first"))
}

fn sequence_type<'a>(ty: &'a TypeRef, what: &str) -> Result<&'a SequenceType, Error> {
    match ty {
        TypeRef::Resolved(t) => Ok(t),
        TypeRef::Lexical(_) => Err(unbound(what)),
    }
}

fn atomic_target(target: &AtomicTypeRef, what: &str) -> Result<AtomicType, Error> {
    match target {
        AtomicTypeRef::Resolved(t) => Ok(*t),
        AtomicTypeRef::Lexical(_) => Err(unbound(what)),
    }
}

pub(crate) fn instance_of<N: XdmNode>(operand: &Arc<Expr>, ty: &TypeRef, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let ty = sequence_type(ty, "instance of")?;
    let items = evaluate(operand, ctx)?.materialize()?;
    Ok(boolean(ty.matches(&items)))
}

pub(crate) fn treat<N: XdmNode>(operand: &Arc<Expr>, ty: &TypeRef, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let ty = sequence_type(ty, "treat as")?;
    let items = evaluate(operand, ctx)?.materialize()?;
    if !ty.matches(&items) {
        return Err(Error::from_code(
            ErrorCode::XPDY0050,
            format!("treat as {ty}: value of {} item(s) does not match", items.len()),
        ));
    }
    Ok(Sequence::from_vec(items))
}

enum Operand {
    Empty,
    One(XdmAtomicValue),
    Many(usize),
}

fn cast_operand<N: XdmNode>(operand: &Arc<Expr>, ctx: &DynamicContext<N>) -> Result<Operand, Error> {
    let items = evaluate(operand, ctx)?.materialize()?;
    Ok(match items.as_slice() {
        [] => Operand::Empty,
        [item] => Operand::One(item.atomize()?),
        many => Operand::Many(many.len()),
    })
}

pub(crate) fn cast<N: XdmNode>(
    operand: &Arc<Expr>,
    target: &AtomicTypeRef,
    optional: bool,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let target = atomic_target(target, "cast as")?;
    match cast_operand(operand, ctx)? {
        Operand::One(value) => Ok(Sequence::singleton(XdmItem::Atomic(cast_atomic(&value, target)?))),
        Operand::Empty if optional => Ok(Sequence::empty()),
        Operand::Empty => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("cast as {target}: empty sequence is not allowed"),
        )),
        Operand::Many(n) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("cast as {target}: expected at most one item, found {n}"),
        )),
    }
}

pub(crate) fn castable<N: XdmNode>(
    operand: &Arc<Expr>,
    target: &AtomicTypeRef,
    optional: bool,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let target = atomic_target(target, "castable as")?;
    let result = match cast_operand(operand, ctx) {
        Ok(Operand::One(value)) => value_castable(&value, target),
        Ok(Operand::Empty) => optional,
        Ok(Operand::Many(_)) => false,
        // a function item cannot be atomized
        Err(e) if e.code_enum() == ErrorCode::FOTY0013 => false,
        Err(e) => return Err(e),
    };
    Ok(boolean(result))
}
