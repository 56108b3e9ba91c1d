//! Static calls, named function references and dynamic calls.

use std::sync::Arc;

use crate::compiler::expr::{Call, Expr};
use crate::engine::registry::FunctionSignature;
use crate::engine::runtime::{CallCtx, DynamicContext, Error, ErrorCode};
use crate::model::{QName, XdmNode};
use crate::xdm::cast::cast_atomic;
use crate::xdm::{AtomicType, FunctionItem, ItemType, Occurrence, Sequence, SequenceType, XdmAtomicValue, XdmItem, XdmSequence};

use super::evaluate;

fn mismatch(ty: &SequenceType, found: &str) -> Error {
    Error::from_code(ErrorCode::XPTY0004, format!("expected {ty}, found {found}"))
}

/// Converts an atomic argument value to `target`: untyped values are cast, numerics are
/// promoted along integer/decimal to float/double, and `xs:anyURI` is promoted to `xs:string`.
fn convert_atomic(value: XdmAtomicValue, item_type: &ItemType, ty: &SequenceType) -> Result<XdmAtomicValue, Error> {
    match item_type {
        ItemType::Numeric if value.is_untyped() => cast_atomic(&value, AtomicType::Double),
        ItemType::Numeric if value.is_numeric() => Ok(value),
        ItemType::Atomic(AtomicType::AnyAtomicType) => Ok(value),
        ItemType::Atomic(target) if value.is_untyped() => cast_atomic(&value, *target),
        ItemType::Atomic(target) if value.instance_of(*target) => Ok(value),
        ItemType::Atomic(target @ (AtomicType::Double | AtomicType::Float))
            if value.is_numeric() && !matches!(value, XdmAtomicValue::Double(_)) =>
        {
            cast_atomic(&value, *target)
        }
        ItemType::Atomic(AtomicType::String) if matches!(value, XdmAtomicValue::AnyUri(_)) => {
            cast_atomic(&value, AtomicType::String)
        }
        _ => Err(mismatch(ty, value.type_name().to_string().as_str())),
    }
}

/// Applies the function conversion rules of a declared parameter type to an argument value.
pub fn function_conversion<N: XdmNode>(items: XdmSequence<N>, ty: &SequenceType) -> Result<XdmSequence<N>, Error> {
    let (item_type, occ) = match ty {
        SequenceType::Empty if items.is_empty() => return Ok(items),
        SequenceType::Empty => return Err(mismatch(ty, &format!("{} item(s)", items.len()))),
        SequenceType::Of(ItemType::Item, Occurrence::ZeroOrMore) => return Ok(items),
        SequenceType::Of(item_type, occ) => (item_type, *occ),
    };
    if !occ.accepts_len(items.len()) {
        return Err(mismatch(ty, &format!("{} item(s)", items.len())));
    }
    if item_type.is_atomic() {
        return items
            .into_iter()
            .map(|item| convert_atomic(item.atomize()?, item_type, ty).map(XdmItem::Atomic))
            .collect();
    }
    match items.iter().find(|item| !item_type.matches(item)) {
        Some(bad) => Err(mismatch(ty, &bad.type_label())),
        None => Ok(items),
    }
}

fn convert_arguments<N: XdmNode>(
    signature: &FunctionSignature,
    args: &[Arc<Expr>],
    ctx: &DynamicContext<N>,
) -> Result<Vec<XdmSequence<N>>, Error> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            let items = evaluate(arg, ctx)?.materialize()?;
            match signature.param_type(i) {
                Some(ty) => function_conversion(items, ty).map_err(|mut e| {
                    e.message = format!("argument {} of {}: {}", i + 1, signature, e.message);
                    e
                }),
                None => Ok(items),
            }
        })
        .collect()
}

fn invoke<N: XdmNode>(
    signature: &FunctionSignature,
    args: &[XdmSequence<N>],
    ctx: &DynamicContext<N>,
    check_return: bool,
) -> Result<Sequence<N>, Error> {
    let func = ctx.functions.get(&signature.key()).ok_or_else(|| {
        Error::from_code(ErrorCode::XPST0017, format!("no implementation registered for {signature}"))
    })?;
    let call_ctx = CallCtx { dyn_ctx: ctx, name: &signature.name };
    let result = func(&call_ctx, args)?;
    if check_return && !signature.return_type.matches(&result) {
        return Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("{signature} returned {} item(s) not matching {}", result.len(), signature.return_type),
        ));
    }
    Ok(Sequence::from_vec(result))
}

pub(crate) fn static_call<N: XdmNode>(call: &Call, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
    let Some(signature) = &call.target else {
        return Err(Error::from_code(
            ErrorCode::XPST0017,
            format!("function {}#{} was not resolved", call.name.lexical(), call.args.len()),
        ));
    };
    let result = convert_arguments(signature, &call.args, ctx)
        .and_then(|args| invoke(signature, &args, ctx, call.check_return));
    match (result, call.span) {
        (Err(e), Some(span)) => Err(e.with_span(span)),
        (result, _) => result,
    }
}

pub(crate) fn function_ref<N: XdmNode>(
    name: &QName,
    arity: usize,
    target: Option<&Arc<FunctionSignature>>,
) -> Result<Sequence<N>, Error> {
    let signature = target.ok_or_else(|| {
        Error::from_code(ErrorCode::XPST0017, format!("function {}#{arity} was not resolved", name.lexical()))
    })?;
    Ok(Sequence::singleton(XdmItem::Function(FunctionItem { signature: Arc::clone(signature), arity })))
}

pub(crate) fn dynamic_call<N: XdmNode>(
    callee: &Arc<Expr>,
    args: &[Arc<Expr>],
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let function = match evaluate(callee, ctx)?.zero_or_one("dynamic function call")? {
        Some(XdmItem::Function(f)) => f,
        Some(other) => {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("dynamic call target must be a function item, found {}", other.type_label()),
            ));
        }
        None => {
            return Err(Error::from_code(ErrorCode::XPTY0004, "dynamic call target is the empty sequence"));
        }
    };
    if args.len() != function.arity {
        return Err(Error::arity_mismatch(format!(
            "function {}#{} called with {} argument(s)",
            function.signature.name,
            function.arity,
            args.len()
        )));
    }
    let values = convert_arguments(&function.signature, args, ctx)?;
    invoke(&function.signature, &values, ctx, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use rstest::rstest;

    fn atoms(values: Vec<XdmAtomicValue>) -> XdmSequence<SimpleNode> {
        values.into_iter().map(XdmItem::Atomic).collect()
    }

    #[rstest]
    fn untyped_argument_is_cast_to_parameter_type() {
        let out = function_conversion(
            atoms(vec![XdmAtomicValue::UntypedAtomic("2.5".into())]),
            &SequenceType::double(Occurrence::ExactlyOne),
        )
        .unwrap();
        assert_eq!(out, atoms(vec![XdmAtomicValue::Double(2.5)]));
    }

    #[rstest]
    fn integer_promotes_to_double() {
        let out = function_conversion(atoms(vec![3i64.into()]), &SequenceType::double(Occurrence::ZeroOrOne)).unwrap();
        assert_eq!(out, atoms(vec![XdmAtomicValue::Double(3.0)]));
    }

    #[rstest]
    #[case(vec![], SequenceType::string(Occurrence::ExactlyOne))]
    #[case(vec!["a".into(), "b".into()], SequenceType::string(Occurrence::ZeroOrOne))]
    #[case(vec![true.into()], SequenceType::string(Occurrence::ExactlyOne))]
    fn rejects_mismatches(#[case] values: Vec<XdmAtomicValue>, #[case] ty: SequenceType) {
        let err = function_conversion(atoms(values), &ty).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }
}
