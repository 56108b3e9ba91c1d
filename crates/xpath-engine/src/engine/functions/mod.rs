//! The built-in `fn:` library.
//!
//! Signatures are registered once for the whole process; implementations are generic over the
//! node type and cached per `TypeId`. Both are produced by the same registration pass so a
//! signature never exists without its implementation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::consts::FNS;
use crate::engine::registry::{FunctionImplementations, FunctionSignature, FunctionSignatures};
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{AtomicType, ExpandedName, Occurrence, SequenceType, XdmAtomicValue, XdmItem, XdmSequence};

pub mod boolean;
pub mod nodes;
pub mod numeric;
pub mod regex;
pub mod sequences;
pub mod strings;

// ===== shared helpers for implementations =====

pub(crate) fn atomic<N>(value: XdmAtomicValue) -> XdmSequence<N> {
    vec![XdmItem::Atomic(value)]
}

pub(crate) fn string_result<N>(s: impl Into<String>) -> XdmSequence<N> {
    atomic(XdmAtomicValue::String(s.into()))
}

pub(crate) fn bool_result<N>(b: bool) -> XdmSequence<N> {
    atomic(XdmAtomicValue::Boolean(b))
}

pub(crate) fn int_result<N>(i: i64) -> XdmSequence<N> {
    atomic(XdmAtomicValue::Integer(i))
}

/// String value of an `xs:string?`-style argument; the empty sequence reads as `""`.
pub(crate) fn opt_string<N: XdmNode>(arg: &[XdmItem<N>]) -> Result<String, Error> {
    match arg.first() {
        Some(item) => item.string_value(),
        None => Ok(String::new()),
    }
}

/// The context item as a node, for the zero-argument forms of node accessors.
pub(crate) fn context_node_arg<N: XdmNode>(ctx: &CallCtx<N>) -> Result<XdmSequence<N>, Error> {
    match ctx.dyn_ctx.context_item()? {
        item @ XdmItem::Node(_) => Ok(vec![item.clone()]),
        other => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("fn:{}() requires a node as context item, found {}", ctx.name.local, other.type_label()),
        )),
    }
}

// ===== signature shorthands =====

fn one(t: AtomicType) -> SequenceType {
    SequenceType::atomic(t, Occurrence::ExactlyOne)
}

fn opt(t: AtomicType) -> SequenceType {
    SequenceType::atomic(t, Occurrence::ZeroOrOne)
}

fn many(t: AtomicType) -> SequenceType {
    SequenceType::atomic(t, Occurrence::ZeroOrMore)
}

fn items() -> SequenceType {
    SequenceType::item(Occurrence::ZeroOrMore)
}

fn node_opt() -> SequenceType {
    SequenceType::node(Occurrence::ZeroOrOne)
}

fn numeric_opt() -> SequenceType {
    SequenceType::numeric(Occurrence::ZeroOrOne)
}

fn register_default_functions<N: XdmNode>(
    mut reg: Option<&mut FunctionImplementations<N>>,
    mut sigs: Option<&mut FunctionSignatures>,
) {
    use AtomicType::{AnyAtomicType as Atomic, Boolean, Double, Integer, QName, String as Str};

    let name = |local: &str| ExpandedName::ns(FNS, local);

    macro_rules! reg_ns {
        ($local:expr, [$($param:expr),* $(,)?] => $ret:expr, $func:expr $(,)?) => {{
            let sig = FunctionSignature::new(name($local), vec![$($param),*], $ret);
            if let Some(r) = reg.as_mut() {
                r.register(sig.key(), Arc::new($func));
            }
            if let Some(s) = sigs.as_mut() {
                s.register(sig);
            }
        }};
    }
    // one signature per listed arity, sharing an implementation
    macro_rules! reg_ns_range {
        ($local:expr, { $([$($param:expr),* $(,)?]),+ $(,)? } => $ret:expr, $func:expr $(,)?) => {{
            $( reg_ns!($local, [$($param),*] => $ret, $func); )+
        }};
    }
    macro_rules! reg_ns_variadic {
        ($local:expr, [$($param:expr),+ $(,)?] => $ret:expr, $func:expr $(,)?) => {{
            let sig = FunctionSignature::new(name($local), vec![$($param),+], $ret).variadic();
            if let Some(r) = reg.as_mut() {
                r.register(sig.key(), Arc::new($func));
            }
            if let Some(s) = sigs.as_mut() {
                s.register(sig);
            }
        }};
    }

    // ===== boolean and context =====
    reg_ns!("true", [] => one(Boolean), boolean::fn_true::<N>);
    reg_ns!("false", [] => one(Boolean), boolean::fn_false::<N>);
    reg_ns!("not", [items()] => one(Boolean), boolean::fn_not::<N>);
    reg_ns!("boolean", [items()] => one(Boolean), boolean::fn_boolean::<N>);
    reg_ns!("position", [] => one(Integer), boolean::position_fn::<N>);
    reg_ns!("last", [] => one(Integer), boolean::last_fn::<N>);

    // ===== node accessors =====
    reg_ns_range!("name", { [], [node_opt()] } => one(Str), nodes::name_fn::<N>);
    reg_ns_range!("local-name", { [], [node_opt()] } => one(Str), nodes::local_name_fn::<N>);
    reg_ns_range!("namespace-uri", { [], [node_opt()] } => one(AtomicType::AnyUri), nodes::namespace_uri_fn::<N>);
    reg_ns_range!("node-name", { [], [node_opt()] } => opt(QName), nodes::node_name_fn::<N>);
    reg_ns_range!("root", { [], [node_opt()] } => node_opt(), nodes::root_fn::<N>);
    reg_ns_range!("has-children", { [], [node_opt()] } => one(Boolean), nodes::has_children_fn::<N>);
    reg_ns_range!("data", { [], [items()] } => many(Atomic), nodes::data_fn::<N>);
    reg_ns_range!(
        "string",
        { [], [SequenceType::item(Occurrence::ZeroOrOne)] } => one(Str),
        nodes::string_fn::<N>,
    );

    // ===== strings =====
    reg_ns_variadic!("concat", [opt(Atomic), opt(Atomic)] => one(Str), strings::concat_fn::<N>);
    reg_ns_range!("string-length", { [], [opt(Str)] } => one(Integer), strings::string_length_fn::<N>);
    reg_ns_range!(
        "contains",
        { [opt(Str), opt(Str)], [opt(Str), opt(Str), one(Str)] } => one(Boolean),
        strings::contains_fn::<N>,
    );
    reg_ns_range!(
        "starts-with",
        { [opt(Str), opt(Str)], [opt(Str), opt(Str), one(Str)] } => one(Boolean),
        strings::starts_with_fn::<N>,
    );
    reg_ns_range!(
        "ends-with",
        { [opt(Str), opt(Str)], [opt(Str), opt(Str), one(Str)] } => one(Boolean),
        strings::ends_with_fn::<N>,
    );
    reg_ns_range!(
        "substring",
        { [opt(Str), one(Double)], [opt(Str), one(Double), one(Double)] } => one(Str),
        strings::substring_fn::<N>,
    );
    reg_ns_range!(
        "substring-before",
        { [opt(Str), opt(Str)], [opt(Str), opt(Str), one(Str)] } => one(Str),
        strings::substring_before_fn::<N>,
    );
    reg_ns_range!(
        "substring-after",
        { [opt(Str), opt(Str)], [opt(Str), opt(Str), one(Str)] } => one(Str),
        strings::substring_after_fn::<N>,
    );
    reg_ns_range!("normalize-space", { [], [opt(Str)] } => one(Str), strings::normalize_space_fn::<N>);
    reg_ns_range!(
        "normalize-unicode",
        { [opt(Str)], [opt(Str), one(Str)] } => one(Str),
        strings::normalize_unicode_fn::<N>,
    );
    reg_ns!("translate", [opt(Str), one(Str), one(Str)] => one(Str), strings::translate_fn::<N>);
    reg_ns!("upper-case", [opt(Str)] => one(Str), strings::upper_case_fn::<N>);
    reg_ns!("lower-case", [opt(Str)] => one(Str), strings::lower_case_fn::<N>);
    reg_ns_range!(
        "string-join",
        { [many(Atomic)], [many(Atomic), one(Str)] } => one(Str),
        strings::string_join_fn::<N>,
    );
    reg_ns_range!(
        "compare",
        { [opt(Str), opt(Str)], [opt(Str), opt(Str), one(Str)] } => opt(Integer),
        strings::compare_fn::<N>,
    );
    reg_ns!("string-to-codepoints", [opt(Str)] => many(Integer), strings::string_to_codepoints_fn::<N>);
    reg_ns!("codepoints-to-string", [many(Integer)] => one(Str), strings::codepoints_to_string_fn::<N>);

    // ===== regular expressions =====
    reg_ns_range!(
        "matches",
        { [opt(Str), one(Str)], [opt(Str), one(Str), one(Str)] } => one(Boolean),
        regex::matches_fn::<N>,
    );
    reg_ns_range!(
        "replace",
        { [opt(Str), one(Str), one(Str)], [opt(Str), one(Str), one(Str), one(Str)] } => one(Str),
        regex::replace_fn::<N>,
    );
    reg_ns_range!(
        "tokenize",
        { [opt(Str)], [opt(Str), one(Str)], [opt(Str), one(Str), one(Str)] } => many(Str),
        regex::tokenize_fn::<N>,
    );

    // ===== numerics and aggregates =====
    reg_ns_range!("number", { [], [opt(Atomic)] } => one(Double), numeric::number_fn::<N>);
    reg_ns!("abs", [numeric_opt()] => numeric_opt(), numeric::abs_fn::<N>);
    reg_ns!("floor", [numeric_opt()] => numeric_opt(), numeric::floor_fn::<N>);
    reg_ns!("ceiling", [numeric_opt()] => numeric_opt(), numeric::ceiling_fn::<N>);
    reg_ns!("round", [numeric_opt()] => numeric_opt(), numeric::round_fn::<N>);
    reg_ns_range!("sum", { [many(Atomic)], [many(Atomic), opt(Atomic)] } => opt(Atomic), numeric::sum_fn::<N>);
    reg_ns!("avg", [many(Atomic)] => opt(Atomic), numeric::avg_fn::<N>);
    reg_ns_range!("min", { [many(Atomic)], [many(Atomic), one(Str)] } => opt(Atomic), numeric::min_fn::<N>);
    reg_ns_range!("max", { [many(Atomic)], [many(Atomic), one(Str)] } => opt(Atomic), numeric::max_fn::<N>);
    reg_ns!("count", [items()] => one(Integer), numeric::count_fn::<N>);

    // ===== sequences =====
    reg_ns!("empty", [items()] => one(Boolean), sequences::empty_fn::<N>);
    reg_ns!("exists", [items()] => one(Boolean), sequences::exists_fn::<N>);
    reg_ns_range!(
        "distinct-values",
        { [many(Atomic)], [many(Atomic), one(Str)] } => many(Atomic),
        sequences::distinct_values_fn::<N>,
    );
    reg_ns!("reverse", [items()] => items(), sequences::reverse_fn::<N>);
    reg_ns_range!(
        "subsequence",
        { [items(), one(Double)], [items(), one(Double), one(Double)] } => items(),
        sequences::subsequence_fn::<N>,
    );
    reg_ns!("head", [items()] => SequenceType::item(Occurrence::ZeroOrOne), sequences::head_fn::<N>);
    reg_ns!("tail", [items()] => items(), sequences::tail_fn::<N>);
    reg_ns_range!(
        "index-of",
        { [many(Atomic), one(Atomic)], [many(Atomic), one(Atomic), one(Str)] } => many(Integer),
        sequences::index_of_fn::<N>,
    );
    reg_ns!("insert-before", [items(), one(Integer), items()] => items(), sequences::insert_before_fn::<N>);
    reg_ns!("remove", [items(), one(Integer)] => items(), sequences::remove_fn::<N>);
    reg_ns!(
        "exactly-one",
        [items()] => SequenceType::item(Occurrence::ExactlyOne),
        sequences::exactly_one_fn::<N>,
    );
    reg_ns!(
        "zero-or-one",
        [items()] => SequenceType::item(Occurrence::ZeroOrOne),
        sequences::zero_or_one_fn::<N>,
    );
    reg_ns!(
        "one-or-more",
        [items()] => SequenceType::item(Occurrence::OneOrMore),
        sequences::one_or_more_fn::<N>,
    );
    reg_ns!("unordered", [items()] => items(), sequences::unordered_fn::<N>);
    reg_ns_range!(
        "error",
        {
            [],
            [opt(QName)],
            [opt(QName), one(Str)],
            [opt(QName), one(Str), items()],
        } => SequenceType::Empty,
        sequences::error_fn::<N>,
    );
}

/// Signatures of the built-in library, shared by every default static context.
pub fn default_function_signatures() -> Arc<FunctionSignatures> {
    static SIGS: OnceLock<Arc<FunctionSignatures>> = OnceLock::new();
    Arc::clone(SIGS.get_or_init(|| {
        let mut sigs = FunctionSignatures::new();
        register_default_functions::<crate::model::simple::SimpleNode>(None, Some(&mut sigs));
        Arc::new(sigs)
    }))
}

/// Implementations of the built-in library for node type `N`, built once per type.
pub fn default_function_implementations<N: XdmNode>() -> Arc<FunctionImplementations<N>> {
    static CACHE: OnceLock<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>> = OnceLock::new();
    let map = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = map.lock().unwrap_or_else(PoisonError::into_inner);
    let type_id = TypeId::of::<N>();
    if let Some(existing) = guard.get(&type_id).and_then(|b| b.downcast_ref::<Arc<FunctionImplementations<N>>>()) {
        return Arc::clone(existing);
    }
    let mut reg = FunctionImplementations::new();
    register_default_functions(Some(&mut reg), None);
    let arc = Arc::new(reg);
    guard.insert(type_id, Box::new(Arc::clone(&arc)));
    arc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use rstest::rstest;

    #[rstest]
    fn every_signature_has_an_implementation() {
        let sigs = default_function_signatures();
        let imps = default_function_implementations::<SimpleNode>();
        assert_eq!(sigs.len(), imps.len());
        for sig in sigs.iter() {
            assert!(imps.get(&sig.key()).is_some(), "missing implementation for {sig}");
        }
    }

    #[rstest]
    fn implementations_are_cached_per_node_type() {
        let a = default_function_implementations::<SimpleNode>();
        let b = default_function_implementations::<SimpleNode>();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[rstest]
    #[case("concat", 5, true)]
    #[case("concat", 1, false)]
    #[case("substring", 3, true)]
    #[case("substring", 4, false)]
    fn arity_resolution(#[case] local: &str, #[case] arity: usize, #[case] found: bool) {
        let sigs = default_function_signatures();
        assert_eq!(sigs.resolve(&ExpandedName::ns(FNS, local), arity).is_some(), found);
    }
}
