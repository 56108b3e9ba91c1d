//! Static binding of a lowered expression tree.
//!
//! Binding resolves every lexical name against a [`StaticContext`]: namespace prefixes, variable
//! references, function calls and type names. Each lookup is recorded in [`StaticBindings`] so that
//! a cached compilation can later be reused for any context that answers the same lookups the same
//! way.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::consts::XS;
use crate::engine::registry::FunctionSignature;
use crate::engine::runtime::{Error, ErrorCode, StaticContext};
use crate::model::QName;
use crate::parser::ast;
use crate::xdm::types::atomic_type_for;
use crate::xdm::{AtomicType, ExpandedName, ItemType, KindTest, NameTest, NodeTest, Occurrence, SequenceType};

use super::expr::{AtomicTypeRef, Axis, Call, Expr, TypeRef, expanded};
use super::lower_kind_test;

/// A function-name resolver answer observed while binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionNameLookup {
    pub prefix: String,
    pub local: String,
    pub arity: usize,
    pub resolved: Option<ExpandedName>,
}

/// Everything a compiled expression looked up in its static context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticBindings {
    /// Prefix → URI as resolved (`None` when the prefix was unknown).
    pub namespaces: BTreeMap<String, Option<String>>,
    /// Set when the default element namespace was consulted.
    pub default_element_namespace: Option<Option<String>>,
    /// Set when the default function namespace was consulted.
    pub default_function_namespace: Option<Option<String>>,
    pub variables: BTreeSet<ExpandedName>,
    pub module_imports: BTreeMap<String, Option<String>>,
    /// Whether a function-name resolver was present, if function names were resolved at all.
    pub function_name_resolver: Option<bool>,
    pub function_name_lookups: Vec<FunctionNameLookup>,
    pub functions: Vec<(ExpandedName, usize, Arc<FunctionSignature>)>,
}

impl StaticBindings {
    /// True when `ctx` answers every recorded lookup the same way.
    pub fn is_satisfied_by(&self, ctx: &StaticContext) -> bool {
        self.namespaces.iter().all(|(prefix, uri)| &ctx.resolve_prefix(prefix) == uri)
            && self.default_element_namespace.as_ref().is_none_or(|v| v == &ctx.default_element_namespace)
            && self.default_function_namespace.as_ref().is_none_or(|v| v == &ctx.default_function_namespace)
            && self.variables.iter().all(|v| ctx.in_scope_variables.contains(v))
            && self.module_imports.iter().all(|(prefix, uri)| &ctx.module_imports.get(prefix).cloned() == uri)
            && self.function_name_resolver.is_none_or(|present| present == ctx.function_name_resolver.is_some())
            && self.function_name_lookups.iter().all(|lookup| {
                ctx.function_name_resolver
                    .as_ref()
                    .is_some_and(|r| r.resolve(&lookup.prefix, &lookup.local, lookup.arity) == lookup.resolved)
            })
            && self.functions.iter().all(|(name, arity, sig)| {
                ctx.function_signatures.resolve(name, *arity).is_some_and(|current| Arc::ptr_eq(&current, sig))
            })
    }
}

/// Binds `expr` against `ctx`, returning the bound tree and the lookups it consumed.
pub fn bind(expr: &Arc<Expr>, ctx: &StaticContext, debug: bool) -> Result<(Arc<Expr>, StaticBindings), Error> {
    let mut binder = Binder { ctx, debug, locals: Vec::new(), record: StaticBindings::default() };
    let bound = binder.expr(expr)?;
    Ok((bound, binder.record))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DefaultNs {
    None,
    Element,
}

struct Binder<'a> {
    ctx: &'a StaticContext,
    debug: bool,
    locals: Vec<ExpandedName>,
    record: StaticBindings,
}

impl Binder<'_> {
    fn prefix_uri(&mut self, prefix: &str) -> Result<String, Error> {
        let uri = self.ctx.resolve_prefix(prefix);
        self.record.namespaces.insert(prefix.to_string(), uri.clone());
        uri.ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0081, format!("namespace prefix '{prefix}' is not declared"))
        })
    }

    fn default_element_namespace(&mut self) -> Option<String> {
        let uri = self.ctx.default_element_namespace.clone();
        self.record.default_element_namespace = Some(uri.clone());
        uri
    }

    fn name(&mut self, q: &QName, default: DefaultNs) -> Result<QName, Error> {
        if q.ns_uri.is_some() {
            return Ok(q.clone());
        }
        let ns_uri = match (&q.prefix, default) {
            (Some(p), _) => Some(self.prefix_uri(p)?),
            (None, DefaultNs::Element) => self.default_element_namespace(),
            (None, DefaultNs::None) => None,
        };
        Ok(QName { prefix: q.prefix.clone(), local: q.local.clone(), ns_uri })
    }

    fn ast_name(&mut self, q: &ast::QName, default: DefaultNs) -> Result<QName, Error> {
        self.name(&super::to_qname(q), default)
    }

    fn located(&self, err: Error, span: Option<ast::Span>) -> Error {
        match span {
            Some(span) if self.debug => err.with_span(span),
            _ => err,
        }
    }

    fn all(&mut self, exprs: &[Arc<Expr>]) -> Result<Vec<Arc<Expr>>, Error> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn scoped<T>(&mut self, names: &[ExpandedName], f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        let depth = self.locals.len();
        self.locals.extend_from_slice(names);
        let result = f(self);
        self.locals.truncate(depth);
        result
    }

    fn expr(&mut self, e: &Arc<Expr>) -> Result<Arc<Expr>, Error> {
        match &**e {
            Expr::Literal(_) | Expr::Empty | Expr::ContextItem | Expr::RootNode => Ok(Arc::clone(e)),
            Expr::Call(call) => self.call(call),
            Expr::Quantified { every, bindings, satisfies } => self.quantified(*every, bindings, satisfies),
            Expr::For { .. }
            | Expr::Let { .. }
            | Expr::InstanceOf { .. }
            | Expr::Treat { .. }
            | Expr::Cast { .. }
            | Expr::Castable { .. }
            | Expr::NamedFunctionRef { .. } => self.declared(e),
            _ => self.operator(e),
        }
    }

    fn operator(&mut self, e: &Arc<Expr>) -> Result<Arc<Expr>, Error> {
        let bound = match &**e {
            Expr::VarRef(q) => Expr::VarRef(self.variable(q)?),
            Expr::Sequence(items) => Expr::Sequence(self.all(items)?),
            Expr::Axis { axis, test } => Expr::Axis { axis: *axis, test: self.node_test(test, *axis)? },
            Expr::Path(steps) => Expr::Path(self.all(steps)?),
            Expr::Filter { base, predicates } => {
                Expr::Filter { base: self.expr(base)?, predicates: self.all(predicates)? }
            }
            Expr::Arithmetic { op, left, right } => {
                Expr::Arithmetic { op: *op, left: self.expr(left)?, right: self.expr(right)? }
            }
            Expr::Unary { negate, operand } => Expr::Unary { negate: *negate, operand: self.expr(operand)? },
            Expr::And(l, r) => Expr::And(self.expr(l)?, self.expr(r)?),
            Expr::Or(l, r) => Expr::Or(self.expr(l)?, self.expr(r)?),
            Expr::ValueCompare { op, left, right } => {
                Expr::ValueCompare { op: *op, left: self.expr(left)?, right: self.expr(right)? }
            }
            Expr::GeneralCompare { op, left, right } => {
                Expr::GeneralCompare { op: *op, left: self.expr(left)?, right: self.expr(right)? }
            }
            Expr::NodeCompare { op, left, right } => {
                Expr::NodeCompare { op: *op, left: self.expr(left)?, right: self.expr(right)? }
            }
            Expr::Range { start, end } => Expr::Range { start: self.expr(start)?, end: self.expr(end)? },
            Expr::SetOp { op, left, right } => Expr::SetOp { op: *op, left: self.expr(left)?, right: self.expr(right)? },
            Expr::If { cond, then_branch, else_branch } => Expr::If {
                cond: self.expr(cond)?,
                then_branch: self.expr(then_branch)?,
                else_branch: self.expr(else_branch)?,
            },
            Expr::StringConcat(l, r) => Expr::StringConcat(self.expr(l)?, self.expr(r)?),
            Expr::SimpleMap(l, r) => Expr::SimpleMap(self.expr(l)?, self.expr(r)?),
            Expr::DynamicCall { callee, args } => Expr::DynamicCall { callee: self.expr(callee)?, args: self.all(args)? },
            _ => return self.expr(e),
        };
        Ok(Arc::new(bound))
    }

    /// Forms that introduce a variable or name a type or function.
    fn declared(&mut self, e: &Arc<Expr>) -> Result<Arc<Expr>, Error> {
        let bound = match &**e {
            Expr::For { var, source, body } => {
                let source = self.expr(source)?;
                let var = self.name(var, DefaultNs::None)?;
                let body = self.scoped(&[expanded(&var)], |b| b.expr(body))?;
                Expr::For { var, source, body }
            }
            Expr::Let { var, value, body } => {
                let value = self.expr(value)?;
                let var = self.name(var, DefaultNs::None)?;
                let body = self.scoped(&[expanded(&var)], |b| b.expr(body))?;
                Expr::Let { var, value, body }
            }
            Expr::InstanceOf { operand, ty } => {
                Expr::InstanceOf { operand: self.expr(operand)?, ty: TypeRef::Resolved(self.sequence_type(ty)?) }
            }
            Expr::Treat { operand, ty } => {
                Expr::Treat { operand: self.expr(operand)?, ty: TypeRef::Resolved(self.sequence_type(ty)?) }
            }
            Expr::Cast { operand, target, optional } => Expr::Cast {
                operand: self.expr(operand)?,
                target: AtomicTypeRef::Resolved(self.cast_target(target)?),
                optional: *optional,
            },
            Expr::Castable { operand, target, optional } => Expr::Castable {
                operand: self.expr(operand)?,
                target: AtomicTypeRef::Resolved(self.cast_target(target)?),
                optional: *optional,
            },
            Expr::NamedFunctionRef { name, arity, span, .. } => {
                let resolved = self.function_name(name, *arity).map_err(|e| self.located(e, *span))?;
                let target = self.signature(&resolved, *arity).map_err(|e| self.located(e, *span))?;
                Expr::NamedFunctionRef {
                    name: QName { ns_uri: resolved.ns_uri.clone(), ..name.clone() },
                    arity: *arity,
                    span: span.filter(|_| self.debug),
                    target: Some(target),
                }
            }
            _ => return self.expr(e),
        };
        Ok(Arc::new(bound))
    }

    fn variable(&mut self, q: &QName) -> Result<QName, Error> {
        let resolved = self.name(q, DefaultNs::None)?;
        let key = expanded(&resolved);
        if self.locals.contains(&key) {
            return Ok(resolved);
        }
        if self.ctx.in_scope_variables.contains(&key) {
            self.record.variables.insert(key);
            return Ok(resolved);
        }
        Err(Error::from_code(ErrorCode::XPST0008, format!("variable ${} is not declared", q.lexical())))
    }

    fn quantified(
        &mut self,
        every: bool,
        bindings: &[(QName, Arc<Expr>)],
        satisfies: &Arc<Expr>,
    ) -> Result<Arc<Expr>, Error> {
        let mut clauses = Vec::with_capacity(bindings.len());
        let depth = self.locals.len();
        let mut result = Ok(());
        for (var, source) in bindings {
            match self.expr(source).and_then(|s| Ok((self.name(var, DefaultNs::None)?, s))) {
                Ok((var, source)) => {
                    self.locals.push(expanded(&var));
                    clauses.push((var, source));
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        let body = result.and_then(|_| self.expr(satisfies));
        self.locals.truncate(depth);
        Ok(nest_dependent_clauses(every, clauses, body?))
    }

    fn node_test(&mut self, test: &NodeTest, axis: Axis) -> Result<NodeTest, Error> {
        let principal = if axis == Axis::Attribute { DefaultNs::None } else { DefaultNs::Element };
        Ok(match test {
            NodeTest::AnyKind => NodeTest::AnyKind,
            NodeTest::Name(NameTest::Exact(q)) => NodeTest::Name(NameTest::Exact(self.name(q, principal)?)),
            NodeTest::Name(NameTest::Namespace { prefix, ns_uri: None }) => {
                let uri = self.prefix_uri(prefix)?;
                NodeTest::Name(NameTest::Namespace { prefix: prefix.clone(), ns_uri: Some(uri) })
            }
            NodeTest::Name(other) => NodeTest::Name(other.clone()),
            NodeTest::Kind(kind) => NodeTest::Kind(self.kind_test(kind)?),
        })
    }

    fn kind_test(&mut self, kind: &KindTest) -> Result<KindTest, Error> {
        Ok(match kind {
            KindTest::Element(Some(q)) => KindTest::Element(Some(self.name(q, DefaultNs::Element)?)),
            KindTest::Attribute(Some(q)) => KindTest::Attribute(Some(self.name(q, DefaultNs::None)?)),
            other => other.clone(),
        })
    }

    fn atomic_name(&mut self, q: &ast::QName) -> Result<(QName, Option<AtomicType>), Error> {
        let name = self.ast_name(q, DefaultNs::Element)?;
        let t = atomic_type_for(name.ns_uri.as_deref(), &name.local);
        Ok((name, t))
    }

    fn sequence_type(&mut self, ty: &TypeRef) -> Result<SequenceType, Error> {
        let lexical = match ty {
            TypeRef::Resolved(t) => return Ok(t.clone()),
            TypeRef::Lexical(t) => t,
        };
        let (item, occ) = match lexical {
            ast::SequenceType::EmptySequence => return Ok(SequenceType::Empty),
            ast::SequenceType::Typed { item, occ } => (item, occ),
        };
        let item = match item {
            ast::ItemType::Item => ItemType::Item,
            ast::ItemType::AnyFunction => ItemType::Function,
            ast::ItemType::Kind(kind) => match lower_kind_test(kind)? {
                NodeTest::Kind(k) => ItemType::Node(NodeTest::Kind(self.kind_test(&k)?)),
                other => ItemType::Node(other),
            },
            ast::ItemType::Atomic(q) => {
                let (name, t) = self.atomic_name(q)?;
                match t {
                    Some(t) => ItemType::Atomic(t),
                    None if name.ns_uri.as_deref() == Some(XS) && name.local == "numeric" => ItemType::Numeric,
                    None => return Err(unknown_type(&name)),
                }
            }
        };
        let occ = match occ {
            ast::Occurrence::One => Occurrence::ExactlyOne,
            ast::Occurrence::ZeroOrOne => Occurrence::ZeroOrOne,
            ast::Occurrence::ZeroOrMore => Occurrence::ZeroOrMore,
            ast::Occurrence::OneOrMore => Occurrence::OneOrMore,
        };
        Ok(SequenceType::Of(item, occ))
    }

    fn cast_target(&mut self, target: &AtomicTypeRef) -> Result<AtomicType, Error> {
        match target {
            AtomicTypeRef::Resolved(t) => Ok(*t),
            AtomicTypeRef::Lexical(q) => match self.atomic_name(q)? {
                (_, Some(t)) if t != AtomicType::AnyAtomicType => Ok(t),
                (name, _) => Err(unknown_type(&name)),
            },
        }
    }

    /// Expanded name of a function call, in resolution order: `Q{uri}` names, the function-name
    /// resolver, module imports, namespace bindings, then the default function namespace.
    fn function_name(&mut self, name: &QName, arity: usize) -> Result<ExpandedName, Error> {
        if name.ns_uri.is_some() {
            return Ok(expanded(name));
        }
        let resolver = self.ctx.function_name_resolver.clone();
        self.record.function_name_resolver = Some(resolver.is_some());
        if let Some(resolver) = resolver {
            let prefix = name.prefix.clone().unwrap_or_default();
            let resolved = resolver.resolve(&prefix, &name.local, arity);
            self.record.function_name_lookups.push(FunctionNameLookup {
                prefix,
                local: name.local.clone(),
                arity,
                resolved: resolved.clone(),
            });
            if let Some(resolved) = resolved {
                return Ok(resolved);
            }
        }
        match &name.prefix {
            Some(prefix) => {
                let imported = self.ctx.module_imports.get(prefix).cloned();
                self.record.module_imports.insert(prefix.clone(), imported.clone());
                let uri = match imported {
                    Some(uri) => uri,
                    None => self.prefix_uri(prefix)?,
                };
                Ok(ExpandedName::new(Some(uri), name.local.clone()))
            }
            None => {
                let ns = self.ctx.default_function_namespace.clone();
                self.record.default_function_namespace = Some(ns.clone());
                Ok(ExpandedName::new(ns, name.local.clone()))
            }
        }
    }

    fn signature(&mut self, name: &ExpandedName, arity: usize) -> Result<Arc<FunctionSignature>, Error> {
        match self.ctx.function_signatures.resolve(name, arity) {
            Some(sig) => {
                self.record.functions.push((name.clone(), arity, Arc::clone(&sig)));
                Ok(sig)
            }
            None => Err(self.ctx.function_signatures.unknown_function(name, arity)),
        }
    }

    fn call(&mut self, call: &Call) -> Result<Arc<Expr>, Error> {
        let arity = call.args.len();
        let resolved = self.function_name(&call.name, arity).map_err(|e| self.located(e, call.span))?;
        let args = self.all(&call.args)?;
        if resolved.ns_uri.as_deref() == Some(XS)
            && arity == 1
            && let Some(t) = AtomicType::from_local_name(&resolved.local)
            && t != AtomicType::AnyAtomicType
        {
            return Ok(Arc::new(Expr::Cast {
                operand: Arc::clone(&args[0]),
                target: AtomicTypeRef::Resolved(t),
                optional: true,
            }));
        }
        let target = self.signature(&resolved, arity).map_err(|e| self.located(e, call.span))?;
        Ok(Arc::new(Expr::Call(Call {
            name: QName { ns_uri: resolved.ns_uri, ..call.name.clone() },
            args,
            span: call.span.filter(|_| self.debug),
            target: Some(target),
            check_return: self.debug,
        })))
    }
}

fn unknown_type(name: &QName) -> Error {
    Error::from_code(ErrorCode::XPST0051, format!("unknown atomic type {}", name.lexical()))
}

fn references_any(expr: &Expr, names: &HashSet<ExpandedName>) -> bool {
    match expr {
        Expr::VarRef(q) => names.contains(&expanded(q)),
        other => other.children().into_iter().any(|c| references_any(c, names)),
    }
}

/// Splits a quantifier whose later clauses depend on earlier variables into nested quantifiers,
/// so that every clause of one node can be materialized once up front.
fn nest_dependent_clauses(every: bool, clauses: Vec<(QName, Arc<Expr>)>, satisfies: Arc<Expr>) -> Arc<Expr> {
    let mut groups: Vec<Vec<(QName, Arc<Expr>)>> = Vec::new();
    let mut group_names = HashSet::new();
    for (var, source) in clauses {
        if references_any(&source, &group_names) {
            groups.push(Vec::new());
            group_names.clear();
        }
        group_names.insert(expanded(&var));
        match groups.last_mut() {
            Some(group) => group.push((var, source)),
            None => groups.push(vec![(var, source)]),
        }
    }
    groups
        .into_iter()
        .rev()
        .fold(satisfies, |body, bindings| Arc::new(Expr::Quantified { every, bindings, satisfies: body }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lower;
    use crate::engine::runtime::StaticContextBuilder;
    use crate::parser::{Language, parse};
    use rstest::rstest;

    fn bind_text(text: &str, ctx: &StaticContext) -> Result<(Arc<Expr>, StaticBindings), Error> {
        let half = lower(&parse(text, Language::XPath3)?)?;
        bind(&half, ctx, false)
    }

    #[rstest]
    fn unknown_prefix_is_reported() {
        let ctx = StaticContextBuilder::new().build();
        let err = bind_text("p:a", &ctx).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0081);
    }

    #[rstest]
    fn free_variables_are_recorded_and_locals_are_not() {
        let ctx = StaticContextBuilder::new().with_variable("x").build();
        let (_, bindings) = bind_text("for $y in 1 to 3 return $x + $y", &ctx).unwrap();
        assert_eq!(bindings.variables.len(), 1);
        assert!(bindings.variables.contains(&ExpandedName::local("x")));
        let err = bind_text("$z", &ctx).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }

    #[rstest]
    fn bindings_ignore_unrelated_namespaces() {
        let ctx = StaticContextBuilder::new().with_namespace("p", "urn:p").build();
        let (_, bindings) = bind_text("p:a", &ctx).unwrap();
        let wider = StaticContextBuilder::new().with_namespace("p", "urn:p").with_namespace("q", "urn:q").build();
        assert!(bindings.is_satisfied_by(&wider));
        let changed = StaticContextBuilder::new().with_namespace("p", "urn:other").build();
        assert!(!bindings.is_satisfied_by(&changed));
    }

    #[rstest]
    fn unprefixed_element_names_take_the_default_namespace() {
        let ctx = StaticContextBuilder::new().with_default_element_namespace("urn:d").build();
        let (bound, _) = bind_text("child::a/@b", &ctx).unwrap();
        let Expr::Path(steps) = &*bound else { panic!("expected a path") };
        match (&*steps[0], &*steps[1]) {
            (
                Expr::Axis { test: NodeTest::Name(NameTest::Exact(a)), .. },
                Expr::Axis { test: NodeTest::Name(NameTest::Exact(b)), .. },
            ) => {
                assert_eq!(a.ns_uri.as_deref(), Some("urn:d"));
                assert_eq!(b.ns_uri, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn constructor_functions_become_casts() {
        let ctx = StaticContextBuilder::new().build();
        let (bound, _) = bind_text("xs:integer('5')", &ctx).unwrap();
        assert!(matches!(&*bound, Expr::Cast { target: AtomicTypeRef::Resolved(AtomicType::Integer), .. }));
    }

    #[rstest]
    fn unknown_function_has_suggestions() {
        let ctx = StaticContextBuilder::new().build();
        let err = bind_text("sum3(1)", &ctx).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0017);
        assert!(err.suggestions.iter().any(|s| s == "sum"));
    }

    #[rstest]
    fn dependent_quantifier_clauses_nest() {
        let ctx = StaticContextBuilder::new().build();
        let (bound, _) = bind_text("some $a in (1, 2), $b in ($a, 3) satisfies $b = 2", &ctx).unwrap();
        match &*bound {
            Expr::Quantified { bindings, satisfies, .. } => {
                assert_eq!(bindings.len(), 1);
                assert!(matches!(**satisfies, Expr::Quantified { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn unknown_cast_target() {
        let ctx = StaticContextBuilder::new().build();
        let err = bind_text("1 cast as xs:nope", &ctx).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0051);
    }
}
