//! Compilation: lowering syntax trees to expression trees and binding them to a static context.

pub mod binder;
pub mod expr;
pub mod specificity;

use std::sync::Arc;
use tracing::trace;

use crate::engine::compare::ValueOp;
use crate::engine::runtime::{DynamicContext, Error, StaticContext};
use crate::model::{QName, XdmNode};
use crate::parser::ast;
use crate::xdm::{KindTest, NameTest, NodeTest, Sequence, XdmAtomicValue, XdmSequence};

pub use crate::parser::Language;
pub use binder::StaticBindings;
pub use expr::{ArithOp, AtomicTypeRef, Axis, Call, Expr, NodeOp, SetOp, TypeRef};
pub use specificity::{Bucket, Specificity, buckets_for_node};

/// A bound expression ready for evaluation, together with the static lookups it depends on.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    pub source: Option<Arc<str>>,
    pub language: Language,
    pub debug: bool,
    pub expr: Arc<Expr>,
    pub bindings: StaticBindings,
    pub specificity: Specificity,
    pub bucket: Option<Bucket>,
}

impl CompiledExpression {
    pub fn evaluate<N: XdmNode>(&self, ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
        self.expr.evaluate(ctx)
    }

    /// Evaluates and materializes the result.
    pub fn evaluate_items<N: XdmNode>(&self, ctx: &DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        self.evaluate(ctx)?.materialize()
    }
}

/// Parses, lowers and binds `text` for XPath 3.1 without debug checks.
pub fn compile(text: &str, ctx: &StaticContext) -> Result<CompiledExpression, Error> {
    compile_with(text, ctx, Language::XPath3, false)
}

pub fn compile_with(
    text: &str,
    ctx: &StaticContext,
    language: Language,
    debug: bool,
) -> Result<CompiledExpression, Error> {
    let tree = crate::parser::parse(text, language)?;
    let half = lower(&tree)?;
    let mut compiled = bind(&half, ctx, language, debug)?;
    compiled.source = Some(Arc::from(text));
    Ok(compiled)
}

/// Binds a lowered tree against `ctx`.
pub fn bind(
    half: &Arc<Expr>,
    ctx: &StaticContext,
    language: Language,
    debug: bool,
) -> Result<CompiledExpression, Error> {
    let (expr, bindings) = binder::bind(half, ctx, debug)?;
    trace!(?bindings, "bound expression");
    Ok(CompiledExpression {
        source: None,
        language,
        debug,
        specificity: specificity::specificity_of(&expr),
        bucket: specificity::bucket_of(&expr),
        expr,
        bindings,
    })
}

/// Turns a syntax tree into the half-compiled expression tree.
pub fn lower(tree: &ast::Expr) -> Result<Arc<Expr>, Error> {
    Ok(Arc::new(lower_expr(tree)?))
}

fn lower_arc(tree: &ast::Expr) -> Result<Arc<Expr>, Error> {
    lower_expr(tree).map(Arc::new)
}

fn lower_all(trees: &[ast::Expr]) -> Result<Vec<Arc<Expr>>, Error> {
    trees.iter().map(lower_arc).collect()
}

pub(crate) fn to_qname(q: &ast::QName) -> QName {
    QName { prefix: q.prefix.clone(), local: q.local.clone(), ns_uri: q.ns_uri.clone() }
}

fn lower_expr(tree: &ast::Expr) -> Result<Expr, Error> {
    use ast::Expr as A;
    match tree {
        A::Literal(lit) => Ok(Expr::Literal(lower_literal(lit))),
        A::EmptySequence => Ok(Expr::Empty),
        A::VarRef(q) => Ok(Expr::VarRef(to_qname(q))),
        A::ContextItem => Ok(Expr::ContextItem),
        A::Sequence(items) => lower_all(items).map(Expr::Sequence),
        A::FunctionCall { name, args, span } => lower_call(name, args, *span),
        A::NamedFunctionRef { name, arity, span } => {
            Ok(Expr::NamedFunctionRef { name: to_qname(name), arity: *arity, span: *span, target: None })
        }
        A::Path(path) => lower_path(path),
        A::Quantified { .. } | A::ForExpr { .. } | A::LetExpr { .. } => lower_binding_expr(tree),
        A::InstanceOf { .. } | A::TreatAs { .. } | A::CastAs { .. } | A::CastableAs { .. } => lower_type_expr(tree),
        _ => lower_operator(tree),
    }
}

fn lower_literal(lit: &ast::Literal) -> XdmAtomicValue {
    match lit {
        ast::Literal::Integer(i) => XdmAtomicValue::Integer(*i),
        ast::Literal::Decimal(d) => XdmAtomicValue::Decimal(*d),
        ast::Literal::Double(d) => XdmAtomicValue::Double(*d),
        ast::Literal::String(s) => XdmAtomicValue::String(s.clone()),
    }
}

fn lower_call(name: &ast::QName, args: &[ast::Expr], span: Option<ast::Span>) -> Result<Expr, Error> {
    Ok(Expr::Call(Call { name: to_qname(name), args: lower_all(args)?, span, target: None, check_return: false }))
}

fn lower_operator(tree: &ast::Expr) -> Result<Expr, Error> {
    use ast::Expr as A;
    Ok(match tree {
        A::DynamicCall { callee, args } => Expr::DynamicCall { callee: lower_arc(callee)?, args: lower_all(args)? },
        A::Filter { base, predicates } => Expr::Filter { base: lower_arc(base)?, predicates: lower_all(predicates)? },
        A::Binary { left, op, right } => {
            let (l, r) = (lower_arc(left)?, lower_arc(right)?);
            let arith = |op| Expr::Arithmetic { op, left: l.clone(), right: r.clone() };
            match op {
                ast::BinaryOp::And => Expr::And(l, r),
                ast::BinaryOp::Or => Expr::Or(l, r),
                ast::BinaryOp::Add => arith(ArithOp::Add),
                ast::BinaryOp::Sub => arith(ArithOp::Sub),
                ast::BinaryOp::Mul => arith(ArithOp::Mul),
                ast::BinaryOp::Div => arith(ArithOp::Div),
                ast::BinaryOp::IDiv => arith(ArithOp::IDiv),
                ast::BinaryOp::Mod => arith(ArithOp::Mod),
            }
        }
        A::GeneralComparison { left, op, right } => Expr::GeneralCompare {
            op: match op {
                ast::GeneralComp::Eq => ValueOp::Eq,
                ast::GeneralComp::Ne => ValueOp::Ne,
                ast::GeneralComp::Lt => ValueOp::Lt,
                ast::GeneralComp::Le => ValueOp::Le,
                ast::GeneralComp::Gt => ValueOp::Gt,
                ast::GeneralComp::Ge => ValueOp::Ge,
            },
            left: lower_arc(left)?,
            right: lower_arc(right)?,
        },
        A::ValueComparison { left, op, right } => Expr::ValueCompare {
            op: match op {
                ast::ValueComp::Eq => ValueOp::Eq,
                ast::ValueComp::Ne => ValueOp::Ne,
                ast::ValueComp::Lt => ValueOp::Lt,
                ast::ValueComp::Le => ValueOp::Le,
                ast::ValueComp::Gt => ValueOp::Gt,
                ast::ValueComp::Ge => ValueOp::Ge,
            },
            left: lower_arc(left)?,
            right: lower_arc(right)?,
        },
        A::NodeComparison { left, op, right } => Expr::NodeCompare {
            op: match op {
                ast::NodeComp::Is => NodeOp::Is,
                ast::NodeComp::Precedes => NodeOp::Precedes,
                ast::NodeComp::Follows => NodeOp::Follows,
            },
            left: lower_arc(left)?,
            right: lower_arc(right)?,
        },
        A::Unary { sign, expr } => {
            Expr::Unary { negate: *sign == ast::UnarySign::Minus, operand: lower_arc(expr)? }
        }
        A::IfThenElse { cond, then_expr, else_expr } => Expr::If {
            cond: lower_arc(cond)?,
            then_branch: lower_arc(then_expr)?,
            else_branch: lower_arc(else_expr)?,
        },
        A::Range { start, end } => Expr::Range { start: lower_arc(start)?, end: lower_arc(end)? },
        A::SetOp { left, op, right } => Expr::SetOp { op: *op, left: lower_arc(left)?, right: lower_arc(right)? },
        A::StringConcat { left, right } => Expr::StringConcat(lower_arc(left)?, lower_arc(right)?),
        A::SimpleMap { left, right } => Expr::SimpleMap(lower_arc(left)?, lower_arc(right)?),
        other => return lower_expr(other),
    })
}

fn lower_type_expr(tree: &ast::Expr) -> Result<Expr, Error> {
    use ast::Expr as A;
    Ok(match tree {
        A::InstanceOf { expr, ty } => Expr::InstanceOf { operand: lower_arc(expr)?, ty: TypeRef::Lexical(ty.clone()) },
        A::TreatAs { expr, ty } => Expr::Treat { operand: lower_arc(expr)?, ty: TypeRef::Lexical(ty.clone()) },
        A::CastAs { expr, ty } => Expr::Cast {
            operand: lower_arc(expr)?,
            target: AtomicTypeRef::Lexical(ty.atomic.clone()),
            optional: ty.optional,
        },
        A::CastableAs { expr, ty } => Expr::Castable {
            operand: lower_arc(expr)?,
            target: AtomicTypeRef::Lexical(ty.atomic.clone()),
            optional: ty.optional,
        },
        other => return lower_expr(other),
    })
}

fn lower_binding_expr(tree: &ast::Expr) -> Result<Expr, Error> {
    use ast::Expr as A;
    Ok(match tree {
        A::Quantified { kind, bindings, satisfies } => Expr::Quantified {
            every: *kind == ast::Quantifier::Every,
            bindings: bindings
                .iter()
                .map(|b| Ok((to_qname(&b.var), lower_arc(&b.expr)?)))
                .collect::<Result<Vec<_>, Error>>()?,
            satisfies: lower_arc(satisfies)?,
        },
        A::ForExpr { bindings, return_expr } => {
            let mut body = lower_expr(return_expr)?;
            for b in bindings.iter().rev() {
                body = Expr::For { var: to_qname(&b.var), source: lower_arc(&b.expr)?, body: Arc::new(body) };
            }
            body
        }
        A::LetExpr { bindings, return_expr } => {
            let mut body = lower_expr(return_expr)?;
            for b in bindings.iter().rev() {
                body = Expr::Let { var: to_qname(&b.var), value: lower_arc(&b.expr)?, body: Arc::new(body) };
            }
            body
        }
        other => return lower_expr(other),
    })
}

fn lower_path(path: &ast::PathExpr) -> Result<Expr, Error> {
    let mut steps = Vec::with_capacity(path.steps.len() + 2);
    match path.start {
        ast::PathStart::Relative => {}
        ast::PathStart::Root => steps.push(Arc::new(Expr::RootNode)),
        ast::PathStart::RootDescendant => {
            steps.push(Arc::new(Expr::RootNode));
            steps.push(Arc::new(Expr::Axis { axis: Axis::DescendantOrSelf, test: NodeTest::AnyKind }));
        }
    }
    for step in &path.steps {
        steps.push(Arc::new(lower_step(step)?));
    }
    Ok(match steps.len() {
        1 if matches!(*steps[0], Expr::RootNode) => Expr::RootNode,
        _ => Expr::Path(steps),
    })
}

fn lower_step(step: &ast::Step) -> Result<Expr, Error> {
    match step {
        ast::Step::Expr(e) => lower_expr(e),
        ast::Step::Axis { axis, test, predicates } => {
            if *axis == Axis::Namespace {
                return Err(Error::not_implemented("the namespace axis"));
            }
            let base = Expr::Axis { axis: *axis, test: lower_node_test(test)? };
            if predicates.is_empty() {
                Ok(base)
            } else {
                Ok(Expr::Filter { base: Arc::new(base), predicates: lower_all(predicates)? })
            }
        }
    }
}

pub(crate) fn lower_node_test(test: &ast::NodeTest) -> Result<NodeTest, Error> {
    Ok(match test {
        ast::NodeTest::Name(ast::NameTest::QName(q)) => NodeTest::Name(NameTest::Exact(to_qname(q))),
        ast::NodeTest::Name(ast::NameTest::Wildcard(w)) => NodeTest::Name(match w {
            ast::WildcardName::Any => NameTest::Any,
            ast::WildcardName::NsWildcard(prefix) => NameTest::Namespace { prefix: prefix.clone(), ns_uri: None },
            ast::WildcardName::UriWildcard(uri) => {
                NameTest::Namespace { prefix: String::new(), ns_uri: Some(uri.clone()) }
            }
            ast::WildcardName::LocalWildcard(local) => NameTest::Local(local.clone()),
        }),
        ast::NodeTest::Kind(kind) => lower_kind_test(kind)?,
    })
}

fn untyped_annotation(ty: &Option<ast::QName>) -> Result<(), Error> {
    match ty {
        None => Ok(()),
        Some(q) if matches!(q.local.as_str(), "anyType" | "untyped" | "anySimpleType" | "untypedAtomic") => Ok(()),
        Some(q) => Err(Error::not_implemented(&format!("type annotation {} in a kind test", q.local))),
    }
}

pub(crate) fn lower_kind_test(kind: &ast::KindTest) -> Result<NodeTest, Error> {
    Ok(match kind {
        ast::KindTest::AnyKind => NodeTest::AnyKind,
        ast::KindTest::Document(None) => NodeTest::Kind(KindTest::Document),
        ast::KindTest::Document(Some(_)) => return Err(Error::not_implemented("document-node() with an element test")),
        ast::KindTest::Text => NodeTest::Kind(KindTest::Text),
        ast::KindTest::Comment => NodeTest::Kind(KindTest::Comment),
        ast::KindTest::NamespaceNode => return Err(Error::not_implemented("namespace-node()")),
        ast::KindTest::ProcessingInstruction(target) => {
            NodeTest::Kind(KindTest::ProcessingInstruction(target.clone()))
        }
        ast::KindTest::Element { name, ty } => {
            untyped_annotation(ty)?;
            NodeTest::Kind(KindTest::Element(name.as_ref().map(to_qname)))
        }
        ast::KindTest::Attribute { name, ty } => {
            untyped_annotation(ty)?;
            NodeTest::Kind(KindTest::Attribute(name.as_ref().map(to_qname)))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::{ErrorCode, StaticContextBuilder};
    use rstest::rstest;

    fn half(text: &str) -> Arc<Expr> {
        lower(&crate::parser::parse(text, Language::XPath3).unwrap()).unwrap()
    }

    #[rstest]
    fn leading_slash_becomes_root_step() {
        match &*half("/a") {
            Expr::Path(steps) => {
                assert!(matches!(*steps[0], Expr::RootNode));
                assert!(matches!(*steps[1], Expr::Axis { axis: Axis::Child, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(*half("/"), Expr::RootNode));
    }

    #[rstest]
    fn step_predicates_wrap_the_axis() {
        match &*half("a[1]") {
            Expr::Path(steps) => assert!(matches!(&*steps[0], Expr::Filter { base, .. } if matches!(**base, Expr::Axis { .. }))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn multiple_for_bindings_nest() {
        match &*half("for $a in 1, $b in 2 return $a + $b") {
            Expr::For { var, body, .. } => {
                assert_eq!(var.local, "a");
                assert!(matches!(**body, Expr::For { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn namespace_axis_is_not_implemented() {
        let tree = crate::parser::parse("namespace::*", Language::XPath3).unwrap();
        assert_eq!(lower(&tree).unwrap_err().code_enum(), ErrorCode::NYI0000);
    }

    #[rstest]
    fn compile_keeps_source() {
        let ctx = StaticContextBuilder::new().build();
        let compiled = compile("1 + 2", &ctx).unwrap();
        assert_eq!(compiled.source.as_deref(), Some("1 + 2"));
        assert_eq!(compiled.language, Language::XPath3);
    }
}
