//! Selector specificity and bucket keys of compiled expressions.
//!
//! Hosts that use expressions as selectors rank competing matches by [`Specificity`] and
//! pre-filter candidates by [`Bucket`]: an expression with a bucket can only match nodes whose
//! [`buckets_for_node`] contain it.

use core::fmt;
use core::ops::Add;
use string_cache::DefaultAtom;

use crate::consts::FNS;
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{KindTest, NameTest, NodeTest, NodeValue};

use super::expr::{Axis, Expr, SetOp};

/// Counts compared lexicographically, most significant first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity {
    pub external: u32,
    pub attribute: u32,
    pub node_name: u32,
    pub node_type: u32,
    pub universal: u32,
}

impl Specificity {
    pub const ZERO: Specificity =
        Specificity { external: 0, attribute: 0, node_name: 0, node_type: 0, universal: 0 };

    pub fn new(external: u32, attribute: u32, node_name: u32, node_type: u32, universal: u32) -> Self {
        Self { external, attribute, node_name, node_type, universal }
    }
}

impl Add for Specificity {
    type Output = Specificity;

    fn add(self, rhs: Specificity) -> Specificity {
        Specificity {
            external: self.external + rhs.external,
            attribute: self.attribute + rhs.attribute,
            node_name: self.node_name + rhs.node_name,
            node_type: self.node_type + rhs.node_type,
            universal: self.universal + rhs.universal,
        }
    }
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.external, self.attribute, self.node_name, self.node_type, self.universal
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bucket {
    Name(DefaultAtom),
    Type(NodeKind),
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Name(local) => write!(f, "name-{local}"),
            Bucket::Type(kind) => write!(f, "type-{}", kind.dom_type()),
        }
    }
}

fn test_specificity(test: &NodeTest) -> Specificity {
    match test {
        NodeTest::AnyKind | NodeTest::Name(NameTest::Any) => Specificity { universal: 1, ..Specificity::ZERO },
        NodeTest::Name(NameTest::Exact(_))
        | NodeTest::Kind(KindTest::Element(Some(_)) | KindTest::Attribute(Some(_))) => {
            Specificity { node_name: 1, ..Specificity::ZERO }
        }
        NodeTest::Name(_) | NodeTest::Kind(_) => Specificity { node_type: 1, ..Specificity::ZERO },
    }
}

pub fn specificity_of(expr: &Expr) -> Specificity {
    match expr {
        Expr::Axis { axis, test } => {
            let mut s = test_specificity(test);
            if *axis == Axis::Attribute {
                s.attribute += 1;
            }
            s
        }
        Expr::Or(l, r) | Expr::SetOp { op: SetOp::Union, left: l, right: r } => {
            specificity_of(l).max(specificity_of(r))
        }
        Expr::Call(call) => {
            let own = match call.name.ns_uri.as_deref() {
                Some(FNS) => Specificity::ZERO,
                _ => Specificity { external: 1, ..Specificity::ZERO },
            };
            call.args.iter().fold(own, |acc, a| acc + specificity_of(a))
        }
        other => other.children().into_iter().fold(Specificity::ZERO, |acc, c| acc + specificity_of(c)),
    }
}

fn test_bucket(test: &NodeTest) -> Option<Bucket> {
    match test {
        NodeTest::AnyKind => None,
        NodeTest::Name(NameTest::Exact(q)) | NodeTest::Kind(KindTest::Element(Some(q))) => {
            Some(Bucket::Name(DefaultAtom::from(q.local.as_str())))
        }
        NodeTest::Name(NameTest::Local(local)) => Some(Bucket::Name(DefaultAtom::from(local.as_str()))),
        NodeTest::Name(_) => Some(Bucket::Type(NodeKind::Element)),
        NodeTest::Kind(kind) => Some(Bucket::Type(kind.node_kind())),
    }
}

pub fn bucket_of(expr: &Expr) -> Option<Bucket> {
    match expr {
        Expr::Axis { axis: Axis::SelfAxis, test } => test_bucket(test),
        Expr::Filter { base, .. } => bucket_of(base),
        Expr::Path(steps) if steps.len() == 1 => bucket_of(&steps[0]),
        Expr::And(l, r) => bucket_of(l).or_else(|| bucket_of(r)),
        Expr::Or(l, r) | Expr::SetOp { op: SetOp::Union, left: l, right: r } => {
            match (bucket_of(l), bucket_of(r)) {
                (Some(a), Some(b)) if a == b => Some(a),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Buckets a node can be found in: its kind, and its local name when it has one.
pub fn buckets_for_node<N: XdmNode>(node: &NodeValue<N>) -> Vec<Bucket> {
    let mut out = vec![Bucket::Type(node.kind())];
    if let Some(name) = node.name() {
        out.push(Bucket::Name(DefaultAtom::from(name.local.as_str())));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::engine::runtime::StaticContextBuilder;
    use crate::model::simple::elem;
    use crate::xdm::NodeCache;
    use rstest::rstest;

    fn compiled(text: &str) -> (Specificity, Option<Bucket>) {
        let ctx = StaticContextBuilder::new().build();
        let c = compile(text, &ctx).unwrap();
        (c.specificity, c.bucket)
    }

    #[rstest]
    #[case("self::button", Specificity::new(0, 0, 1, 0, 0))]
    #[case("self::*", Specificity::new(0, 0, 0, 0, 1))]
    #[case("self::text()", Specificity::new(0, 0, 0, 1, 0))]
    #[case("self::a[@id]", Specificity::new(0, 1, 2, 0, 0))]
    #[case("self::a or self::*", Specificity::new(0, 0, 1, 0, 0))]
    fn counts(#[case] text: &str, #[case] expected: Specificity) {
        assert_eq!(compiled(text).0, expected);
    }

    #[rstest]
    fn ordering_is_lexicographic() {
        assert!(Specificity::new(0, 1, 0, 0, 0) > Specificity::new(0, 0, 5, 5, 5));
        assert_eq!(Specificity::new(1, 0, 1, 0, 0) + Specificity::new(0, 1, 0, 0, 1), Specificity::new(1, 1, 1, 0, 1));
    }

    #[rstest]
    #[case("self::button[@x]", Some("name-button"))]
    #[case("self::text()", Some("type-3"))]
    #[case("self::a and self::*", Some("name-a"))]
    #[case("self::a or self::b", None)]
    #[case("self::a | self::a", Some("name-a"))]
    #[case("child::a", None)]
    fn buckets(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(compiled(text).1.map(|b| b.to_string()).as_deref(), expected);
    }

    #[rstest]
    fn node_buckets() {
        let node = elem("button").build();
        let cache = NodeCache::new();
        let names: Vec<String> = buckets_for_node(&cache.wrap(node)).iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["type-1".to_string(), "name-button".to_string()]);
    }
}
