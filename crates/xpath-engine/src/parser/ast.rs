//! Syntax tree produced by the parser.
//!
//! Names are kept lexical (prefix + local part); they are resolved against a static context only
//! when the tree is bound. Trees built by hand can be passed to the compiler directly.

use rust_decimal::Decimal;

/// Byte range in the source text.
pub type Span = (usize, usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralComp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueComp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeComp {
    Is,
    Precedes,
    Follows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnarySign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

/// Lexical name. `ns_uri` is only set for `Q{uri}local` names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    pub fn prefixed(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()), local: local.into(), ns_uri: None }
    }

    /// Parses `local`, `prefix:local` or `Q{uri}local`.
    pub fn parse(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix("Q{")
            && let Some((uri, local)) = rest.split_once('}')
        {
            return Self { prefix: None, local: local.to_string(), ns_uri: Some(uri.to_string()) };
        }
        match text.split_once(':') {
            Some((prefix, local)) => Self::prefixed(prefix, local),
            None => Self::local(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub var: QName,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    EmptySequence,
    VarRef(QName),
    ContextItem,
    Sequence(Vec<Expr>),
    FunctionCall {
        name: QName,
        args: Vec<Expr>,
        span: Option<Span>,
    },
    /// `name#arity`
    NamedFunctionRef {
        name: QName,
        arity: usize,
        span: Option<Span>,
    },
    /// `$f(args)` or any other postfix argument list.
    DynamicCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    GeneralComparison {
        left: Box<Expr>,
        op: GeneralComp,
        right: Box<Expr>,
    },
    ValueComparison {
        left: Box<Expr>,
        op: ValueComp,
        right: Box<Expr>,
    },
    NodeComparison {
        left: Box<Expr>,
        op: NodeComp,
        right: Box<Expr>,
    },
    Unary {
        sign: UnarySign,
        expr: Box<Expr>,
    },
    IfThenElse {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    SetOp {
        left: Box<Expr>,
        op: SetOp,
        right: Box<Expr>,
    },
    /// `a || b`
    StringConcat {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a ! b`
    SimpleMap {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: SequenceType,
    },
    TreatAs {
        expr: Box<Expr>,
        ty: SequenceType,
    },
    CastableAs {
        expr: Box<Expr>,
        ty: SingleType,
    },
    CastAs {
        expr: Box<Expr>,
        ty: SingleType,
    },
    Path(PathExpr),
    Quantified {
        kind: Quantifier,
        bindings: Vec<Binding>,
        satisfies: Box<Expr>,
    },
    ForExpr {
        bindings: Vec<Binding>,
        return_expr: Box<Expr>,
    },
    LetExpr {
        bindings: Vec<Binding>,
        return_expr: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStart {
    /// `/…`
    Root,
    /// `//…`
    RootDescendant,
    Relative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub start: PathStart,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Axis { axis: Axis, test: NodeTest, predicates: Vec<Expr> },
    /// A filter expression used as a step, e.g. `$x` in `$x/a` or `(b | c)` in `a/(b | c)`.
    Expr(Expr),
}

impl Step {
    /// `descendant-or-self::node()`, the expansion of `//`.
    pub fn descendant_or_self() -> Self {
        Step::Axis { axis: Axis::DescendantOrSelf, test: NodeTest::Kind(KindTest::AnyKind), predicates: vec![] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    Attribute,
    SelfAxis,
    DescendantOrSelf,
    FollowingSibling,
    Following,
    Namespace,
    Parent,
    Ancestor,
    PrecedingSibling,
    Preceding,
    AncestorOrSelf,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "attribute" => Axis::Attribute,
            "self" => Axis::SelfAxis,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "following" => Axis::Following,
            "namespace" => Axis::Namespace,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "preceding-sibling" => Axis::PrecedingSibling,
            "preceding" => Axis::Preceding,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::Following => "following",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Preceding => "preceding",
            Axis::AncestorOrSelf => "ancestor-or-self",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameTest {
    QName(QName),
    Wildcard(WildcardName),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WildcardName {
    /// `*`
    Any,
    /// `prefix:*`
    NsWildcard(String),
    /// `Q{uri}*`
    UriWildcard(String),
    /// `*:local`
    LocalWildcard(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KindTest {
    AnyKind,
    Document(Option<Box<KindTest>>),
    Text,
    Comment,
    NamespaceNode,
    ProcessingInstruction(Option<String>),
    /// `element()`, `element(*)`, `element(name)`, `element(name, type)`.
    Element { name: Option<QName>, ty: Option<QName> },
    Attribute { name: Option<QName>, ty: Option<QName> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleType {
    pub atomic: QName,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemType {
    Item,
    Kind(KindTest),
    Atomic(QName),
    /// `function(*)`
    AnyFunction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceType {
    EmptySequence,
    Typed { item: ItemType, occ: Occurrence },
}
