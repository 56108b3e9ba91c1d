use chrono::{FixedOffset, Offset, Utc};
use core::fmt;
use smallvec::SmallVec;
use std::cell::{OnceCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::consts::{ERR_NS, FNS, XML_URI, XS};
use crate::engine::registry::{FunctionImplementations, FunctionSignatures};
use crate::model::XdmNode;
use crate::xdm::{ExpandedName, HostValue, NodeCache, NodeValue, Sequence, XdmItem, XdmSequence};

/// Error codes the engine raises. Codes outside this set still round-trip through
/// [`Error::code`] and map to [`ErrorCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    FOCA0001, // value out of range for decimal
    FOCA0002, // invalid value for cast (NaN/INF to decimal)
    FOCA0003, // value too large for integer
    FOCA0005, // NaN supplied as a float/double operand
    FOCH0002, // unsupported collation
    FOCH0003, // unsupported normalization form
    FODT0001, // overflow/underflow in date/time arithmetic
    FODT0002, // overflow/underflow in duration arithmetic
    FOER0000, // fn:error, cancellation
    FORG0001, // invalid lexical form
    FORG0003, // zero-or-one called with more than one item
    FORG0004, // one-or-more called with an empty sequence
    FORG0005, // exactly-one violated
    FORG0006, // invalid argument type / effective boolean value
    FORX0001, // invalid regex flags
    FORX0002, // invalid regex
    FORX0003, // regex matches the empty string
    FORX0004, // invalid replacement string
    FOTY0013, // atomizing a function item
    FOTY0014, // string value of a function item
    XPDY0002, // context item absent
    XPDY0050, // treat as / root is not a document node
    XPST0003, // syntax error
    XPST0008, // unknown variable
    XPST0017, // unknown function
    XPST0051, // unknown type
    XPST0081, // unknown namespace prefix
    XPTY0004, // type error
    XPTY0018, // path result mixes nodes and atomics
    XPTY0019, // non-final path step yields atomics
    XPTY0020, // axis step context item is not a node
    NYI0000,  // recognized but not implemented
    Unknown,
}

impl ErrorCode {
    const ALL: &'static [ErrorCode] = &[
        ErrorCode::FOAR0001,
        ErrorCode::FOAR0002,
        ErrorCode::FOCA0001,
        ErrorCode::FOCA0002,
        ErrorCode::FOCA0003,
        ErrorCode::FOCA0005,
        ErrorCode::FOCH0002,
        ErrorCode::FOCH0003,
        ErrorCode::FODT0001,
        ErrorCode::FODT0002,
        ErrorCode::FOER0000,
        ErrorCode::FORG0001,
        ErrorCode::FORG0003,
        ErrorCode::FORG0004,
        ErrorCode::FORG0005,
        ErrorCode::FORG0006,
        ErrorCode::FORX0001,
        ErrorCode::FORX0002,
        ErrorCode::FORX0003,
        ErrorCode::FORX0004,
        ErrorCode::FOTY0013,
        ErrorCode::FOTY0014,
        ErrorCode::XPDY0002,
        ErrorCode::XPDY0050,
        ErrorCode::XPST0003,
        ErrorCode::XPST0008,
        ErrorCode::XPST0017,
        ErrorCode::XPST0051,
        ErrorCode::XPST0081,
        ErrorCode::XPTY0004,
        ErrorCode::XPTY0018,
        ErrorCode::XPTY0019,
        ErrorCode::XPTY0020,
        ErrorCode::NYI0000,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOCA0001 => "FOCA0001",
            ErrorCode::FOCA0002 => "FOCA0002",
            ErrorCode::FOCA0003 => "FOCA0003",
            ErrorCode::FOCA0005 => "FOCA0005",
            ErrorCode::FOCH0002 => "FOCH0002",
            ErrorCode::FOCH0003 => "FOCH0003",
            ErrorCode::FODT0001 => "FODT0001",
            ErrorCode::FODT0002 => "FODT0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0003 => "FORG0003",
            ErrorCode::FORG0004 => "FORG0004",
            ErrorCode::FORG0005 => "FORG0005",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FORX0001 => "FORX0001",
            ErrorCode::FORX0002 => "FORX0002",
            ErrorCode::FORX0003 => "FORX0003",
            ErrorCode::FORX0004 => "FORX0004",
            ErrorCode::FOTY0013 => "FOTY0013",
            ErrorCode::FOTY0014 => "FOTY0014",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0051 => "XPST0051",
            ErrorCode::XPST0081 => "XPST0081",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::NYI0000 => "NYI0000",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// The code as a name in the `err` namespace.
    pub fn qname(&self) -> ExpandedName {
        ExpandedName::ns(ERR_NS, self.as_str())
    }

    /// Parses `err:CODE` or a bare `CODE`.
    pub fn from_code(s: &str) -> Self {
        let local = s.strip_prefix("err:").unwrap_or(s);
        ErrorCode::ALL.iter().copied().find(|c| c.as_str() == local).unwrap_or(ErrorCode::Unknown)
    }
}

/// Coarse classification of errors for callers that do not care about individual codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Type,
    EffectiveBooleanValue,
    UnknownIdentifier,
    ArityMismatch,
    NotImplemented,
    Dynamic,
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    /// Close matches for an unknown name, best first.
    pub suggestions: Vec<String>,
    /// Source text of the expression being evaluated, attached at the API boundary.
    pub expression: Option<Arc<str>>,
    /// Byte range in the source (debug compilations only).
    pub span: Option<(usize, usize)>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    kind_override: Option<ErrorKind>,
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            suggestions: Vec::new(),
            expression: None,
            span: None,
            source: None,
            kind_override: None,
        }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), msg)
    }

    pub fn not_implemented(feature: &str) -> Self {
        Self::from_code(ErrorCode::NYI0000, format!("not implemented: {feature}"))
    }

    /// XPTY0004 raised when a function value is called with the wrong number of arguments.
    pub fn arity_mismatch(msg: impl Into<String>) -> Self {
        let mut err = Self::from_code(ErrorCode::XPTY0004, msg);
        err.kind_override = Some(ErrorKind::ArityMismatch);
        err
    }

    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Attaches the expression source unless an inner call site already did.
    pub fn with_expression(mut self, expression: Arc<str>) -> Self {
        if self.expression.is_none() {
            self.expression = Some(expression);
        }
        self
    }

    pub fn with_span(mut self, span: (usize, usize)) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn code_enum(&self) -> ErrorCode {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            ErrorCode::from_code(&self.code.local)
        } else {
            ErrorCode::Unknown
        }
    }

    pub fn kind(&self) -> ErrorKind {
        if let Some(kind) = self.kind_override {
            return kind;
        }
        use ErrorCode as C;
        match self.code_enum() {
            C::XPST0003 => ErrorKind::Syntax,
            C::XPTY0004
            | C::XPTY0018
            | C::XPTY0019
            | C::XPTY0020
            | C::FOTY0013
            | C::FOTY0014
            | C::XPDY0050
            | C::FORG0001
            | C::FOAR0001
            | C::FOAR0002
            | C::FOCA0001
            | C::FOCA0002
            | C::FOCA0003
            | C::FOCA0005 => ErrorKind::Type,
            C::FORG0006 => ErrorKind::EffectiveBooleanValue,
            C::XPST0008 | C::XPST0017 | C::XPST0051 | C::XPST0081 => ErrorKind::UnknownIdentifier,
            C::NYI0000 => ErrorKind::NotImplemented,
            _ => ErrorKind::Dynamic,
        }
    }

    /// `err:LOCAL` for standard codes, `Q{ns}local` otherwise.
    pub fn format_code(&self) -> String {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            format!("err:{}", self.code.local)
        } else {
            self.code.to_string()
        }
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::FORX0002, format!("invalid regular expression: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())?;
        if !self.suggestions.is_empty() {
            write!(f, "; did you mean {}?", self.suggestions.join(", "))?;
        }
        if let Some(expr) = &self.expression {
            write!(f, " in expression `{expr}`")?;
            if let Some((start, end)) = self.span {
                write!(f, " at {start}..{end}")?;
            }
        }
        Ok(())
    }
}

/// Resolves namespace prefixes that are not bound explicitly.
pub trait NamespaceResolver: Send + Sync {
    fn resolve(&self, prefix: &str) -> Option<String>;
}

impl<F> NamespaceResolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, prefix: &str) -> Option<String> {
        self(prefix)
    }
}

/// Maps a lexical function name (prefix, local) and arity to the expanded name to call.
pub trait FunctionNameResolver: Send + Sync {
    fn resolve(&self, prefix: &str, local: &str, arity: usize) -> Option<ExpandedName>;
}

impl<F> FunctionNameResolver for F
where
    F: Fn(&str, &str, usize) -> Option<ExpandedName> + Send + Sync,
{
    fn resolve(&self, prefix: &str, local: &str, arity: usize) -> Option<ExpandedName> {
        self(prefix, local, arity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceBindings {
    pub by_prefix: HashMap<String, String>,
}

#[derive(Clone)]
pub struct StaticContext {
    pub base_uri: Option<String>,
    pub default_function_namespace: Option<String>,
    pub default_element_namespace: Option<String>,
    pub namespaces: NamespaceBindings,
    pub namespace_resolver: Option<Arc<dyn NamespaceResolver>>,
    pub in_scope_variables: HashSet<ExpandedName>,
    /// Module-import prefix → URI, consulted for function-call prefixes.
    pub module_imports: HashMap<String, String>,
    pub function_name_resolver: Option<Arc<dyn FunctionNameResolver>>,
    pub function_signatures: Arc<FunctionSignatures>,
}

impl Default for StaticContext {
    fn default() -> Self {
        let mut ns = NamespaceBindings::default();
        for (prefix, uri) in [("xml", XML_URI), ("xs", XS), ("fn", FNS), ("err", ERR_NS)] {
            ns.by_prefix.insert(prefix.to_string(), uri.to_string());
        }
        Self {
            base_uri: None,
            default_function_namespace: Some(FNS.to_string()),
            default_element_namespace: None,
            namespaces: ns,
            namespace_resolver: None,
            in_scope_variables: HashSet::new(),
            module_imports: HashMap::new(),
            function_name_resolver: None,
            function_signatures: crate::engine::functions::default_function_signatures(),
        }
    }
}

impl fmt::Debug for StaticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticContext")
            .field("default_function_namespace", &self.default_function_namespace)
            .field("default_element_namespace", &self.default_element_namespace)
            .field("namespaces", &self.namespaces)
            .field("has_namespace_resolver", &self.namespace_resolver.is_some())
            .field("in_scope_variables", &self.in_scope_variables)
            .field("module_imports", &self.module_imports)
            .field("has_function_name_resolver", &self.function_name_resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl StaticContext {
    /// Explicit bindings first, then the resolver callback.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<String> {
        if let Some(uri) = self.namespaces.by_prefix.get(prefix) {
            return Some(uri.clone());
        }
        self.namespace_resolver.as_ref().and_then(|r| r.resolve(prefix))
    }
}

/// Builder for `StaticContext`. The reserved `xml` prefix cannot be rebound.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self { ctx: StaticContext::default() }
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    pub fn without_default_function_namespace(mut self) -> Self {
        self.ctx.default_function_namespace = None;
        self
    }

    pub fn with_default_element_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_element_namespace = Some(uri.into());
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.ctx.namespaces.by_prefix.insert(p, uri.into());
        self
    }

    pub fn with_namespace_resolver(mut self, resolver: impl NamespaceResolver + 'static) -> Self {
        self.ctx.namespace_resolver = Some(Arc::new(resolver));
        self
    }

    /// Declares an in-scope variable that expressions may reference.
    pub fn with_variable(mut self, name: impl Into<ExpandedName>) -> Self {
        self.ctx.in_scope_variables.insert(name.into());
        self
    }

    pub fn with_module_import(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.ctx.module_imports.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_function_name_resolver(
        mut self,
        resolver: impl FunctionNameResolver + 'static,
    ) -> Self {
        self.ctx.function_name_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_function_signatures(mut self, signatures: Arc<FunctionSignatures>) -> Self {
        self.ctx.function_signatures = signatures;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

/// Context item, position and size.
#[derive(Debug, Clone)]
pub struct Focus<N> {
    pub item: Option<XdmItem<N>>,
    pub position: usize,
    pub size: usize,
}

impl<N> Default for Focus<N> {
    fn default() -> Self {
        Self { item: None, position: 0, size: 0 }
    }
}

type DeferredInit<N> = Box<dyn FnOnce() -> Result<XdmSequence<N>, Error>>;

/// A variable value computed on first use and shared afterwards.
pub struct DeferredValue<N> {
    value: OnceCell<Result<Rc<XdmSequence<N>>, Error>>,
    init: RefCell<Option<DeferredInit<N>>>,
}

impl<N> DeferredValue<N> {
    pub fn new(init: impl FnOnce() -> Result<XdmSequence<N>, Error> + 'static) -> Self {
        Self { value: OnceCell::new(), init: RefCell::new(Some(Box::new(init))) }
    }

    pub fn force(&self) -> Result<Rc<XdmSequence<N>>, Error> {
        self.value
            .get_or_init(|| match self.init.borrow_mut().take() {
                Some(init) => init().map(Rc::new),
                None => Err(Error::from_code(
                    ErrorCode::XPST0008,
                    "variable referenced during its own initialization",
                )),
            })
            .clone()
    }
}

#[derive(Clone)]
pub enum VariableBinding<N> {
    Value(Rc<XdmSequence<N>>),
    Deferred(Rc<DeferredValue<N>>),
}

impl<N: XdmNode> VariableBinding<N> {
    pub fn value(items: XdmSequence<N>) -> Self {
        VariableBinding::Value(Rc::new(items))
    }

    pub fn single(item: XdmItem<N>) -> Self {
        VariableBinding::Value(Rc::new(vec![item]))
    }

    pub fn items(&self) -> Result<Rc<XdmSequence<N>>, Error> {
        match self {
            VariableBinding::Value(v) => Ok(Rc::clone(v)),
            VariableBinding::Deferred(d) => d.force(),
        }
    }

    pub fn to_sequence(&self) -> Result<Sequence<N>, Error> {
        self.items().map(Sequence::from_shared)
    }
}

type Frame<N> = SmallVec<[(ExpandedName, VariableBinding<N>); 4]>;

struct Scope<N> {
    frame: Frame<N>,
    parent: Option<Rc<Scope<N>>>,
}

/// Per-evaluation environment. Cloning is shallow; scoping returns a new context layered on top
/// of the current one and never touches the parent's bindings.
pub struct DynamicContext<N> {
    pub focus: Focus<N>,
    scope: Option<Rc<Scope<N>>>,
    pub functions: Arc<FunctionImplementations<N>>,
    pub nodes: Rc<NodeCache<N>>,
    pub cancel_flag: Option<Arc<AtomicBool>>,
    pub implicit_timezone: FixedOffset,
}

impl<N: Clone> Clone for DynamicContext<N> {
    fn clone(&self) -> Self {
        Self {
            focus: self.focus.clone(),
            scope: self.scope.clone(),
            functions: Arc::clone(&self.functions),
            nodes: Rc::clone(&self.nodes),
            cancel_flag: self.cancel_flag.clone(),
            implicit_timezone: self.implicit_timezone,
        }
    }
}

impl<N: XdmNode> DynamicContext<N> {
    pub fn with_focus(&self, item: XdmItem<N>, position: usize, size: usize) -> Self {
        let mut ctx = self.clone();
        ctx.focus = Focus { item: Some(item), position, size };
        ctx
    }

    pub fn bind(&self, name: ExpandedName, binding: VariableBinding<N>) -> Self {
        let mut frame = Frame::new();
        frame.push((name, binding));
        self.push_frame(frame)
    }

    /// Binds several variables in a single overlay frame.
    pub fn bind_all(&self, bindings: impl IntoIterator<Item = (ExpandedName, VariableBinding<N>)>) -> Self {
        self.push_frame(bindings.into_iter().collect())
    }

    fn push_frame(&self, frame: Frame<N>) -> Self {
        let mut ctx = self.clone();
        ctx.scope = Some(Rc::new(Scope { frame, parent: self.scope.clone() }));
        ctx
    }

    pub fn lookup(&self, name: &ExpandedName) -> Option<&VariableBinding<N>> {
        let mut scope = self.scope.as_deref();
        while let Some(s) = scope {
            // innermost binding of a frame wins
            if let Some((_, b)) = s.frame.iter().rev().find(|(n, _)| n == name) {
                return Some(b);
            }
            scope = s.parent.as_deref();
        }
        None
    }

    pub fn context_item(&self) -> Result<&XdmItem<N>, Error> {
        self.focus
            .item
            .as_ref()
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is absent"))
    }

    pub fn context_node(&self) -> Result<&NodeValue<N>, Error> {
        match self.context_item()? {
            XdmItem::Node(n) => Ok(n),
            other => Err(Error::from_code(
                ErrorCode::XPTY0020,
                format!("context item is not a node but {}", other.type_label()),
            )),
        }
    }

    pub fn check_cancelled(&self) -> Result<(), Error> {
        match &self.cancel_flag {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                Err(Error::from_code(ErrorCode::FOER0000, "evaluation cancelled"))
            }
            _ => Ok(()),
        }
    }
}

pub struct DynamicContextBuilder<N> {
    context_node: Option<N>,
    context_item: Option<XdmItem<N>>,
    variables: Vec<(ExpandedName, HostValue<N>)>,
    functions: Option<Arc<FunctionImplementations<N>>>,
    nodes: Option<Rc<NodeCache<N>>>,
    cancel_flag: Option<Arc<AtomicBool>>,
    implicit_timezone: FixedOffset,
}

impl<N: XdmNode> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self {
            context_node: None,
            context_item: None,
            variables: Vec::new(),
            functions: None,
            nodes: None,
            cancel_flag: None,
            implicit_timezone: Utc.fix(),
        }
    }

    pub fn with_context_node(mut self, node: N) -> Self {
        self.context_node = Some(node);
        self.context_item = None;
        self
    }

    pub fn with_context_item(mut self, item: impl Into<XdmItem<N>>) -> Self {
        self.context_item = Some(item.into());
        self.context_node = None;
        self
    }

    pub fn with_variable(mut self, name: impl Into<ExpandedName>, value: impl Into<HostValue<N>>) -> Self {
        self.variables.push((name.into(), value.into()));
        self
    }

    pub fn with_functions(mut self, functions: Arc<FunctionImplementations<N>>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Shares a node cache across evaluations, so wrappers of the same tree stay identical.
    pub fn with_node_cache(mut self, nodes: Rc<NodeCache<N>>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn with_implicit_timezone(mut self, offset: FixedOffset) -> Self {
        self.implicit_timezone = offset;
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        let nodes = self.nodes.unwrap_or_else(|| Rc::new(NodeCache::new()));
        let item = match (self.context_item, self.context_node) {
            (Some(item), _) => Some(item),
            (None, Some(node)) => Some(XdmItem::Node(nodes.wrap(node))),
            (None, None) => None,
        };
        let focus = match item {
            Some(item) => Focus { item: Some(item), position: 1, size: 1 },
            None => Focus::default(),
        };
        let frame: Frame<N> = self
            .variables
            .into_iter()
            .map(|(name, value)| (name, VariableBinding::value(value.into_items(&nodes))))
            .collect();
        let scope = (!frame.is_empty()).then(|| Rc::new(Scope { frame, parent: None }));
        DynamicContext {
            focus,
            scope,
            functions: self
                .functions
                .unwrap_or_else(crate::engine::functions::default_function_implementations::<N>),
            nodes,
            cancel_flag: self.cancel_flag,
            implicit_timezone: self.implicit_timezone,
        }
    }
}

/// Passed to every function implementation.
pub struct CallCtx<'a, N> {
    pub dyn_ctx: &'a DynamicContext<N>,
    pub name: &'a ExpandedName,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use crate::xdm::XdmAtomicValue;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorCode::XPST0003, ErrorKind::Syntax)]
    #[case(ErrorCode::XPTY0019, ErrorKind::Type)]
    #[case(ErrorCode::FORG0006, ErrorKind::EffectiveBooleanValue)]
    #[case(ErrorCode::XPST0017, ErrorKind::UnknownIdentifier)]
    #[case(ErrorCode::NYI0000, ErrorKind::NotImplemented)]
    #[case(ErrorCode::FOER0000, ErrorKind::Dynamic)]
    #[case(ErrorCode::XPDY0002, ErrorKind::Dynamic)]
    fn kinds_follow_codes(#[case] code: ErrorCode, #[case] kind: ErrorKind) {
        assert_eq!(Error::from_code(code, "x").kind(), kind);
    }

    #[rstest]
    fn arity_mismatch_keeps_type_code() {
        let err = Error::arity_mismatch("wrong arity");
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    }

    #[rstest]
    fn codes_round_trip() {
        assert_eq!(ErrorCode::from_code("err:XPTY0018"), ErrorCode::XPTY0018);
        assert_eq!(ErrorCode::from_code("FOAR0001"), ErrorCode::FOAR0001);
        assert_eq!(ErrorCode::from_code("err:NOPE"), ErrorCode::Unknown);
    }

    #[rstest]
    fn display_lists_suggestions_and_expression() {
        let err = Error::from_code(ErrorCode::XPST0017, "unknown function sum3#1")
            .with_suggestions(vec!["sum".into()])
            .with_expression(Arc::from("sum3(1)"));
        let text = err.to_string();
        assert!(text.contains("err:XPST0017"));
        assert!(text.contains("did you mean sum?"));
        assert!(text.contains("`sum3(1)`"));
    }

    #[rstest]
    fn overlay_scopes_do_not_leak() {
        let ctx: DynamicContext<SimpleNode> = DynamicContextBuilder::new().with_variable("x", 1i64).build();
        let inner = ctx.bind(
            ExpandedName::local("x"),
            VariableBinding::single(XdmItem::Atomic(XdmAtomicValue::Integer(2))),
        );
        let outer_value = ctx.lookup(&ExpandedName::local("x")).unwrap().items().unwrap();
        let inner_value = inner.lookup(&ExpandedName::local("x")).unwrap().items().unwrap();
        assert_eq!(outer_value[0], XdmItem::Atomic(XdmAtomicValue::Integer(1)));
        assert_eq!(inner_value[0], XdmItem::Atomic(XdmAtomicValue::Integer(2)));
    }

    #[rstest]
    fn deferred_values_run_once() {
        let counter = Rc::new(std::cell::Cell::new(0));
        let c = Rc::clone(&counter);
        let deferred: DeferredValue<SimpleNode> = DeferredValue::new(move || {
            c.set(c.get() + 1);
            Ok(vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))])
        });
        deferred.force().unwrap();
        deferred.force().unwrap();
        assert_eq!(counter.get(), 1);
    }

    #[rstest]
    fn cancellation_is_polled() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx: DynamicContext<SimpleNode> =
            DynamicContextBuilder::new().with_cancel_flag(Arc::clone(&flag)).build();
        assert!(ctx.check_cancelled().is_ok());
        flag.store(true, Ordering::Relaxed);
        assert_eq!(ctx.check_cancelled().unwrap_err().code_enum(), ErrorCode::FOER0000);
    }

    #[rstest]
    fn missing_context_item() {
        let ctx: DynamicContext<SimpleNode> = DynamicContextBuilder::new().build();
        assert_eq!(ctx.context_item().unwrap_err().code_enum(), ErrorCode::XPDY0002);
    }
}
