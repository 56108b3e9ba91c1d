//! Host-facing evaluation API.
//!
//! An [`Evaluator`] bundles the compiled-expression cache with the function registry. Each call
//! builds a static context from [`EvaluationOptions`] and the declared [`Variables`], compiles
//! through the cache, evaluates against an optional context node and shapes the result as the
//! caller asked via [`ReturnType`]. A [`Session`] keeps one node cache across calls.

use core::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::FixedOffset;
use tracing::debug;

use crate::cache::CompiledExpressionCache;
use crate::compiler::{CompiledExpression, Language};
use crate::engine::functions::{default_function_implementations, default_function_signatures};
use crate::engine::registry::{FunctionImplementations, FunctionSignature, FunctionSignatures};
use crate::engine::runtime::{
    CallCtx, DynamicContextBuilder, Error, ErrorCode, FunctionNameResolver, NamespaceResolver, StaticContext,
    StaticContextBuilder,
};
use crate::model::XdmNode;
use crate::xdm::{
    ExpandedName, HostValue, NodeCache, Sequence, SequenceType, XdmAtomicValue, XdmItem, XdmSequence,
};

/// How the result sequence is handed back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnType {
    Boolean,
    String,
    Strings,
    Number,
    Numbers,
    FirstNode,
    Nodes,
    #[default]
    Any,
    AllResults,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue<N> {
    Node(N),
    Nodes(Vec<N>),
    Atomic(XdmAtomicValue),
    Atomics(Vec<XdmAtomicValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum XPathResult<N> {
    Boolean(bool),
    String(String),
    Strings(Vec<String>),
    Number(f64),
    Numbers(Vec<f64>),
    FirstNode(Option<N>),
    Nodes(Vec<N>),
    Any(AnyValue<N>),
    AllResults(XdmSequence<N>),
}

/// Named host values bound as external variables.
#[derive(Debug, Clone)]
pub struct Variables<N> {
    entries: Vec<(ExpandedName, HostValue<N>)>,
}

impl<N> Default for Variables<N> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<N> Variables<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<ExpandedName>, value: impl Into<HostValue<N>>) -> Self {
        self.insert(name, value);
        self
    }

    /// Binds `name`, replacing an earlier value of the same name.
    pub fn insert(&mut self, name: impl Into<ExpandedName>, value: impl Into<HostValue<N>>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &ExpandedName) -> Option<HostValue<N>> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &ExpandedName> {
        self.entries.iter().map(|(n, _)| n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-call settings: static context knobs plus cancellation and the implicit timezone.
#[derive(Clone, Default)]
pub struct EvaluationOptions {
    pub namespaces: Vec<(String, String)>,
    pub namespace_resolver: Option<Arc<dyn NamespaceResolver>>,
    pub language: Language,
    /// Compile with source spans so that errors point into the expression.
    pub debug: bool,
    /// Overrides the `fn` namespace as the default for unprefixed function names.
    pub default_function_namespace: Option<String>,
    pub default_element_namespace: Option<String>,
    pub module_imports: Vec<(String, String)>,
    pub function_name_resolver: Option<Arc<dyn FunctionNameResolver>>,
    pub cancel_flag: Option<Arc<AtomicBool>>,
    pub implicit_timezone: Option<FixedOffset>,
}

impl fmt::Debug for EvaluationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationOptions")
            .field("namespaces", &self.namespaces)
            .field("has_namespace_resolver", &self.namespace_resolver.is_some())
            .field("language", &self.language)
            .field("debug", &self.debug)
            .field("default_function_namespace", &self.default_function_namespace)
            .field("default_element_namespace", &self.default_element_namespace)
            .field("module_imports", &self.module_imports)
            .field("has_function_name_resolver", &self.function_name_resolver.is_some())
            .field("cancellable", &self.cancel_flag.is_some())
            .field("implicit_timezone", &self.implicit_timezone)
            .finish()
    }
}

impl EvaluationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    pub fn with_namespace_resolver(mut self, resolver: impl NamespaceResolver + 'static) -> Self {
        self.namespace_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_function_namespace = Some(uri.into());
        self
    }

    pub fn with_default_element_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_element_namespace = Some(uri.into());
        self
    }

    pub fn with_module_import(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.module_imports.push((prefix.into(), uri.into()));
        self
    }

    pub fn with_function_name_resolver(mut self, resolver: impl FunctionNameResolver + 'static) -> Self {
        self.function_name_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn with_implicit_timezone(mut self, offset: FixedOffset) -> Self {
        self.implicit_timezone = Some(offset);
        self
    }
}

/// Compiles and evaluates expressions over trees of `N`.
pub struct Evaluator<N> {
    cache: Arc<CompiledExpressionCache>,
    signatures: Arc<FunctionSignatures>,
    implementations: Arc<FunctionImplementations<N>>,
}

impl<N> Clone for Evaluator<N> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            signatures: Arc::clone(&self.signatures),
            implementations: Arc::clone(&self.implementations),
        }
    }
}

impl<N> fmt::Debug for Evaluator<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("cache", &self.cache)
            .field("signatures", &self.signatures.len())
            .field("implementations", &self.implementations.len())
            .finish()
    }
}

impl<N: XdmNode> Default for Evaluator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> Evaluator<N> {
    /// An evaluator with the standard function library and a private, unbounded cache.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(CompiledExpressionCache::new()),
            default_function_signatures(),
            default_function_implementations(),
        )
    }

    pub fn with_parts(
        cache: Arc<CompiledExpressionCache>,
        signatures: Arc<FunctionSignatures>,
        implementations: Arc<FunctionImplementations<N>>,
    ) -> Self {
        Self { cache, signatures, implementations }
    }

    /// Shares `cache` with other evaluators.
    pub fn with_cache(mut self, cache: Arc<CompiledExpressionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<CompiledExpressionCache> {
        &self.cache
    }

    pub fn signatures(&self) -> &Arc<FunctionSignatures> {
        &self.signatures
    }

    /// Registers a host function. Types use declaration syntax such as `xs:string?` or `node()*`.
    ///
    /// Registering copies the registry if it is shared with another evaluator.
    pub fn register_function<F>(
        &mut self,
        name: ExpandedName,
        params: &[&str],
        return_type: &str,
        func: F,
    ) -> Result<(), Error>
    where
        F: Fn(&CallCtx<N>, &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> + Send + Sync + 'static,
    {
        let params = params.iter().map(|p| SequenceType::parse(p)).collect::<Result<Vec<_>, _>>()?;
        let signature = FunctionSignature::new(name, params, SequenceType::parse(return_type)?);
        debug!(%signature, "registering host function");
        Arc::make_mut(&mut self.implementations).register_fn(signature.key(), func);
        Arc::make_mut(&mut self.signatures).register(signature);
        Ok(())
    }

    fn static_context<'a>(
        &self,
        options: &EvaluationOptions,
        variables: impl Iterator<Item = &'a ExpandedName>,
    ) -> StaticContext {
        let mut builder = StaticContextBuilder::new().with_function_signatures(Arc::clone(&self.signatures));
        for (prefix, uri) in &options.namespaces {
            builder = builder.with_namespace(prefix.clone(), uri.clone());
        }
        if let Some(uri) = &options.default_function_namespace {
            builder = builder.with_default_function_namespace(uri.clone());
        }
        if let Some(uri) = &options.default_element_namespace {
            builder = builder.with_default_element_namespace(uri.clone());
        }
        for (prefix, uri) in &options.module_imports {
            builder = builder.with_module_import(prefix.clone(), uri.clone());
        }
        for name in variables {
            builder = builder.with_variable(name.clone());
        }
        let mut ctx = builder.build();
        ctx.namespace_resolver = options.namespace_resolver.clone();
        ctx.function_name_resolver = options.function_name_resolver.clone();
        ctx
    }

    /// Compiles `source` without external variables.
    pub fn compile(&self, source: &str, options: &EvaluationOptions) -> Result<Arc<CompiledExpression>, Error> {
        let ctx = self.static_context(options, core::iter::empty());
        self.cache
            .compile(source, &ctx, options.language, options.debug)
            .map_err(|e| e.with_expression(Arc::from(source)))
    }

    pub fn evaluate(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        return_type: ReturnType,
        options: &EvaluationOptions,
    ) -> Result<XPathResult<N>, Error> {
        self.evaluate_in(source, context, variables, return_type, options, None)
    }

    /// Starts a [`Session`] whose evaluations share one node cache.
    pub fn session(&self) -> Session<'_, N> {
        self.session_with(Rc::new(NodeCache::new()))
    }

    pub fn session_with(&self, nodes: Rc<NodeCache<N>>) -> Session<'_, N> {
        Session { evaluator: self, nodes }
    }

    fn evaluate_in(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        return_type: ReturnType,
        options: &EvaluationOptions,
        nodes: Option<&Rc<NodeCache<N>>>,
    ) -> Result<XPathResult<N>, Error> {
        debug!(expression = source, ?return_type, shared_nodes = nodes.is_some(), "evaluating expression");
        self.run(source, context, variables, options, nodes)
            .and_then(|seq| shape(seq, return_type))
            .map_err(|e| e.with_expression(Arc::from(source)))
    }

    fn run(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
        nodes: Option<&Rc<NodeCache<N>>>,
    ) -> Result<Sequence<N>, Error> {
        let ctx = self.static_context(options, variables.names());
        let compiled = self.cache.compile(source, &ctx, options.language, options.debug)?;
        let mut builder = DynamicContextBuilder::new().with_functions(Arc::clone(&self.implementations));
        if let Some(nodes) = nodes {
            builder = builder.with_node_cache(Rc::clone(nodes));
        }
        if let Some(node) = context {
            builder = builder.with_context_node(node.clone());
        }
        for (name, value) in &variables.entries {
            builder = builder.with_variable(name.clone(), value.clone());
        }
        if let Some(flag) = &options.cancel_flag {
            builder = builder.with_cancel_flag(Arc::clone(flag));
        }
        if let Some(offset) = options.implicit_timezone {
            builder = builder.with_implicit_timezone(offset);
        }
        compiled.evaluate(&builder.build())
    }

    pub fn evaluate_to_boolean(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
    ) -> Result<bool, Error> {
        match self.evaluate(source, context, variables, ReturnType::Boolean, options)? {
            XPathResult::Boolean(b) => Ok(b),
            other => Err(unexpected_shape(&other)),
        }
    }

    pub fn evaluate_to_string(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
    ) -> Result<String, Error> {
        match self.evaluate(source, context, variables, ReturnType::String, options)? {
            XPathResult::String(s) => Ok(s),
            other => Err(unexpected_shape(&other)),
        }
    }

    pub fn evaluate_to_strings(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
    ) -> Result<Vec<String>, Error> {
        match self.evaluate(source, context, variables, ReturnType::Strings, options)? {
            XPathResult::Strings(s) => Ok(s),
            other => Err(unexpected_shape(&other)),
        }
    }

    pub fn evaluate_to_number(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
    ) -> Result<f64, Error> {
        match self.evaluate(source, context, variables, ReturnType::Number, options)? {
            XPathResult::Number(n) => Ok(n),
            other => Err(unexpected_shape(&other)),
        }
    }

    pub fn evaluate_to_first_node(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
    ) -> Result<Option<N>, Error> {
        match self.evaluate(source, context, variables, ReturnType::FirstNode, options)? {
            XPathResult::FirstNode(n) => Ok(n),
            other => Err(unexpected_shape(&other)),
        }
    }

    pub fn evaluate_to_nodes(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        options: &EvaluationOptions,
    ) -> Result<Vec<N>, Error> {
        match self.evaluate(source, context, variables, ReturnType::Nodes, options)? {
            XPathResult::Nodes(n) => Ok(n),
            other => Err(unexpected_shape(&other)),
        }
    }
}

fn unexpected_shape<N>(result: &XPathResult<N>) -> Error {
    let shape = match result {
        XPathResult::Boolean(_) => "boolean",
        XPathResult::String(_) => "string",
        XPathResult::Strings(_) => "strings",
        XPathResult::Number(_) => "number",
        XPathResult::Numbers(_) => "numbers",
        XPathResult::FirstNode(_) => "first node",
        XPathResult::Nodes(_) => "nodes",
        XPathResult::Any(_) => "any",
        XPathResult::AllResults(_) => "all results",
    };
    Error::from_code(ErrorCode::Unknown, format!("unexpected result shape: {shape}"))
}

/// The underlying tree node of a non-attribute node item.
fn host_node<N: XdmNode>(item: &XdmItem<N>) -> Result<N, Error> {
    match item {
        XdmItem::Node(n) => n.tree_node().cloned().ok_or_else(|| {
            Error::from_code(ErrorCode::XPTY0004, "attribute nodes cannot be returned as nodes")
        }),
        other => Err(Error::from_code(ErrorCode::XPTY0004, format!("expected a node, found {}", other.type_label()))),
    }
}

fn numeric_value<N: XdmNode>(item: &XdmItem<N>) -> Option<f64> {
    item.as_atomic().filter(|a| a.is_numeric()).and_then(XdmAtomicValue::as_f64)
}

/// Evaluations over one tree that share a node cache, so a node reached by several queries is
/// wrapped once and results held across calls stay identical. Sessions are tied to one thread;
/// the [`Evaluator`] they borrow is not.
pub struct Session<'e, N> {
    evaluator: &'e Evaluator<N>,
    nodes: Rc<NodeCache<N>>,
}

impl<N> fmt::Debug for Session<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("evaluator", self.evaluator).finish_non_exhaustive()
    }
}

impl<N: XdmNode> Session<'_, N> {
    pub fn nodes(&self) -> &Rc<NodeCache<N>> {
        &self.nodes
    }

    /// Forgets cached wrappers. Call after the tree changed.
    pub fn invalidate(&self) {
        self.nodes.invalidate();
    }

    pub fn evaluate(
        &self,
        source: &str,
        context: Option<&N>,
        variables: &Variables<N>,
        return_type: ReturnType,
        options: &EvaluationOptions,
    ) -> Result<XPathResult<N>, Error> {
        self.evaluator.evaluate_in(source, context, variables, return_type, options, Some(&self.nodes))
    }
}

fn shape<N: XdmNode>(seq: Sequence<N>, return_type: ReturnType) -> Result<XPathResult<N>, Error> {
    Ok(match return_type {
        ReturnType::Boolean => XPathResult::Boolean(seq.ebv()?),
        ReturnType::FirstNode => match seq.first()? {
            Some(item) => XPathResult::FirstNode(Some(host_node(&item)?)),
            None => XPathResult::FirstNode(None),
        },
        ReturnType::String => match seq.first()? {
            Some(item) => XPathResult::String(item.atomize()?.string_value()),
            None => XPathResult::String(String::new()),
        },
        ReturnType::Strings => {
            let items = seq.materialize()?;
            XPathResult::Strings(
                items.iter().map(|i| i.atomize().map(|a| a.string_value())).collect::<Result<_, _>>()?,
            )
        }
        ReturnType::Number => {
            let items = seq.materialize()?;
            let value = match items.as_slice() {
                [single] => numeric_value(single).unwrap_or(f64::NAN),
                _ => f64::NAN,
            };
            XPathResult::Number(value)
        }
        ReturnType::Numbers => {
            let items = seq.materialize()?;
            let numbers = items
                .iter()
                .map(|item| {
                    numeric_value(item).ok_or_else(|| {
                        Error::from_code(
                            ErrorCode::XPTY0004,
                            format!("expected a numeric value, found {}", item.type_label()),
                        )
                    })
                })
                .collect::<Result<_, _>>()?;
            XPathResult::Numbers(numbers)
        }
        ReturnType::Nodes => {
            let items = seq.materialize()?;
            XPathResult::Nodes(items.iter().map(host_node).collect::<Result<_, _>>()?)
        }
        ReturnType::Any => XPathResult::Any(any_value(seq.materialize()?)?),
        ReturnType::AllResults => XPathResult::AllResults(seq.materialize()?),
    })
}

/// Tree nodes stay nodes; anything else, attributes included, is atomized.
fn any_value<N: XdmNode>(items: XdmSequence<N>) -> Result<AnyValue<N>, Error> {
    let all_tree_nodes = items.iter().all(|i| i.as_node().is_some_and(|n| n.tree_node().is_some()));
    if all_tree_nodes {
        let mut nodes = items.iter().map(host_node).collect::<Result<Vec<_>, _>>()?;
        return Ok(match nodes.len() {
            1 => AnyValue::Node(nodes.remove(0)),
            _ => AnyValue::Nodes(nodes),
        });
    }
    let mut atomics = items.iter().map(XdmItem::atomize).collect::<Result<Vec<_>, _>>()?;
    Ok(match atomics.len() {
        1 => AnyValue::Atomic(atomics.remove(0)),
        _ => AnyValue::Atomics(atomics),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, doc, elem, text};
    use crate::xdm::NodeValue;
    use rstest::{fixture, rstest};

    #[fixture]
    fn tree() -> SimpleNode {
        doc()
            .child(elem("root").attr("id", "r").child(elem("a").child(text("1"))).child(elem("a").child(text("2"))))
            .build()
    }

    #[rstest]
    fn string_of_empty_is_empty(tree: SimpleNode) {
        let ev = Evaluator::<SimpleNode>::new();
        let s = ev.evaluate_to_string("/root/missing", Some(&tree), &Variables::new(), &EvaluationOptions::new());
        assert_eq!(s.unwrap(), "");
    }

    #[rstest]
    fn number_of_non_singleton_is_nan(tree: SimpleNode) {
        let ev = Evaluator::<SimpleNode>::new();
        let n = ev.evaluate_to_number("(1, 2)", Some(&tree), &Variables::new(), &EvaluationOptions::new()).unwrap();
        assert!(n.is_nan());
    }

    #[rstest]
    fn nodes_reject_attributes(tree: SimpleNode) {
        let ev = Evaluator::<SimpleNode>::new();
        let err = ev.evaluate_to_nodes("/root/@id", Some(&tree), &Variables::new(), &EvaluationOptions::new());
        assert_eq!(err.unwrap_err().code_enum(), ErrorCode::XPTY0004);
    }

    #[rstest]
    fn any_atomizes_attributes(tree: SimpleNode) {
        let ev = Evaluator::<SimpleNode>::new();
        let result = ev.evaluate("/root/@id", Some(&tree), &Variables::new(), ReturnType::Any, &EvaluationOptions::new());
        assert_eq!(result.unwrap(), XPathResult::Any(AnyValue::Atomic(XdmAtomicValue::UntypedAtomic("r".into()))));
    }

    #[rstest]
    fn errors_carry_the_expression() {
        let ev = Evaluator::<SimpleNode>::new();
        let err = ev.evaluate_to_boolean("1 div 0", None, &Variables::new(), &EvaluationOptions::new()).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOAR0001);
        assert_eq!(err.expression.as_deref(), Some("1 div 0"));
    }

    #[rstest]
    fn host_functions_are_callable() {
        let mut ev = Evaluator::<SimpleNode>::new();
        ev.register_function(ExpandedName::ns("urn:host", "twice"), &["xs:string?"], "xs:string", |_ctx, args| {
            let s = args[0].first().map(|i| i.string_value()).transpose()?.unwrap_or_default();
            Ok(vec![XdmItem::Atomic(XdmAtomicValue::String(format!("{s}{s}")))])
        })
        .unwrap();
        let options = EvaluationOptions::new().with_namespace("h", "urn:host");
        let s = ev.evaluate_to_string("h:twice('ab')", None, &Variables::new(), &options).unwrap();
        assert_eq!(s, "abab");
    }

    fn held_nodes(session: &Session<'_, SimpleNode>, tree: &SimpleNode) -> Vec<NodeValue<SimpleNode>> {
        let result = session
            .evaluate("/root/a", Some(tree), &Variables::new(), ReturnType::AllResults, &EvaluationOptions::new())
            .unwrap();
        let XPathResult::AllResults(items) = result else { panic!("expected all results") };
        items
            .into_iter()
            .map(|item| match item {
                XdmItem::Node(n) => n,
                other => panic!("expected a node, found {other:?}"),
            })
            .collect()
    }

    #[rstest]
    fn session_reuses_node_wrappers_across_calls(tree: SimpleNode) {
        let ev = Evaluator::<SimpleNode>::new();
        let session = ev.session();
        let first = held_nodes(&session, &tree);
        let live = session.nodes().live_entries();
        assert!(live >= 2);
        let second = held_nodes(&session, &tree);
        assert_eq!(session.nodes().live_entries(), live);
        assert_eq!(first, second);

        session.invalidate();
        let third = held_nodes(&session, &tree);
        assert!(third.iter().all(|n| n.generation() == 1));
        assert!(first.iter().all(|n| n.generation() == 0));
    }

    #[rstest]
    fn caller_supplied_node_cache_is_used(tree: SimpleNode) {
        let ev = Evaluator::<SimpleNode>::new();
        let nodes = Rc::new(NodeCache::new());
        nodes.invalidate();
        let session = ev.session_with(Rc::clone(&nodes));
        let held = held_nodes(&session, &tree);
        assert_eq!(held.len(), 2);
        assert!(held.iter().all(|n| n.generation() == nodes.generation()));
    }
}
