//! Function signatures and implementations.
//!
//! Signatures are independent of the node type and are consulted during static binding;
//! implementations are keyed the same way and looked up once a call has been resolved.

use core::fmt;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::FNS;
use crate::engine::runtime::{CallCtx, Error, ErrorCode};
use crate::xdm::{ExpandedName, SequenceType, XdmSequence};

pub type Arity = usize;

pub type FunctionImpl<N> =
    Arc<dyn Fn(&CallCtx<N>, &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: ExpandedName,
    pub params: Vec<SequenceType>,
    /// The last parameter repeats for any additional argument.
    pub rest: bool,
    pub return_type: SequenceType,
}

impl FunctionSignature {
    pub fn new(name: ExpandedName, params: Vec<SequenceType>, return_type: SequenceType) -> Self {
        Self { name, params, rest: false, return_type }
    }

    pub fn variadic(mut self) -> Self {
        self.rest = true;
        self
    }

    pub fn key(&self) -> FunctionKey {
        FunctionKey { name: self.name.clone(), arity: self.params.len(), variadic: self.rest }
    }

    pub fn accepts_arity(&self, arity: Arity) -> bool {
        arity == self.params.len() || (self.rest && arity >= self.params.len())
    }

    /// Declared type of the `index`-th argument, accounting for a rest parameter.
    pub fn param_type(&self, index: usize) -> Option<&SequenceType> {
        match self.params.get(index) {
            Some(t) => Some(t),
            None if self.rest => self.params.last(),
            None => None,
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.ns_uri.as_deref() == Some(FNS) {
            format!("fn:{}", self.name.local)
        } else {
            self.name.to_string()
        };
        let rest = if self.rest { ", ..." } else { "" };
        write!(f, "{name}({}{rest}) as {}", self.params.iter().join(", "), self.return_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionKey {
    pub name: ExpandedName,
    /// Declared parameter count (the minimum arity for variadic functions).
    pub arity: Arity,
    pub variadic: bool,
}

/// Declared signatures, shared across node types and evaluations.
#[derive(Debug, Clone, Default)]
pub struct FunctionSignatures {
    by_name: HashMap<ExpandedName, Vec<Arc<FunctionSignature>>>,
}

impl FunctionSignatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signature; an existing one with the same key is replaced.
    pub fn register(&mut self, signature: FunctionSignature) {
        let entry = self.by_name.entry(signature.name.clone()).or_default();
        let key = signature.key();
        entry.retain(|s| s.key() != key);
        entry.push(Arc::new(signature));
    }

    /// Exact arity wins; otherwise the variadic signature with the largest fixed count that fits.
    pub fn resolve(&self, name: &ExpandedName, arity: Arity) -> Option<Arc<FunctionSignature>> {
        let candidates = self.by_name.get(name)?;
        if let Some(exact) = candidates.iter().find(|s| !s.rest && s.params.len() == arity) {
            return Some(Arc::clone(exact));
        }
        candidates
            .iter()
            .filter(|s| s.rest && s.params.len() <= arity)
            .max_by_key(|s| s.params.len())
            .cloned()
    }

    pub fn contains_name(&self, name: &ExpandedName) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FunctionSignature>> {
        self.by_name.values().flatten()
    }

    /// Registered names closest to `name` by edit distance on the local part.
    ///
    /// Only names within half the query's length are kept; the best five are returned, ordered by
    /// distance and then by display name.
    pub fn suggestions(&self, name: &ExpandedName) -> Vec<String> {
        let limit = name.local.chars().count() / 2;
        self.by_name
            .keys()
            .filter_map(|candidate| {
                let distance = levenshtein(&name.local, &candidate.local);
                (distance <= limit).then(|| (distance, display_name(candidate)))
            })
            .sorted()
            .dedup_by(|a, b| a.1 == b.1)
            .take(5)
            .map(|(_, name)| name)
            .collect()
    }

    /// XPST0017 for a call that did not resolve, with suggestions attached.
    pub fn unknown_function(&self, name: &ExpandedName, arity: Arity) -> Error {
        let shown = display_name(name);
        let message = match self.by_name.get(name) {
            Some(known) => {
                let arities = known
                    .iter()
                    .map(|s| if s.rest { format!("{}+", s.params.len()) } else { s.params.len().to_string() })
                    .join(", ");
                format!("function {shown}#{arity} is not defined; known arities: {arities}")
            }
            None => format!("function {shown}#{arity} is not defined"),
        };
        Error::from_code(ErrorCode::XPST0017, message).with_suggestions(self.suggestions(name))
    }
}

fn display_name(name: &ExpandedName) -> String {
    match name.ns_uri.as_deref() {
        Some(FNS) | None => name.local.clone(),
        Some(_) => name.to_string(),
    }
}

/// Implementations keyed like their signatures; shared read-only across evaluations.
pub struct FunctionImplementations<N> {
    by_key: HashMap<FunctionKey, FunctionImpl<N>>,
}

impl<N> Default for FunctionImplementations<N> {
    fn default() -> Self {
        Self { by_key: HashMap::new() }
    }
}

impl<N> Clone for FunctionImplementations<N> {
    fn clone(&self) -> Self {
        Self { by_key: self.by_key.clone() }
    }
}

impl<N> fmt::Debug for FunctionImplementations<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionImplementations").field("len", &self.by_key.len()).finish()
    }
}

impl<N> FunctionImplementations<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: FunctionKey, func: FunctionImpl<N>) {
        self.by_key.insert(key, func);
    }

    pub fn register_fn<F>(&mut self, key: FunctionKey, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<N>, &[XdmSequence<N>]) -> Result<XdmSequence<N>, Error>,
    {
        self.register(key, Arc::new(f));
    }

    pub fn get(&self, key: &FunctionKey) -> Option<&FunctionImpl<N>> {
        self.by_key.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j] + cost).min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::Occurrence;
    use rstest::rstest;

    fn fn_name(local: &str) -> ExpandedName {
        ExpandedName::ns(FNS, local)
    }

    fn sigs() -> FunctionSignatures {
        let mut sigs = FunctionSignatures::new();
        let any = SequenceType::any_atomic(Occurrence::ZeroOrMore);
        for local in ["sum", "count", "substring", "string", "min", "max"] {
            sigs.register(FunctionSignature::new(fn_name(local), vec![any.clone()], any.clone()));
        }
        sigs.register(
            FunctionSignature::new(fn_name("concat"), vec![any.clone(), any.clone()], any.clone()).variadic(),
        );
        sigs
    }

    #[rstest]
    #[case("kitten", "sitting", 3)]
    #[case("sum", "sum", 0)]
    #[case("", "abc", 3)]
    fn edit_distance(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
    }

    #[rstest]
    fn rest_parameter_absorbs_extra_arity() {
        let sigs = sigs();
        assert!(sigs.resolve(&fn_name("concat"), 5).is_some());
        assert!(sigs.resolve(&fn_name("concat"), 1).is_none());
        let sig = sigs.resolve(&fn_name("concat"), 4).unwrap();
        assert_eq!(sig.param_type(3), sig.params.last());
    }

    #[rstest]
    fn unknown_function_suggests_close_names() {
        let sigs = sigs();
        let err = sigs.unknown_function(&fn_name("sum3"), 1);
        assert_eq!(err.code_enum(), ErrorCode::XPST0017);
        assert_eq!(err.suggestions.first().map(String::as_str), Some("sum"));
        assert!(err.suggestions.len() <= 5);
    }

    #[rstest]
    fn known_name_with_wrong_arity_lists_arities() {
        let err = sigs().unknown_function(&fn_name("count"), 3);
        assert!(err.message.contains("known arities: 1"));
    }
}
