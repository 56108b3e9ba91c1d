//! XPath 2.0/3.1 expression engine over caller-owned trees.
//!
//! Trees are exposed through the [`XdmNode`] facade. Expressions are parsed with `pest`, lowered
//! to an expression tree, bound against a [`StaticContext`] and evaluated lazily. Compiled
//! expressions are cached per source text and reused whenever the static lookups they made still
//! hold.

pub mod api;
pub mod cache;
pub mod compiler;
pub mod consts;
pub mod engine;
pub mod model;
pub mod parser;
pub mod xdm;

pub use api::{AnyValue, EvaluationOptions, Evaluator, ReturnType, Session, Variables, XPathResult};
pub use cache::{CacheStats, CompiledExpressionCache};
pub use compiler::{CompiledExpression, Language, Specificity, compile, compile_with};
pub use engine::registry::{FunctionImplementations, FunctionSignature, FunctionSignatures};
pub use engine::runtime::{
    DynamicContext, DynamicContextBuilder, Error, ErrorCode, ErrorKind, StaticContext, StaticContextBuilder,
};
pub use model::simple::{SimpleNode, SimpleNodeBuilder};
pub use model::{NodeKind, QName, XdmNode};
pub use xdm::{ExpandedName, HostValue, XdmAtomicValue, XdmItem, XdmSequence};
