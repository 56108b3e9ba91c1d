//! Runtime half of the engine: contexts and errors, value comparison, the function registry and
//! the standard library, and the tree-walking evaluator.

pub mod compare;
pub mod evaluator;
pub mod functions;
pub mod registry;
pub mod runtime;
