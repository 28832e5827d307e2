//! The external AST surface the engine consumes
//!
//! The parser that produces these nodes is out of scope here; this module
//! only states the trait boundary the evaluation engine is built against,
//! so a real parser crate has something concrete to implement.

use crate::engine::Frame;
use crate::error::PklResult;
use crate::types::TypeNode;
use crate::value::Value;

/// An expression node: anything that can be evaluated in a [`Frame`] to
/// produce a [`Value`].
pub trait ExpressionNode: Send + Sync {
    fn execute_generic(&self, frame: &Frame) -> PklResult<Value>;
}

/// A parsed module: its own members plus the classes/typealiases it
/// declares. The module loader (C6) hands this to the engine to build the
/// module's root object.
pub trait ModuleNode: Send + Sync {
    fn module_name(&self) -> &str;
    fn class_nodes(&self) -> &[Box<dyn ClassNode>];
    fn amends_uri(&self) -> Option<&str>;
}

/// A class declaration node, source for a [`crate::class::Class`].
pub trait ClassNode: Send + Sync {
    fn simple_name(&self) -> &str;
    fn supertype(&self) -> Option<&dyn TypeNodeSource>;
    fn properties(&self) -> &[Box<dyn ClassPropertyNode>];
    fn methods(&self) -> &[Box<dyn ClassMethodNode>];
}

/// A property declaration within a [`ClassNode`].
pub trait ClassPropertyNode: Send + Sync {
    fn name(&self) -> &str;
    fn declared_type(&self) -> Option<&dyn TypeNodeSource>;
    fn value_expr(&self) -> Option<&dyn ExpressionNode>;
}

/// A method declaration within a [`ClassNode`].
pub trait ClassMethodNode: Send + Sync {
    fn name(&self) -> &str;
    fn arity(&self) -> usize;
    fn body(&self) -> &dyn ExpressionNode;
}

/// Anything that can resolve itself to a core [`TypeNode`] once the
/// enclosing module's classes/typealiases have been registered.
pub trait TypeNodeSource: Send + Sync {
    fn resolve(&self) -> PklResult<TypeNode>;
}
