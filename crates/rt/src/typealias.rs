//! Type alias metaobjects
//!
//! A [`TypeAlias`] is a named, possibly-generic alias for a [`TypeNode`].
//! `instantiate` is the only operation that matters at evaluation time: it
//! substitutes the alias's own type parameters into its body, the same
//! `TypeVariable` substitution `Class` generics use.

use std::sync::Arc;

use crate::class::ClassModifiers;
use crate::types::{TypeNode, Variance};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct AliasTypeParameter {
    pub name: String,
    pub variance: Variance,
}

/// A type alias metaobject. Compares by identity, matching `Class`.
pub struct TypeAlias {
    pub simple_name: String,
    pub qualified_name: String,
    pub module_name: String,
    pub modifiers: ClassModifiers,
    pub type_parameters: Vec<AliasTypeParameter>,
    pub annotations: Vec<Value>,
    body: TypeNode,
}

pub type TypeAliasRef = Arc<TypeAlias>;

impl TypeAlias {
    pub fn new(
        simple_name: impl Into<String>,
        qualified_name: impl Into<String>,
        module_name: impl Into<String>,
        modifiers: ClassModifiers,
        type_parameters: Vec<AliasTypeParameter>,
        annotations: Vec<Value>,
        body: TypeNode,
    ) -> TypeAliasRef {
        Arc::new(TypeAlias {
            simple_name: simple_name.into(),
            qualified_name: qualified_name.into(),
            module_name: module_name.into(),
            modifiers,
            type_parameters,
            annotations,
            body,
        })
    }

    /// Substitutes `type_args` into the alias's body. With no type
    /// parameters this is just the body itself, so a plain alias costs
    /// nothing beyond a clone.
    pub fn instantiate(&self, type_args: &[TypeNode]) -> TypeNode {
        if self.type_parameters.is_empty() {
            self.body.deep_copy()
        } else {
            self.body.substitute(type_args)
        }
    }

    pub fn body(&self) -> &TypeNode {
        &self.body
    }
}

impl std::fmt::Debug for TypeAlias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeAlias({} = {:?})", self.qualified_name, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;

    #[test]
    fn non_generic_alias_instantiates_to_its_body() {
        let alias = TypeAlias::new(
            "Id",
            "pkl.base#Id",
            "pkl.base",
            ClassModifiers::empty(),
            vec![],
            vec![],
            TypeNode::Union(vec![TypeNode::Unknown]),
        );
        let instantiated = alias.instantiate(&[]);
        assert!(instantiated.check(&Value::Int(1)).unwrap());
    }

    #[test]
    fn generic_alias_substitutes_type_variable() {
        let alias = TypeAlias::new(
            "Box",
            "pkl.base#Box",
            "pkl.base",
            ClassModifiers::empty(),
            vec![AliasTypeParameter {
                name: "T".to_string(),
                variance: Variance::Invariant,
            }],
            vec![],
            TypeNode::Nullable(Box::new(TypeNode::TypeVariable(0))),
        );
        let base = Class::new("Int", "pkl.base#Int", "pkl.base", ClassModifiers::empty(), vec![], vec![]);
        let instantiated = alias.instantiate(&[TypeNode::Class(base, vec![])]);
        assert!(instantiated.check(&Value::null()).unwrap());
    }
}
