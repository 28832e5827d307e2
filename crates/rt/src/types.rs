//! Type nodes and the structural type-check protocol
//!
//! `TypeNode` is the closed sum every class/typealias/property annotation
//! compiles down to. `check` is the single entry point the evaluation
//! engine calls on every type-checked read; it never throws to signal
//! rejection, using a `Result`/bool return instead of exceptions as
//! control flow, so a `Union`'s short-circuit is just an `any()` over
//! its members.

use std::fmt;
use std::sync::Arc;

use pkl_ident::PSet;

use crate::class::ClassRef;
use crate::typealias::TypeAliasRef;
use crate::value::Value;

/// The stdlib integer alias lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntAlias {
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    UInt,
}

impl IntAlias {
    /// Whether `self <: other` in the fixed stdlib lattice:
    /// `Int8 <: Int16 <: Int32`; `UInt8 <: {Int16,Int32,UInt16,UInt32,UInt}`;
    /// `UInt16 <: {Int32,UInt32,UInt}`; `UInt32 <: UInt`.
    pub fn is_subtype_of(self, other: IntAlias) -> bool {
        use IntAlias::*;
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (Int8, Int16)
                | (Int8, Int32)
                | (Int16, Int32)
                | (UInt8, Int16)
                | (UInt8, Int32)
                | (UInt8, UInt16)
                | (UInt8, UInt32)
                | (UInt8, UInt)
                | (UInt16, Int32)
                | (UInt16, UInt32)
                | (UInt16, UInt)
                | (UInt32, UInt)
        )
    }

    pub fn accepts(self, value: &Value) -> bool {
        let Value::Int(i) = value else { return false };
        match self {
            IntAlias::Int8 => i8::try_from(*i).is_ok(),
            IntAlias::Int16 => i16::try_from(*i).is_ok(),
            IntAlias::Int32 => i32::try_from(*i).is_ok(),
            IntAlias::UInt8 => u8::try_from(*i).is_ok(),
            IntAlias::UInt16 => u16::try_from(*i).is_ok(),
            IntAlias::UInt32 => u32::try_from(*i).is_ok(),
            IntAlias::UInt => *i >= 0,
        }
    }
}

/// A constraint expression: a boolean-returning closure over `it`. The
/// parser/evaluator of the constraint expression itself is an
/// external collaborator; the core only needs somewhere to hang the
/// compiled closure.
pub type ConstraintFn = dyn Fn(&Value) -> Result<bool, crate::error::PklError> + Send + Sync;

/// Variance of a class/typealias type parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variance {
    In,
    Out,
    Invariant,
}

/// The closed sum of type nodes.
#[derive(Clone)]
pub enum TypeNode {
    Class(ClassRef, Vec<TypeNode>),
    Alias(TypeAliasRef, Vec<TypeNode>),
    Nullable(Box<TypeNode>),
    Constrained(Box<TypeNode>, Vec<Arc<ConstraintFn>>),
    Union(Vec<TypeNode>),
    UnionOfStringLiterals(PSet<String>),
    StringLiteral(String),
    Unknown,
    Nothing,
    TypeVariable(usize),
    Function(Vec<TypeNode>, Box<TypeNode>),
    IntAlias(IntAlias),
}

impl fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Class(c, args) => {
                write!(f, "{}", c.qualified_name)?;
                if !args.is_empty() {
                    write!(f, "<{args:?}>")?;
                }
                Ok(())
            }
            TypeNode::Alias(a, args) => {
                write!(f, "{}", a.qualified_name)?;
                if !args.is_empty() {
                    write!(f, "<{args:?}>")?;
                }
                Ok(())
            }
            TypeNode::Nullable(inner) => write!(f, "{inner:?}?"),
            TypeNode::Constrained(inner, cs) => write!(f, "{inner:?}({} constraints)", cs.len()),
            TypeNode::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| format!("{m:?}")).collect();
                write!(f, "{}", parts.join(" | "))
            }
            TypeNode::UnionOfStringLiterals(set) => {
                let parts: Vec<String> = set.iter().map(|s| format!("{s:?}")).collect();
                write!(f, "{}", parts.join(" | "))
            }
            TypeNode::StringLiteral(s) => write!(f, "{s:?}"),
            TypeNode::Unknown => write!(f, "unknown"),
            TypeNode::Nothing => write!(f, "nothing"),
            TypeNode::TypeVariable(i) => write!(f, "#{i}"),
            TypeNode::Function(params, ret) => write!(f, "({params:?}) -> {ret:?}"),
            TypeNode::IntAlias(a) => write!(f, "{a:?}"),
        }
    }
}

impl TypeNode {
    /// Structural accept/reject check.
    pub fn check(&self, value: &Value) -> Result<bool, crate::error::PklError> {
        match self {
            TypeNode::Unknown => Ok(true),
            TypeNode::Nothing => Ok(false),
            TypeNode::Nullable(inner) => {
                if value.is_null() {
                    Ok(true)
                } else {
                    inner.check(value)
                }
            }
            TypeNode::Union(members) => {
                for member in members {
                    if member.check(value)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            TypeNode::UnionOfStringLiterals(literals) => match value {
                Value::String(s) => Ok(literals.contains(&s.to_string())),
                _ => Ok(false),
            },
            TypeNode::StringLiteral(expected) => match value {
                Value::String(s) => Ok(s.as_ref() == expected),
                _ => Ok(false),
            },
            TypeNode::Constrained(base, constraints) => {
                if !base.check(value)? {
                    return Ok(false);
                }
                for constraint in constraints {
                    if !constraint(value)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TypeNode::IntAlias(alias) => Ok(alias.accepts(value)),
            TypeNode::TypeVariable(i) => Err(crate::error::PklError::bug(format!(
                "uninstantiated type variable #{i} reached check()"
            ))),
            TypeNode::Function(..) => Ok(matches!(value, Value::Function(_))),
            TypeNode::Class(class, type_args) => class.accepts(value, type_args),
            TypeNode::Alias(alias, type_args) => alias.instantiate(type_args).check(value),
        }
    }

    /// Best-effort reflective description; the full `reflect` stdlib module
    /// mirror graph is an external/stdlib concern, this just gives it a
    /// stable rendering to hang labels off of.
    pub fn mirror(&self) -> String {
        format!("{self:?}")
    }

    pub fn deep_copy(&self) -> TypeNode {
        self.clone()
    }

    /// Replaces every `TypeVariable(i)` in a (cloned) copy of this node with
    /// `args[i]`, or `Unknown` if `i` is out of range. Backs
    /// `TypeAlias::instantiate`.
    pub fn substitute(&self, args: &[TypeNode]) -> TypeNode {
        match self {
            TypeNode::TypeVariable(i) => args.get(*i).cloned().unwrap_or(TypeNode::Unknown),
            TypeNode::Nullable(inner) => TypeNode::Nullable(Box::new(inner.substitute(args))),
            TypeNode::Constrained(inner, constraints) => {
                TypeNode::Constrained(Box::new(inner.substitute(args)), constraints.clone())
            }
            TypeNode::Union(members) => {
                TypeNode::Union(members.iter().map(|m| m.substitute(args)).collect())
            }
            TypeNode::Function(params, ret) => TypeNode::Function(
                params.iter().map(|p| p.substitute(args)).collect(),
                Box::new(ret.substitute(args)),
            ),
            TypeNode::Class(class, type_args) => TypeNode::Class(
                class.clone(),
                type_args.iter().map(|t| t.substitute(args)).collect(),
            ),
            TypeNode::Alias(alias, type_args) => TypeNode::Alias(
                alias.clone(),
                type_args.iter().map(|t| t.substitute(args)).collect(),
            ),
            other => other.clone(),
        }
    }

    /// Pairwise variance-respecting check of generic type arguments.
    pub fn args_compatible(declared: &[Variance], actual: &[TypeNode], required: &[TypeNode]) -> bool {
        if actual.len() != required.len() || actual.len() != declared.len() {
            return false;
        }
        declared
            .iter()
            .zip(actual.iter().zip(required.iter()))
            .all(|(variance, (a, r))| match variance {
                Variance::Invariant => format!("{a:?}") == format!("{r:?}"),
                // Out/In without full subtyping over arbitrary TypeNodes
                // reduce to structural equality here; full variance-aware
                // subtyping is left to the class-level `check`.
                Variance::Out | Variance::In => format!("{a:?}") == format!("{r:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_alias_lattice() {
        assert!(IntAlias::Int8.is_subtype_of(IntAlias::Int16));
        assert!(IntAlias::Int16.is_subtype_of(IntAlias::Int32));
        assert!(IntAlias::Int8.is_subtype_of(IntAlias::Int32));
        assert!(IntAlias::UInt16.is_subtype_of(IntAlias::UInt32));
        assert!(IntAlias::UInt32.is_subtype_of(IntAlias::UInt));
        assert!(!IntAlias::Int32.is_subtype_of(IntAlias::Int8));
    }

    #[test]
    fn nullable_accepts_null_for_any_inner() {
        let t = TypeNode::Nullable(Box::new(TypeNode::Nothing));
        assert!(t.check(&Value::null()).unwrap());
        assert!(!t.check(&Value::Int(1)).unwrap());
    }

    #[test]
    fn nullable_defers_to_inner_for_non_null() {
        let t = TypeNode::Nullable(Box::new(TypeNode::Unknown));
        assert!(t.check(&Value::Int(1)).unwrap());
    }

    #[test]
    fn union_accepts_if_any_member_accepts() {
        let t = TypeNode::Union(vec![TypeNode::Nothing, TypeNode::Unknown]);
        assert!(t.check(&Value::Int(1)).unwrap());
        let t2 = TypeNode::Union(vec![TypeNode::Nothing, TypeNode::Nothing]);
        assert!(!t2.check(&Value::Int(1)).unwrap());
    }

    #[test]
    fn union_of_string_literals() {
        let set: PSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let t = TypeNode::UnionOfStringLiterals(set);
        assert!(t.check(&Value::String("a".into())).unwrap());
        assert!(!t.check(&Value::String("c".into())).unwrap());
    }

    #[test]
    fn substitute_replaces_type_variables() {
        let t = TypeNode::Nullable(Box::new(TypeNode::TypeVariable(0)));
        let substituted = t.substitute(&[TypeNode::Unknown]);
        assert!(substituted.check(&Value::Int(1)).unwrap());
    }
}
