//! Pkl Core Runtime: the value universe, object graph, class/typealias
//! system and evaluation engine underneath a Pkl evaluator.
//!
//! - `value`: the closed sum of runtime values (C2)
//! - `object`: the amend-chain object graph (C3)
//! - `class` / `typealias` / `types`: the class and type system (C4)
//! - `engine`: member reads, forcing, memoization (C5)
//! - `error`: the structured exception model (C7)
//! - `ast`: the trait boundary an external parser implements against

pub mod ast;
pub mod class;
pub mod engine;
pub mod error;
pub mod object;
pub mod typealias;
pub mod types;
pub mod value;

pub use class::{Class, ClassModifiers, ClassRef, MethodDef, PropertyDef, TypeParameter};
pub use engine::{CallableBody, Engine, Frame, ValueTracker};
pub use error::{ErrorKind, PklError, PklResult, SourceSection};
pub use object::{MemberBody, MemberKey, MemberModifiers, Object, ObjectKind, ObjectMember, ObjectRef};
pub use typealias::{AliasTypeParameter, TypeAlias, TypeAliasRef};
pub use types::{IntAlias, TypeNode, Variance};
pub use value::{
    Access, DataSizeUnit, DurationUnit, ExportedValue, HashableValue, IntSeq, PklFunction, PklRegex, Value,
};
