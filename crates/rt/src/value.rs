//! The Pkl value universe
//!
//! `Value` is a closed sum of every runtime value a Pkl program can produce.
//! Primitives and value-typed variants compare by value; collections compare
//! structurally; `Function`/`Class`/`TypeAlias` compare by identity.
//! Objects (`Dynamic`/`Typed`/`Listing`/`Mapping`) live in
//! [`crate::object`] and are reference-counted so the amend chain can share
//! ancestors cheaply.

use std::fmt;
use std::sync::Arc;

use pkl_ident::{Identifier, PList, PMap, PSet};

use crate::class::ClassRef;
use crate::object::{ExtraStorage, ObjectRef};
use crate::typealias::TypeAliasRef;

/// `Duration`/`DataSize` unit tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Nanos,
    Micros,
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSizeUnit {
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Petabytes,
    Kibibytes,
    Mebibytes,
    Gibibytes,
    Tebibytes,
    Pebibytes,
}

impl DataSizeUnit {
    /// Buckets a byte length into {B,KB,MB,GB,TB,PB} by
    /// `floor(log10(len))/3`.
    pub fn bucket_for_len(len: usize) -> DataSizeUnit {
        if len == 0 {
            return DataSizeUnit::Bytes;
        }
        let digits = (len as f64).log10().floor() as i64;
        match (digits / 3).clamp(0, 5) {
            0 => DataSizeUnit::Bytes,
            1 => DataSizeUnit::Kilobytes,
            2 => DataSizeUnit::Megabytes,
            3 => DataSizeUnit::Gigabytes,
            4 => DataSizeUnit::Terabytes,
            _ => DataSizeUnit::Petabytes,
        }
    }

    fn divisor(self) -> f64 {
        match self {
            DataSizeUnit::Bytes => 1.0,
            DataSizeUnit::Kilobytes => 1e3,
            DataSizeUnit::Megabytes => 1e6,
            DataSizeUnit::Gigabytes => 1e9,
            DataSizeUnit::Terabytes => 1e12,
            DataSizeUnit::Petabytes => 1e15,
            DataSizeUnit::Kibibytes => 1024.0,
            DataSizeUnit::Mebibytes => 1024f64.powi(2),
            DataSizeUnit::Gibibytes => 1024f64.powi(3),
            DataSizeUnit::Tebibytes => 1024f64.powi(4),
            DataSizeUnit::Pebibytes => 1024f64.powi(5),
        }
    }
}

/// A half-closed arithmetic progression; `step` is never zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntSeq {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl IntSeq {
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        assert!(step != 0, "IntSeq step must not be 0");
        IntSeq { start, end, step }
    }

    pub fn is_empty(&self) -> bool {
        if self.step > 0 {
            self.start > self.end
        } else {
            self.start < self.end
        }
    }

    /// The greatest value `<= end` (or `>= end` if `step < 0`) reachable
    /// from `start`.
    pub fn last(&self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        let span = self.end - self.start;
        let steps = span / self.step;
        Some(self.start + steps * self.step)
    }

    pub fn iter(&self) -> IntSeqIter {
        IntSeqIter {
            next: self.start,
            seq: *self,
            done: self.is_empty(),
        }
    }
}

pub struct IntSeqIter {
    next: i64,
    seq: IntSeq,
    done: bool,
}

impl Iterator for IntSeqIter {
    type Item = i64;
    fn next(&mut self) -> Option<i64> {
        if self.done {
            return None;
        }
        let current = self.next;
        let reached_end = if self.seq.step > 0 {
            current >= self.seq.end
        } else {
            current <= self.seq.end
        };
        if reached_end {
            self.done = true;
        } else {
            self.next += self.seq.step;
        }
        Some(current)
    }
}

/// A value-equal, source-compared compiled regex.
#[derive(Debug, Clone)]
pub struct PklRegex {
    pub pattern: Arc<str>,
    pub compiled: Arc<regex::Regex>,
}

impl PklRegex {
    pub fn compile(pattern: &str) -> Result<PklRegex, regex::Error> {
        Ok(PklRegex {
            pattern: Arc::from(pattern),
            compiled: Arc::new(regex::Regex::new(pattern)?),
        })
    }
}

impl PartialEq for PklRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// A closed, identity-compared callable.
#[derive(Clone)]
pub struct PklFunction {
    pub arity: usize,
    pub this_value: Option<Box<Value>>,
    body: Arc<dyn crate::engine::CallableBody>,
}

impl PklFunction {
    pub fn new(arity: usize, this_value: Option<Value>, body: Arc<dyn crate::engine::CallableBody>) -> Self {
        PklFunction {
            arity,
            this_value: this_value.map(Box::new),
            body,
        }
    }

    pub fn body(&self) -> &Arc<dyn crate::engine::CallableBody> {
        &self.body
    }
}

impl fmt::Debug for PklFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function/{}", self.arity)
    }
}

impl PartialEq for PklFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

/// A symbolic access step in a [`Value::Reference`] path.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Property(Identifier),
    Element(i64),
    Entry(Box<Value>),
}

/// The closed sum of all runtime values.
#[derive(Clone)]
pub enum Value {
    /// Optional "missing" payload; carries a default so a coerced read of a
    /// missing property can still produce something sensible.
    Null(Option<Box<Value>>),
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Duration(f64, DurationUnit),
    DataSize(f64, DataSizeUnit),
    IntSeq(IntSeq),
    Regex(PklRegex),
    Pair(Box<Value>, Box<Value>),
    List(PList<Value>),
    Set(PSet<HashableValue>),
    Map(PMap<HashableValue, Value>),
    Dynamic(ObjectRef),
    Typed(ObjectRef),
    Listing(ObjectRef),
    Mapping(ObjectRef),
    Function(PklFunction),
    Class(ClassRef),
    TypeAlias(TypeAliasRef),
    Reference {
        candidate_types: PSet<HashableValue>,
        root_value: Box<Value>,
        path: PList<Access>,
    },
}

/// A newtype so `Value` can live inside `PSet`/`PMap` keys, which require
/// `Hash`. Hashing stays consistent with equality: functions/classes/
/// typealiases hash by pointer identity, everything else by structural
/// content.
#[derive(Clone)]
pub struct HashableValue(pub Value);

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null(a), Null(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Duration(a, ua), Duration(b, ub)) => a == b && ua == ub,
            (DataSize(a, ua), DataSize(b, ub)) => a == b && ua == ub,
            (IntSeq(a), IntSeq(b)) => a == b,
            (Regex(a), Regex(b)) => a == b,
            (Pair(a1, a2), Pair(b1, b2)) => a1 == b1 && a2 == b2,
            (List(a), List(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Function(a), Function(b)) => a == b,
            (Class(a), Class(b)) => Arc::ptr_eq(a, b),
            (TypeAlias(a), TypeAlias(b)) => Arc::ptr_eq(a, b),
            (Dynamic(a) | Typed(a) | Listing(a) | Mapping(a), Dynamic(b) | Typed(b) | Listing(b) | Mapping(b)) => {
                Arc::ptr_eq(a, b)
            }
            (
                Reference { root_value: ra, path: pa, .. },
                Reference { root_value: rb, path: pb, .. },
            ) => ra == rb && pa == pb,
            _ => false,
        }
    }
}
impl Eq for Value {}

impl PartialEq for HashableValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for HashableValue {}

impl std::hash::Hash for HashableValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use Value::*;
        match &self.0 {
            Null(_) => 0u8.hash(state),
            Bool(b) => b.hash(state),
            Int(i) => i.hash(state),
            Float(f) => f.to_bits().hash(state),
            String(s) => s.hash(state),
            Bytes(b) => b.hash(state),
            Duration(v, u) => {
                v.to_bits().hash(state);
                (*u as u8).hash(state);
            }
            DataSize(v, u) => {
                v.to_bits().hash(state);
                (*u as u8).hash(state);
            }
            IntSeq(s) => {
                s.start.hash(state);
                s.end.hash(state);
                s.step.hash(state);
            }
            Regex(r) => r.pattern.hash(state),
            Pair(a, b) => {
                HashableValue((**a).clone()).hash(state);
                HashableValue((**b).clone()).hash(state);
            }
            List(items) => {
                for item in items.iter() {
                    HashableValue(item.clone()).hash(state);
                }
            }
            Function(f) => (Arc::as_ptr(f.body()) as *const () as usize).hash(state),
            Class(c) => (Arc::as_ptr(c) as usize).hash(state),
            TypeAlias(t) => (Arc::as_ptr(t) as usize).hash(state),
            Dynamic(o) | Typed(o) | Listing(o) | Mapping(o) => {
                (Arc::as_ptr(o) as usize).hash(state)
            }
            Set(_) | Map(_) | Reference { .. } => {
                // These contain (or are) collections of values; hashing them
                // as map/set keys is legal per the data model but rare in
                // practice. Fall back to a stable discriminant so equal
                // values still collide into the same bucket.
                99u8.hash(state);
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(default) => write!(f, "null{}", if default.is_some() { "(with default)" } else { "" }),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::Duration(v, u) => write!(f, "{v}.{u:?}"),
            Value::DataSize(v, u) => write!(f, "{v}.{u:?}"),
            Value::IntSeq(s) => write!(f, "IntSeq({}, {}, {})", s.start, s.end, s.step),
            Value::Regex(r) => write!(f, "Regex({:?})", r.pattern),
            Value::Pair(a, b) => write!(f, "Pair({a:?}, {b:?})"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Set(items) => f.debug_set().entries(items.iter().map(|v| &v.0)).finish(),
            Value::Map(entries) => f.debug_map().entries(entries.iter().map(|(k, v)| (&k.0, v))).finish(),
            Value::Dynamic(_) => write!(f, "Dynamic"),
            Value::Typed(_) => write!(f, "Typed"),
            Value::Listing(_) => write!(f, "Listing"),
            Value::Mapping(_) => write!(f, "Mapping"),
            Value::Function(fun) => write!(f, "{fun:?}"),
            Value::Class(c) => write!(f, "Class({})", c.qualified_name),
            Value::TypeAlias(t) => write!(f, "TypeAlias({})", t.qualified_name),
            Value::Reference { root_value, path, .. } => {
                write!(f, "Reference({root_value:?}, {} steps)", path.len())
            }
        }
    }
}

impl Value {
    pub fn null() -> Value {
        Value::Null(None)
    }

    pub fn null_with_default(default: Value) -> Value {
        Value::Null(Some(Box::new(default)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Export the value's `Bytes` size bucket as `(scaled_value, unit)`;
    /// a 2048-byte value reports `2.KB` with value ≈ 2.05.
    pub fn bytes_size_bucket(len: usize) -> (f64, DataSizeUnit) {
        let unit = DataSizeUnit::bucket_for_len(len);
        (len as f64 / unit.divisor(), unit)
    }

    /// Language-neutral export.
    pub fn export(&self) -> ExportedValue {
        match self {
            Value::Null(_) => ExportedValue::Null,
            Value::Bool(b) => ExportedValue::Bool(*b),
            Value::Int(i) => ExportedValue::Int(*i),
            Value::Float(x) => ExportedValue::Float(*x),
            Value::String(s) => ExportedValue::String(s.to_string()),
            Value::Bytes(b) => ExportedValue::Bytes(b.to_vec()),
            Value::Duration(v, u) => ExportedValue::Duration(*v, format!("{u:?}")),
            Value::DataSize(v, u) => ExportedValue::DataSize(*v, format!("{u:?}")),
            Value::Regex(r) => ExportedValue::Regex(r.pattern.to_string()),
            Value::List(items) => {
                ExportedValue::List(items.iter().map(Value::export).collect())
            }
            Value::Set(items) => {
                ExportedValue::List(items.iter().map(|v| v.0.export()).collect())
            }
            Value::Map(entries) => ExportedValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (format!("{:?}", k.0), v.export()))
                    .collect(),
            ),
            Value::Dynamic(obj) | Value::Typed(obj) | Value::Listing(obj) | Value::Mapping(obj) => {
                export_object(obj)
            }
            other => ExportedValue::String(format!("{other:?}")),
        }
    }
}

/// Objects export as a structure with module URI, class info, and an
/// ordered property map, walking the live member set through a throwaway
/// `Engine` the same way any other caller forces reads against an object.
fn export_object(obj: &ObjectRef) -> ExportedValue {
    let engine = crate::engine::Engine::new();
    let class = obj
        .object_class()
        .map(|c| c.qualified_name.clone())
        .unwrap_or_default();
    let module_uri = match &obj.extra {
        Some(ExtraStorage::Module { uri }) => uri.clone(),
        _ => obj.object_class().map(|c| c.module_name.clone()).unwrap_or_default(),
    };
    let mut properties = Vec::new();
    obj.iterate_members(|key, member| {
        if !member.is_hidden() {
            if let Ok(value) = engine.read_member(obj, key, &[]) {
                properties.push((key.to_string(), value.export()));
            }
        }
        true
    });
    ExportedValue::Object {
        class,
        module_uri,
        properties,
    }
}

/// A language-neutral export structure. A real embedding would
/// wire this into a JSON-like tree or similar; the core only needs to
/// produce it.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(untagged)]
pub enum ExportedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Duration(f64, String),
    DataSize(f64, String),
    Regex(String),
    List(Vec<ExportedValue>),
    Map(Vec<(String, ExportedValue)>),
    Object {
        class: String,
        module_uri: String,
        properties: Vec<(String, ExportedValue)>,
    },
}
