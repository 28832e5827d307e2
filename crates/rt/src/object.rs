//! The object graph
//!
//! An [`Object`] is one of `Dynamic`/`Typed`/`Listing`/`Mapping`. Each holds
//! an optional `parent`, an immutable
//! insertion-ordered `members` table, and a mutable `cache` of forced
//! values. Amend chains share ancestors through `Arc`, modeling the chain
//! as owned nodes with an immutable parent pointer; `cache` is a `Mutex`
//! rather than a `RefCell` because stdlib
//! prototypes are shared, read-only, across evaluator-context threads once
//! forced.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use pkl_ident::Identifier;

use crate::class::ClassRef;
use crate::error::{PklError, PklResult};
use crate::value::{HashableValue, Value};

/// Which concrete object shape this node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Dynamic,
    Typed,
    Listing,
    Mapping,
}

/// The key under which a member is stored: identifiers for properties,
/// non-negative integers for elements, arbitrary values for entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberKey {
    Property(Identifier),
    Element(i64),
    Entry(HashableValue),
}

impl std::fmt::Display for MemberKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKey::Property(id) => write!(f, "{id}"),
            MemberKey::Element(i) => write!(f, "[{i}]"),
            MemberKey::Entry(v) => write!(f, "[{:?}]", v.0),
        }
    }
}

/// Member modifier bitmask. Hand-rolled rather than pulled from
/// the `bitflags` crate, matching `ClassModifiers` in `class.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberModifiers(pub u16);

impl MemberModifiers {
    pub const LOCAL: MemberModifiers = MemberModifiers(1 << 0);
    pub const HIDDEN: MemberModifiers = MemberModifiers(1 << 1);
    pub const ABSTRACT: MemberModifiers = MemberModifiers(1 << 2);
    pub const EXTERNAL: MemberModifiers = MemberModifiers(1 << 3);
    pub const FIXED: MemberModifiers = MemberModifiers(1 << 4);
    pub const CONST: MemberModifiers = MemberModifiers(1 << 5);
    pub const ENTRY: MemberModifiers = MemberModifiers(1 << 6);
    pub const ELEMENT: MemberModifiers = MemberModifiers(1 << 7);
    pub const IMPORT: MemberModifiers = MemberModifiers(1 << 8);
    pub const CLASS: MemberModifiers = MemberModifiers(1 << 9);
    pub const TYPEALIAS: MemberModifiers = MemberModifiers(1 << 10);
    pub const DELETE: MemberModifiers = MemberModifiers(1 << 11);

    pub const fn empty() -> Self {
        MemberModifiers(0)
    }

    pub const fn contains(self, other: MemberModifiers) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for MemberModifiers {
    type Output = MemberModifiers;
    fn bitor(self, rhs: MemberModifiers) -> MemberModifiers {
        MemberModifiers(self.0 | rhs.0)
    }
}

/// The body of a member: either an already-known constant, or a callable
/// bound to the AST body.
pub enum MemberBody {
    Constant(Value),
    Callable(Arc<dyn crate::engine::CallableBody>),
}

/// A definition attached to an object.
pub struct ObjectMember {
    pub identifier: Option<Identifier>,
    pub qualified_name: Option<String>,
    pub section: Option<crate::error::SourceSection>,
    pub header_section: Option<crate::error::SourceSection>,
    pub modifiers: MemberModifiers,
    pub declared_type: Option<crate::types::TypeNode>,
    pub body: MemberBody,
}

impl ObjectMember {
    pub fn is_local(&self) -> bool {
        self.modifiers.contains(MemberModifiers::LOCAL)
    }
    pub fn is_hidden(&self) -> bool {
        self.modifiers.contains(MemberModifiers::HIDDEN)
    }
    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(MemberModifiers::ABSTRACT)
    }
    pub fn is_external(&self) -> bool {
        self.modifiers.contains(MemberModifiers::EXTERNAL)
    }
    pub fn is_delete(&self) -> bool {
        self.modifiers.contains(MemberModifiers::DELETE)
    }
}

/// Per-object auxiliary data that doesn't belong on every object.
pub enum ExtraStorage {
    Module { uri: String },
    ListingSurrogate { element_type: crate::types::TypeNode },
    MappingSurrogate {
        key_type: crate::types::TypeNode,
        value_type: crate::types::TypeNode,
    },
}

#[derive(Default)]
struct Cache {
    values: IndexMap<MemberKey, Value>,
    /// Single-flight guard: keys currently being computed by this thread's
    /// call stack re-enter `CannotFindMember`-safe recursion instead of a
    /// torn double-compute.
    in_flight: std::collections::HashSet<MemberKey>,
    deleted_elements: BTreeSet<i64>,
    deleted_keys: std::collections::HashSet<MemberKey>,
}

/// An object node in the graph. Cheap to share via [`ObjectRef`].
pub struct Object {
    pub kind: ObjectKind,
    pub parent: Option<ObjectRef>,
    pub class: Option<ClassRef>,
    members: IndexMap<MemberKey, Arc<ObjectMember>>,
    cache: Mutex<Cache>,
    pub extra: Option<ExtraStorage>,
    forced: AtomicBool,
}

pub type ObjectRef = Arc<Object>;

impl Object {
    pub fn new(
        kind: ObjectKind,
        parent: Option<ObjectRef>,
        class: Option<ClassRef>,
        members: Vec<(MemberKey, ObjectMember)>,
        extra: Option<ExtraStorage>,
    ) -> ObjectRef {
        Arc::new(Object {
            kind,
            parent,
            class,
            members: members
                .into_iter()
                .map(|(k, m)| (k, Arc::new(m)))
                .collect(),
            cache: Mutex::new(Cache::default()),
            extra,
            forced: AtomicBool::new(false),
        })
    }

    pub fn object_class(&self) -> Option<&ClassRef> {
        self.class.as_ref()
    }

    /// `getMember`: this level only.
    pub fn get_member(&self, key: &MemberKey) -> Option<Arc<ObjectMember>> {
        self.members.get(key).cloned()
    }

    /// `findMember`: walks `parent`.
    pub fn find_member(self: &ObjectRef, key: &MemberKey) -> Option<(ObjectRef, Arc<ObjectMember>)> {
        let mut current = self.clone();
        loop {
            if let Some(member) = current.get_member(key) {
                return Some((current.clone(), member));
            }
            current = current.parent.clone()?;
        }
    }

    /// Whether `self`'s amend chain contains `other`.
    pub fn is_amending(self: &ObjectRef, other: &ObjectRef) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if Arc::ptr_eq(&node, other) {
                return true;
            }
            current = node.parent.clone();
        }
        false
    }

    /// Whether a prototype of `class` appears in this object's chain.
    pub fn amends_class(self: &ObjectRef, class: &ClassRef) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(node_class) = &node.class {
                if node_class.is_subclass_of(class) {
                    return true;
                }
            }
            current = node.parent.clone();
        }
        false
    }

    fn deleted_elements_upto(self: &ObjectRef) -> BTreeSet<i64> {
        // The *nearest deleting ancestor* owns the renumbering; we merge
        // deletions root-first so a descendant's delete always takes
        // precedence at the same index.
        let mut current = self.clone();
        let mut chain = vec![current.clone()];
        while let Some(parent) = current.parent.clone() {
            chain.push(parent.clone());
            current = parent;
        }
        let mut deleted = BTreeSet::new();
        for node in chain.iter().rev() {
            let cache = node.cache.lock().unwrap();
            for idx in &cache.deleted_elements {
                deleted.insert(*idx);
            }
        }
        deleted
    }

    /// Converts a consumer-facing element index into the index a deleting
    /// ancestor actually stores it under, by shifting upward past deleted
    /// indices until a fixpoint is reached.
    pub fn to_definition_key(self: &ObjectRef, reference_key: &MemberKey) -> Option<MemberKey> {
        match reference_key {
            MemberKey::Element(i) => {
                let deleted = self.deleted_elements_upto();
                if deleted.is_empty() {
                    return Some(MemberKey::Element(*i));
                }
                let mut idx = *i;
                loop {
                    let shift = deleted.iter().filter(|d| **d <= idx).count() as i64;
                    let shifted = *i + shift;
                    if shifted == idx && shift > 0 {
                        // fixpoint
                        return Some(MemberKey::Element(shifted));
                    }
                    if shift == 0 {
                        return Some(MemberKey::Element(idx));
                    }
                    idx = shifted;
                }
            }
            MemberKey::Property(_) | MemberKey::Entry(_) => {
                if self.key_is_deleted(reference_key) {
                    None
                } else {
                    Some(reference_key.clone())
                }
            }
        }
    }

    pub fn to_reference_key(self: &ObjectRef, definition_key: &MemberKey) -> Option<MemberKey> {
        match definition_key {
            MemberKey::Element(i) => {
                let deleted = self.deleted_elements_upto();
                let shift = deleted.iter().filter(|d| **d <= *i).count() as i64;
                Some(MemberKey::Element(*i - shift))
            }
            other => {
                if self.key_is_deleted(other) {
                    None
                } else {
                    Some(other.clone())
                }
            }
        }
    }

    fn key_is_deleted(self: &ObjectRef, key: &MemberKey) -> bool {
        if let MemberKey::Element(i) = key {
            if self.deleted_elements_upto().contains(i) {
                return true;
            }
        }
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.cache.lock().unwrap().deleted_keys.contains(key) {
                return true;
            }
            current = node.parent.clone();
        }
        false
    }

    pub(crate) fn cached(&self, key: &MemberKey) -> Option<Value> {
        self.cache.lock().unwrap().values.get(key).cloned()
    }

    pub(crate) fn cache_insert(&self, key: MemberKey, value: Value) {
        let mut cache = self.cache.lock().unwrap();
        cache.in_flight.remove(&key);
        cache.values.insert(key, value);
    }

    /// Returns `true` if this call began the single-flight section (caller
    /// must compute and call `cache_insert`); `false` if another in-flight
    /// computation is already underway for `key` on this object and the
    /// caller should treat it as a (structurally impossible without true
    /// threading) cycle.
    pub(crate) fn begin_compute(&self, key: &MemberKey) -> bool {
        let mut cache = self.cache.lock().unwrap();
        if cache.in_flight.contains(key) {
            return false;
        }
        cache.in_flight.insert(key.clone());
        true
    }

    /// Releases the single-flight guard without caching a value, e.g. after
    /// the member turned out not to exist or its computation failed.
    pub(crate) fn cancel_compute(&self, key: &MemberKey) {
        self.cache.lock().unwrap().in_flight.remove(key);
    }

    /// Marks element index `index` deleted at this object level.
    pub fn delete_element(&self, index: i64) {
        self.cache.lock().unwrap().deleted_elements.insert(index);
    }

    /// Marks property/entry `key` deleted at this object level.
    pub fn delete_key(&self, key: MemberKey) {
        self.cache.lock().unwrap().deleted_keys.insert(key);
    }

    /// Iterates `{ancestors ∪ self}` root-first, applying deletion rules,
    /// skipping local members, and handing `visit` the *most-derived*
    /// override of each key rather than the first ancestor definition
    /// encountered — a descendant that redeclares a key and flips its
    /// modifiers (hides a previously-visible property, say) must have
    /// that override's modifiers win. `visit` returns `false` to stop
    /// early.
    pub fn iterate_members(self: &ObjectRef, mut visit: impl FnMut(&MemberKey, &ObjectMember) -> bool) {
        let mut chain = vec![self.clone()];
        let mut current = self.clone();
        while let Some(parent) = current.parent.clone() {
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse(); // root-first, fixes each key's position in iteration order

        let mut seen = std::collections::HashSet::new();
        for node in &chain {
            for key in node.members.keys() {
                if seen.contains(key) {
                    continue;
                }
                seen.insert(key.clone());
                let Some((_, member)) = self.find_member(key) else {
                    continue;
                };
                if member.is_local() || member.is_delete() {
                    continue;
                }
                if self.key_is_deleted(key) {
                    continue;
                }
                if !visit(key, &member) {
                    return;
                }
            }
        }
    }

    pub fn forced(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }

    pub(crate) fn mark_forced(&self, value: bool) {
        self.forced.store(value, Ordering::Release);
    }

    pub fn member_count_hint(&self) -> usize {
        self.members.len()
    }

    /// All member keys declared at this level only, in declaration order.
    pub fn own_keys(&self) -> Vec<MemberKey> {
        self.members.keys().cloned().collect()
    }
}

pub(crate) fn require_class(obj: &ObjectRef, what: &str) -> PklResult<ClassRef> {
    obj.class
        .clone()
        .ok_or_else(|| PklError::bug(format!("{what} requires a Typed object with a class")))
}
