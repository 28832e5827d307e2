//! Interned identifiers
//!
//! Three independent pools back the three identifier flavors used by the
//! object/class system: regular names, local properties, and local methods.
//! An `Identifier` compares and hashes by pointer identity, not by the text
//! it carries — this is what lets the evaluator tell a local member apart
//! from a same-named non-local one without extra bookkeeping at every call
//! site.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Three intern pools                   │
//! ├─────────────────────┬──────────────────┬────────────────┤
//! │   REGULAR            │  LOCAL_PROPERTY  │  LOCAL_METHOD  │
//! │   get("x")            │  localProperty("x") │ localMethod("x") │
//! └─────────────────────┴──────────────────┴────────────────┘
//! ```
//! Looking up `"x"` in all three pools yields three *distinct* `Identifier`
//! instances, even though `name()` returns `"x"` for all of them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, RwLock};

use indexmap::IndexMap;

/// Which pool an identifier was interned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Regular,
    LocalProperty,
    LocalMethod,
}

struct IdentifierInner {
    name: String,
    flavor: Flavor,
}

/// An interned name. Cheap to clone (it's an `Arc`), compares by pointer
/// identity.
#[derive(Clone)]
pub struct Identifier(Arc<IdentifierInner>);

impl Identifier {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn flavor(&self) -> Flavor {
        self.0.flavor
    }

    pub fn is_local(&self) -> bool {
        !matches!(self.0.flavor, Flavor::Regular)
    }

    /// Reinterns this name's text into the regular pool.
    pub fn to_regular(&self) -> Identifier {
        pool_for(Flavor::Regular).get(&self.0.name)
    }

    /// Reinterns this name's text into the local-property pool.
    pub fn to_local_property(&self) -> Identifier {
        pool_for(Flavor::LocalProperty).get(&self.0.name)
    }

    /// Reinterns this name's text into the local-method pool.
    pub fn to_local_method(&self) -> Identifier {
        pool_for(Flavor::LocalMethod).get(&self.0.name)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({:?}, {:?})", self.0.name, self.0.flavor)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// Natural (text) ordering, intentionally inconsistent with `Eq` (which is
/// pointer identity) — matches the reference design.
impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

/// An append-only, concurrent-safe interning pool for one identifier flavor.
struct Pool {
    flavor: Flavor,
    entries: RwLock<IndexMap<String, Identifier>>,
}

impl Pool {
    fn new(flavor: Flavor) -> Self {
        Pool {
            flavor,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    fn get(&self, name: &str) -> Identifier {
        if let Some(id) = self.entries.read().unwrap().get(name) {
            return id.clone();
        }
        let mut entries = self.entries.write().unwrap();
        // Someone may have inserted while we waited for the write lock.
        if let Some(id) = entries.get(name) {
            return id.clone();
        }
        let id = Identifier(Arc::new(IdentifierInner {
            name: name.to_string(),
            flavor: self.flavor,
        }));
        entries.insert(name.to_string(), id.clone());
        id
    }
}

static REGULAR: OnceLock<Pool> = OnceLock::new();
static LOCAL_PROPERTY: OnceLock<Pool> = OnceLock::new();
static LOCAL_METHOD: OnceLock<Pool> = OnceLock::new();

fn pool_for(flavor: Flavor) -> &'static Pool {
    match flavor {
        Flavor::Regular => REGULAR.get_or_init(|| Pool::new(Flavor::Regular)),
        Flavor::LocalProperty => LOCAL_PROPERTY.get_or_init(|| Pool::new(Flavor::LocalProperty)),
        Flavor::LocalMethod => LOCAL_METHOD.get_or_init(|| Pool::new(Flavor::LocalMethod)),
    }
}

/// Intern `name` in the regular pool.
pub fn get(name: &str) -> Identifier {
    pool_for(Flavor::Regular).get(name)
}

/// Intern `name` in the local-property pool.
pub fn local_property(name: &str) -> Identifier {
    pool_for(Flavor::LocalProperty).get(name)
}

/// Intern `name` in the local-method pool.
pub fn local_method(name: &str) -> Identifier {
    pool_for(Flavor::LocalMethod).get(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_instance() {
        assert_eq!(get("foo"), get("foo"));
        assert_eq!(local_property("foo"), local_property("foo"));
        assert_eq!(local_method("foo"), local_method("foo"));
    }

    #[test]
    fn flavors_are_distinct_instances() {
        let regular = get("foo");
        let local = local_property("foo");
        assert_ne!(regular, local);
        assert_eq!(regular.name(), local.name());
    }

    #[test]
    fn cross_conversion_lands_in_the_right_pool() {
        let local = local_property("bar");
        let back = local.to_regular();
        assert_eq!(back, get("bar"));
        assert_eq!(back.to_local_property(), local);
    }

    #[test]
    fn ordering_is_by_name_not_identity() {
        let a = local_property("a");
        let b = get("b");
        assert!(a < b);
    }
}
