//! Standard-library bootstrap singletons
//!
//! Each stdlib module is realized once, at first access, as a process-wide
//! shared singleton — mirroring `pkl_ident::identifier`'s three intern
//! pools: a private registry behind a `LazyLock`, double-checked only in
//! the sense that `LazyLock::Lazy` itself guarantees single initialization
//! across threads. Because a real parser/stdlib source tree is an external
//! collaborator, each module here is built directly as a handful
//! of representative classes rather than parsed from `.pkl` source; the
//! bootstrap steps (temporary context, force, shared read-only result) are
//! what this module demonstrates, not the full library surface.

use std::collections::HashMap;
use std::sync::LazyLock;

use pkl_rt::{Class, ClassModifiers, ClassRef, Engine, Object, ObjectKind, ObjectRef, PklError, PklResult};

/// Names of the stdlib modules the core recognizes.
pub const STDLIB_MODULE_NAMES: &[&str] = &[
    "base", "math", "test", "reflect", "release", "semver", "settings", "xml", "platform", "benchmark",
    "jsonnet", "project",
];

fn leaf_class(simple_name: &str, module_name: &str, superclass: Option<&ClassRef>) -> ClassRef {
    let class = Class::new(
        simple_name,
        format!("pkl.{module_name}#{simple_name}"),
        format!("pkl.{module_name}"),
        ClassModifiers::empty(),
        vec![],
        vec![],
    );
    if let Some(super_class) = superclass {
        class
            .init_supertype(pkl_rt::TypeNode::Class(super_class.clone(), vec![]), super_class.clone())
            .expect("bootstrap classes initialize their supertype exactly once");
    }
    let prototype = Object::new(ObjectKind::Typed, None, Some(class.clone()), vec![], None);
    class
        .set_prototype(prototype)
        .expect("bootstrap classes set their prototype exactly once");
    class
}

/// `pkl.base`'s core classes, built bottom-up so `Any` has no superclass and
/// everything else chains up to it.
static BASE_CLASSES: LazyLock<HashMap<&'static str, ClassRef>> = LazyLock::new(|| {
    let mut classes = HashMap::new();
    let any = leaf_class("Any", "base", None);
    let nothing = leaf_class("Nothing", "base", Some(&any));
    let boolean = leaf_class("Boolean", "base", Some(&any));
    let number = leaf_class("Number", "base", Some(&any));
    let int = leaf_class("Int", "base", Some(&number));
    let float = leaf_class("Float", "base", Some(&number));
    let string = leaf_class("String", "base", Some(&any));
    let dynamic = leaf_class("Dynamic", "base", Some(&any));
    let typed = leaf_class("Typed", "base", Some(&any));
    let listing = leaf_class("Listing", "base", Some(&any));
    let mapping = leaf_class("Mapping", "base", Some(&any));
    let function = leaf_class("Function", "base", Some(&any));
    let class_class = leaf_class("Class", "base", Some(&any));
    let type_alias_class = leaf_class("TypeAlias", "base", Some(&any));
    for (name, class) in [
        ("Any", any),
        ("Nothing", nothing),
        ("Boolean", boolean),
        ("Number", number),
        ("Int", int),
        ("Float", float),
        ("String", string),
        ("Dynamic", dynamic),
        ("Typed", typed),
        ("Listing", listing),
        ("Mapping", mapping),
        ("Function", function),
        ("Class", class_class),
        ("TypeAlias", type_alias_class),
    ] {
        classes.insert(name, class);
    }
    classes
});

/// Looks up a `pkl.base` class by simple name. `pkl.base#String` must be
/// the same object across independent evaluator contexts; this registry is
/// process-wide, so it trivially is.
pub fn base_class(simple_name: &str) -> Option<ClassRef> {
    BASE_CLASSES.get(simple_name).cloned()
}

fn build_module_root(name: &str) -> PklResult<ObjectRef> {
    // Real modules parse and install their own properties/methods; absent
    // a parser, each non-base module gets an empty Dynamic root amending
    // nothing, which is enough to give it stable identity and forceability.
    let root = Object::new(ObjectKind::Dynamic, None, None, vec![], None);
    let engine = Engine::new();
    engine.force(&root, false, true)?;
    Ok(root)
}

struct StdlibRegistry {
    modules: std::sync::Mutex<HashMap<&'static str, ObjectRef>>,
}

static REGISTRY: LazyLock<StdlibRegistry> = LazyLock::new(|| StdlibRegistry {
    modules: std::sync::Mutex::new(HashMap::new()),
});

/// `getOrLoad` step 1: returns the singleton for a stdlib
/// module, building it on first access. An unknown module name is a plain
/// `Eval` error rather than a dedicated error kind.
pub fn get_stdlib_module(name: &str) -> PklResult<ObjectRef> {
    let Some(&canonical) = STDLIB_MODULE_NAMES.iter().find(|&&n| n == name) else {
        return Err(PklError::eval(format!("cannot find standard library module `{name}`")));
    };
    {
        let modules = REGISTRY.modules.lock().unwrap();
        if let Some(existing) = modules.get(canonical) {
            return Ok(existing.clone());
        }
    }
    let built = build_module_root(canonical)?;
    let mut modules = REGISTRY.modules.lock().unwrap();
    Ok(modules.entry(canonical).or_insert(built).clone())
}

pub fn is_stdlib_module(name: &str) -> bool {
    STDLIB_MODULE_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_classes_chain_to_any() {
        let int = base_class("Int").unwrap();
        let any = base_class("Any").unwrap();
        assert!(int.is_subclass_of(&any));
    }

    #[test]
    fn module_singleton_is_same_object_every_call() {
        let a = get_stdlib_module("math").unwrap();
        let b = get_stdlib_module("math").unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_module_reports_cannot_find() {
        assert!(get_stdlib_module("nope").is_err());
    }
}
