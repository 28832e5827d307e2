//! The module cache
//!
//! `ModuleCache::get_or_load` is `getOrLoad`: stdlib modules bypass the
//! cache entirely, non-cacheable keys are resolved and evaluated
//! fresh every time, and everything else is looked up by original URI then
//! resolved URI before falling through to a real load. A failed load is
//! stored as an error so repeated imports of a broken module replay the
//! same failure instead of re-running the initializer.
//!
//! This core's [`pkl_rt::Object`] builds its member table in one pass from
//! an already-parsed AST (declared members don't depend on evaluation, only
//! their *values* do — that's what C5's single-flight `readMember` already
//! guards). So unlike a literal "insert an empty Typed, then mutate it"
//! implementation, a reentrant `getOrLoad` for a URI whose initializer is
//! still running (a genuine `A imports B imports A` at the class-table
//! level, not just the value level) gets back a fresh empty stand-in Typed
//! rather than the eventual object — object identity doesn't hold across
//! that one edge, but lazy value reads that only observe the objects
//! after both imports complete are unaffected. See DESIGN.md for the
//! full rationale.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use pkl_rt::{ExtraStorage, MemberBody, MemberKey, Object, ObjectKind, ObjectRef, PklError, PklResult, Value};

use crate::module_key::{ModuleKey, ResolvedModuleKey};
use crate::security::SecurityManager;

/// The runtime's own version, checked against a module's
/// `@ModuleInfo.minPklVersion` annotation.
pub const RUNTIME_VERSION: (u32, u32, u32) = (0, 1, 0);

#[derive(Clone)]
enum CacheEntry {
    Ready(ObjectRef),
    Failed(PklError),
}

pub struct ModuleCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_progress: Mutex<HashSet<String>>,
}

impl Default for ModuleCache {
    fn default() -> Self {
        ModuleCache::new()
    }
}

impl ModuleCache {
    pub fn new() -> Self {
        ModuleCache {
            entries: Mutex::new(HashMap::new()),
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    fn peek(&self, uri: &str) -> Option<PklResult<ObjectRef>> {
        match self.entries.lock().unwrap().get(uri) {
            Some(CacheEntry::Ready(module)) => Some(Ok(module.clone())),
            Some(CacheEntry::Failed(err)) => Some(Err(err.clone())),
            None => None,
        }
    }

    fn store(&self, uri: &str, entry: CacheEntry) {
        self.entries.lock().unwrap().insert(uri.to_string(), entry);
    }

    /// `getOrLoad(moduleKey, ...)`. `init` resolves the already
    /// security-checked [`ResolvedModuleKey`] into a fully built module
    /// object; it is only invoked on an actual cache miss.
    pub fn get_or_load(
        &self,
        key: &dyn ModuleKey,
        security_manager: &dyn SecurityManager,
        init: impl FnOnce(&dyn ResolvedModuleKey) -> PklResult<ObjectRef>,
    ) -> PklResult<ObjectRef> {
        // Step 1: stdlib modules are static singletons, never cached here.
        if key.is_std_lib() {
            let name = key.uri().rsplit(':').next().unwrap_or(key.uri());
            return crate::stdlib::get_stdlib_module(name);
        }

        // Step 2: non-cacheable keys are resolved and evaluated fresh.
        if !key.is_cached() {
            security_manager.check_resolve_module(key.uri())?;
            let resolved = key.resolve(security_manager)?;
            return init(resolved.as_ref());
        }

        // Step 3: original-URI lookup, with sticky error replay.
        let original = key.uri().to_string();
        if let Some(entry) = self.peek(&original) {
            return entry;
        }

        // Step 4: resolve, then resolved-URI lookup.
        security_manager.check_resolve_module(&original)?;
        let resolved = key.resolve(security_manager)?;
        let resolved_uri = resolved.uri().to_string();
        if let Some(entry) = self.peek(&resolved_uri) {
            self.store(&original, entry_clone(&entry));
            return entry;
        }

        {
            let mut in_progress = self.in_progress.lock().unwrap();
            if in_progress.contains(&original) || in_progress.contains(&resolved_uri) {
                tracing::debug!(uri = %original, "cyclic module import, returning empty stand-in");
                return Ok(Object::new(
                    ObjectKind::Typed,
                    None,
                    None,
                    vec![],
                    Some(ExtraStorage::Module { uri: original }),
                ));
            }
            in_progress.insert(original.clone());
            in_progress.insert(resolved_uri.clone());
        }

        // Step 5: real miss. Build the module, then check step 6's version
        // gate before publishing it.
        let result = init(resolved.as_ref()).and_then(|module| {
            check_min_version(&module)?;
            Ok(module)
        });

        {
            let mut in_progress = self.in_progress.lock().unwrap();
            in_progress.remove(&original);
            in_progress.remove(&resolved_uri);
        }

        match &result {
            Ok(module) => {
                self.store(&original, CacheEntry::Ready(module.clone()));
                self.store(&resolved_uri, CacheEntry::Ready(module.clone()));
            }
            Err(err) => {
                tracing::warn!(uri = %original, error = %err, "module initializer failed, caching the error");
                self.store(&original, CacheEntry::Failed(err.clone()));
                self.store(&resolved_uri, CacheEntry::Failed(err.clone()));
            }
        }
        result
    }
}

fn entry_clone(entry: &PklResult<ObjectRef>) -> CacheEntry {
    match entry {
        Ok(module) => CacheEntry::Ready(module.clone()),
        Err(err) => CacheEntry::Failed(err.clone()),
    }
}

/// Parses `"major.minor.patch"` and compares against [`RUNTIME_VERSION`].
fn check_min_version(module: &ObjectRef) -> PklResult<()> {
    let Some(member) = module.get_member(&MemberKey::Property(pkl_ident::get("minPklVersion"))) else {
        return Ok(());
    };
    let MemberBody::Constant(Value::String(declared)) = &member.body else {
        return Ok(());
    };
    let Some(required) = parse_version(declared) else {
        return Ok(());
    };
    if required > RUNTIME_VERSION {
        return Err(PklError::eval(format!(
            "module requires Pkl {}.{}.{} but the runtime is {}.{}.{}",
            required.0, required.1, required.2, RUNTIME_VERSION.0, RUNTIME_VERSION.1, RUNTIME_VERSION.2
        ))
        .with_hint("upgrade the runtime or relax the module's minPklVersion"));
    }
    Ok(())
}

fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let mut parts = text.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::AllowAllSecurityManager;
    use std::sync::Arc;

    struct FixedKey {
        uri: String,
        cached: bool,
    }
    impl ModuleKey for FixedKey {
        fn uri(&self) -> &str {
            &self.uri
        }
        fn is_cached(&self) -> bool {
            self.cached
        }
        fn is_std_lib(&self) -> bool {
            false
        }
        fn is_globbable(&self) -> bool {
            false
        }
        fn resolve(&self, _sm: &dyn SecurityManager) -> PklResult<Box<dyn ResolvedModuleKey>> {
            Ok(Box::new(FixedResolved { uri: self.uri.clone() }))
        }
        fn resolve_uri(&self, glob_uri: &str) -> PklResult<String> {
            Ok(glob_uri.to_string())
        }
    }
    struct FixedResolved {
        uri: String,
    }
    impl ResolvedModuleKey for FixedResolved {
        fn load_source(&self) -> PklResult<String> {
            Ok(String::new())
        }
        fn uri(&self) -> &str {
            &self.uri
        }
    }

    #[test]
    fn repeated_load_does_not_reinvoke_initializer() {
        let cache = ModuleCache::new();
        let sm = AllowAllSecurityManager;
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let key = FixedKey {
            uri: "file:///a.pkl".to_string(),
            cached: true,
        };
        let make_init = |calls: Arc<std::sync::atomic::AtomicUsize>| {
            move |_resolved: &dyn ResolvedModuleKey| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Object::new(ObjectKind::Typed, None, None, vec![], None))
            }
        };
        let first = cache.get_or_load(&key, &sm, make_init(calls.clone()));
        let second = cache.get_or_load(&key, &sm, make_init(calls.clone()));
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_initializer_replays_the_same_error() {
        let cache = ModuleCache::new();
        let sm = AllowAllSecurityManager;
        let key = FixedKey {
            uri: "file:///broken.pkl".to_string(),
            cached: true,
        };
        let first = cache.get_or_load(&key, &sm, |_r| Err(PklError::eval("boom")));
        let second = cache.get_or_load(&key, &sm, |_r| {
            panic!("initializer must not run again for a cached failure")
        });
        assert_eq!(first.unwrap_err().message, "boom");
        assert_eq!(second.unwrap_err().message, "boom");
    }

    #[test]
    fn noncacheable_key_always_reinvokes() {
        let cache = ModuleCache::new();
        let sm = AllowAllSecurityManager;
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let key = FixedKey {
            uri: "file:///nocache.pkl".to_string(),
            cached: false,
        };
        for _ in 0..2 {
            let calls = calls.clone();
            let _ = cache.get_or_load(&key, &sm, move |_r| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Object::new(ObjectKind::Typed, None, None, vec![], None))
            });
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
