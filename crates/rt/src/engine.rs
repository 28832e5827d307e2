//! The evaluation engine
//!
//! `Engine::read_member` is the single entry point for reading any member
//! of any object: it implements a five-step algorithm, including constant
//! folding with synthesized stack frames and the type-check gate.
//! `Object::force` drives recursive forcing under a cycle-safety rule: the
//! `forced` bit is set *before* recursing and cleared if an exception
//! escapes, so a later retry is possible.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::class::PropertyDef;
use crate::error::{ErrorKind, PklError, PklResult};
use crate::object::{ExtraStorage, MemberBody, MemberKey, Object, ObjectKind, ObjectRef};
use crate::value::Value;

/// Nested `readMember`/`force` calls beyond this depth are a genuine
/// unbounded recursion (mutual self-reference through callable bodies),
/// not a deeply-but-finitely nested object graph — raised as
/// [`ErrorKind::StackOverflow`] rather than letting the host thread's own
/// stack blow up first.
const MAX_RECURSION_DEPTH: usize = 2000;

/// Decrements an [`Engine`]'s call-depth counter when a `read_member`/`force`
/// frame returns, success or failure alike.
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A stack frame: which object produced the value being computed, which
/// ancestor's member definition is being run, and under what key.
#[derive(Clone)]
pub struct Frame {
    pub receiver: ObjectRef,
    pub owner: ObjectRef,
    pub member_key: Option<MemberKey>,
}

/// The compiled body bound to a non-constant [`crate::object::ObjectMember`]
/// or [`crate::value::PklFunction`]. The AST that produces these bodies is
/// an external collaborator; the engine only needs to invoke one.
pub trait CallableBody: Send + Sync {
    fn call(&self, frame: &Frame, args: &[Value]) -> PklResult<Value>;
}

/// A debug-only subscriber for expression-node evaluations. Scoped to a
/// single engine; never affects memoization.
pub trait ValueTracker: Send + Sync {
    fn on_value(&self, node_id: u64, value: &Value);
}

/// Top-level coordinator for member reads. One `Engine` per evaluator
/// context: contexts don't share tenant objects, only stdlib singletons
/// and identifier pools are process-wide.
pub struct Engine {
    tracker: Mutex<Option<Box<dyn ValueTracker>>>,
    depth: AtomicUsize,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            tracker: Mutex::new(None),
            depth: AtomicUsize::new(0),
        }
    }

    /// Bumps the shared recursion counter, returning a guard that restores
    /// it on drop and an error if the bump crossed [`MAX_RECURSION_DEPTH`].
    fn enter(&self) -> (DepthGuard<'_>, PklResult<()>) {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = DepthGuard(&self.depth);
        if depth > MAX_RECURSION_DEPTH {
            return (
                guard,
                Err(PklError::new(
                    ErrorKind::StackOverflow,
                    format!("stack overflow: recursion depth exceeded {MAX_RECURSION_DEPTH}"),
                )),
            );
        }
        (guard, Ok(()))
    }

    pub fn set_tracker(&self, tracker: Option<Box<dyn ValueTracker>>) {
        *self.tracker.lock().unwrap() = tracker;
    }

    fn notify(&self, node_id: u64, value: &Value) {
        if let Some(tracker) = self.tracker.lock().unwrap().as_ref() {
            tracker.on_value(node_id, value);
        }
    }

    /// Reads `key` on `receiver`, memoizing the result. `args` are extra
    /// positional arguments for method-shaped reads;
    /// property/entry/element reads pass an empty slice.
    pub fn read_member(&self, receiver: &ObjectRef, key: &MemberKey, args: &[Value]) -> PklResult<Value> {
        let (_guard, budget) = self.enter();
        budget?;

        // Step 1: local-property routing is implicit — `MemberKey`
        // equality/hash already distinguish a local-property identifier
        // from a same-named regular one (pkl-ident's three pools), so no
        // extra dispatch is needed here.

        // Step 2: cache check.
        if let Some(cached) = receiver.cached(key) {
            tracing::trace!(%key, "member cache hit");
            return Ok(cached);
        }

        // Single-flight: if another frame on this call stack is already
        // computing this exact (object, key) pair, that's a genuine cycle
        //.
        if !receiver.begin_compute(key) {
            return Err(PklError::bug(format!(
                "cyclic evaluation of member {key} (single-flight already in progress)"
            )));
        }

        // Step 3: walk parents for the member definition.
        let found = receiver.find_member(key);
        let Some((owner, member)) = found else {
            receiver.cancel_compute(key);
            let all_keys: Vec<String> = receiver.own_keys().iter().map(|k| k.to_string()).collect();
            return Err(crate::error::cannot_find_member(&key.to_string(), &all_keys));
        };

        tracing::trace!(%key, "member cache miss, evaluating");

        let frame = Frame {
            receiver: receiver.clone(),
            owner: owner.clone(),
            member_key: Some(key.clone()),
        };

        let result = match &member.body {
            // Step 4: constant-folded path.
            MemberBody::Constant(value) => {
                if let Some(declared_type) = &member.declared_type {
                    match declared_type.check(value) {
                        Ok(true) => Ok(value.clone()),
                        Ok(false) => {
                            let section = member
                                .section
                                .clone()
                                .unwrap_or_else(|| fallback_section(&owner));
                            Err(PklError::type_check_failed(&format!("{declared_type:?}"), value)
                                .with_inserted_frame(
                                    member
                                        .qualified_name
                                        .clone()
                                        .unwrap_or_else(|| key.to_string()),
                                    section,
                                ))
                        }
                        Err(e) => Err(e),
                    }
                } else {
                    Ok(value.clone())
                }
            }
            // Step 5: dynamic path.
            MemberBody::Callable(body) => body.call(&frame, args),
        };

        match &result {
            Ok(value) => {
                receiver.cache_insert(key.clone(), value.clone());
                self.notify(hash_key(key), value);
            }
            Err(_) => {
                // Release the single-flight guard on failure so a later,
                // independent read can retry (e.g. after the member is
                // redefined further down an amend chain in a different
                // evaluation).
                receiver.cancel_compute(key);
            }
        }
        result
    }

    /// `force(allowUndef, recursive)`.
    pub fn force(&self, obj: &ObjectRef, allow_undef: bool, recursive: bool) -> PklResult<()> {
        let (_guard, budget) = self.enter();
        budget?;

        if obj.forced() {
            return Ok(());
        }
        obj.mark_forced(true);

        let mut keys = Vec::new();
        obj.iterate_members(|key, member| {
            if !member.is_local()
                && !member.is_hidden()
                && !member.is_external()
                && !member.is_abstract()
                && !member.is_delete()
            {
                keys.push(key.clone());
            }
            true
        });

        for key in keys {
            let result = self.read_member(obj, &key, &[]);
            match result {
                Ok(value) => {
                    if recursive {
                        if let Some(child) = as_object_ref(&value) {
                            if let Err(e) = self.force(&child, allow_undef, true) {
                                obj.mark_forced(false);
                                return Err(e);
                            }
                        }
                    }
                }
                Err(e) if e.kind == crate::error::ErrorKind::UndefinedValue && allow_undef => {
                    continue;
                }
                Err(e) => {
                    obj.mark_forced(false);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn as_object_ref(value: &Value) -> Option<ObjectRef> {
    match value {
        Value::Dynamic(o) | Value::Typed(o) | Value::Listing(o) | Value::Mapping(o) => Some(o.clone()),
        _ => None,
    }
}

fn fallback_section(owner: &ObjectRef) -> crate::error::SourceSection {
    let module_uri = match &owner.extra {
        Some(ExtraStorage::Module { uri }) => uri.clone(),
        _ => "<unknown>".to_string(),
    };
    crate::error::SourceSection {
        module_uri,
        start_line: 0,
        start_col: 0,
        end_line: 0,
        end_col: 0,
    }
}

fn hash_key(key: &MemberKey) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Reads a property's declared type through a class's type-check table
/// without requiring the caller to re-derive it. Used by `Object`'s
/// Typed→Dynamic and Map conversions.
pub fn declared_type_for(class: &crate::class::ClassRef, key: &MemberKey) -> Option<PropertyDef> {
    match key {
        MemberKey::Property(id) => class.get_property(id).cloned(),
        _ => None,
    }
}

/// Instantiates a fresh `Typed` object amending `class`'s prototype — the
/// runtime counterpart of "instantiating a class produces a Typed amending
/// the prototype".
pub fn instantiate(
    class: &crate::class::ClassRef,
    members: Vec<(MemberKey, crate::object::ObjectMember)>,
) -> PklResult<ObjectRef> {
    let prototype = class
        .prototype()
        .cloned()
        .ok_or_else(|| PklError::bug(format!("class {} has no prototype yet", class.qualified_name)))?;
    Ok(Object::new(
        ObjectKind::Typed,
        Some(prototype),
        Some(class.clone()),
        members,
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{MemberModifiers, ObjectMember};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBody {
        calls: std::sync::Arc<AtomicUsize>,
        value: Value,
    }
    impl CallableBody for CountingBody {
        fn call(&self, _frame: &Frame, _args: &[Value]) -> PklResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    #[test]
    fn member_read_is_memoized() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let body = std::sync::Arc::new(CountingBody {
            calls: calls.clone(),
            value: Value::Int(42),
        });
        let key = MemberKey::Property(pkl_ident::get("x"));
        let obj = Object::new(
            ObjectKind::Dynamic,
            None,
            None,
            vec![(
                key.clone(),
                ObjectMember {
                    identifier: Some(pkl_ident::get("x")),
                    qualified_name: None,
                    section: None,
                    header_section: None,
                    modifiers: MemberModifiers::empty(),
                    declared_type: None,
                    body: MemberBody::Callable(body),
                },
            )],
            None,
        );
        let engine = Engine::new();
        let v1 = engine.read_member(&obj, &key, &[]).unwrap();
        let v2 = engine.read_member(&obj, &key, &[]).unwrap();
        assert_eq!(v1, Value::Int(42));
        assert_eq!(v2, Value::Int(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn constant_fold_type_check_failure_has_program_value() {
        let key = MemberKey::Property(pkl_ident::get("x"));
        let obj = Object::new(
            ObjectKind::Dynamic,
            None,
            None,
            vec![(
                key.clone(),
                ObjectMember {
                    identifier: Some(pkl_ident::get("x")),
                    qualified_name: Some("x".to_string()),
                    section: None,
                    header_section: None,
                    modifiers: MemberModifiers::empty(),
                    declared_type: Some(crate::types::TypeNode::Nothing),
                    body: MemberBody::Constant(Value::Bool(true)),
                },
            )],
            None,
        );
        let engine = Engine::new();
        let err = engine.read_member(&obj, &key, &[]).unwrap_err();
        assert_eq!(err.program_values[0].name, "Value");
        assert_eq!(err.program_values[0].value, Value::Bool(true));
    }

    #[test]
    fn recursion_past_the_depth_ceiling_raises_stack_overflow() {
        let engine = Engine::new();
        for _ in 0..MAX_RECURSION_DEPTH {
            let (guard, budget) = engine.enter();
            assert!(budget.is_ok());
            std::mem::forget(guard);
        }
        let (_guard, budget) = engine.enter();
        assert_eq!(budget.unwrap_err().kind, ErrorKind::StackOverflow);
    }

    #[test]
    fn depth_guard_unwinds_so_later_independent_reads_still_succeed() {
        let engine = Engine::new();
        {
            let (_guard, budget) = engine.enter();
            assert!(budget.is_ok());
        }
        let key = MemberKey::Property(pkl_ident::get("x"));
        let obj = Object::new(
            ObjectKind::Dynamic,
            None,
            None,
            vec![(
                key.clone(),
                ObjectMember {
                    identifier: Some(pkl_ident::get("x")),
                    qualified_name: None,
                    section: None,
                    header_section: None,
                    modifiers: MemberModifiers::empty(),
                    declared_type: None,
                    body: MemberBody::Constant(Value::Int(1)),
                },
            )],
            None,
        );
        assert_eq!(engine.read_member(&obj, &key, &[]).unwrap(), Value::Int(1));
    }

    #[test]
    fn missing_member_reports_cannot_find() {
        let obj = Object::new(ObjectKind::Dynamic, None, None, vec![], None);
        let engine = Engine::new();
        let err = engine
            .read_member(&obj, &MemberKey::Property(pkl_ident::get("missing")), &[])
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Eval);
        assert_eq!(err.member_name.as_deref(), Some("missing"));
    }
}
