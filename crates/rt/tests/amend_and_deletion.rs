//! End-to-end coverage for the object graph under the evaluation engine:
//! amend-merge semantics and listing deletion.

use pkl_rt::{
    Engine, MemberBody, MemberKey, MemberModifiers, Object, ObjectKind, ObjectMember, Value,
};

fn constant(modifiers: MemberModifiers, value: Value) -> ObjectMember {
    ObjectMember {
        identifier: None,
        qualified_name: None,
        section: None,
        header_section: None,
        modifiers,
        declared_type: None,
        body: MemberBody::Constant(value),
    }
}

#[test]
fn amending_overrides_only_the_redefined_property() {
    // A { x = 1; y = 2 }
    let a = Object::new(
        ObjectKind::Dynamic,
        None,
        None,
        vec![
            (
                MemberKey::Property(pkl_ident::get("x")),
                constant(MemberModifiers::empty(), Value::Int(1)),
            ),
            (
                MemberKey::Property(pkl_ident::get("y")),
                constant(MemberModifiers::empty(), Value::Int(2)),
            ),
        ],
        None,
    );
    // A { y = 3 }
    let amended = Object::new(
        ObjectKind::Dynamic,
        Some(a),
        None,
        vec![(
            MemberKey::Property(pkl_ident::get("y")),
            constant(MemberModifiers::empty(), Value::Int(3)),
        )],
        None,
    );

    let engine = Engine::new();
    let x = engine
        .read_member(&amended, &MemberKey::Property(pkl_ident::get("x")), &[])
        .unwrap();
    let y = engine
        .read_member(&amended, &MemberKey::Property(pkl_ident::get("y")), &[])
        .unwrap();
    assert_eq!(x, Value::Int(1));
    assert_eq!(y, Value::Int(3));
}

#[test]
fn forcing_an_amended_object_sees_the_merged_member_set() {
    let base = Object::new(
        ObjectKind::Dynamic,
        None,
        None,
        vec![(
            MemberKey::Property(pkl_ident::get("x")),
            constant(MemberModifiers::empty(), Value::Int(1)),
        )],
        None,
    );
    let amended = Object::new(
        ObjectKind::Dynamic,
        Some(base),
        None,
        vec![(
            MemberKey::Property(pkl_ident::get("y")),
            constant(MemberModifiers::empty(), Value::Int(2)),
        )],
        None,
    );

    let engine = Engine::new();
    engine.force(&amended, false, false).unwrap();
    assert!(amended.forced());
}

#[test]
fn deleting_a_listing_element_renumbers_subsequent_reads() {
    // [A, B, C, D] with `delete 1` yields iteration order [A, C, D] (S5).
    let root = Object::new(
        ObjectKind::Listing,
        None,
        None,
        vec![
            (
                MemberKey::Element(0),
                constant(MemberModifiers::ELEMENT, Value::String("A".into())),
            ),
            (
                MemberKey::Element(1),
                constant(MemberModifiers::ELEMENT, Value::String("B".into())),
            ),
            (
                MemberKey::Element(2),
                constant(MemberModifiers::ELEMENT, Value::String("C".into())),
            ),
            (
                MemberKey::Element(3),
                constant(MemberModifiers::ELEMENT, Value::String("D".into())),
            ),
        ],
        None,
    );
    let amended = Object::new(ObjectKind::Listing, Some(root), None, vec![], None);
    amended.delete_element(1);

    let engine = Engine::new();
    let mut survivors = Vec::new();
    amended.iterate_members(|key, _| {
        if let MemberKey::Element(_) = key {
            survivors.push(engine.read_member(&amended, key, &[]).unwrap());
        }
        true
    });
    // iterate_members already applies deletion filtering and hands back
    // definition-level keys, so the deleted slot (index 1, "B") never
    // reaches the visitor; no further key translation is needed here.
    assert_eq!(survivors.len(), 3);
    assert!(survivors.contains(&Value::String("A".into())));
    assert!(!survivors.contains(&Value::String("B".into())));
    assert!(survivors.contains(&Value::String("C".into())));
    assert!(survivors.contains(&Value::String("D".into())));
}
