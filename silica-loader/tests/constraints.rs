mod common;

use common::*;
use silica_assembly::{AssemblyBuilder, ConstraintKind, StorageMode};
use silica_loader::{ErrorKind, LoadError, Loader};

#[test]
fn same_constraint_admits_and_rejects() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, _t4) = setup_native_types(&mut b);

    b.begin_type(StorageMode::Value, "Test.OnlyNative1");
    let g = b.add_generic_parameter();
    b.add_constraint(&g, &[t1.clone()], ConstraintKind::Same, 0);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    let n1 = load_type_ok(&loader, "Test", "Test.Native1", vec![]);
    let n4 = load_type_ok(&loader, "Test", "Test.Native4", vec![]);

    load_type_ok(&loader, "Test", "Test.OnlyNative1", vec![n1.id]);
    let err = load_type_err(&loader, "Test", "Test.OnlyNative1", vec![n4.id]);
    assert_eq!(err, LoadError::InvalidGenericArguments);
    assert_eq!(err.kind(), ErrorKind::Constraint);
}

#[test]
fn same_constraint_deduces_placeholders() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, _t4) = setup_native_types(&mut b);

    let pair = b.begin_type(StorageMode::Value, "Test.Pair");
    let p1 = b.add_generic_parameter();
    let p2 = b.add_generic_parameter();
    b.add_field(&p1);
    b.add_field(&p2);
    b.link(true, false);
    b.end_type();

    // accepts Pair<X, Native1> for some deduced X
    b.begin_type(StorageMode::Value, "Test.WantsNative1Pair");
    let g = b.add_generic_parameter();
    let any = b.any_type();
    let pattern = b.make_type(&pair, vec![any, t1.clone()]);
    b.add_constraint(&g, &[pattern], ConstraintKind::Same, 0);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    let n1 = load_type_ok(&loader, "Test", "Test.Native1", vec![]);
    let n4 = load_type_ok(&loader, "Test", "Test.Native4", vec![]);

    let matching = load_type_ok(&loader, "Test", "Test.Pair", vec![n4.id, n1.id]);
    let mismatching = load_type_ok(&loader, "Test", "Test.Pair", vec![n1.id, n4.id]);

    load_type_ok(&loader, "Test", "Test.WantsNative1Pair", vec![matching.id]);
    assert_eq!(
        load_type_err(&loader, "Test", "Test.WantsNative1Pair", vec![mismatching.id]),
        LoadError::InvalidGenericArguments
    );
    // a non-Pair argument cannot match the pattern either
    assert_eq!(
        load_type_err(&loader, "Test", "Test.WantsNative1Pair", vec![n1.id]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn exist_with_try_turns_errors_into_rejection() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, _t4) = setup_native_types(&mut b);

    // Guarded<T> only accepts Native1
    let guarded = b.begin_type(StorageMode::Value, "Test.Guarded");
    let gp = b.add_generic_parameter();
    b.add_constraint(&gp, &[t1.clone()], ConstraintKind::Same, 0);
    b.link(true, false);
    b.end_type();

    // Wants<T> requires Guarded<T> to exist, tolerantly
    b.begin_type(StorageMode::Value, "Test.Wants");
    let g = b.add_generic_parameter();
    let probe = b.make_type(&guarded, vec![g]);
    let try_probe = b.try_type(&probe);
    b.add_constraint(&try_probe, &[], ConstraintKind::Exist, 0);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    let n1 = load_type_ok(&loader, "Test", "Test.Native1", vec![]);
    let n4 = load_type_ok(&loader, "Test", "Test.Native4", vec![]);

    load_type_ok(&loader, "Test", "Test.Wants", vec![n1.id]);
    // the guarded instantiation legitimately fails, so the constraint is
    // false rather than a propagated error
    assert_eq!(
        load_type_err(&loader, "Test", "Test.Wants", vec![n4.id]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn base_constraint_walks_the_inheritance_chain() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");

    let root = b.begin_type(StorageMode::Reference, "Test.Root");
    b.link(true, false);
    b.end_type();

    let mid = b.begin_type(StorageMode::Reference, "Test.Mid");
    b.set_base(&root);
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Reference, "Test.Leaf");
    b.set_base(&mid);
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Reference, "Test.Other");
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.WantsRooted");
    let g = b.add_generic_parameter();
    b.add_constraint(&g, &[root.clone()], ConstraintKind::Base, 0);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let leaf = load_type_ok(&loader, "Test", "Test.Leaf", vec![]);
    let other = load_type_ok(&loader, "Test", "Test.Other", vec![]);

    load_type_ok(&loader, "Test", "Test.WantsRooted", vec![leaf.id]);
    assert_eq!(
        load_type_err(&loader, "Test", "Test.WantsRooted", vec![other.id]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn interface_constraint_includes_boxed_value_interfaces() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, _t4) = setup_native_types(&mut b);

    let vtab = b.begin_type(StorageMode::Global, "Test.Vtab");
    b.add_field(&t1);
    b.end_type();

    let iface = b.begin_type(StorageMode::Interface, "Test.IThing");
    b.set_vtable(&vtab);
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Reference, "Test.RefImpl");
    b.add_interface(&iface, Some(&vtab));
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.ValueImpl");
    b.add_interface(&iface, Some(&vtab));
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.Plain");
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.WantsThing");
    let g = b.add_generic_parameter();
    b.add_constraint(&g, &[iface.clone()], ConstraintKind::Interface, 0);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);

    let ref_impl = load_type_ok(&loader, "Test", "Test.RefImpl", vec![]);
    let value_impl = load_type_ok(&loader, "Test", "Test.ValueImpl", vec![]);
    let plain = load_type_ok(&loader, "Test", "Test.Plain", vec![]);

    load_type_ok(&loader, "Test", "Test.WantsThing", vec![ref_impl.id]);
    load_type_ok(&loader, "Test", "Test.WantsThing", vec![value_impl.id]);
    assert_eq!(
        load_type_err(&loader, "Test", "Test.WantsThing", vec![plain.id]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn cyclic_constraint_is_detected() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let selfish = b.forward_declare_type();
    b.begin_type_at(StorageMode::Value, "Test.Selfish", &selfish);
    let g = b.add_generic_parameter();
    let probe = b.make_type(&selfish, vec![g]);
    b.add_constraint(&probe, &[], ConstraintKind::Exist, 0);
    b.link(true, false);
    b.end_type();
    setup_native_types(&mut b);
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    let n1 = load_type_ok(&loader, "Test", "Test.Native1", vec![]);

    assert_eq!(
        load_type_err(&loader, "Test", "Test.Selfish", vec![n1.id]),
        LoadError::CyclicConstraint
    );
}

#[test]
fn failed_constraint_check_rolls_back_cleanly() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, t4) = setup_native_types(&mut b);

    b.begin_type(StorageMode::Value, "Test.Strict");
    let g = b.add_generic_parameter();
    b.add_constraint(&g, &[t1.clone()], ConstraintKind::Same, 0);
    b.add_field(&g);
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.Normal");
    b.add_field(&t4);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    let n1 = load_type_ok(&loader, "Test", "Test.Native1", vec![]);
    let n4 = load_type_ok(&loader, "Test", "Test.Native4", vec![]);

    assert_eq!(
        load_type_err(&loader, "Test", "Test.Strict", vec![n4.id]),
        LoadError::InvalidGenericArguments
    );
    // the loader is unaffected afterwards
    let normal = load_type_ok(&loader, "Test", "Test.Normal", vec![]);
    check_size(&normal, 4, 4);
    let strict = load_type_ok(&loader, "Test", "Test.Strict", vec![n1.id]);
    check_size(&strict, 1, 1);
}
