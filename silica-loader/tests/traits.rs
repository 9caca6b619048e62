mod common;

use common::*;
use silica_assembly::{AssemblyBuilder, ConstraintKind, StorageMode, TypeRef};
use silica_loader::{LoadError, Loader};

#[test]
fn trait_field_requirement_matches_by_name_and_type() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, t4) = setup_native_types(&mut b);

    let tr = b.begin_trait("Test.HasLength");
    b.add_trait_field(&t4, "length", "");
    b.end_trait();

    let sized = b.begin_type(StorageMode::Value, "Test.Sized");
    b.add_field_named(&t4, "length");
    b.end_type();

    let wrong = b.begin_type(StorageMode::Value, "Test.WrongType");
    b.add_field_named(&t1, "length");
    b.end_type();

    let none = b.begin_type(StorageMode::Value, "Test.NoField");
    b.add_field(&t4);
    b.end_type();

    for (name, target) in [
        ("Test.UseSized", &sized),
        ("Test.UseWrongType", &wrong),
        ("Test.UseNoField", &none),
    ] {
        b.begin_type(StorageMode::Value, name);
        b.add_constraint(target, &[], ConstraintKind::Trait, tr.id());
        b.link(true, false);
        b.end_type();
    }
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);

    load_type_ok(&loader, "Test", "Test.UseSized", vec![]);
    assert_eq!(
        load_type_err(&loader, "Test", "Test.UseWrongType", vec![]),
        LoadError::InvalidGenericArguments
    );
    assert_eq!(
        load_type_err(&loader, "Test", "Test.UseNoField", vec![]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn trait_field_deduces_generic_arguments() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (_t1, t4) = setup_native_types(&mut b);

    // trait Content<TElem>(T) { TElem item; }
    let tr = b.begin_trait("Test.Content");
    let elem = b.add_generic_parameter();
    b.add_trait_field(&elem, "item", "");
    b.end_trait();

    let holder = b.begin_type(StorageMode::Value, "Test.Holder");
    b.add_field_named(&t4, "item");
    b.end_type();

    // the trait argument is an undetermined placeholder, deduced from the
    // target's field type
    b.begin_type(StorageMode::Value, "Test.UseHolder");
    let any = b.any_type();
    b.add_constraint(&holder, &[any], ConstraintKind::Trait, tr.id());
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    load_type_ok(&loader, "Test", "Test.UseHolder", vec![]);
}

#[test]
fn trait_function_overload_selection() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Core");

    // void TargetFunction<T1, T2>(T1, T2) requires Same(T1, T2)
    let tf = b.begin_function("Core.TargetFunction");
    let fg1 = b.add_generic_parameter();
    let fg2 = b.add_generic_parameter();
    b.add_constraint(&fg1, &[fg2.clone()], ConstraintKind::Same, 0);
    b.signature(&TypeRef::Empty, &[fg1.clone(), fg2.clone()]);
    b.end_function();

    let tt = b.begin_type(StorageMode::Value, "Core.TargetType");
    let a0 = b.add_additional_generic_parameter(0);
    let a1 = b.add_additional_generic_parameter(1);
    let ttf = b.make_function(&tf, vec![a0, a1]);
    b.add_member_function("Func", &ttf);
    b.end_type();

    let vt1 = b.begin_type(StorageMode::Value, "Core.ValueType1");
    b.end_type();
    let vt2 = b.begin_type(StorageMode::Value, "Core.ValueType2");
    b.end_type();

    let tr1 = b.begin_trait("Core.Trait1");
    b.add_trait_function(&TypeRef::Empty, &[vt1.clone(), vt1.clone()], "Func", "Func");
    b.end_trait();
    let tr2 = b.begin_trait("Core.Trait2");
    b.add_trait_function(&TypeRef::Empty, &[vt1.clone(), vt2.clone()], "Func", "Func");
    b.end_trait();

    b.begin_type(StorageMode::Value, "Core.TestType1");
    b.link(true, false);
    b.add_constraint(&tt, &[], ConstraintKind::Trait, tr1.id());
    b.end_type();

    b.begin_type(StorageMode::Value, "Core.TestType2");
    b.link(true, false);
    b.add_constraint(&tt, &[], ConstraintKind::Trait, tr2.id());
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    load_type_ok(&loader, "Core", "Core.TestType1", vec![]);
    assert_eq!(
        load_type_err(&loader, "Core", "Core.TestType2", vec![]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn trait_function_through_constraint_import() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Core");

    // struct ParentType<T> { alias Sub = T; }
    let pt = b.begin_type(StorageMode::Value, "Core.ParentType");
    let ptg = b.add_generic_parameter();
    b.add_subtype("Sub", &ptg);
    b.end_type();

    // void TargetFunction<T>(T, T1.Sub) requires ParentType<T> as "constraint"
    let tf = b.begin_function("Core.TargetFunction");
    let tfg = b.add_generic_parameter();
    let probe = b.make_type(&pt, vec![tfg.clone()]);
    let try_probe = b.try_type(&probe);
    b.add_constraint_exported(&try_probe, &[], ConstraintKind::Exist, 0, "constraint");
    let parent = b.constraint_import("constraint/.target");
    let arg2 = b.make_subtype(&parent, "Sub", vec![]);
    b.signature(&TypeRef::Empty, &[tfg, arg2]);
    b.end_function();

    let tt = b.begin_type(StorageMode::Value, "Core.TargetType");
    let a0 = b.add_additional_generic_parameter(0);
    let ttf = b.make_function(&tf, vec![a0]);
    b.add_member_function("Func", &ttf);
    b.end_type();

    let vt1 = b.begin_type(StorageMode::Value, "Core.ValueType1");
    b.end_type();
    let vt2 = b.begin_type(StorageMode::Value, "Core.ValueType2");
    b.end_type();

    let tr1 = b.begin_trait("Core.Trait1");
    b.add_trait_function(&TypeRef::Empty, &[vt1.clone(), vt1.clone()], "Func", "Func");
    b.end_trait();
    let tr2 = b.begin_trait("Core.Trait2");
    b.add_trait_function(&TypeRef::Empty, &[vt1.clone(), vt2.clone()], "Func", "Func");
    b.end_trait();

    b.begin_type(StorageMode::Value, "Core.TestType1");
    b.link(true, false);
    b.add_constraint(&tt, &[], ConstraintKind::Trait, tr1.id());
    b.end_type();

    b.begin_type(StorageMode::Value, "Core.TestType2");
    b.link(true, false);
    b.add_constraint(&tt, &[], ConstraintKind::Trait, tr2.id());
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    load_type_ok(&loader, "Core", "Core.TestType1", vec![]);
    assert_eq!(
        load_type_err(&loader, "Core", "Core.TestType2", vec![]),
        LoadError::InvalidGenericArguments
    );
}

#[test]
fn constraint_export_resolves_subtype_member() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Core");

    // trait with a tolerated self subtype, exported as "a"
    let tr = b.begin_trait("Core.Trait");
    let self_ref = b.self_type();
    let subtype = b.make_subtype(&self_ref, "A", vec![]);
    let try_subtype = b.try_type(&subtype);
    b.add_constraint(&try_subtype, &[], ConstraintKind::Exist, 0);
    b.add_trait_type(&subtype, "a");
    b.end_trait();

    let vt = b.begin_type(StorageMode::Value, "Core.ValueType");
    b.link(true, false);
    b.end_type();

    let tt = b.begin_type(StorageMode::Value, "Core.TargetType");
    b.add_subtype("A", &vt);
    b.end_type();

    b.begin_type(StorageMode::Value, "Core.TestType");
    b.link(true, false);
    b.add_constraint_exported(&tt, &[], ConstraintKind::Trait, tr.id(), "subtype");
    let field = b.constraint_import("subtype/a");
    b.add_field(&field);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let vt = load_type_ok(&loader, "Core", "Core.ValueType", vec![]);
    let test = load_type_ok(&loader, "Core", "Core.TestType", vec![]);
    check_field_offsets(&test, &[0]);
    assert_eq!(test.fields[0].ty, vt.id);
}

#[test]
fn circular_trait_constraint_is_a_program_error() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");

    // trait whose own constraint restates itself on the same target
    let tr = b.forward_declare_trait();
    b.begin_trait_at("Test.Loop", &tr);
    let self_ref = b.self_type();
    b.add_constraint(&self_ref, &[], ConstraintKind::Trait, tr.id());
    b.end_trait();

    let target = b.begin_type(StorageMode::Value, "Test.Target");
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.UseLoop");
    b.link(true, false);
    b.add_constraint(&target, &[], ConstraintKind::Trait, tr.id());
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    assert_eq!(
        load_type_err(&loader, "Test", "Test.UseLoop", vec![]),
        LoadError::CircularConstraintCheck
    );
}

#[test]
fn trait_with_unresolvable_placeholder_fails() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let (t1, _t4) = setup_native_types(&mut b);

    // the trait requires nothing that could pin the placeholder down
    let tr = b.begin_trait("Test.Empty");
    b.add_generic_parameter();
    b.end_trait();

    let target = b.begin_type(StorageMode::Value, "Test.Target");
    b.add_field(&t1);
    b.end_type();

    b.begin_type(StorageMode::Value, "Test.UseEmpty");
    let any = b.any_type();
    b.add_constraint(&target, &[any], ConstraintKind::Trait, tr.id());
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_native_types(&loader);
    assert_eq!(
        load_type_err(&loader, "Test", "Test.UseEmpty", vec![]),
        LoadError::InvalidGenericArguments
    );
}
