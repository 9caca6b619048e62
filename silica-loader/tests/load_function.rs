mod common;

use std::sync::Arc;

use common::*;
use silica_assembly::{AssemblyBuilder, StorageMode, TypeRef};
use silica_loader::{LoadError, Loader, NativeFunction, RuntimeFunction};

fn check_function_basic(loader: &Loader, f: &Arc<RuntimeFunction>) {
    let again = loader.get_function_by_id(f.id).unwrap();
    assert!(Arc::ptr_eq(f, &again));
}

fn check_signature(loader: &Loader, f: &RuntimeFunction, ret_size: usize, param_sizes: &[usize]) {
    match f.return_type {
        None => assert_eq!(ret_size, 0),
        Some(r) => {
            let t = loader.get_type_by_id(r).unwrap();
            assert_eq!(t.storage_size(PTR), ret_size);
        }
    }
    assert_eq!(f.parameters.len(), param_sizes.len());
    for (&p, &size) in f.parameters.iter().zip(param_sizes.iter()) {
        let t = loader.get_type_by_id(p).unwrap();
        assert_eq!(t.storage_size(PTR), size);
    }
}

#[test]
fn load_empty_function() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    b.begin_function("Test.EmptyFunc");
    b.link(true, false);
    b.signature(&TypeRef::Empty, &[]);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let f = load_function_ok(&loader, "Test", "Test.EmptyFunc", vec![]);
    check_function_basic(&loader, &f);
    check_signature(&loader, &f, 0, &[]);
    assert!(f.code.is_none());
}

#[test]
fn load_simple_function_signature() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let t = b.begin_type(StorageMode::Value, "Test.Native4");
    b.link(false, true);
    b.end_type();

    b.begin_function("Test.TestFunc1");
    b.link(true, false);
    b.signature(&t, &[t.clone(), t.clone()]);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    load_native_type(&loader, "Test", "Test.Native4", 4);

    let f = load_function_ok(&loader, "Test", "Test.TestFunc1", vec![]);
    check_function_basic(&loader, &f);
    check_signature(&loader, &f, 4, &[4, 4]);
}

#[test]
fn function_wires_finalizer_through_referenced_type() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let t1 = b.forward_declare_type();
    let f1 = b.begin_function("Test.TestFunc1");
    b.signature(&TypeRef::Empty, &[t1.clone()]);
    b.end_function();

    b.begin_type_at(StorageMode::Reference, "Test.TestType1", &t1);
    b.set_finalizer(&f1);
    b.end_type();

    b.begin_function("Test.TestFunc2");
    b.link(true, false);
    b.signature(&t1, &[]);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let f2 = load_function_ok(&loader, "Test", "Test.TestFunc2", vec![]);
    let t1 = loader.get_type_by_id(f2.return_type.unwrap()).unwrap();
    let f1 = loader.get_function_by_id(t1.finalizer.unwrap()).unwrap();

    check_function_basic(&loader, &f1);
    check_signature(&loader, &f1, 0, &[PTR]);
    assert_eq!(f1.parameters[0], t1.id);

    check_function_basic(&loader, &f2);
    check_signature(&loader, &f2, PTR, &[]);
}

#[test]
fn cyclic_function_references_terminate() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let f2 = b.forward_declare_function();
    let f1 = b.begin_function("Test.TestFunc1");
    b.signature(&TypeRef::Empty, &[]);
    let f1_ref_slot = b.add_function_ref(&f2);
    b.end_function();

    b.begin_function_at("Test.TestFunc2", &f2);
    b.link(true, false);
    b.signature(&TypeRef::Empty, &[]);
    let f2_ref_slot = b.add_function_ref(&f1);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let f2 = load_function_ok(&loader, "Test", "Test.TestFunc2", vec![]);
    let f1_id = f2.referenced_functions[f2_ref_slot].unwrap();
    let f1 = loader.get_function_by_id(f1_id).unwrap();

    check_signature(&loader, &f1, 0, &[]);
    assert_eq!(f1.referenced_functions[f1_ref_slot], Some(f2.id));
}

#[test]
fn function_code_is_shared_and_imports_are_rewritten() {
    init_logging();
    let mut b = AssemblyBuilder::new();

    b.begin_assembly("Lib");
    b.export_constant("Answer", 42);
    b.end_assembly();

    b.begin_assembly("Test");
    b.begin_type(StorageMode::Value, "Test.Native1");
    b.link(false, true);
    b.end_type();
    let t4 = b.begin_type(StorageMode::Value, "Test.Native4");
    b.link(false, true);
    b.end_type();
    let answer = b.import_constant("Lib", "Answer");

    b.begin_function("Test.GenericFunc");
    let g = b.add_generic_parameter();
    b.link(true, false);
    b.signature(&TypeRef::Empty, &[g]);
    b.add_code(&[1, 2, 3, 4]);
    let inline_const = b.add_function_constant(&t4, &7u32.to_le_bytes());
    let import_const = b.add_function_import_constant(&t4, answer);
    b.add_function_local(&t4);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let n1 = load_native_type(&loader, "Test", "Test.Native1", 1);
    let n4 = load_native_type(&loader, "Test", "Test.Native4", 4);

    let fa = load_function_ok(&loader, "Test", "Test.GenericFunc", vec![n4.id]);
    let code = fa.code.as_ref().expect("code expected");
    assert_eq!(code.instructions, vec![1, 2, 3, 4]);
    assert_eq!(code.locals.len(), 1);

    let inline = code.constant_table[inline_const];
    assert_eq!(inline.length, 4);
    assert_eq!(&code.constant_data[inline.offset..inline.offset + 4], &7u32.to_le_bytes());

    let imported = code.constant_table[import_const];
    assert_eq!(imported.length, 4);
    assert_eq!(
        &code.constant_data[imported.offset..imported.offset + 4],
        &42u32.to_le_bytes()
    );

    // a different instantiation shares the same code object
    let fb = load_function_ok(&loader, "Test", "Test.GenericFunc", vec![n1.id]);
    assert!(!Arc::ptr_eq(&fa, &fb));
    assert!(Arc::ptr_eq(
        fa.code.as_ref().unwrap(),
        fb.code.as_ref().unwrap()
    ));
}

#[test]
fn constant_references_resolve_per_instantiation() {
    init_logging();
    let mut b = AssemblyBuilder::new();

    b.begin_assembly("Lib");
    b.export_constant("Flag", 9);
    b.end_assembly();

    b.begin_assembly("Test");
    let flag = b.import_constant("Lib", "Flag");
    b.begin_function("Test.Reader");
    b.link(true, false);
    b.signature(&TypeRef::Empty, &[]);
    b.add_constant_ref(flag);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let f = load_function_ok(&loader, "Test", "Test.Reader", vec![]);
    assert_eq!(f.referenced_constants, vec![9]);
}

#[test]
fn native_function_binding() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Test");
    let t4 = b.begin_type(StorageMode::Value, "Test.Native4");
    b.link(false, true);
    b.end_type();

    b.begin_function("Test.NativeAdd");
    b.link(true, true);
    b.signature(&t4, &[t4.clone(), t4.clone()]);
    b.end_function();

    b.begin_function("Test.HasCode");
    b.link(true, true);
    b.signature(&TypeRef::Empty, &[]);
    b.add_code(&[0]);
    b.end_function();
    b.end_assembly();

    let loader = Loader::new(b.build());
    let n4 = load_native_type(&loader, "Test", "Test.Native4", 4);

    let handler: NativeFunction = Arc::new(|_ctx| Ok(()));
    loader
        .add_native_function("Test", "Test.NativeAdd", Arc::clone(&handler))
        .expect("binding should register");

    // code-carrying templates cannot be native
    let err = loader
        .add_native_function("Test", "Test.HasCode", Arc::clone(&handler))
        .unwrap_err();
    assert_eq!(err, LoadError::program("Invalid native function"));

    let f = loader
        .add_native_function_checked(
            "Test",
            "Test.NativeAdd",
            handler,
            Some(n4.id),
            &[n4.id, n4.id],
        )
        .expect("signature should match");
    assert!(f.code.is_none());
    assert!(loader.native_function(&f).is_some());

    let mut ctx = ();
    let bound = loader.native_function(&f).unwrap();
    assert!(bound(&mut ctx).is_ok());
}
