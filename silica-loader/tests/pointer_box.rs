mod common;

use std::sync::Arc;

use common::*;
use silica_assembly::{AssemblyBuilder, StorageMode};
use silica_loader::{LoadError, Loader, StorageMode as Storage};

#[test]
fn pointer_type_loads_and_patches_element() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Core");
    write_core_common(&mut b);
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_core_natives(&loader);

    let int32 = load_type_ok(&loader, "Core", "Core.Int32", vec![]);
    assert!(int32.pointer_type().is_none());

    let ptr = loader.load_pointer_type(int32.id).expect("pointer type");
    assert_eq!(ptr.storage, Storage::Value);
    check_size(&ptr, PTR, PTR);
    assert!(loader.is_pointer_type(&ptr));
    assert!(!loader.is_pointer_type(&int32));

    // the element type now carries the back-reference
    let int32_again = loader.get_type_by_id(int32.id).unwrap();
    assert_eq!(int32_again.pointer_type(), Some(ptr.id));

    // and requesting again yields the very same entity
    let ptr_again = loader.load_pointer_type(int32.id).expect("pointer type");
    assert!(Arc::ptr_eq(&ptr, &ptr_again));

    let direct = load_type_ok(&loader, "Core", "Core.Pointer", vec![int32.id]);
    assert!(Arc::ptr_eq(&ptr, &direct));
}

#[test]
fn box_requires_value_argument_and_copies_interfaces() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Core");
    write_core_common(&mut b);

    // interface machinery: a vtable layout and an interface over it
    let vtab = b.begin_type(StorageMode::Global, "Core.DisplayVtab");
    let raw = b.import_type("Core", "Core.RawPtr", Some(0));
    b.add_field(&raw);
    b.end_type();

    let iface = b.begin_type(StorageMode::Interface, "Core.Display");
    b.set_vtable(&vtab);
    b.link(true, false);
    b.end_type();

    // a value type whose boxed form implements the interface
    b.begin_type(StorageMode::Value, "Core.Point");
    let int32 = b.import_type("Core", "Core.Int32", Some(0));
    b.add_field(&int32);
    b.add_interface(&iface, Some(&vtab));
    b.link(true, false);
    b.end_type();

    // a reference type, to exercise the box argument check
    b.begin_type(StorageMode::Reference, "Core.RefThing");
    b.link(true, false);
    b.end_type();

    b.begin_type(StorageMode::Reference, "Core.Box");
    let g = b.add_generic_parameter();
    b.add_field(&g);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_core_natives(&loader);

    let point = load_type_ok(&loader, "Core", "Core.Point", vec![]);
    // value types do not load their interface list themselves
    assert!(point.interfaces.is_empty());

    let boxed = load_type_ok(&loader, "Core", "Core.Box", vec![point.id]);
    assert_eq!(boxed.storage, Storage::Reference);
    assert_eq!(boxed.interfaces.len(), 1);
    let display = load_type_ok(&loader, "Core", "Core.Display", vec![]);
    assert_eq!(boxed.interfaces[0].ty, display.id);
    assert!(boxed.interfaces[0].vtable.is_some());
    // boxed layout holds the value inline
    assert_eq!(boxed.size, point.size);

    let r = load_type_ok(&loader, "Core", "Core.RefThing", vec![]);
    assert_eq!(
        load_type_err(&loader, "Core", "Core.Box", vec![r.id]),
        LoadError::program("Box type can only take value type as argument")
    );
}

#[test]
fn malformed_pointer_export_does_not_disable_detection() {
    init_logging();
    let mut b = AssemblyBuilder::new();
    b.begin_assembly("Core");

    // a decoy with the reserved name but the wrong shape (no parameters),
    // exported before the real declarations
    b.begin_type(StorageMode::Value, "Core.Pointer");
    b.link(true, false);
    b.end_type();

    write_core_common(&mut b);

    b.begin_type(StorageMode::Reference, "Core.Box");
    let g = b.add_generic_parameter();
    b.add_field(&g);
    b.link(true, false);
    b.end_type();
    b.end_assembly();

    let loader = Loader::new(b.build());
    register_core_natives(&loader);

    // the later well-formed export is picked up despite the decoy
    let int32 = load_type_ok(&loader, "Core", "Core.Int32", vec![]);
    let ptr = loader.load_pointer_type(int32.id).expect("pointer type");
    assert!(loader.is_pointer_type(&ptr));
    check_size(&ptr, PTR, PTR);

    // and box detection, which scans after the decoy, still works
    let boxed = load_type_ok(&loader, "Core", "Core.Box", vec![int32.id]);
    assert_eq!(boxed.storage, Storage::Reference);
    assert_eq!(boxed.size, int32.size);
}
