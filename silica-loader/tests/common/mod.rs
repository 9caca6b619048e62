//! Shared helpers for the loader integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use silica_assembly::{AssemblyBuilder, StorageMode, TypeRef};
use silica_loader::{
    LoadError, Loader, LoadingArguments, RuntimeFunction, RuntimeType, TypeId,
};

pub const PTR: usize = std::mem::size_of::<usize>();

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn type_args(
    loader: &Loader,
    assembly: &str,
    name: &str,
    args: Vec<TypeId>,
) -> LoadingArguments {
    let mut la = loader
        .find_export_type(assembly, name, None)
        .unwrap_or_else(|| panic!("type export {name} not found"));
    la.arguments = args;
    la
}

pub fn load_type(
    loader: &Loader,
    assembly: &str,
    name: &str,
    args: Vec<TypeId>,
) -> Result<Arc<RuntimeType>, LoadError> {
    loader.get_type(&type_args(loader, assembly, name, args))
}

pub fn load_type_ok(
    loader: &Loader,
    assembly: &str,
    name: &str,
    args: Vec<TypeId>,
) -> Arc<RuntimeType> {
    load_type(loader, assembly, name, args)
        .unwrap_or_else(|e| panic!("loading {name} failed: {e}"))
}

pub fn load_type_err(
    loader: &Loader,
    assembly: &str,
    name: &str,
    args: Vec<TypeId>,
) -> LoadError {
    match load_type(loader, assembly, name, args) {
        Ok(t) => panic!("loading {name} unexpectedly succeeded as {}", t.id),
        Err(e) => e,
    }
}

pub fn load_function(
    loader: &Loader,
    assembly: &str,
    name: &str,
    args: Vec<TypeId>,
) -> Result<Arc<RuntimeFunction>, LoadError> {
    let mut la = loader
        .find_export_function(assembly, name, None)
        .unwrap_or_else(|| panic!("function export {name} not found"));
    la.arguments = args;
    loader.get_function(&la)
}

pub fn load_function_ok(
    loader: &Loader,
    assembly: &str,
    name: &str,
    args: Vec<TypeId>,
) -> Arc<RuntimeFunction> {
    load_function(loader, assembly, name, args)
        .unwrap_or_else(|e| panic!("loading {name} failed: {e}"))
}

pub fn load_native_type(
    loader: &Loader,
    assembly: &str,
    name: &str,
    size: usize,
) -> Arc<RuntimeType> {
    loader
        .add_native_type(assembly, name, size, size)
        .unwrap_or_else(|e| panic!("native type {name} failed: {e}"))
}

pub fn check_type_basic(loader: &Loader, t: &Arc<RuntimeType>, storage: StorageMode) {
    assert_eq!(t.storage, storage);
    let again = loader
        .get_type_by_id(t.id)
        .unwrap_or_else(|| panic!("{} not found by id", t.id));
    assert!(Arc::ptr_eq(t, &again));
}

pub fn check_size(t: &RuntimeType, size: usize, alignment: usize) {
    assert_eq!(t.size, size, "size of {}", t.args);
    assert_eq!(t.alignment, alignment, "alignment of {}", t.args);
}

pub fn check_field_offsets(t: &RuntimeType, offsets: &[usize]) {
    let actual: Vec<usize> = t.fields.iter().map(|f| f.offset).collect();
    assert_eq!(actual, offsets, "field offsets of {}", t.args);
}

/// Declares the two host-sized native value types most tests build on.
pub fn setup_native_types(b: &mut AssemblyBuilder) -> (TypeRef, TypeRef) {
    let t1 = b.begin_type(StorageMode::Value, "Test.Native1");
    b.link(true, true);
    b.end_type();
    let t4 = b.begin_type(StorageMode::Value, "Test.Native4");
    b.link(true, true);
    b.end_type();
    (t1, t4)
}

pub fn register_native_types(loader: &Loader) {
    load_native_type(loader, "Test", "Test.Native1", 1);
    load_native_type(loader, "Test", "Test.Native4", 4);
}

/// Declares the Core assembly pieces the pointer/box machinery needs:
/// `Core.Int32`, `Core.RawPtr` and the generic `Core.Pointer`.
pub fn write_core_common(b: &mut AssemblyBuilder) -> (TypeRef, TypeRef, TypeRef) {
    let int32 = b.begin_type(StorageMode::Value, "Core.Int32");
    b.link(true, true);
    b.end_type();

    let raw_ptr = b.begin_type(StorageMode::Value, "Core.RawPtr");
    b.link(true, true);
    b.end_type();

    let pointer = b.begin_type(StorageMode::Value, "Core.Pointer");
    b.add_generic_parameter();
    b.link(true, false);
    b.add_field(&raw_ptr);
    b.end_type();

    (int32, raw_ptr, pointer)
}

pub fn register_core_natives(loader: &Loader) {
    load_native_type(loader, "Core", "Core.Int32", 4);
    load_native_type(loader, "Core", "Core.RawPtr", PTR);
}
