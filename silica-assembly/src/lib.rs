//! Assembly data model for the Silica runtime.
//!
//! An assembly is a namespace of generic templates — types, functions and
//! traits — together with import/export tables and a constant pool. Every
//! symbolic reference inside a template is an index into a flat reference
//! list ([`refs::RefList`]); the loader interprets those lists under a
//! concrete argument environment.
//!
//! Assemblies are constructed programmatically through
//! [`builder::AssemblyBuilder`]; a serialized format is a host concern.

pub mod builder;
pub mod model;
pub mod refs;

pub use builder::{AssemblyBuilder, FuncRef, TraitRef, TypeRef};
pub use model::{
    Assembly, AssemblyList, ConstantEntry, ExportEntry, FunctionTemplate, ImportEntry,
    InterfaceDecl, NamedMember, StorageMode, TraitField, TraitFunction, TraitTemplate,
    TraitTypeExport, TypeTemplate,
};
pub use refs::{ConstraintKind, GenericConstraint, GenericDecl, RefEntry, RefKind, RefList};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_list_round_trips_through_json() {
        let mut b = AssemblyBuilder::new();
        b.begin_assembly("Core");
        let t = b.begin_type(StorageMode::Value, "Core.Int32");
        b.link(true, true);
        b.end_type();
        b.begin_type(StorageMode::Reference, "Core.List");
        let g = b.add_generic_parameter();
        b.add_field(&g);
        b.add_field(&t);
        b.link(true, false);
        b.end_type();
        b.end_assembly();
        let list = b.build();

        let text = serde_json::to_string(&list).unwrap();
        let back: AssemblyList = serde_json::from_str(&text).unwrap();
        assert_eq!(list, back);
    }
}
