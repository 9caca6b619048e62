use serde::{Deserialize, Serialize};

use crate::refs::GenericDecl;

/// Storage mode of a type. Drives layout and which relations are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageMode {
    /// Laid out inline; fields contribute size and alignment directly.
    Value,
    /// Heap allocated, accessed through a pointer.
    Reference,
    /// A pointer plus an interface-table offset. No fields.
    Interface,
    /// Inline singleton storage (vtables, statics). No base, no interfaces.
    Global,
}

/// A named member of a type template. The meaning of `id` depends on the
/// table: field index for `public_fields`, function-reference index for
/// `public_functions`, type-reference index for `public_subtypes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedMember {
    pub name: String,
    pub id: usize,
}

/// An interface declared on a type template: the interface type reference
/// and the vtable type reference implementing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub ty: usize,
    pub vtable: Option<usize>,
}

/// An uninstantiated type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTemplate {
    pub generic: GenericDecl,
    pub storage: StorageMode,
    /// Type-reference indices, in field order.
    pub fields: Vec<usize>,
    pub base: Option<usize>,
    pub vtable: Option<usize>,
    pub interfaces: Vec<InterfaceDecl>,
    /// Function-reference indices.
    pub initializer: Option<usize>,
    pub finalizer: Option<usize>,
    pub public_fields: Vec<NamedMember>,
    pub public_functions: Vec<NamedMember>,
    pub public_subtypes: Vec<NamedMember>,
}

impl TypeTemplate {
    pub fn new(storage: StorageMode) -> Self {
        TypeTemplate {
            generic: GenericDecl::default(),
            storage,
            fields: Vec::new(),
            base: None,
            vtable: None,
            interfaces: Vec::new(),
            initializer: None,
            finalizer: None,
            public_fields: Vec::new(),
            public_functions: Vec::new(),
            public_subtypes: Vec::new(),
        }
    }
}

impl Default for TypeTemplate {
    fn default() -> Self {
        TypeTemplate::new(StorageMode::Value)
    }
}

/// One entry of a function's constant table. `length == 0` marks an import:
/// `offset` is then an index into the generic declaration's constant
/// imports, rewritten by the loader to a resolved inline value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantEntry {
    pub offset: usize,
    pub length: usize,
    pub type_ref: usize,
}

/// An uninstantiated function declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionTemplate {
    pub generic: GenericDecl,
    /// Type-reference index; `Empty` means no return value.
    pub return_type: Option<usize>,
    /// Type-reference indices.
    pub parameters: Vec<usize>,
    pub instructions: Vec<u8>,
    pub constant_data: Vec<u8>,
    pub constant_table: Vec<ConstantEntry>,
    /// Type-reference indices of local variable slots.
    pub locals: Vec<usize>,
}

impl FunctionTemplate {
    /// True when the template carries no executable payload at all, which
    /// is what native-function bindings require.
    pub fn has_code(&self) -> bool {
        !self.instructions.is_empty()
            || !self.constant_data.is_empty()
            || !self.constant_table.is_empty()
    }
}

/// A field required by a trait: the target must expose a public field of
/// this name whose type matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitField {
    pub name: String,
    pub type_ref: usize,
    pub export_name: String,
}

/// A function required by a trait: the target must expose at least one
/// public function overload of this name with a matching signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitFunction {
    pub name: String,
    pub return_type: Option<usize>,
    pub parameters: Vec<usize>,
    pub export_name: String,
}

/// A type alias exported by a trait, addressable through the constraint's
/// export name once the trait check succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitTypeExport {
    pub type_ref: usize,
    pub export_name: String,
}

/// A structural trait declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitTemplate {
    pub generic: GenericDecl,
    pub fields: Vec<TraitField>,
    pub functions: Vec<TraitFunction>,
    pub types: Vec<TraitTypeExport>,
}

/// An import table entry: target assembly, export name and, when known,
/// the expected generic arity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub assembly: String,
    pub name: String,
    pub arity: Option<usize>,
}

/// An export table entry. An `internal_id` at or past the end of the
/// corresponding template table designates the import entry
/// `internal_id - templates.len()` instead (transparent re-export).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub name: String,
    pub internal_id: usize,
}

/// A namespace of templates with its import and export tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub name: String,
    pub types: Vec<TypeTemplate>,
    pub functions: Vec<FunctionTemplate>,
    pub traits: Vec<TraitTemplate>,
    pub constants: Vec<u32>,
    pub import_types: Vec<ImportEntry>,
    pub import_functions: Vec<ImportEntry>,
    pub import_constants: Vec<ImportEntry>,
    pub import_traits: Vec<ImportEntry>,
    pub export_types: Vec<ExportEntry>,
    pub export_functions: Vec<ExportEntry>,
    pub export_constants: Vec<ExportEntry>,
    pub export_traits: Vec<ExportEntry>,
    /// Templates whose layout (types) or implementation (functions) is
    /// supplied by the host, addressed by name.
    pub native_types: Vec<ExportEntry>,
    pub native_functions: Vec<ExportEntry>,
}

impl Assembly {
    pub fn named(name: impl Into<String>) -> Self {
        Assembly {
            name: name.into(),
            ..Assembly::default()
        }
    }
}

/// The host-supplied input to a loader: every assembly it may draw
/// templates from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyList {
    pub assemblies: Vec<Assembly>,
}
