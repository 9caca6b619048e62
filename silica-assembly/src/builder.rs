//! Programmatic assembly construction.
//!
//! Assemblies have no text syntax at this layer; hosts and tests assemble
//! template tables through [`AssemblyBuilder`], which takes care of the
//! flat reference-list encoding (continuation markers, name tables,
//! force-load marking).

use crate::model::{
    Assembly, AssemblyList, ConstantEntry, ExportEntry, ImportEntry, InterfaceDecl, NamedMember,
    StorageMode, TraitField, TraitFunction, TraitTemplate, TraitTypeExport, TypeTemplate,
};
use crate::refs::{GenericConstraint, ConstraintKind, GenericDecl, RefEntry, RefKind, RefList};

/// A symbolic type reference handed around while building an assembly.
/// Invalidated by `end_assembly`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Empty,
    /// Generic argument `index` of segment `segment` (0 = own parameters,
    /// 1 = appended arguments).
    Argument { index: usize, segment: usize },
    /// Template `index` of the assembly under construction.
    Template(usize),
    /// Entry `index` of the type import table.
    Imported(usize),
    /// An instantiation of a `Template` or `Imported` base.
    Instance {
        base: Box<TypeRef>,
        arguments: Vec<TypeRef>,
    },
    SelfType,
    /// Named subtype navigation through `parent`.
    Subtype {
        parent: Box<TypeRef>,
        name: String,
        arguments: Vec<TypeRef>,
    },
    /// Undetermined placeholder (constraint expressions only).
    Any,
    /// Failure-tolerant wrapper (constraint expressions only).
    Try(Box<TypeRef>),
    /// A name exported by a constraint of the surrounding declaration.
    ConstraintImport(String),
}

/// A symbolic function reference. Invalidated by `end_assembly`.
#[derive(Debug, Clone, PartialEq)]
pub enum FuncRef {
    Empty,
    Template(usize),
    Imported(usize),
    Instance {
        base: Box<FuncRef>,
        arguments: Vec<TypeRef>,
    },
}

/// A symbolic trait reference. Invalidated by `end_assembly`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraitRef {
    Template(usize),
    Imported(usize),
}

impl TraitRef {
    pub fn id(&self) -> usize {
        match *self {
            TraitRef::Template(id) | TraitRef::Imported(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Current {
    None,
    Type(usize),
    Function(usize),
    Trait(usize),
}

/// Builds an [`AssemblyList`] one assembly at a time.
#[derive(Debug)]
pub struct AssemblyBuilder {
    assemblies: Vec<Assembly>,
    assembly: Assembly,
    current: Current,
    current_name: String,
}

impl AssemblyBuilder {
    pub fn new() -> Self {
        AssemblyBuilder {
            assemblies: Vec::new(),
            assembly: Assembly::default(),
            current: Current::None,
            current_name: String::new(),
        }
    }

    pub fn begin_assembly(&mut self, name: impl Into<String>) {
        self.assembly = Assembly::named(name);
        self.current = Current::None;
        self.current_name.clear();
    }

    pub fn end_assembly(&mut self) {
        let done = std::mem::take(&mut self.assembly);
        self.assemblies.push(done);
        self.current = Current::None;
    }

    pub fn build(self) -> AssemblyList {
        AssemblyList {
            assemblies: self.assemblies,
        }
    }

    // ----- constants -----

    pub fn export_constant(&mut self, name: impl Into<String>, value: u32) {
        let id = self.assembly.constants.len();
        self.assembly.constants.push(value);
        self.assembly.export_constants.push(ExportEntry {
            name: name.into(),
            internal_id: id,
        });
    }

    pub fn import_constant(&mut self, assembly: impl Into<String>, name: impl Into<String>) -> usize {
        self.assembly.import_constants.push(ImportEntry {
            assembly: assembly.into(),
            name: name.into(),
            arity: Some(0),
        });
        self.assembly.import_constants.len() - 1
    }

    // ----- types -----

    pub fn forward_declare_type(&mut self) -> TypeRef {
        self.assembly.types.push(TypeTemplate::default());
        TypeRef::Template(self.assembly.types.len() - 1)
    }

    pub fn import_type(
        &mut self,
        assembly: impl Into<String>,
        name: impl Into<String>,
        arity: Option<usize>,
    ) -> TypeRef {
        self.assembly.import_types.push(ImportEntry {
            assembly: assembly.into(),
            name: name.into(),
            arity,
        });
        TypeRef::Imported(self.assembly.import_types.len() - 1)
    }

    pub fn export_type(&mut self, name: impl Into<String>, internal_id: usize) {
        self.assembly.export_types.push(ExportEntry {
            name: name.into(),
            internal_id,
        });
    }

    pub fn begin_type(&mut self, storage: StorageMode, name: impl Into<String>) -> TypeRef {
        let r = self.forward_declare_type();
        self.begin_type_at(storage, name, &r);
        r
    }

    /// Starts the body of a previously forward-declared type.
    pub fn begin_type_at(&mut self, storage: StorageMode, name: impl Into<String>, r: &TypeRef) {
        let TypeRef::Template(id) = *r else {
            panic!("begin_type_at requires a template reference");
        };
        self.assembly.types[id].storage = storage;
        self.current = Current::Type(id);
        self.current_name = name.into();
    }

    pub fn end_type(&mut self) {
        debug_assert!(matches!(self.current, Current::Type(_)));
        self.current = Current::None;
        self.current_name.clear();
    }

    /// Records the current item in the export and/or native tables.
    pub fn link(&mut self, export: bool, native: bool) {
        let name = self.current_name.clone();
        match self.current {
            Current::Type(id) => {
                if export {
                    self.assembly.export_types.push(ExportEntry {
                        name: name.clone(),
                        internal_id: id,
                    });
                }
                if native {
                    self.assembly.native_types.push(ExportEntry {
                        name,
                        internal_id: id,
                    });
                }
            }
            Current::Function(id) => {
                if export {
                    self.assembly.export_functions.push(ExportEntry {
                        name: name.clone(),
                        internal_id: id,
                    });
                }
                if native {
                    self.assembly.native_functions.push(ExportEntry {
                        name,
                        internal_id: id,
                    });
                }
            }
            Current::Trait(id) => {
                debug_assert!(!native);
                if export {
                    self.assembly.export_traits.push(ExportEntry {
                        name,
                        internal_id: id,
                    });
                }
            }
            Current::None => panic!("link called outside of an item"),
        }
    }

    pub fn add_field(&mut self, ty: &TypeRef) {
        self.add_field_named(ty, "");
    }

    pub fn add_field_named(&mut self, ty: &TypeRef, name: &str) {
        let id = self.current_type_id();
        let type_id = write_type_ref(&mut self.assembly.types[id].generic.types, ty, true);
        let field_id = self.assembly.types[id].fields.len();
        self.assembly.types[id].fields.push(type_id);
        if !name.is_empty() {
            self.assembly.types[id].public_fields.push(NamedMember {
                name: name.to_string(),
                id: field_id,
            });
        }
    }

    pub fn add_subtype(&mut self, name: impl Into<String>, ty: &TypeRef) {
        let id = self.current_type_id();
        let ref_id = write_type_ref(&mut self.assembly.types[id].generic.types, ty, false);
        self.assembly.types[id].public_subtypes.push(NamedMember {
            name: name.into(),
            id: ref_id,
        });
    }

    pub fn add_member_function(&mut self, name: impl Into<String>, func: &FuncRef) {
        let id = self.current_type_id();
        let ref_id = write_function_ref(&mut self.assembly.types[id].generic, func, false);
        self.assembly.types[id].public_functions.push(NamedMember {
            name: name.into(),
            id: ref_id,
        });
    }

    pub fn set_initializer(&mut self, func: &FuncRef) {
        let id = self.current_type_id();
        let ref_id = write_function_ref(&mut self.assembly.types[id].generic, func, true);
        self.assembly.types[id].initializer = Some(ref_id);
    }

    pub fn set_finalizer(&mut self, func: &FuncRef) {
        let id = self.current_type_id();
        let ref_id = write_function_ref(&mut self.assembly.types[id].generic, func, true);
        self.assembly.types[id].finalizer = Some(ref_id);
    }

    pub fn set_base(&mut self, base: &TypeRef) {
        let id = self.current_type_id();
        let ref_id = write_type_ref(&mut self.assembly.types[id].generic.types, base, true);
        self.assembly.types[id].base = Some(ref_id);
    }

    pub fn set_vtable(&mut self, vtable: &TypeRef) {
        let id = self.current_type_id();
        let ref_id = write_type_ref(&mut self.assembly.types[id].generic.types, vtable, true);
        self.assembly.types[id].vtable = Some(ref_id);
    }

    pub fn add_interface(&mut self, ty: &TypeRef, vtable: Option<&TypeRef>) {
        let id = self.current_type_id();
        let ty_id = write_type_ref(&mut self.assembly.types[id].generic.types, ty, true);
        let vtable_id = vtable
            .map(|v| write_type_ref(&mut self.assembly.types[id].generic.types, v, true));
        self.assembly.types[id].interfaces.push(InterfaceDecl {
            ty: ty_id,
            vtable: vtable_id,
        });
    }

    // ----- generic surface -----

    pub fn add_generic_parameter(&mut self) -> TypeRef {
        let decl = self.current_decl();
        let index = decl.param_count;
        decl.param_count += 1;
        TypeRef::Argument { index, segment: 0 }
    }

    /// A generic argument beyond the declaration's own parameters, supplied
    /// by subtype navigation or trait overload probing.
    pub fn add_additional_generic_parameter(&mut self, index: usize) -> TypeRef {
        TypeRef::Argument { index, segment: 1 }
    }

    pub fn add_constraint(
        &mut self,
        target: &TypeRef,
        arguments: &[TypeRef],
        kind: ConstraintKind,
        index: usize,
    ) {
        self.add_constraint_exported(target, arguments, kind, index, "");
    }

    pub fn add_constraint_exported(
        &mut self,
        target: &TypeRef,
        arguments: &[TypeRef],
        kind: ConstraintKind,
        index: usize,
        export_name: &str,
    ) {
        let mut constraint = GenericConstraint {
            kind,
            index,
            target: 0,
            arguments: Vec::new(),
            type_refs: RefList::default(),
            export_name: export_name.to_string(),
        };
        constraint.target = write_type_ref(&mut constraint.type_refs, target, false);
        for arg in arguments {
            let id = write_type_ref(&mut constraint.type_refs, arg, false);
            constraint.arguments.push(id);
        }
        self.current_decl().constraints.push(constraint);
    }

    /// Adds a forced entry to the current declaration's type list and
    /// returns its index.
    pub fn add_type_ref(&mut self, ty: &TypeRef) -> usize {
        write_type_ref(&mut self.current_decl().types, ty, true)
    }

    /// Adds a forced entry to the current declaration's function list and
    /// returns its index.
    pub fn add_function_ref(&mut self, func: &FuncRef) -> usize {
        write_function_ref(self.current_decl(), func, true)
    }

    // ----- reference combinators -----

    pub fn make_type(&self, base: &TypeRef, arguments: Vec<TypeRef>) -> TypeRef {
        match base {
            TypeRef::Template(_) | TypeRef::Imported(_) => TypeRef::Instance {
                base: Box::new(base.clone()),
                arguments,
            },
            _ => panic!("make_type requires a template or import reference"),
        }
    }

    pub fn make_subtype(
        &self,
        parent: &TypeRef,
        name: impl Into<String>,
        arguments: Vec<TypeRef>,
    ) -> TypeRef {
        TypeRef::Subtype {
            parent: Box::new(parent.clone()),
            name: name.into(),
            arguments,
        }
    }

    pub fn make_function(&self, base: &FuncRef, arguments: Vec<TypeRef>) -> FuncRef {
        match base {
            FuncRef::Template(_) | FuncRef::Imported(_) => FuncRef::Instance {
                base: Box::new(base.clone()),
                arguments,
            },
            _ => panic!("make_function requires a template or import reference"),
        }
    }

    pub fn self_type(&self) -> TypeRef {
        TypeRef::SelfType
    }

    pub fn any_type(&self) -> TypeRef {
        TypeRef::Any
    }

    pub fn try_type(&self, inner: &TypeRef) -> TypeRef {
        TypeRef::Try(Box::new(inner.clone()))
    }

    pub fn constraint_import(&self, name: impl Into<String>) -> TypeRef {
        TypeRef::ConstraintImport(name.into())
    }

    // ----- functions -----

    pub fn forward_declare_function(&mut self) -> FuncRef {
        self.assembly.functions.push(Default::default());
        FuncRef::Template(self.assembly.functions.len() - 1)
    }

    pub fn import_function(
        &mut self,
        assembly: impl Into<String>,
        name: impl Into<String>,
        arity: Option<usize>,
    ) -> FuncRef {
        self.assembly.import_functions.push(ImportEntry {
            assembly: assembly.into(),
            name: name.into(),
            arity,
        });
        FuncRef::Imported(self.assembly.import_functions.len() - 1)
    }

    pub fn export_function(&mut self, name: impl Into<String>, internal_id: usize) {
        self.assembly.export_functions.push(ExportEntry {
            name: name.into(),
            internal_id,
        });
    }

    pub fn begin_function(&mut self, name: impl Into<String>) -> FuncRef {
        let r = self.forward_declare_function();
        self.begin_function_at(name, &r);
        r
    }

    pub fn begin_function_at(&mut self, name: impl Into<String>, r: &FuncRef) {
        let FuncRef::Template(id) = *r else {
            panic!("begin_function_at requires a template reference");
        };
        self.current = Current::Function(id);
        self.current_name = name.into();
    }

    pub fn end_function(&mut self) {
        debug_assert!(matches!(self.current, Current::Function(_)));
        self.current = Current::None;
        self.current_name.clear();
    }

    /// Sets the return and parameter types. `TypeRef::Empty` as return
    /// means no return value.
    pub fn signature(&mut self, ret: &TypeRef, params: &[TypeRef]) {
        let id = self.current_function_id();
        let f = &mut self.assembly.functions[id];
        f.return_type = match ret {
            TypeRef::Empty => None,
            other => Some(write_type_ref(&mut f.generic.types, other, true)),
        };
        f.parameters.clear();
        for p in params {
            let type_id = write_type_ref(&mut f.generic.types, p, true);
            f.parameters.push(type_id);
        }
    }

    /// Appends raw instruction bytes to the current function.
    pub fn add_code(&mut self, bytes: &[u8]) {
        let id = self.current_function_id();
        self.assembly.functions[id].instructions.extend_from_slice(bytes);
    }

    pub fn add_function_constant(&mut self, ty: &TypeRef, value: &[u8]) -> usize {
        let id = self.current_function_id();
        let f = &mut self.assembly.functions[id];
        let type_ref = write_type_ref(&mut f.generic.types, ty, true);
        let offset = f.constant_data.len();
        f.constant_data.extend_from_slice(value);
        f.constant_table.push(ConstantEntry {
            offset,
            length: value.len(),
            type_ref,
        });
        f.constant_table.len() - 1
    }

    /// References a previously imported constant; the loader rewrites the
    /// entry to an inline value during code preparation.
    pub fn add_function_import_constant(&mut self, ty: &TypeRef, import_id: usize) -> usize {
        let id = self.current_function_id();
        let f = &mut self.assembly.functions[id];
        let type_ref = write_type_ref(&mut f.generic.types, ty, true);
        f.constant_table.push(ConstantEntry {
            offset: import_id,
            length: 0,
            type_ref,
        });
        f.constant_table.len() - 1
    }

    /// Records an import-constant reference on the current declaration;
    /// the loader resolves it per instantiation.
    pub fn add_constant_ref(&mut self, import_id: usize) -> usize {
        let constants = &mut self.current_decl().constants;
        constants.push(import_id);
        constants.len() - 1
    }

    pub fn add_function_local(&mut self, ty: &TypeRef) -> usize {
        let id = self.current_function_id();
        let f = &mut self.assembly.functions[id];
        let type_ref = write_type_ref(&mut f.generic.types, ty, true);
        f.locals.push(type_ref);
        f.locals.len() - 1
    }

    // ----- traits -----

    pub fn forward_declare_trait(&mut self) -> TraitRef {
        self.assembly.traits.push(TraitTemplate::default());
        TraitRef::Template(self.assembly.traits.len() - 1)
    }

    pub fn import_trait(
        &mut self,
        assembly: impl Into<String>,
        name: impl Into<String>,
        arity: Option<usize>,
    ) -> TraitRef {
        self.assembly.import_traits.push(ImportEntry {
            assembly: assembly.into(),
            name: name.into(),
            arity,
        });
        TraitRef::Imported(self.assembly.import_traits.len() - 1)
    }

    pub fn export_trait(&mut self, name: impl Into<String>, internal_id: usize) {
        self.assembly.export_traits.push(ExportEntry {
            name: name.into(),
            internal_id,
        });
    }

    pub fn begin_trait(&mut self, name: impl Into<String>) -> TraitRef {
        let r = self.forward_declare_trait();
        self.begin_trait_at(name, &r);
        r
    }

    /// Starts the body of a previously forward-declared trait.
    pub fn begin_trait_at(&mut self, name: impl Into<String>, r: &TraitRef) {
        let TraitRef::Template(id) = *r else {
            panic!("begin_trait_at requires a template reference");
        };
        self.current = Current::Trait(id);
        self.current_name = name.into();
    }

    pub fn end_trait(&mut self) {
        debug_assert!(matches!(self.current, Current::Trait(_)));
        self.current = Current::None;
        self.current_name.clear();
    }

    pub fn add_trait_type(&mut self, ty: &TypeRef, export_name: impl Into<String>) {
        let id = self.current_trait_id();
        let t = &mut self.assembly.traits[id];
        let type_ref = write_type_ref(&mut t.generic.types, ty, true);
        t.types.push(TraitTypeExport {
            type_ref,
            export_name: export_name.into(),
        });
    }

    pub fn add_trait_field(
        &mut self,
        ty: &TypeRef,
        name: impl Into<String>,
        export_name: impl Into<String>,
    ) {
        let id = self.current_trait_id();
        let t = &mut self.assembly.traits[id];
        let type_ref = write_type_ref(&mut t.generic.types, ty, true);
        t.fields.push(TraitField {
            name: name.into(),
            type_ref,
            export_name: export_name.into(),
        });
    }

    pub fn add_trait_function(
        &mut self,
        ret: &TypeRef,
        params: &[TypeRef],
        name: impl Into<String>,
        export_name: impl Into<String>,
    ) {
        let id = self.current_trait_id();
        let t = &mut self.assembly.traits[id];
        let return_type = match ret {
            TypeRef::Empty => None,
            other => Some(write_type_ref(&mut t.generic.types, other, true)),
        };
        let mut parameters = Vec::new();
        for p in params {
            parameters.push(write_type_ref(&mut t.generic.types, p, true));
        }
        t.functions.push(TraitFunction {
            name: name.into(),
            return_type,
            parameters,
            export_name: export_name.into(),
        });
    }

    // ----- internals -----

    fn current_type_id(&self) -> usize {
        match self.current {
            Current::Type(id) => id,
            _ => panic!("no type is being built"),
        }
    }

    fn current_function_id(&self) -> usize {
        match self.current {
            Current::Function(id) => id,
            _ => panic!("no function is being built"),
        }
    }

    fn current_trait_id(&self) -> usize {
        match self.current {
            Current::Trait(id) => id,
            _ => panic!("no trait is being built"),
        }
    }

    fn current_decl(&mut self) -> &mut GenericDecl {
        match self.current {
            Current::Type(id) => &mut self.assembly.types[id].generic,
            Current::Function(id) => &mut self.assembly.functions[id].generic,
            Current::Trait(id) => &mut self.assembly.traits[id].generic,
            Current::None => panic!("no item is being built"),
        }
    }
}

impl Default for AssemblyBuilder {
    fn default() -> Self {
        AssemblyBuilder::new()
    }
}

/// Encodes a symbolic type reference into `list`, returning the index of
/// the written head entry. Argument lists are emitted as
/// `Segment Clone... ListEnd` continuations so the head index stays stable.
fn write_type_ref(list: &mut RefList, r: &TypeRef, force: bool) -> usize {
    match r {
        TypeRef::Empty => list.push(entry(RefKind::Empty, 0, force)),
        TypeRef::Argument { index, segment } => {
            let head = list.push(entry(RefKind::Argument, *index, force));
            list.push(RefEntry::new(RefKind::ArgumentSeg, *segment));
            head
        }
        TypeRef::SelfType => list.push(entry(RefKind::SelfType, 0, force)),
        TypeRef::Template(id) => {
            let head = list.push(entry(RefKind::Assembly, *id, force));
            list.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
        TypeRef::Imported(id) => {
            let head = list.push(entry(RefKind::Import, *id, force));
            list.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
        TypeRef::Instance { base, arguments } => {
            let args: Vec<usize> = arguments
                .iter()
                .map(|a| write_type_ref(list, a, false))
                .collect();
            let (kind, id) = match base.as_ref() {
                TypeRef::Template(id) => (RefKind::Assembly, *id),
                TypeRef::Imported(id) => (RefKind::Import, *id),
                _ => panic!("instance base must be a template or import reference"),
            };
            let head = list.push(entry(kind, id, force));
            list.push(RefEntry::new(RefKind::Segment, 0));
            for a in args {
                list.push(RefEntry::new(RefKind::Clone, a));
            }
            list.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
        TypeRef::Subtype {
            parent,
            name,
            arguments,
        } => {
            let parent_id = write_type_ref(list, parent, false);
            let args: Vec<usize> = arguments
                .iter()
                .map(|a| write_type_ref(list, a, false))
                .collect();
            let name_id = list.push_name(name.clone());
            let head = list.push(entry(RefKind::Subtype, name_id, force));
            list.push(RefEntry::new(RefKind::Clone, parent_id));
            if !args.is_empty() {
                list.push(RefEntry::new(RefKind::Segment, 0));
            }
            for a in args {
                list.push(RefEntry::new(RefKind::Clone, a));
            }
            list.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
        TypeRef::Any => list.push(entry(RefKind::Any, 0, force)),
        TypeRef::Try(inner) => {
            let inner_id = write_type_ref(list, inner, false);
            list.push(entry(RefKind::Try, inner_id, force))
        }
        TypeRef::ConstraintImport(name) => {
            let name_id = list.push_name(name.clone());
            list.push(entry(RefKind::Constraint, name_id, force))
        }
    }
}

/// Encodes a symbolic function reference into the declaration's function
/// list; generic arguments are written into the sibling type list and
/// referenced through `CloneType` entries.
fn write_function_ref(decl: &mut GenericDecl, r: &FuncRef, force: bool) -> usize {
    match r {
        FuncRef::Empty => decl.functions.push(entry(RefKind::Empty, 0, force)),
        FuncRef::Template(id) => {
            let head = decl.functions.push(entry(RefKind::Assembly, *id, force));
            decl.functions.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
        FuncRef::Imported(id) => {
            let head = decl.functions.push(entry(RefKind::Import, *id, force));
            decl.functions.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
        FuncRef::Instance { base, arguments } => {
            let args: Vec<usize> = arguments
                .iter()
                .map(|a| write_type_ref(&mut decl.types, a, false))
                .collect();
            let (kind, id) = match base.as_ref() {
                FuncRef::Template(id) => (RefKind::Assembly, *id),
                FuncRef::Imported(id) => (RefKind::Import, *id),
                _ => panic!("instance base must be a template or import reference"),
            };
            let head = decl.functions.push(entry(kind, id, force));
            decl.functions.push(RefEntry::new(RefKind::Segment, 0));
            for a in args {
                decl.functions.push(RefEntry::new(RefKind::CloneType, a));
            }
            decl.functions.push(RefEntry::new(RefKind::ListEnd, 0));
            head
        }
    }
}

fn entry(kind: RefKind, index: usize, force: bool) -> RefEntry {
    if force {
        RefEntry::forced(kind, index)
    } else {
        RefEntry::new(kind, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_ref_is_terminated() {
        let mut b = AssemblyBuilder::new();
        b.begin_assembly("Test");
        let t = b.begin_type(StorageMode::Value, "Test.A");
        b.add_field(&t);
        b.end_type();
        b.end_assembly();

        let list = b.build();
        let decl = &list.assemblies[0].types[0].generic;
        assert_eq!(decl.types.entries[0].kind, RefKind::Assembly);
        assert!(decl.types.entries[0].force_load);
        assert_eq!(decl.types.entries[1].kind, RefKind::ListEnd);
    }

    #[test]
    fn instance_arguments_use_clone_continuations() {
        let mut b = AssemblyBuilder::new();
        b.begin_assembly("Test");
        let elem = b.forward_declare_type();
        let tmpl = b.forward_declare_type();
        let inst = b.make_type(&tmpl, vec![elem.clone()]);
        let holder = b.begin_type(StorageMode::Value, "Test.Holder");
        let _ = holder;
        b.add_field(&inst);
        b.end_type();
        b.end_assembly();

        let list = b.build();
        let decl = &list.assemblies[0].types[2].generic;
        // argument written first, then head, segment, clone, list end
        let kinds: Vec<RefKind> = decl.types.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RefKind::Assembly,
                RefKind::ListEnd,
                RefKind::Assembly,
                RefKind::Segment,
                RefKind::Clone,
                RefKind::ListEnd,
            ]
        );
        assert_eq!(decl.types.entries[4].index, 0);
        assert_eq!(list.assemblies[0].types[2].fields, vec![2]);
    }

    #[test]
    fn subtype_parent_comes_first() {
        let mut b = AssemblyBuilder::new();
        b.begin_assembly("Test");
        let parent = b.forward_declare_type();
        let sub = b.make_subtype(&parent, "Item", vec![]);
        b.begin_type(StorageMode::Value, "Test.User");
        b.add_field(&sub);
        b.end_type();
        b.end_assembly();

        let list = b.build();
        let decl = &list.assemblies[0].types[1].generic;
        let head = list.assemblies[0].types[1].fields[0];
        assert_eq!(decl.types.entries[head].kind, RefKind::Subtype);
        assert_eq!(decl.types.names[decl.types.entries[head].index], "Item");
        assert_eq!(decl.types.entries[head + 1].kind, RefKind::Clone);
        assert_eq!(decl.types.entries[head + 2].kind, RefKind::ListEnd);
    }

    #[test]
    fn generic_parameters_count_up() {
        let mut b = AssemblyBuilder::new();
        b.begin_assembly("Test");
        b.begin_type(StorageMode::Value, "Test.Pair");
        let g1 = b.add_generic_parameter();
        let g2 = b.add_generic_parameter();
        b.add_field(&g1);
        b.add_field(&g2);
        b.end_type();
        b.end_assembly();

        let list = b.build();
        let tt = &list.assemblies[0].types[0];
        assert_eq!(tt.generic.param_count, 2);
        assert_eq!(
            g2,
            TypeRef::Argument {
                index: 1,
                segment: 0
            }
        );
    }
}
