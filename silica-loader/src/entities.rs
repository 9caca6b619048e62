use std::fmt;
use std::sync::{Arc, OnceLock};

use silica_assembly::model::{ConstantEntry, StorageMode};

/// Dense identifier of a committed or in-flight runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Dense identifier of a committed or in-flight runtime function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Identifies one instantiation: an assembly, a template index in it, and
/// the concrete generic arguments. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadingArguments {
    pub assembly: String,
    pub id: usize,
    pub arguments: Vec<TypeId>,
}

impl LoadingArguments {
    pub fn new(assembly: impl Into<String>, id: usize, arguments: Vec<TypeId>) -> Self {
        LoadingArguments {
            assembly: assembly.into(),
            id,
            arguments,
        }
    }
}

impl fmt::Display for LoadingArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.assembly, self.id)?;
        if !self.arguments.is_empty() {
            write!(f, "<")?;
            for (i, a) in self.arguments.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", a)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

/// A named subtype navigated through a parent type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtypeArguments {
    pub parent: TypeId,
    pub name: String,
    pub arguments: Vec<TypeId>,
}

/// One laid-out field of a runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub ty: TypeId,
    pub offset: usize,
    pub length: usize,
}

/// An interface implemented by a runtime type, with the vtable type
/// backing the implementation (absent on interface-to-interface
/// inheritance entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub ty: TypeId,
    pub vtable: Option<TypeId>,
}

/// One fully instantiated type.
#[derive(Debug)]
pub struct RuntimeType {
    pub id: TypeId,
    pub args: LoadingArguments,
    pub storage: StorageMode,
    pub size: usize,
    /// Zero only while the type is mid-instantiation; observing a zero
    /// alignment on a `Value` dependency means a cyclic value type.
    pub alignment: usize,
    pub fields: Vec<FieldLayout>,
    pub base: Option<TypeId>,
    pub interfaces: Vec<InterfaceBinding>,
    pub vtable: Option<TypeId>,
    pub initializer: Option<FunctionId>,
    pub finalizer: Option<FunctionId>,
    /// Force-loaded entries of the template's type reference list,
    /// index-aligned with it.
    pub referenced_types: Vec<Option<TypeId>>,
    /// Force-loaded entries of the template's function reference list.
    pub referenced_functions: Vec<Option<FunctionId>>,
    /// Deduction results of exported constraints, keyed
    /// `"<name>/.target"` or `"<name>/<alias>"`.
    pub constraint_exports: Vec<(String, TypeId)>,
    pointer_type: OnceLock<TypeId>,
}

impl RuntimeType {
    pub(crate) fn new(id: TypeId, args: LoadingArguments, storage: StorageMode) -> Self {
        RuntimeType {
            id,
            args,
            storage,
            size: 0,
            alignment: 0,
            fields: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            vtable: None,
            initializer: None,
            finalizer: None,
            referenced_types: Vec::new(),
            referenced_functions: Vec::new(),
            constraint_exports: Vec::new(),
            pointer_type: OnceLock::new(),
        }
    }

    /// The cached `Pointer<Self>` instantiation, if one has been loaded.
    pub fn pointer_type(&self) -> Option<TypeId> {
        self.pointer_type.get().copied()
    }

    /// Records the pointer type. Monotone: setting the same value twice is
    /// a no-op, a conflicting value is reported to the caller.
    pub(crate) fn set_pointer_type(&self, ptr: TypeId) -> bool {
        *self.pointer_type.get_or_init(|| ptr) == ptr
    }

    /// Bytes this type occupies when stored in a field or on a stack slot.
    pub fn storage_size(&self, pointer_size: usize) -> usize {
        match self.storage {
            StorageMode::Reference | StorageMode::Interface => pointer_size,
            _ => self.size,
        }
    }

    pub fn storage_alignment(&self, pointer_size: usize) -> usize {
        match self.storage {
            StorageMode::Reference | StorageMode::Interface => pointer_size,
            _ => self.alignment,
        }
    }
}

/// Executable payload shared by every instantiation of one function
/// template. Import-constant entries have already been rewritten to
/// inline values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCode {
    pub assembly: String,
    pub template: usize,
    pub instructions: Vec<u8>,
    pub constant_data: Vec<u8>,
    pub constant_table: Vec<ConstantEntry>,
    pub locals: Vec<usize>,
}

/// One fully instantiated function. A function that is entirely native
/// carries no code.
#[derive(Debug)]
pub struct RuntimeFunction {
    pub id: FunctionId,
    pub args: LoadingArguments,
    /// `None` means no return value.
    pub return_type: Option<TypeId>,
    pub parameters: Vec<TypeId>,
    pub referenced_types: Vec<Option<TypeId>>,
    pub referenced_functions: Vec<Option<FunctionId>>,
    /// Import constants resolved for this instantiation, in declaration
    /// order.
    pub referenced_constants: Vec<u32>,
    pub constraint_exports: Vec<(String, TypeId)>,
    pub code: Option<Arc<FunctionCode>>,
}

impl RuntimeFunction {
    pub(crate) fn new(id: FunctionId, args: LoadingArguments) -> Self {
        RuntimeFunction {
            id,
            args,
            return_type: None,
            parameters: Vec::new(),
            referenced_types: Vec::new(),
            referenced_functions: Vec::new(),
            referenced_constants: Vec::new(),
            constraint_exports: Vec::new(),
            code: None,
        }
    }
}
