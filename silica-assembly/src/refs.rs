use serde::{Deserialize, Serialize};

/// Kind of a reference-list entry.
///
/// A reference list is a flat sequence of `(kind, index)` entries. Most
/// kinds stand for a type or function on their own; `Segment`, `ListEnd`,
/// `Clone` and `CloneType` act as continuation markers for the argument
/// lists of `Assembly`, `Import` and `Subtype` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    /// No referent. Legal where a reference is optional (base type,
    /// initializer, function return value), an error where it is not.
    Empty,
    /// Resolve the entry at `index` in the same list instead.
    Clone,
    /// Generic argument `index` of the loading environment. May be followed
    /// by an `ArgumentSeg` entry selecting the argument segment.
    Argument,
    /// Segment selector trailing an `Argument` entry.
    ArgumentSeg,
    /// The type currently being instantiated.
    SelfType,
    /// Template `index` of the environment's own assembly. Generic
    /// arguments follow up to `ListEnd`.
    Assembly,
    /// Entry `index` of the environment assembly's import table. Generic
    /// arguments follow up to `ListEnd`.
    Import,
    /// Named subtype navigation; `index` points into the list's name table.
    /// The continuation holds the parent reference first, then the
    /// navigation arguments.
    Subtype,
    /// A name exported by a constraint of the surrounding declaration;
    /// `index` points into the name table (`"name/.target"` or
    /// `"name/alias"`).
    Constraint,
    /// Undetermined placeholder. Only valid inside constraint expressions.
    Any,
    /// Wraps the entry at `index`; resolution failure yields "constraint
    /// false" instead of an error. Only valid inside constraint expressions.
    Try,
    /// Function lists only: a generic argument given as entry `index` of
    /// the sibling type list.
    CloneType,
    /// Opens the argument segment of the preceding entry.
    Segment,
    /// Terminates an argument list.
    ListEnd,
}

/// One entry of a reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEntry {
    pub kind: RefKind,
    pub index: usize,
    /// Entries carrying this marker are resolved eagerly during post-load
    /// and stored on the runtime entity at the same index.
    pub force_load: bool,
}

impl RefEntry {
    pub fn new(kind: RefKind, index: usize) -> Self {
        RefEntry {
            kind,
            index,
            force_load: false,
        }
    }

    pub fn forced(kind: RefKind, index: usize) -> Self {
        RefEntry {
            kind,
            index,
            force_load: true,
        }
    }
}

/// A flat reference list plus the name table used by `Subtype` and
/// `Constraint` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefList {
    pub entries: Vec<RefEntry>,
    pub names: Vec<String>,
}

impl RefList {
    pub fn push(&mut self, entry: RefEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn push_name(&mut self, name: impl Into<String>) -> usize {
        self.names.push(name.into());
        self.names.len() - 1
    }
}

/// Kinds of generic constraints a declaration may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// The target must resolve to a valid type.
    Exist,
    /// The target and the single argument must resolve to the same type.
    Same,
    /// The target's transitive base chain must include the argument.
    Base,
    /// The argument must appear in the target's transitive interface set.
    Interface,
    /// Structural trait check; `index` names a trait of this assembly.
    Trait,
    /// Structural trait check; `index` names a trait import entry.
    TraitImport,
}

/// A single generic constraint. `target` and `arguments` index the
/// constraint's own reference list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericConstraint {
    pub kind: ConstraintKind,
    /// Trait template or trait import index for the trait kinds; unused
    /// otherwise.
    pub index: usize,
    pub target: usize,
    pub arguments: Vec<usize>,
    pub type_refs: RefList,
    /// Non-empty: deduction results become addressable from the owner's
    /// body as `"<export_name>/.target"` and `"<export_name>/<alias>"`.
    pub export_name: String,
}

/// The generic surface of a template: parameter arity, the shared type and
/// function reference lists, constant imports and constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericDecl {
    pub param_count: usize,
    pub types: RefList,
    pub functions: RefList,
    /// Import-constant table references. Only meaningful on function
    /// templates; a type template carrying any is rejected by the loader.
    pub constants: Vec<usize>,
    pub constraints: Vec<GenericConstraint>,
}
