//! Runtime loader for Silica assemblies.
//!
//! Given an [`AssemblyList`](silica_assembly::AssemblyList) of generic
//! templates and loading arguments naming one of them plus concrete
//! generic arguments, the loader produces fully instantiated runtime
//! types and functions: laid out in memory, wired to their base type,
//! interfaces, virtual tables, initializer and finalizer, and validated
//! against all generic constraints (including structural traits).
//!
//! ```
//! use silica_assembly::{AssemblyBuilder, StorageMode};
//! use silica_loader::{Loader, LoadingArguments};
//!
//! let mut b = AssemblyBuilder::new();
//! b.begin_assembly("Demo");
//! b.begin_type(StorageMode::Value, "Demo.Empty");
//! b.link(true, false);
//! b.end_type();
//! b.end_assembly();
//!
//! let loader = Loader::new(b.build());
//! let args = loader.find_export_type("Demo", "Demo.Empty", Some(0)).unwrap();
//! let t = loader.get_type(&args).unwrap();
//! assert_eq!(t.size, 0);
//! assert_eq!(t.alignment, 1);
//! ```
//!
//! Execution of the loaded functions, garbage collection and the
//! serialized assembly format are host concerns; the loader only hands
//! out stable entities and, for native functions, the bindings the host
//! registered.

mod catalog;
mod constraints;
mod entities;
mod error;
mod loader;
mod native;
mod pipeline;
mod resolver;
mod session;

pub use entities::{
    FieldLayout, FunctionCode, FunctionId, InterfaceBinding, LoadingArguments, RuntimeFunction,
    RuntimeType, SubtypeArguments, TypeId,
};
pub use error::{ErrorKind, LoadError};
pub use loader::{Loader, LoaderConfig, LoaderListener};
pub use native::NativeFunction;

pub use silica_assembly::StorageMode;
