//! Host-supplied native implementations.
//!
//! Native *types* supply their layout through
//! [`Loader::add_native_type`](crate::loader::Loader::add_native_type).
//! Native *functions* are registered here: the template must be a pure
//! declaration (no code, no generics) listed in the assembly's
//! native-function export table; the binding itself is an opaque callable
//! the executing host invokes with its own context.

use std::any::Any;
use std::sync::Arc;

use crate::catalog::AssemblyCatalog;
use crate::error::{LoadError, Result};
use crate::pipeline::LoaderCore;

/// A host callback implementing a native function. The argument is the
/// host's execution context (typically its value stack); the loader never
/// invokes it.
pub type NativeFunction = Arc<dyn Fn(&mut dyn Any) -> std::result::Result<(), String> + Send + Sync>;

impl LoaderCore {
    /// Validates the named template and records the binding. Returns the
    /// template index the binding was stored under.
    pub fn register_native_function(
        &mut self,
        assembly: &str,
        name: &str,
        function: NativeFunction,
    ) -> Result<usize> {
        let catalog = Arc::clone(&self.catalog);
        let a = catalog.assembly(assembly)?;
        let template = AssemblyCatalog::find_native_id(&a.native_functions, name)
            .ok_or_else(|| LoadError::program("Native object not found"))?;
        let ft = catalog.function_template(assembly, template)?;
        if ft.has_code()
            || ft.generic.param_count != 0
            || !ft.generic.functions.entries.is_empty()
        {
            return Err(LoadError::program("Invalid native function"));
        }
        self.native_functions
            .insert((assembly.to_string(), template), function);
        Ok(template)
    }

    pub fn native_function(&self, assembly: &str, template: usize) -> Option<NativeFunction> {
        self.native_functions
            .get(&(assembly.to_string(), template))
            .cloned()
    }
}
