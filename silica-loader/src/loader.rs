//! The loader façade: entry points, caching, the coarse lock.

use std::sync::{Arc, Mutex, MutexGuard};

use silica_assembly::model::AssemblyList;

use crate::catalog::AssemblyCatalog;
use crate::entities::{
    FunctionId, LoadingArguments, RuntimeFunction, RuntimeType, TypeId,
};
use crate::error::{LoadError, Result};
use crate::native::NativeFunction;
use crate::pipeline::{LoaderCore, CORE_ASSEMBLY};

/// Notification hooks, called once per committed entity while the loader
/// lock is held. Implementations must not call back into the loader.
pub trait LoaderListener: Send + Sync {
    fn on_type_loaded(&self, _ty: &RuntimeType) {}
    fn on_function_loaded(&self, _func: &RuntimeFunction) {}
}

pub struct LoaderConfig {
    /// Size (and alignment) of a pointer on the target platform.
    pub pointer_size: usize,
    /// Cap on simultaneously loading entities; the only bounded-work
    /// guarantee against a pathological template.
    pub loading_limit: usize,
    pub listener: Option<Arc<dyn LoaderListener>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            pointer_size: std::mem::size_of::<usize>(),
            loading_limit: 256,
            listener: None,
        }
    }
}

/// Instantiates runtime types and functions from an assembly list.
///
/// Loaded entities are stable for the loader's lifetime: ids and the
/// returned `Arc`s never change after commit. Every entry point either
/// completes or fails without publishing anything.
pub struct Loader {
    catalog: Arc<AssemblyCatalog>,
    core: Mutex<LoaderCore>,
}

impl Loader {
    pub fn new(assemblies: AssemblyList) -> Self {
        Loader::with_config(assemblies, LoaderConfig::default())
    }

    pub fn with_config(assemblies: AssemblyList, config: LoaderConfig) -> Self {
        let catalog = Arc::new(AssemblyCatalog::new(assemblies));
        let core = LoaderCore::new(
            Arc::clone(&catalog),
            config.pointer_size,
            config.loading_limit,
            config.listener,
        );
        Loader {
            catalog,
            core: Mutex::new(core),
        }
    }

    // Loader calls are rare relative to execution, so one coarse lock
    // around the whole core is enough.
    fn lock(&self) -> MutexGuard<'_, LoaderCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the runtime type for `args`, loading it if needed.
    /// Idempotent: equal arguments always yield the same entity.
    pub fn get_type(&self, args: &LoadingArguments) -> Result<Arc<RuntimeType>> {
        let mut core = self.lock();
        get_type_locked(&mut core, args)
    }

    /// Dual of [`get_type`](Self::get_type) for functions.
    pub fn get_function(&self, args: &LoadingArguments) -> Result<Arc<RuntimeFunction>> {
        let mut core = self.lock();
        if let Some(&id) = core.function_lookup.get(args) {
            if let Some(f) = core.committed_function(id) {
                return Ok(f);
            }
        }
        let id = core.load_function_entry(args)?;
        core.committed_function(id)
            .ok_or_else(|| LoadError::program("Loaded function was not committed"))
    }

    /// Dense-id lookup; `None` for ids never assigned or rolled back.
    pub fn get_type_by_id(&self, id: TypeId) -> Option<Arc<RuntimeType>> {
        self.lock().committed_type(id)
    }

    pub fn get_function_by_id(&self, id: FunctionId) -> Option<Arc<RuntimeFunction>> {
        self.lock().committed_function(id)
    }

    /// Resolves an exported type name to loading arguments (without
    /// generic arguments filled in), following re-exports.
    pub fn find_export_type(
        &self,
        assembly: &str,
        name: &str,
        arity: Option<usize>,
    ) -> Option<LoadingArguments> {
        self.catalog
            .find_export_type(assembly, name, arity)
            .map(|(asm, id)| LoadingArguments::new(asm, id, Vec::new()))
    }

    pub fn find_export_function(
        &self,
        assembly: &str,
        name: &str,
        arity: Option<usize>,
    ) -> Option<LoadingArguments> {
        self.catalog
            .find_export_function(assembly, name, arity)
            .map(|(asm, id)| LoadingArguments::new(asm, id, Vec::new()))
    }

    pub fn find_export_constant(&self, assembly: &str, name: &str) -> Option<u32> {
        self.catalog.find_export_constant(assembly, name)
    }

    /// Registers a non-generic value type whose layout the host supplies.
    pub fn add_native_type(
        &self,
        assembly: &str,
        name: &str,
        size: usize,
        alignment: usize,
    ) -> Result<Arc<RuntimeType>> {
        let mut core = self.lock();
        let id = core.add_native_type(assembly, name, size, alignment)?;
        core.committed_type(id)
            .ok_or_else(|| LoadError::program("Loaded type was not committed"))
    }

    /// Binds a host implementation to a native function template.
    pub fn add_native_function(
        &self,
        assembly: &str,
        name: &str,
        function: NativeFunction,
    ) -> Result<()> {
        self.lock()
            .register_native_function(assembly, name, function)
            .map(|_| ())
    }

    /// Like [`add_native_function`](Self::add_native_function), but also
    /// loads the function and verifies its resolved signature.
    pub fn add_native_function_checked(
        &self,
        assembly: &str,
        name: &str,
        function: NativeFunction,
        return_type: Option<TypeId>,
        parameters: &[TypeId],
    ) -> Result<Arc<RuntimeFunction>> {
        let mut core = self.lock();
        let template = core.register_native_function(assembly, name, function)?;
        let args = LoadingArguments::new(assembly, template, Vec::new());
        let cached = core.function_lookup.get(&args).copied();
        let id = match cached {
            Some(id) => id,
            None => core.load_function_entry(&args)?,
        };
        let f = core
            .committed_function(id)
            .ok_or_else(|| LoadError::program("Loaded function was not committed"))?;
        if f.return_type != return_type || f.parameters != parameters {
            return Err(LoadError::program("Invalid native function"));
        }
        Ok(f)
    }

    /// The binding registered for `func`'s template, if any.
    pub fn native_function(&self, func: &RuntimeFunction) -> Option<NativeFunction> {
        self.lock()
            .native_function(&func.args.assembly, func.args.id)
    }

    /// Loads `Core.Pointer<element>`, caching the result on the element
    /// type.
    pub fn load_pointer_type(&self, element: TypeId) -> Result<Arc<RuntimeType>> {
        let mut core = self.lock();
        if let Some(existing) = core.committed_type(element).and_then(|t| t.pointer_type()) {
            if let Some(t) = core.committed_type(existing) {
                return Ok(t);
            }
        }
        let Some(template) = core.pointer_template else {
            return Err(LoadError::program("Pointer type not available"));
        };
        let args = LoadingArguments::new(CORE_ASSEMBLY, template, vec![element]);
        get_type_locked(&mut core, &args)
    }

    pub fn is_pointer_type(&self, ty: &RuntimeType) -> bool {
        self.lock().is_pointer_args(&ty.args)
    }

    pub fn pointer_size(&self) -> usize {
        self.lock().pointer_size
    }
}

fn get_type_locked(core: &mut LoaderCore, args: &LoadingArguments) -> Result<Arc<RuntimeType>> {
    if let Some(&id) = core.type_lookup.get(args) {
        if let Some(t) = core.committed_type(id) {
            return Ok(t);
        }
    }
    let id = core.load_type_entry(args)?;
    core.committed_type(id)
        .ok_or_else(|| LoadError::program("Loaded type was not committed"))
}
