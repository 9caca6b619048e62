//! The instantiation pipeline.
//!
//! Types and functions are loaded in stages through ordered queues so that
//! partially constructed entities are visible to the resolver and cyclic
//! reference graphs terminate. See [`LoaderCore::process_loading_lists`]
//! for the stage precedence.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use silica_assembly::model::{StorageMode, TypeTemplate};

use crate::catalog::AssemblyCatalog;
use crate::entities::{
    FieldLayout, FunctionCode, FunctionId, LoadingArguments, RuntimeFunction, RuntimeType, TypeId,
};
use crate::error::{LoadError, Result};
use crate::loader::LoaderListener;
use crate::native::NativeFunction;
use crate::resolver::RefEnv;
use crate::session::LoadingSession;

pub(crate) const CORE_ASSEMBLY: &str = "Core";
pub(crate) const POINTER_TYPE_NAME: &str = "Core.Pointer";
pub(crate) const BOX_TYPE_NAME: &str = "Core.Box";

pub(crate) struct LoaderCore {
    pub catalog: Arc<AssemblyCatalog>,
    pub pointer_size: usize,
    pub loading_limit: usize,
    pub listener: Option<Arc<dyn LoaderListener>>,

    pub types: Vec<Option<Arc<RuntimeType>>>,
    pub functions: Vec<Option<Arc<RuntimeFunction>>>,
    pub type_lookup: HashMap<LoadingArguments, TypeId>,
    pub function_lookup: HashMap<LoadingArguments, FunctionId>,

    pub code_storage: HashMap<(String, usize), Arc<FunctionCode>>,
    pub native_functions: HashMap<(String, usize), NativeFunction>,

    pub session: LoadingSession,

    /// Template indices of `Core.Pointer` / `Core.Box`, when the Core
    /// assembly declares them well-formed. Left unset otherwise; loading
    /// then fails with an ordinary diagnostic instead of at construction.
    pub pointer_template: Option<usize>,
    pub box_template: Option<usize>,

    next_type_id: u32,
    next_function_id: u32,
}

impl LoaderCore {
    pub fn new(
        catalog: Arc<AssemblyCatalog>,
        pointer_size: usize,
        loading_limit: usize,
        listener: Option<Arc<dyn LoaderListener>>,
    ) -> Self {
        let mut core = LoaderCore {
            catalog,
            pointer_size,
            loading_limit,
            listener,
            types: Vec::new(),
            functions: Vec::new(),
            type_lookup: HashMap::new(),
            function_lookup: HashMap::new(),
            code_storage: HashMap::new(),
            native_functions: HashMap::new(),
            session: LoadingSession::default(),
            pointer_template: None,
            box_template: None,
            next_type_id: 0,
            next_function_id: 0,
        };
        core.find_internal_type_ids();
        core
    }

    fn find_internal_type_ids(&mut self) {
        let Some(core_assembly) = self.catalog.find_assembly(CORE_ASSEMBLY) else {
            return;
        };
        for e in &core_assembly.export_types {
            let Some(tt) = core_assembly.types.get(e.internal_id) else {
                continue;
            };
            if e.name == POINTER_TYPE_NAME {
                if tt.generic.param_count == 1
                    && tt.storage == StorageMode::Value
                    && self.pointer_template.is_none()
                {
                    self.pointer_template = Some(e.internal_id);
                }
            } else if e.name == BOX_TYPE_NAME
                && tt.generic.param_count == 1
                && tt.storage == StorageMode::Reference
                && self.box_template.is_none()
            {
                self.box_template = Some(e.internal_id);
            }
        }
    }

    // ----- entity access -----

    pub fn type_view(&self, id: TypeId) -> &RuntimeType {
        if let Some(t) = self.session.types.get(&id.0) {
            return t;
        }
        match self.types.get(id.0 as usize) {
            Some(Some(t)) => t,
            _ => unreachable!("unknown type id {id}"),
        }
    }

    pub fn function_view(&self, id: FunctionId) -> &RuntimeFunction {
        if let Some(f) = self.session.functions.get(&id.0) {
            return f;
        }
        match self.functions.get(id.0 as usize) {
            Some(Some(f)) => f,
            _ => unreachable!("unknown function id {id}"),
        }
    }

    fn session_type_mut(&mut self, id: TypeId) -> &mut RuntimeType {
        match self.session.types.get_mut(&id.0) {
            Some(t) => t,
            None => unreachable!("type {id} is not in flight"),
        }
    }

    fn session_function_mut(&mut self, id: FunctionId) -> &mut RuntimeFunction {
        match self.session.functions.get_mut(&id.0) {
            Some(f) => f,
            None => unreachable!("function {id} is not in flight"),
        }
    }

    pub fn committed_type(&self, id: TypeId) -> Option<Arc<RuntimeType>> {
        self.types.get(id.0 as usize).and_then(|s| s.clone())
    }

    pub fn committed_function(&self, id: FunctionId) -> Option<Arc<RuntimeFunction>> {
        self.functions.get(id.0 as usize).and_then(|s| s.clone())
    }

    pub fn is_box_args(&self, args: &LoadingArguments) -> bool {
        args.assembly == CORE_ASSEMBLY && Some(args.id) == self.box_template
    }

    pub fn is_pointer_args(&self, args: &LoadingArguments) -> bool {
        args.assembly == CORE_ASSEMBLY && Some(args.id) == self.pointer_template
    }

    // ----- entry points (caller holds the loader lock) -----

    pub fn load_type_entry(&mut self, args: &LoadingArguments) -> Result<TypeId> {
        debug!("loading type {}", args);
        self.session.clear();
        let result = self
            .load_type_internal(args, None)
            .and_then(|id| {
                self.process_loading_lists()?;
                self.move_finished_objects()?;
                Ok(id)
            });
        self.session.clear();
        if let Err(e) = &result {
            debug!("loading type {} failed: {}", args, e);
        }
        result
    }

    pub fn load_function_entry(&mut self, args: &LoadingArguments) -> Result<FunctionId> {
        debug!("loading function {}", args);
        self.session.clear();
        let result = self
            .load_function_internal(args)
            .and_then(|id| {
                self.process_loading_lists()?;
                self.move_finished_objects()?;
                Ok(id)
            });
        self.session.clear();
        if let Err(e) = &result {
            debug!("loading function {} failed: {}", args, e);
        }
        result
    }

    // ----- type creation -----

    /// Finds or creates the runtime type for `args`. When `prechecked`
    /// carries the constraint exports of an argument check that already
    /// ran, the check is not repeated.
    pub fn load_type_internal(
        &mut self,
        args: &LoadingArguments,
        prechecked: Option<Vec<(String, TypeId)>>,
    ) -> Result<TypeId> {
        if let Some(&id) = self.type_lookup.get(args) {
            return Ok(id);
        }
        if let Some(id) = self.session.find_type_by_args(args) {
            return Ok(id);
        }

        let catalog = Arc::clone(&self.catalog);
        let tt = catalog.type_template(&args.assembly, args.id)?;

        if self
            .session
            .constraint_checking_types
            .iter()
            .any(|a| a == args)
        {
            return Err(LoadError::CyclicConstraint);
        }
        let exports = match prechecked {
            Some(exports) => exports,
            None => {
                self.session.constraint_checking_types.push(args.clone());
                let checked = self.check_generic_arguments(&args.assembly, &tt.generic, args);
                self.session.constraint_checking_types.pop();
                match checked? {
                    Some(exports) => exports,
                    None => return Err(LoadError::InvalidGenericArguments),
                }
            }
        };

        if !tt.generic.constants.is_empty() {
            return Err(LoadError::program(
                "Type template cannot contain field reference",
            ));
        }

        if self.is_box_args(args) {
            let value_arg = args.arguments.len() == 1
                && self.type_view(args.arguments[0]).storage == StorageMode::Value;
            if !value_arg {
                return Err(LoadError::program(
                    "Box type can only take value type as argument",
                ));
            }
        }

        let id = TypeId(self.next_type_id);
        self.next_type_id += 1;
        let mut t = RuntimeType::new(id, args.clone(), tt.storage);
        t.constraint_exports = exports;
        t.referenced_types = vec![None; tt.generic.types.entries.len()];
        t.referenced_functions = vec![None; tt.generic.functions.entries.len()];
        trace!("created {} as {}", args, id);
        self.session.types.insert(id.0, t);

        if tt.storage == StorageMode::Reference {
            // Publish before field layout; this closes reference cycles.
            self.session.loading_ref_types.push_back(id);
            Ok(id)
        } else {
            // Value, Interface and Global layout must be known before the
            // type can be used as a field.
            self.load_fields(id, Some(tt))
        }
    }

    pub fn load_function_internal(&mut self, args: &LoadingArguments) -> Result<FunctionId> {
        if let Some(&id) = self.function_lookup.get(args) {
            return Ok(id);
        }
        if let Some(id) = self.session.find_function_by_args(args) {
            return Ok(id);
        }

        let catalog = Arc::clone(&self.catalog);
        let ft = catalog.function_template(&args.assembly, args.id)?;

        if self
            .session
            .constraint_checking_functions
            .iter()
            .any(|a| a == args)
        {
            return Err(LoadError::CyclicConstraint);
        }
        self.session.constraint_checking_functions.push(args.clone());
        let checked = self.check_generic_arguments(&args.assembly, &ft.generic, args);
        self.session.constraint_checking_functions.pop();
        let exports = match checked? {
            Some(exports) => exports,
            None => return Err(LoadError::InvalidGenericArguments),
        };

        let id = FunctionId(self.next_function_id);
        self.next_function_id += 1;
        let mut f = RuntimeFunction::new(id, args.clone());
        f.constraint_exports = exports;
        f.referenced_types = vec![None; ft.generic.types.entries.len()];
        f.referenced_functions = vec![None; ft.generic.functions.entries.len()];
        f.code = self.get_code(&args.assembly, args.id)?;
        trace!("created {} as {}", args, id);
        self.session.functions.insert(id.0, f);
        self.session.loading_functions.push_back(id);
        Ok(id)
    }

    // ----- stage loop -----

    pub fn process_loading_lists(&mut self) -> Result<()> {
        debug_assert!(self.session.loading_types.is_empty());
        loop {
            if let Some(id) = self.session.loading_ref_types.pop_front() {
                self.load_fields(id, None)?;
                debug_assert!(self.session.loading_types.is_empty());
                continue;
            }
            if let Some(id) = self.session.post_loading_types.pop_front() {
                self.post_load_type(id)?;
                debug_assert!(self.session.loading_types.is_empty());
                continue;
            }
            if let Some(id) = self.session.loading_functions.pop_front() {
                self.post_load_function(id)?;
                debug_assert!(self.session.loading_types.is_empty());
                continue;
            }
            break;
        }
        Ok(())
    }

    /// Resolves field types and computes the layout. Runs with the type on
    /// the `loading_types` stack so value-type cycles surface as a zero
    /// alignment on a dependency.
    fn load_fields(&mut self, id: TypeId, template: Option<&TypeTemplate>) -> Result<TypeId> {
        debug_assert!(!self.session.loading_types.contains(&id));
        self.session.loading_types.push(id);
        if self.session.live_count() > self.loading_limit {
            return Err(LoadError::LoadingLimitExceeded);
        }

        let catalog = Arc::clone(&self.catalog);
        let (args, storage) = {
            let t = self.type_view(id);
            (t.args.clone(), t.storage)
        };
        let tt = match template {
            Some(t) => t,
            None => catalog.type_template(&args.assembly, args.id)?,
        };

        if storage == StorageMode::Interface && !tt.fields.is_empty() {
            return Err(LoadError::program("Interface cannot have fields"));
        }

        let env = RefEnv::for_type(id, &args, &tt.generic);

        let vtable = match tt.vtable {
            Some(r) => self.ref_type(&env, r)?,
            None => None,
        };
        if let Some(v) = vtable {
            if self.type_view(v).storage != StorageMode::Global {
                return Err(LoadError::program("Vtab type must be global storage"));
            }
            if storage == StorageMode::Global || storage == StorageMode::Value {
                return Err(LoadError::program("Global and value type cannot have vtab"));
            }
            self.session_type_mut(id).vtable = Some(v);
        } else if storage == StorageMode::Interface {
            return Err(LoadError::program("Interface must have vtab"));
        }

        let base = match tt.base {
            Some(r) => self.ref_type(&env, r)?,
            None => None,
        };
        if let Some(b) = base {
            match storage {
                StorageMode::Global => {
                    return Err(LoadError::program("Global type cannot have base type"));
                }
                StorageMode::Interface => {
                    return Err(LoadError::program("Interface cannot have base type"));
                }
                _ => {
                    if self.type_view(b).storage != storage {
                        return Err(LoadError::program(
                            "Base type storage must be same as the derived type",
                        ));
                    }
                }
            }
            self.session_type_mut(id).base = Some(b);
        }
        self.check_virtual_table(base, vtable)?;

        if storage == StorageMode::Interface {
            // Resolved inside the loading stack so that cyclic interface
            // inheritance terminates through the in-flight entry.
            self.load_interfaces(id, id, Some(tt))?;
        }

        let mut field_types = Vec::with_capacity(tt.fields.len());
        for &fref in &tt.fields {
            let fty = self
                .ref_type(&env, fref)?
                .ok_or_else(|| LoadError::program("Invalid field type"))?;
            let fv = self.type_view(fty);
            if fv.storage == StorageMode::Value && fv.alignment == 0 {
                debug_assert!(self.session.loading_types.contains(&fty));
                return Err(LoadError::CyclicTypeDependence);
            }
            field_types.push(fty);
        }

        let mut offset = 0usize;
        let mut total_alignment = 1usize;
        let mut fields = Vec::with_capacity(field_types.len());
        for fty in field_types {
            let fv = self.type_view(fty);
            let (length, alignment) = match fv.storage {
                StorageMode::Reference | StorageMode::Interface => {
                    (self.pointer_size, self.pointer_size)
                }
                StorageMode::Value => (fv.size, fv.alignment),
                StorageMode::Global => {
                    return Err(LoadError::program("Invalid field type"));
                }
            };
            offset = (offset + alignment - 1) / alignment * alignment;
            total_alignment = total_alignment.max(alignment);
            fields.push(FieldLayout {
                ty: fty,
                offset,
                length,
            });
            offset += length;
        }
        {
            let t = self.session_type_mut(id);
            t.fields = fields;
            t.size = offset;
            t.alignment = total_alignment;
        }
        trace!("laid out {}: size {} align {}", id, offset, total_alignment);

        self.session.post_loading_types.push_back(id);
        debug_assert_eq!(self.session.loading_types.last(), Some(&id));
        self.session.loading_types.pop();
        Ok(id)
    }

    /// Wires relations once the layout exists: force-loaded references,
    /// interfaces, initializer and finalizer.
    fn post_load_type(&mut self, id: TypeId) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);
        let (args, storage) = {
            let t = self.type_view(id);
            (t.args.clone(), t.storage)
        };
        let tt = catalog.type_template(&args.assembly, args.id)?;
        let env = RefEnv::for_type(id, &args, &tt.generic);

        for (i, e) in tt.generic.types.entries.iter().enumerate() {
            if e.force_load {
                let r = self.ref_type(&env, i)?;
                self.session_type_mut(id).referenced_types[i] = r;
            }
        }
        for (i, e) in tt.generic.functions.entries.iter().enumerate() {
            if e.force_load {
                let r = self.ref_function(&env, i)?;
                self.session_type_mut(id).referenced_functions[i] = r;
            }
        }

        if storage == StorageMode::Global && !tt.interfaces.is_empty() {
            return Err(LoadError::program(
                "Global and value type cannot have interfaces",
            ));
        }

        if self.is_box_args(&args) {
            // Box exposes the boxed value type's interfaces.
            if self.type_view(args.arguments[0]).storage == StorageMode::Value {
                self.load_interfaces(id, args.arguments[0], None)?;
            }
        } else if storage == StorageMode::Reference {
            self.load_interfaces(id, id, Some(tt))?;
        }
        // Interface-storage types resolved theirs during field loading.

        let initializer = match tt.initializer {
            Some(r) => self.ref_function(&env, r)?,
            None => None,
        };
        let finalizer = match tt.finalizer {
            Some(r) => self.ref_function(&env, r)?,
            None => None,
        };
        if storage != StorageMode::Global && initializer.is_some() {
            return Err(LoadError::program("Only global type can have initializer"));
        }
        if storage != StorageMode::Reference && finalizer.is_some() {
            return Err(LoadError::program("Only reference type can have finalizer"));
        }
        {
            let t = self.session_type_mut(id);
            t.initializer = initializer;
            t.finalizer = finalizer;
        }
        self.session.finished_types.push_back(id);
        Ok(())
    }

    fn post_load_function(&mut self, id: FunctionId) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);
        let args = self.function_view(id).args.clone();
        let ft = catalog.function_template(&args.assembly, args.id)?;
        let env = RefEnv::for_function(id, &args, &ft.generic);

        for (i, e) in ft.generic.types.entries.iter().enumerate() {
            if e.force_load {
                let r = self.ref_type(&env, i)?;
                self.session_function_mut(id).referenced_types[i] = r;
            }
        }
        for (i, e) in ft.generic.functions.entries.iter().enumerate() {
            if e.force_load {
                let r = self.ref_function(&env, i)?;
                self.session_function_mut(id).referenced_functions[i] = r;
            }
        }

        let mut constants = Vec::with_capacity(ft.generic.constants.len());
        for &cref in &ft.generic.constants {
            constants.push(self.load_import_constant(&args.assembly, cref)?);
        }

        let return_type = match ft.return_type {
            Some(r) => self.ref_type(&env, r)?,
            None => None,
        };
        let mut parameters = Vec::with_capacity(ft.parameters.len());
        for &p in &ft.parameters {
            parameters.push(
                self.ref_type(&env, p)?
                    .ok_or(LoadError::InvalidTypeReference)?,
            );
        }
        {
            let f = self.session_function_mut(id);
            f.referenced_constants = constants;
            f.return_type = return_type;
            f.parameters = parameters;
        }
        self.session.finished_functions.push_back(id);
        Ok(())
    }

    // ----- interfaces & vtables -----

    /// Loads the interface list declared on `src`'s template into `dest`.
    /// `dest` differs from `src` only for `Box<T>`, which copies `T`'s
    /// interfaces.
    fn load_interfaces(
        &mut self,
        dest: TypeId,
        src: TypeId,
        src_template: Option<&TypeTemplate>,
    ) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);
        let (src_args, src_storage) = {
            let t = self.type_view(src);
            (t.args.clone(), t.storage)
        };
        let tt = match src_template {
            Some(t) => t,
            None => catalog.type_template(&src_args.assembly, src_args.id)?,
        };
        let env = RefEnv::for_type(src, &src_args, &tt.generic);

        for decl in &tt.interfaces {
            let vtable = match decl.vtable {
                Some(r) => self.ref_type(&env, r)?,
                None => None,
            };
            if vtable.is_none() && src_storage != StorageMode::Interface {
                return Err(LoadError::program("Vtab type not specified for interface"));
            }
            if let Some(v) = vtable {
                if self.type_view(v).storage != StorageMode::Global {
                    return Err(LoadError::program("Vtab type must be global storage"));
                }
            }

            let iface = self
                .ref_type(&env, decl.ty)?
                .ok_or_else(|| LoadError::program("Interface type not specified"))?;
            if self.type_view(iface).storage != StorageMode::Interface {
                return Err(LoadError::program("Interface must be interface storage"));
            }

            if src_storage == StorageMode::Interface {
                if vtable.is_some() {
                    return Err(LoadError::program("Interface cannot have implementation"));
                }
            } else {
                self.check_virtual_table(Some(iface), vtable)?;
            }
            self.session_type_mut(dest)
                .interfaces
                .push(crate::entities::InterfaceBinding { ty: iface, vtable });
        }
        Ok(())
    }

    /// The derived vtable must extend the base vtable: slot `i` of the base
    /// must match slot `i` of the derived table exactly.
    fn check_virtual_table(&self, base: Option<TypeId>, vtable: Option<TypeId>) -> Result<()> {
        let Some(b) = base else { return Ok(()) };
        let base_vtable = self.type_view(b).vtable;
        let Some(bv) = base_vtable else { return Ok(()) };
        let Some(v) = vtable else {
            return Err(LoadError::VtabMismatch);
        };
        let base_fields = &self.type_view(bv).fields;
        let derived_fields = &self.type_view(v).fields;
        if base_fields.len() > derived_fields.len() {
            return Err(LoadError::VtabMismatch);
        }
        for (fb, fd) in base_fields.iter().zip(derived_fields.iter()) {
            if fb.ty != fd.ty || fb.offset != fd.offset || fb.length != fd.length {
                return Err(LoadError::VtabMismatch);
            }
        }
        Ok(())
    }

    // ----- commit -----

    /// Runs final checks and notification hooks over every finished
    /// entity, then commits them to the catalog. Any failure leaves the
    /// catalog untouched.
    pub fn move_finished_objects(&mut self) -> Result<()> {
        let finished_types: Vec<TypeId> = self.session.finished_types.iter().copied().collect();
        let finished_functions: Vec<FunctionId> =
            self.session.finished_functions.iter().copied().collect();

        for &id in &finished_types {
            self.final_check_type(id)?;
        }
        for &id in &finished_functions {
            self.final_check_function(id)?;
        }

        if let Some(listener) = self.listener.clone() {
            for &id in &finished_types {
                listener.on_type_loaded(self.type_view(id));
            }
            for &id in &finished_functions {
                listener.on_function_loaded(self.function_view(id));
            }
        }

        while let Some(id) = self.session.finished_types.pop_front() {
            if let Some(t) = self.session.types.remove(&id.0) {
                self.add_loaded_type(t);
            }
        }
        while let Some(id) = self.session.finished_functions.pop_front() {
            if let Some(f) = self.session.functions.remove(&id.0) {
                self.add_loaded_function(f);
            }
        }
        debug!(
            "committed {} types, {} functions",
            finished_types.len(),
            finished_functions.len()
        );
        Ok(())
    }

    fn final_check_type(&mut self, id: TypeId) -> Result<()> {
        let (args, storage) = {
            let t = self.type_view(id);
            (t.args.clone(), t.storage)
        };
        if self.is_pointer_args(&args) {
            let t = self.type_view(id);
            if storage != StorageMode::Value
                || args.arguments.len() != 1
                || t.size != self.pointer_size
                || t.alignment != self.pointer_size
            {
                return Err(LoadError::program("Invalid pointer type"));
            }
            let element = args.arguments[0];
            if !self.type_view(element).set_pointer_type(id) {
                return Err(LoadError::program("Invalid pointer type"));
            }
        }
        // The early check during field loading is skipped when the base is
        // still mid-flight without its vtable; everything is wired now.
        let (base, vtable, interfaces) = {
            let t = self.type_view(id);
            (t.base, t.vtable, t.interfaces.clone())
        };
        self.check_virtual_table(base, vtable)?;
        if storage != StorageMode::Interface {
            for binding in &interfaces {
                self.check_virtual_table(Some(binding.ty), binding.vtable)?;
            }
        }
        let (initializer, finalizer) = {
            let t = self.type_view(id);
            (t.initializer, t.finalizer)
        };
        if let Some(init) = initializer {
            let f = self.function_view(init);
            if f.return_type.is_some() || !f.parameters.is_empty() {
                return Err(LoadError::program("Invalid initializer"));
            }
        }
        if let Some(fin) = finalizer {
            let f = self.function_view(fin);
            if f.return_type.is_some() || f.parameters.len() != 1 || f.parameters[0] != id {
                return Err(LoadError::program("Invalid finalizer"));
            }
        }
        Ok(())
    }

    fn final_check_function(&mut self, _id: FunctionId) -> Result<()> {
        Ok(())
    }

    fn add_loaded_type(&mut self, t: RuntimeType) {
        let slot = t.id.0 as usize;
        if self.types.len() <= slot {
            self.types.resize_with(slot + 1, || None);
        }
        debug_assert!(self.types[slot].is_none());
        self.type_lookup.insert(t.args.clone(), t.id);
        self.types[slot] = Some(Arc::new(t));
    }

    fn add_loaded_function(&mut self, f: RuntimeFunction) {
        let slot = f.id.0 as usize;
        if self.functions.len() <= slot {
            self.functions.resize_with(slot + 1, || None);
        }
        debug_assert!(self.functions[slot].is_none());
        self.function_lookup.insert(f.args.clone(), f.id);
        self.functions[slot] = Some(Arc::new(f));
    }

    // ----- shared function code -----

    /// Builds (or fetches) the code shared by all instantiations of a
    /// function template. Import-constant entries are rewritten here, once.
    fn get_code(&mut self, assembly: &str, template: usize) -> Result<Option<Arc<FunctionCode>>> {
        let key = (assembly.to_string(), template);
        if let Some(code) = self.code_storage.get(&key) {
            return Ok(Some(Arc::clone(code)));
        }
        let catalog = Arc::clone(&self.catalog);
        let ft = catalog.function_template(assembly, template)?;
        if !ft.has_code() {
            return Ok(None);
        }
        let mut code = FunctionCode {
            assembly: assembly.to_string(),
            template,
            instructions: ft.instructions.clone(),
            constant_data: ft.constant_data.clone(),
            constant_table: ft.constant_table.clone(),
            locals: ft.locals.clone(),
        };
        for entry in &mut code.constant_table {
            if entry.length == 0 {
                let value = self.load_import_constant(assembly, entry.offset)?;
                entry.offset = code.constant_data.len();
                entry.length = 4;
                code.constant_data.extend_from_slice(&value.to_le_bytes());
            }
        }
        let code = Arc::new(code);
        self.code_storage.insert(key, Arc::clone(&code));
        Ok(Some(code))
    }

    // ----- native types -----

    /// Registers a non-generic value type whose layout the host supplies.
    /// Idempotent: a second registration with the same layout returns the
    /// committed entity.
    pub fn add_native_type(
        &mut self,
        assembly: &str,
        name: &str,
        size: usize,
        alignment: usize,
    ) -> Result<TypeId> {
        let catalog = Arc::clone(&self.catalog);
        let a = catalog.assembly(assembly)?;
        let template = AssemblyCatalog::find_native_id(&a.native_types, name)
            .ok_or_else(|| LoadError::program("Native object not found"))?;
        let args = LoadingArguments::new(assembly, template, Vec::new());

        if let Some(&existing) = self.type_lookup.get(&args) {
            let t = self.type_view(existing);
            if t.size != size || t.alignment != alignment {
                return Err(LoadError::program("Native type layout mismatch"));
            }
            return Ok(existing);
        }

        let tt = catalog.type_template(assembly, template)?;
        if tt.generic.param_count != 0 {
            return Err(LoadError::program("Native type cannot be generic"));
        }
        if tt.storage != StorageMode::Value {
            return Err(LoadError::program("Internal type can only be value type"));
        }
        for (r, what) in [
            (tt.initializer, "Internal type cannot have initializer"),
            (tt.finalizer, "Internal type cannot have finalizer"),
        ] {
            if let Some(idx) = r {
                let entry = tt
                    .generic
                    .functions
                    .entries
                    .get(idx)
                    .ok_or(LoadError::InvalidFunctionReference)?;
                if entry.kind != silica_assembly::refs::RefKind::Empty {
                    return Err(LoadError::program(what));
                }
            }
        }

        let id = TypeId(self.next_type_id);
        self.next_type_id += 1;
        let mut t = RuntimeType::new(id, args, StorageMode::Value);
        t.size = size;
        t.alignment = alignment;
        debug!("registered native type {} as {}", name, id);
        if let Some(listener) = self.listener.clone() {
            listener.on_type_loaded(&t);
        }
        self.add_loaded_type(t);
        Ok(id)
    }
}
