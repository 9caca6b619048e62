//! Reference-list resolution.
//!
//! A template's symbolic references are interpreted under a loading
//! environment: the declaration's reference lists, the environment
//! assembly, the flat generic-argument vector (own parameters first,
//! appended arguments after them) and, inside a type body, the self type.

use std::sync::Arc;

use silica_assembly::refs::{GenericDecl, RefEntry, RefKind};

use crate::entities::{FunctionId, LoadingArguments, SubtypeArguments, TypeId};
use crate::error::{LoadError, Result};
use crate::pipeline::LoaderCore;

/// The entity whose declaration the environment belongs to; used to look
/// up constraint exports.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EntityRef {
    Type(TypeId),
    Function(FunctionId),
}

pub(crate) struct RefEnv<'a> {
    pub decl: &'a GenericDecl,
    pub assembly: &'a str,
    pub args: Vec<TypeId>,
    pub self_type: Option<TypeId>,
    pub owner: Option<EntityRef>,
}

impl<'a> RefEnv<'a> {
    pub fn for_type(id: TypeId, args: &'a LoadingArguments, decl: &'a GenericDecl) -> Self {
        RefEnv {
            decl,
            assembly: &args.assembly,
            args: args.arguments.clone(),
            self_type: Some(id),
            owner: Some(EntityRef::Type(id)),
        }
    }

    pub fn for_function(id: FunctionId, args: &'a LoadingArguments, decl: &'a GenericDecl) -> Self {
        RefEnv {
            decl,
            assembly: &args.assembly,
            args: args.arguments.clone(),
            self_type: None,
            owner: Some(EntityRef::Function(id)),
        }
    }

    /// Environment for resolving a named subtype of `parent`: the parent's
    /// own arguments with the navigation arguments appended after them.
    pub fn for_subtype(
        parent: TypeId,
        parent_args: &'a LoadingArguments,
        decl: &'a GenericDecl,
        extra: &[TypeId],
    ) -> Self {
        let mut args = parent_args.arguments.clone();
        args.extend_from_slice(extra);
        RefEnv {
            decl,
            assembly: &parent_args.assembly,
            args,
            self_type: Some(parent),
            owner: Some(EntityRef::Type(parent)),
        }
    }
}

/// How a subtype reference resolved: to an entity that already exists, or
/// to instantiation arguments not yet loaded.
pub(crate) enum SubtypeResolution {
    Loaded(TypeId),
    Instantiate(LoadingArguments),
}

/// Flat position of an `Argument` entry, honoring a trailing
/// `ArgumentSeg` selector. Segment 0 addresses the declaration's own
/// parameters, segment 1 the appended arguments.
pub(crate) fn argument_position(
    decl: &GenericDecl,
    entries: &[RefEntry],
    idx: usize,
) -> Result<usize> {
    let entry = entries[idx];
    let segment = match entries.get(idx + 1) {
        Some(next) if next.kind == RefKind::ArgumentSeg => next.index,
        _ => 0,
    };
    match segment {
        0 => Ok(entry.index),
        1 => Ok(decl.param_count + entry.index),
        _ => Err(LoadError::InvalidTypeReference),
    }
}

impl LoaderCore {
    /// Resolves entry `index` of the environment's type list. `Ok(None)`
    /// means the entry was `Empty`.
    pub(crate) fn ref_type(&mut self, env: &RefEnv<'_>, index: usize) -> Result<Option<TypeId>> {
        let entries = &env.decl.types.entries;
        let mut idx = index;
        let mut hops = 0usize;
        loop {
            let entry = *entries.get(idx).ok_or(LoadError::InvalidTypeReference)?;
            match entry.kind {
                RefKind::Empty => return Ok(None),
                RefKind::Clone => {
                    hops += 1;
                    if hops > entries.len() {
                        return Err(LoadError::InvalidTypeReference);
                    }
                    idx = entry.index;
                }
                RefKind::Argument => {
                    let flat = argument_position(env.decl, entries, idx)?;
                    return env
                        .args
                        .get(flat)
                        .copied()
                        .map(Some)
                        .ok_or(LoadError::InvalidTypeReference);
                }
                RefKind::SelfType => {
                    return env
                        .self_type
                        .map(Some)
                        .ok_or(LoadError::InvalidTypeReference);
                }
                RefKind::Assembly => {
                    let arguments = self.collect_type_args(env, idx)?;
                    let la = LoadingArguments {
                        assembly: env.assembly.to_string(),
                        id: entry.index,
                        arguments,
                    };
                    return self.load_type_internal(&la, None).map(Some);
                }
                RefKind::Import => {
                    let (asm, id, arity) = self.resolve_type_import(env.assembly, entry.index)?;
                    let arguments = self.collect_type_args(env, idx)?;
                    if let Some(n) = arity {
                        if arguments.len() != n {
                            return Err(LoadError::InvalidTypeReference);
                        }
                    }
                    let la = LoadingArguments {
                        assembly: asm,
                        id,
                        arguments,
                    };
                    return self.load_type_internal(&la, None).map(Some);
                }
                RefKind::Subtype => {
                    let name = env
                        .decl
                        .types
                        .names
                        .get(entry.index)
                        .ok_or(LoadError::InvalidTypeReference)?
                        .clone();
                    let mut list = self.collect_type_args(env, idx)?;
                    if list.is_empty() {
                        return Err(LoadError::InvalidTypeReference);
                    }
                    let parent = list.remove(0);
                    let sub = SubtypeArguments {
                        parent,
                        name,
                        arguments: list,
                    };
                    return self
                        .load_subtype(&sub)?
                        .map(Some)
                        .ok_or(LoadError::InvalidTypeReference);
                }
                RefKind::Constraint => {
                    let name = env
                        .decl
                        .types
                        .names
                        .get(entry.index)
                        .ok_or(LoadError::InvalidTypeReference)?;
                    let exports = match env.owner {
                        Some(EntityRef::Type(t)) => &self.type_view(t).constraint_exports,
                        Some(EntityRef::Function(f)) => &self.function_view(f).constraint_exports,
                        None => return Err(LoadError::InvalidTypeReference),
                    };
                    return exports
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|&(_, t)| Some(t))
                        .ok_or(LoadError::InvalidTypeReference);
                }
                _ => return Err(LoadError::InvalidTypeReference),
            }
        }
    }

    /// Resolves entry `index` of the environment's function list.
    pub(crate) fn ref_function(
        &mut self,
        env: &RefEnv<'_>,
        index: usize,
    ) -> Result<Option<FunctionId>> {
        let entries = &env.decl.functions.entries;
        let mut idx = index;
        let mut hops = 0usize;
        loop {
            let entry = *entries
                .get(idx)
                .ok_or(LoadError::InvalidFunctionReference)?;
            match entry.kind {
                RefKind::Empty => return Ok(None),
                RefKind::Clone => {
                    hops += 1;
                    if hops > entries.len() {
                        return Err(LoadError::InvalidFunctionReference);
                    }
                    idx = entry.index;
                }
                RefKind::Assembly => {
                    let arguments = self.collect_function_type_args(env, idx)?;
                    let la = LoadingArguments {
                        assembly: env.assembly.to_string(),
                        id: entry.index,
                        arguments,
                    };
                    return self.load_function_internal(&la).map(Some);
                }
                RefKind::Import => {
                    let catalog = Arc::clone(&self.catalog);
                    let a = catalog.assembly(env.assembly)?;
                    let import = a
                        .import_functions
                        .get(entry.index)
                        .ok_or(LoadError::InvalidFunctionReference)?;
                    let (asm, id) = catalog
                        .find_export_function(&import.assembly, &import.name, import.arity)
                        .ok_or_else(|| LoadError::program("Import function not found"))?;
                    let arguments = self.collect_function_type_args(env, idx)?;
                    if let Some(n) = import.arity {
                        if arguments.len() != n {
                            return Err(LoadError::InvalidFunctionReference);
                        }
                    }
                    let la = LoadingArguments {
                        assembly: asm,
                        id,
                        arguments,
                    };
                    return self.load_function_internal(&la).map(Some);
                }
                RefKind::CloneType => return Ok(None),
                _ => return Err(LoadError::InvalidFunctionReference),
            }
        }
    }

    fn resolve_type_import(
        &self,
        assembly: &str,
        index: usize,
    ) -> Result<(String, usize, Option<usize>)> {
        let a = self.catalog.assembly(assembly)?;
        let import = a
            .import_types
            .get(index)
            .ok_or(LoadError::InvalidTypeReference)?;
        let (asm, id) = self
            .catalog
            .find_export_type(&import.assembly, &import.name, import.arity)
            .ok_or_else(|| LoadError::program("Import type not found"))?;
        Ok((asm, id, import.arity))
    }

    /// Collects the argument list following entry `head`: an optional
    /// `Segment` marker, argument entries, then `ListEnd`.
    fn collect_type_args(&mut self, env: &RefEnv<'_>, head: usize) -> Result<Vec<TypeId>> {
        let entries = &env.decl.types.entries;
        let mut out = Vec::new();
        let mut i = head + 1;
        let mut seen_segment = false;
        loop {
            let entry = *entries.get(i).ok_or(LoadError::InvalidTypeReference)?;
            match entry.kind {
                RefKind::ListEnd => break,
                RefKind::Segment => {
                    if seen_segment {
                        return Err(LoadError::InvalidTypeReference);
                    }
                    seen_segment = true;
                    i += 1;
                }
                RefKind::Clone | RefKind::SelfType | RefKind::Argument => {
                    let t = self
                        .ref_type(env, i)?
                        .ok_or(LoadError::InvalidTypeReference)?;
                    out.push(t);
                    let has_seg = entry.kind == RefKind::Argument
                        && matches!(
                            env.decl.types.entries.get(i + 1).map(|e| e.kind),
                            Some(RefKind::ArgumentSeg)
                        );
                    i += if has_seg { 2 } else { 1 };
                }
                _ => return Err(LoadError::InvalidTypeReference),
            }
        }
        Ok(out)
    }

    /// Generic arguments of a function reference are `CloneType` entries
    /// pointing into the sibling type list.
    fn collect_function_type_args(&mut self, env: &RefEnv<'_>, head: usize) -> Result<Vec<TypeId>> {
        let entries = &env.decl.functions.entries;
        let mut out = Vec::new();
        let mut i = head + 1;
        let mut seen_segment = false;
        loop {
            let entry = *entries
                .get(i)
                .ok_or(LoadError::InvalidFunctionReference)?;
            match entry.kind {
                RefKind::ListEnd => break,
                RefKind::Segment => {
                    if seen_segment {
                        return Err(LoadError::InvalidFunctionReference);
                    }
                    seen_segment = true;
                    i += 1;
                }
                RefKind::CloneType => {
                    let t = self
                        .ref_type(env, entry.index)?
                        .ok_or(LoadError::InvalidTypeReference)?;
                    out.push(t);
                    i += 1;
                }
                _ => {
                    return Err(LoadError::program("Invalid generic function argument"));
                }
            }
        }
        Ok(out)
    }

    // ----- subtype navigation -----

    /// Fully resolves a named subtype; `Ok(None)` when the parent declares
    /// no member of that name.
    pub(crate) fn load_subtype(&mut self, sub: &SubtypeArguments) -> Result<Option<TypeId>> {
        match self.find_subtype(sub)? {
            None => Ok(None),
            Some(SubtypeResolution::Loaded(t)) => Ok(Some(t)),
            Some(SubtypeResolution::Instantiate(la)) => {
                self.load_type_internal(&la, None).map(Some)
            }
        }
    }

    /// Resolves a named subtype up to (but not including) instantiating
    /// its head, so callers can pre-check generic arguments first.
    pub(crate) fn find_subtype(
        &mut self,
        sub: &SubtypeArguments,
    ) -> Result<Option<SubtypeResolution>> {
        if self.session.loading_subtypes.iter().any(|s| s == sub) {
            return Err(LoadError::CyclicTypeDependence);
        }
        self.session.loading_subtypes.push(sub.clone());
        let result = if self.session.live_count() > self.loading_limit {
            Err(LoadError::LoadingLimitExceeded)
        } else {
            self.find_subtype_inner(sub)
        };
        self.session.loading_subtypes.pop();
        result
    }

    fn find_subtype_inner(&mut self, sub: &SubtypeArguments) -> Result<Option<SubtypeResolution>> {
        let catalog = Arc::clone(&self.catalog);
        let parent_args = self.type_view(sub.parent).args.clone();
        let tt = catalog.type_template(&parent_args.assembly, parent_args.id)?;
        let Some(member) = tt.public_subtypes.iter().find(|m| m.name == sub.name) else {
            return Ok(None);
        };
        let env = RefEnv::for_subtype(sub.parent, &parent_args, &tt.generic, &sub.arguments);

        // Inspect the head so instantiations can be returned unloaded.
        let entries = &tt.generic.types.entries;
        let mut idx = member.id;
        let mut hops = 0usize;
        loop {
            let entry = *entries.get(idx).ok_or(LoadError::InvalidTypeReference)?;
            match entry.kind {
                RefKind::Clone => {
                    hops += 1;
                    if hops > entries.len() {
                        return Err(LoadError::InvalidTypeReference);
                    }
                    idx = entry.index;
                }
                RefKind::Assembly => {
                    let arguments = self.collect_type_args(&env, idx)?;
                    return Ok(Some(SubtypeResolution::Instantiate(LoadingArguments {
                        assembly: env.assembly.to_string(),
                        id: entry.index,
                        arguments,
                    })));
                }
                RefKind::Import => {
                    let (asm, id, arity) = self.resolve_type_import(env.assembly, entry.index)?;
                    let arguments = self.collect_type_args(&env, idx)?;
                    if let Some(n) = arity {
                        if arguments.len() != n {
                            return Err(LoadError::InvalidTypeReference);
                        }
                    }
                    return Ok(Some(SubtypeResolution::Instantiate(LoadingArguments {
                        assembly: asm,
                        id,
                        arguments,
                    })));
                }
                _ => {
                    let t = self
                        .ref_type(&env, idx)?
                        .ok_or(LoadError::InvalidTypeReference)?;
                    return Ok(Some(SubtypeResolution::Loaded(t)));
                }
            }
        }
    }

    // ----- constants -----

    pub(crate) fn load_import_constant(&self, assembly: &str, index: usize) -> Result<u32> {
        let a = self.catalog.assembly(assembly)?;
        let info = a
            .import_constants
            .get(index)
            .ok_or_else(|| LoadError::program("Invalid constant import reference"))?;
        if let Some(n) = info.arity {
            if n != 0 {
                return Err(LoadError::program("Invalid constant import"));
            }
        }
        self.catalog
            .find_export_constant(&info.assembly, &info.name)
            .ok_or_else(|| LoadError::program("Constant export not found"))
    }
}
