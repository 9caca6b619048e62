//! The constraint engine.
//!
//! Generic arguments are checked against a declaration's constraints by
//! rewriting both sides into constraint terms: a sum of `Fail`, an
//! undetermined placeholder (`Any`), an uninstantiated generic form, a
//! symbolic subtype navigation, or a concrete runtime type. A deduction
//! loop unifies terms until no placeholder remains, then each constraint
//! kind runs its final check. Everything here lives for a single check
//! invocation.

use std::sync::Arc;

use log::trace;
use silica_assembly::refs::{ConstraintKind, GenericConstraint, GenericDecl, RefKind};

use crate::entities::{LoadingArguments, SubtypeArguments, TypeId};
use crate::error::{LoadError, Result};
use crate::pipeline::LoaderCore;
use crate::resolver::{argument_position, RefEnv, SubtypeResolution};

type TermId = usize;

#[derive(Debug, Clone, PartialEq)]
enum TermKind {
    Fail,
    Any { slot: usize },
    Generic { assembly: String, id: usize },
    Subtype { name: String },
    Rt { ty: TypeId },
}

#[derive(Debug, Clone)]
struct Term {
    kind: TermKind,
    args: Vec<TermId>,
    try_constraint: bool,
}

enum UndoEntry {
    Term { id: TermId, kind: TermKind },
    Slot { slot: usize },
}

/// Identity of the constraint declaration a cache was built from; equal
/// sources plus equal arguments up the ancestor chain mean a circular
/// constraint.
#[derive(Debug, Clone, PartialEq)]
enum SourceKey {
    Root { index: usize },
    Trait { assembly: String, id: usize, index: usize },
    Export,
}

#[derive(Debug, Clone)]
struct TraitFieldSlot {
    ty: TermId,
    ty_in_target: Option<TermId>,
}

#[derive(Debug, Clone)]
struct Overload {
    fn_args: Vec<TermId>,
    ret: Option<TermId>,
    params: Vec<TermId>,
    assembly: String,
    template: usize,
}

#[derive(Debug, Clone)]
struct TraitFunctionSlot {
    ret: Option<TermId>,
    params: Vec<TermId>,
    overloads: Vec<Overload>,
}

struct Cache {
    parent: Option<usize>,
    source: SourceKey,
    kind: ConstraintKind,
    trait_index: usize,
    src_assembly: String,
    check_arguments: Vec<TermId>,
    target: TermId,
    arguments: Vec<TermId>,
    children: Vec<usize>,
    trait_ref: Option<(String, usize)>,
    trait_cache_created: bool,
    trait_member_resolved: bool,
    trait_fields: Vec<TraitFieldSlot>,
    trait_functions: Vec<TraitFunctionSlot>,
}

/// Context for building terms out of a constraint's own reference list.
struct ArgCtx<'a> {
    constraint: &'a GenericConstraint,
    src_assembly: &'a str,
    check_args: &'a [TermId],
    check_target: TermId,
}

struct ConstraintSolver {
    terms: Vec<Term>,
    slots: Vec<Option<TypeId>>,
    undo: Vec<UndoEntry>,
    levels: Vec<usize>,
    caches: Vec<Cache>,
}

impl LoaderCore {
    /// Arity plus constraint check of one argument vector. `Ok(None)`
    /// means the arguments are legitimately rejected; on success the
    /// constraint-export table for the owner entity is returned.
    pub(crate) fn check_generic_arguments(
        &mut self,
        src_assembly: &str,
        decl: &GenericDecl,
        args: &LoadingArguments,
    ) -> Result<Option<Vec<(String, TypeId)>>> {
        if decl.param_count != args.arguments.len() {
            return Ok(None);
        }
        self.check_constraints(src_assembly, decl, &args.arguments)
    }

    /// Checks every constraint of `decl` under `args`.
    pub(crate) fn check_constraints(
        &mut self,
        src_assembly: &str,
        decl: &GenericDecl,
        args: &[TypeId],
    ) -> Result<Option<Vec<(String, TypeId)>>> {
        let mut exports = Vec::new();
        for (index, constraint) in decl.constraints.iter().enumerate() {
            let mut solver = ConstraintSolver::new();
            let cargs: Vec<TermId> = args.iter().map(|&t| solver.rt_term(t)).collect();
            let fail = solver.fail_term();
            let cache = solver.create_cache(
                self,
                constraint,
                src_assembly,
                cargs,
                fail,
                SourceKey::Root { index },
                None,
            )?;
            let ok = solver.check_cached(self, cache)?;
            trace!("constraint {} of {}: {}", index, src_assembly, ok);
            if !ok {
                return Ok(None);
            }
            if !constraint.export_name.is_empty() {
                solver.collect_exports(self, cache, &constraint.export_name, &mut exports)?;
            }
        }
        Ok(Some(exports))
    }
}

impl ConstraintSolver {
    fn new() -> Self {
        ConstraintSolver {
            terms: Vec::new(),
            slots: Vec::new(),
            undo: Vec::new(),
            levels: Vec::new(),
            caches: Vec::new(),
        }
    }

    // ----- terms -----

    fn push_term(&mut self, kind: TermKind, args: Vec<TermId>) -> TermId {
        self.terms.push(Term {
            kind,
            args,
            try_constraint: false,
        });
        self.terms.len() - 1
    }

    fn rt_term(&mut self, ty: TypeId) -> TermId {
        self.push_term(TermKind::Rt { ty }, Vec::new())
    }

    fn fail_term(&mut self) -> TermId {
        self.push_term(TermKind::Fail, Vec::new())
    }

    fn any_term(&mut self) -> TermId {
        let slot = self.slots.len();
        self.slots.push(None);
        self.push_term(TermKind::Any { slot }, Vec::new())
    }

    fn determined(&self, t: TermId) -> Option<TypeId> {
        match self.terms[t].kind {
            TermKind::Rt { ty } => Some(ty),
            _ => None,
        }
    }

    fn deduct(&mut self, t: TermId, kind: TermKind) {
        let old = std::mem::replace(&mut self.terms[t].kind, kind);
        self.undo.push(UndoEntry::Term { id: t, kind: old });
    }

    fn set_slot(&mut self, slot: usize, ty: TypeId) {
        self.undo.push(UndoEntry::Slot { slot });
        self.slots[slot] = Some(ty);
    }

    fn start_backtrack(&mut self) -> usize {
        self.levels.push(self.undo.len());
        self.levels.len() - 1
    }

    fn backtrack(&mut self, level: usize) {
        let mark = self.levels[level];
        while self.undo.len() > mark {
            match self.undo.pop() {
                Some(UndoEntry::Term { id, kind }) => self.terms[id].kind = kind,
                Some(UndoEntry::Slot { slot }) => self.slots[slot] = None,
                None => break,
            }
        }
        self.levels.truncate(level);
    }

    fn is_undetermined(&self, t: TermId) -> bool {
        match &self.terms[t].kind {
            TermKind::Rt { .. } | TermKind::Fail => false,
            TermKind::Any { slot } => self.slots[*slot].is_none(),
            TermKind::Generic { .. } | TermKind::Subtype { .. } => self.terms[t]
                .args
                .iter()
                .any(|&a| self.is_undetermined(a)),
        }
    }

    // ----- term construction: constraint reference lists -----

    fn construct_argument_term(
        &mut self,
        core: &mut LoaderCore,
        ctx: &ArgCtx<'_>,
        index: usize,
        depth: usize,
    ) -> Result<TermId> {
        let list = &ctx.constraint.type_refs;
        if depth > list.entries.len() {
            return Err(LoadError::InvalidTypeReference);
        }
        let entry = *list
            .entries
            .get(index)
            .ok_or(LoadError::InvalidTypeReference)?;
        match entry.kind {
            RefKind::Any => Ok(self.any_term()),
            RefKind::Try => {
                let inner = self.construct_argument_term(core, ctx, entry.index, depth + 1)?;
                self.terms[inner].try_constraint = true;
                Ok(inner)
            }
            RefKind::Clone => self.construct_argument_term(core, ctx, entry.index, depth + 1),
            RefKind::Argument => ctx
                .check_args
                .get(entry.index)
                .copied()
                .ok_or(LoadError::InvalidTypeReference),
            RefKind::SelfType => {
                if self.terms[ctx.check_target].kind == TermKind::Fail {
                    return Err(LoadError::InvalidTypeReference);
                }
                Ok(ctx.check_target)
            }
            RefKind::Assembly => {
                let args = self.collect_argument_terms(core, ctx, index, depth)?;
                Ok(self.push_term(
                    TermKind::Generic {
                        assembly: ctx.src_assembly.to_string(),
                        id: entry.index,
                    },
                    args,
                ))
            }
            RefKind::Import => {
                let catalog = Arc::clone(&core.catalog);
                let a = catalog.assembly(ctx.src_assembly)?;
                let import = a
                    .import_types
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?;
                let (asm, id) = catalog
                    .find_export_type(&import.assembly, &import.name, import.arity)
                    .ok_or_else(|| LoadError::program("Import type not found"))?;
                let args = self.collect_argument_terms(core, ctx, index, depth)?;
                if let Some(n) = import.arity {
                    if args.len() != n {
                        return Err(LoadError::InvalidTypeReference);
                    }
                }
                Ok(self.push_term(TermKind::Generic { assembly: asm, id }, args))
            }
            RefKind::Subtype => {
                let name = list
                    .names
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?
                    .clone();
                let args = self.collect_argument_terms(core, ctx, index, depth)?;
                if args.is_empty() {
                    return Err(LoadError::InvalidTypeReference);
                }
                Ok(self.push_term(TermKind::Subtype { name }, args))
            }
            _ => Err(LoadError::InvalidTypeReference),
        }
    }

    fn collect_argument_terms(
        &mut self,
        core: &mut LoaderCore,
        ctx: &ArgCtx<'_>,
        head: usize,
        depth: usize,
    ) -> Result<Vec<TermId>> {
        let entries = &ctx.constraint.type_refs.entries;
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
                    out.push(self.construct_argument_term(core, ctx, i, depth + 1)?);
                    let has_seg = entry.kind == RefKind::Argument
                        && matches!(
                            entries.get(i + 1).map(|e| e.kind),
                            Some(RefKind::ArgumentSeg)
                        );
                    i += if has_seg { 2 } else { 1 };
                }
                _ => return Err(LoadError::InvalidTypeReference),
            }
        }
        Ok(out)
    }

    // ----- term construction: trait reference lists -----

    fn construct_trait_term(
        &mut self,
        core: &mut LoaderCore,
        cache: usize,
        index: usize,
        depth: usize,
    ) -> Result<TermId> {
        let (tasm, tid) = self.trait_ref(cache)?;
        let catalog = Arc::clone(&core.catalog);
        let tr = catalog.trait_template(&tasm, tid)?;
        let list = &tr.generic.types;
        if depth > list.entries.len() {
            return Err(LoadError::InvalidTypeReference);
        }
        let entry = *list
            .entries
            .get(index)
            .ok_or(LoadError::InvalidTypeReference)?;
        match entry.kind {
            RefKind::Clone => self.construct_trait_term(core, cache, entry.index, depth + 1),
            RefKind::Argument => {
                let flat = argument_position(&tr.generic, &list.entries, index)?;
                self.caches[cache]
                    .arguments
                    .get(flat)
                    .copied()
                    .ok_or(LoadError::InvalidTypeReference)
            }
            RefKind::SelfType => Ok(self.caches[cache].target),
            RefKind::Assembly => {
                let args = self.collect_trait_terms(core, cache, index, depth)?;
                Ok(self.push_term(
                    TermKind::Generic {
                        assembly: tasm,
                        id: entry.index,
                    },
                    args,
                ))
            }
            RefKind::Import => {
                let a = catalog.assembly(&tasm)?;
                let import = a
                    .import_types
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?;
                let (asm, id) = catalog
                    .find_export_type(&import.assembly, &import.name, import.arity)
                    .ok_or_else(|| LoadError::program("Import type not found"))?;
                let args = self.collect_trait_terms(core, cache, index, depth)?;
                if let Some(n) = import.arity {
                    if args.len() != n {
                        return Err(LoadError::InvalidTypeReference);
                    }
                }
                Ok(self.push_term(TermKind::Generic { assembly: asm, id }, args))
            }
            RefKind::Subtype => {
                let name = list
                    .names
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?
                    .clone();
                let args = self.collect_trait_terms(core, cache, index, depth)?;
                if args.is_empty() {
                    return Err(LoadError::InvalidTypeReference);
                }
                Ok(self.push_term(TermKind::Subtype { name }, args))
            }
            _ => Err(LoadError::InvalidTypeReference),
        }
    }

    fn collect_trait_terms(
        &mut self,
        core: &mut LoaderCore,
        cache: usize,
        head: usize,
        depth: usize,
    ) -> Result<Vec<TermId>> {
        let (tasm, tid) = self.trait_ref(cache)?;
        let catalog = Arc::clone(&core.catalog);
        let tr = catalog.trait_template(&tasm, tid)?;
        let entries = &tr.generic.types.entries;
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
                    out.push(self.construct_trait_term(core, cache, i, depth + 1)?);
                    let has_seg = entry.kind == RefKind::Argument
                        && matches!(
                            entries.get(i + 1).map(|e| e.kind),
                            Some(RefKind::ArgumentSeg)
                        );
                    i += if has_seg { 2 } else { 1 };
                }
                _ => return Err(LoadError::InvalidTypeReference),
            }
        }
        Ok(out)
    }

    fn trait_ref(&self, cache: usize) -> Result<(String, usize)> {
        self.caches[cache]
            .trait_ref
            .clone()
            .ok_or_else(|| LoadError::program("Invalid trait reference"))
    }

    // ----- term construction: ordinary reference lists -----

    /// Builds a term from an entry of a template's own type list, with the
    /// generic arguments supplied as terms. Used to probe function
    /// signatures during trait matching.
    fn construct_reflist_term(
        &mut self,
        core: &mut LoaderCore,
        decl: &GenericDecl,
        src_assembly: &str,
        index: usize,
        args: &[TermId],
        self_type: Option<TypeId>,
        depth: usize,
    ) -> Result<TermId> {
        let list = &decl.types;
        if depth > list.entries.len() {
            return Err(LoadError::InvalidTypeReference);
        }
        let entry = *list
            .entries
            .get(index)
            .ok_or(LoadError::InvalidTypeReference)?;
        match entry.kind {
            RefKind::Empty => Ok(self.fail_term()),
            RefKind::Clone => self.construct_reflist_term(
                core,
                decl,
                src_assembly,
                entry.index,
                args,
                self_type,
                depth + 1,
            ),
            RefKind::Argument => {
                let flat = argument_position(decl, &list.entries, index)?;
                args.get(flat)
                    .copied()
                    .ok_or(LoadError::InvalidTypeReference)
            }
            RefKind::SelfType => Ok(match self_type {
                Some(t) => self.rt_term(t),
                None => self.fail_term(),
            }),
            RefKind::Assembly => {
                let list_args =
                    self.collect_reflist_terms(core, decl, src_assembly, index, args, self_type, depth)?;
                Ok(self.push_term(
                    TermKind::Generic {
                        assembly: src_assembly.to_string(),
                        id: entry.index,
                    },
                    list_args,
                ))
            }
            RefKind::Import => {
                let catalog = Arc::clone(&core.catalog);
                let a = catalog.assembly(src_assembly)?;
                let import = a
                    .import_types
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?;
                let (asm, id) = catalog
                    .find_export_type(&import.assembly, &import.name, import.arity)
                    .ok_or_else(|| LoadError::program("Import type not found"))?;
                let list_args =
                    self.collect_reflist_terms(core, decl, src_assembly, index, args, self_type, depth)?;
                if let Some(n) = import.arity {
                    if list_args.len() != n {
                        return Err(LoadError::InvalidTypeReference);
                    }
                }
                Ok(self.push_term(TermKind::Generic { assembly: asm, id }, list_args))
            }
            RefKind::Subtype => {
                let name = list
                    .names
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?
                    .clone();
                let list_args =
                    self.collect_reflist_terms(core, decl, src_assembly, index, args, self_type, depth)?;
                if list_args.is_empty() {
                    return Err(LoadError::InvalidTypeReference);
                }
                Ok(self.push_term(TermKind::Subtype { name }, list_args))
            }
            RefKind::Constraint => {
                let name = list
                    .names
                    .get(entry.index)
                    .ok_or(LoadError::InvalidTypeReference)?
                    .clone();
                self.constraint_export_term(core, decl, src_assembly, &name, args, self_type)
            }
            _ => Err(LoadError::InvalidTypeReference),
        }
    }

    fn collect_reflist_terms(
        &mut self,
        core: &mut LoaderCore,
        decl: &GenericDecl,
        src_assembly: &str,
        head: usize,
        args: &[TermId],
        self_type: Option<TypeId>,
        depth: usize,
    ) -> Result<Vec<TermId>> {
        let entries = &decl.types.entries;
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
                    out.push(self.construct_reflist_term(
                        core,
                        decl,
                        src_assembly,
                        i,
                        args,
                        self_type,
                        depth + 1,
                    )?);
                    let has_seg = entry.kind == RefKind::Argument
                        && matches!(
                            entries.get(i + 1).map(|e| e.kind),
                            Some(RefKind::ArgumentSeg)
                        );
                    i += if has_seg { 2 } else { 1 };
                }
                _ => return Err(LoadError::InvalidTypeReference),
            }
        }
        Ok(out)
    }

    /// A `Constraint` reference met while probing a signature: rebuild the
    /// named constraint's deduction target (or a trait type alias) as a
    /// term under the same argument terms.
    fn constraint_export_term(
        &mut self,
        core: &mut LoaderCore,
        decl: &GenericDecl,
        src_assembly: &str,
        full_name: &str,
        args: &[TermId],
        self_type: Option<TypeId>,
    ) -> Result<TermId> {
        let (cname, member) = match full_name.split_once('/') {
            Some((c, m)) => (c, m),
            None => (full_name, ".target"),
        };
        let constraint = decl
            .constraints
            .iter()
            .find(|c| c.export_name == cname)
            .ok_or(LoadError::InvalidTypeReference)?;
        let check_target = match self_type {
            Some(t) => self.rt_term(t),
            None => self.fail_term(),
        };
        let ctx = ArgCtx {
            constraint,
            src_assembly,
            check_args: args,
            check_target,
        };
        if member == ".target" {
            return self.construct_argument_term(core, &ctx, constraint.target, 0);
        }
        if !matches!(
            constraint.kind,
            ConstraintKind::Trait | ConstraintKind::TraitImport
        ) {
            return Err(LoadError::InvalidTypeReference);
        }
        let cache = self.create_cache(
            core,
            constraint,
            src_assembly,
            args.to_vec(),
            check_target,
            SourceKey::Export,
            None,
        )?;
        let (tasm, tid) = self.trait_ref(cache)?;
        let catalog = Arc::clone(&core.catalog);
        let tr = catalog.trait_template(&tasm, tid)?;
        let export = tr
            .types
            .iter()
            .find(|t| t.export_name == member)
            .ok_or(LoadError::InvalidTypeReference)?;
        self.construct_trait_term(core, cache, export.type_ref, 0)
    }

    // ----- cache construction -----

    fn create_cache(
        &mut self,
        core: &mut LoaderCore,
        constraint: &GenericConstraint,
        src_assembly: &str,
        check_args: Vec<TermId>,
        check_target: TermId,
        source: SourceKey,
        parent: Option<usize>,
    ) -> Result<usize> {
        let target = {
            let ctx = ArgCtx {
                constraint,
                src_assembly,
                check_args: &check_args,
                check_target,
            };
            self.construct_argument_term(core, &ctx, constraint.target, 0)?
        };
        let mut arguments = Vec::with_capacity(constraint.arguments.len());
        for &a in &constraint.arguments {
            let ctx = ArgCtx {
                constraint,
                src_assembly,
                check_args: &check_args,
                check_target,
            };
            arguments.push(self.construct_argument_term(core, &ctx, a, 0)?);
        }
        let idx = self.caches.len();
        self.caches.push(Cache {
            parent,
            source,
            kind: constraint.kind,
            trait_index: constraint.index,
            src_assembly: src_assembly.to_string(),
            check_arguments: check_args,
            target,
            arguments,
            children: Vec::new(),
            trait_ref: None,
            trait_cache_created: false,
            trait_member_resolved: false,
            trait_fields: Vec::new(),
            trait_functions: Vec::new(),
        });
        if matches!(
            constraint.kind,
            ConstraintKind::Trait | ConstraintKind::TraitImport
        ) {
            self.init_trait(core, idx)?;
        }
        Ok(idx)
    }

    fn init_trait(&mut self, core: &mut LoaderCore, idx: usize) -> Result<()> {
        let kind = self.caches[idx].kind;
        let index = self.caches[idx].trait_index;
        let src = self.caches[idx].src_assembly.clone();
        let catalog = Arc::clone(&core.catalog);
        let resolved = match kind {
            ConstraintKind::Trait => {
                if index >= catalog.assembly(&src)?.traits.len() {
                    return Err(LoadError::program("Invalid trait reference"));
                }
                (src, index)
            }
            ConstraintKind::TraitImport => {
                let a = catalog.assembly(&src)?;
                let import = a
                    .import_traits
                    .get(index)
                    .ok_or_else(|| LoadError::program("Invalid trait reference"))?;
                catalog
                    .find_export_trait(&import.assembly, &import.name)
                    .ok_or_else(|| LoadError::program("Invalid trait reference"))?
            }
            _ => unreachable!("init_trait on a non-trait constraint"),
        };
        self.caches[idx].trait_ref = Some(resolved);
        Ok(())
    }

    /// Creates sub-caches for the trait's own constraints and terms for
    /// its required members. A sub-cache structurally equal to one of its
    /// ancestors is a circular constraint (a program error).
    fn ensure_sub_caches(&mut self, core: &mut LoaderCore, idx: usize) -> Result<()> {
        if self.caches[idx].trait_cache_created {
            return Ok(());
        }
        let (tasm, tid) = self.trait_ref(idx)?;
        let catalog = Arc::clone(&core.catalog);
        let tr = catalog.trait_template(&tasm, tid)?;

        if self.caches[idx].arguments.len() != tr.generic.param_count {
            return Err(LoadError::InvalidGenericArguments);
        }
        let args = self.caches[idx].arguments.clone();
        let target = self.caches[idx].target;

        for (ci, constraint) in tr.generic.constraints.iter().enumerate() {
            let child = self.create_cache(
                core,
                constraint,
                &tasm,
                args.clone(),
                target,
                SourceKey::Trait {
                    assembly: tasm.clone(),
                    id: tid,
                    index: ci,
                },
                Some(idx),
            )?;
            self.caches[idx].children.push(child);

            let mut ancestor = Some(idx);
            while let Some(p) = ancestor {
                if self.caches_equal(core, p, child)? {
                    return Err(LoadError::CircularConstraintCheck);
                }
                ancestor = self.caches[p].parent;
            }
        }

        let mut fields = Vec::with_capacity(tr.fields.len());
        for f in &tr.fields {
            let ty = self.construct_trait_term(core, idx, f.type_ref, 0)?;
            fields.push(TraitFieldSlot {
                ty,
                ty_in_target: None,
            });
        }
        let mut functions = Vec::with_capacity(tr.functions.len());
        for f in &tr.functions {
            let ret = match f.return_type {
                Some(r) => Some(self.construct_trait_term(core, idx, r, 0)?),
                None => None,
            };
            let mut params = Vec::with_capacity(f.parameters.len());
            for &p in &f.parameters {
                params.push(self.construct_trait_term(core, idx, p, 0)?);
            }
            functions.push(TraitFunctionSlot {
                ret,
                params,
                overloads: Vec::new(),
            });
        }
        let cache = &mut self.caches[idx];
        cache.trait_fields = fields;
        cache.trait_functions = functions;
        cache.trait_cache_created = true;
        Ok(())
    }

    fn caches_equal(&mut self, core: &mut LoaderCore, a: usize, b: usize) -> Result<bool> {
        if self.caches[a].source != self.caches[b].source {
            return Ok(false);
        }
        let aa = self.caches[a].check_arguments.clone();
        let bb = self.caches[b].check_arguments.clone();
        if aa.len() != bb.len() {
            return Ok(false);
        }
        for (&x, &y) in aa.iter().zip(bb.iter()) {
            if !self.terms_equal(core, x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn terms_equal(&mut self, core: &mut LoaderCore, a: TermId, b: TermId) -> Result<bool> {
        self.simplify(core, a)?;
        self.simplify(core, b)?;
        let (ka, kb) = (self.terms[a].kind.clone(), self.terms[b].kind.clone());
        let same_head = match (&ka, &kb) {
            (TermKind::Fail, TermKind::Fail) => return Ok(true),
            (TermKind::Any { slot: sa }, TermKind::Any { slot: sb }) => return Ok(sa == sb),
            (TermKind::Rt { ty: ta }, TermKind::Rt { ty: tb }) => return Ok(ta == tb),
            (
                TermKind::Generic {
                    assembly: aa,
                    id: ia,
                },
                TermKind::Generic {
                    assembly: ab,
                    id: ib,
                },
            ) => aa == ab && ia == ib,
            (TermKind::Subtype { name: na }, TermKind::Subtype { name: nb }) => na == nb,
            _ => false,
        };
        if !same_head {
            return Ok(false);
        }
        let argsa = self.terms[a].args.clone();
        let argsb = self.terms[b].args.clone();
        if argsa.len() != argsb.len() {
            return Ok(false);
        }
        for (&x, &y) in argsa.iter().zip(argsb.iter()) {
            if !self.terms_equal(core, x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ----- simplification -----

    /// Folds a term toward `Rt` when all children are concrete. A
    /// `try_constraint` term whose argument check fails deducts to `Fail`
    /// instead of propagating the failure.
    fn simplify(&mut self, core: &mut LoaderCore, t: TermId) -> Result<()> {
        match self.terms[t].kind.clone() {
            TermKind::Rt { .. } | TermKind::Fail => Ok(()),
            TermKind::Any { slot } => {
                if let Some(ty) = self.slots[slot] {
                    self.deduct(t, TermKind::Rt { ty });
                }
                Ok(())
            }
            TermKind::Generic { assembly, id } => {
                let Some(resolved) = self.simplify_children(core, t)? else {
                    return Ok(());
                };
                let la = LoadingArguments {
                    assembly,
                    id,
                    arguments: resolved,
                };
                if self.terms[t].try_constraint {
                    let catalog = Arc::clone(&core.catalog);
                    let tt = catalog.type_template(&la.assembly, la.id)?;
                    match core.check_generic_arguments(&la.assembly, &tt.generic, &la)? {
                        None => self.deduct(t, TermKind::Fail),
                        Some(exports) => {
                            let ty = core.load_type_internal(&la, Some(exports))?;
                            self.deduct(t, TermKind::Rt { ty });
                        }
                    }
                } else {
                    let ty = core.load_type_internal(&la, None)?;
                    self.deduct(t, TermKind::Rt { ty });
                }
                Ok(())
            }
            TermKind::Subtype { name } => {
                let Some(resolved) = self.simplify_children(core, t)? else {
                    return Ok(());
                };
                let mut resolved = resolved;
                let parent = resolved.remove(0);
                let sub = SubtypeArguments {
                    parent,
                    name,
                    arguments: resolved,
                };
                let try_constraint = self.terms[t].try_constraint;
                match core.find_subtype(&sub)? {
                    None => {
                        if try_constraint {
                            self.deduct(t, TermKind::Fail);
                            Ok(())
                        } else {
                            Err(LoadError::program("Invalid subtype constraint"))
                        }
                    }
                    Some(SubtypeResolution::Loaded(ty)) => {
                        self.deduct(t, TermKind::Rt { ty });
                        Ok(())
                    }
                    Some(SubtypeResolution::Instantiate(la)) => {
                        if try_constraint {
                            let catalog = Arc::clone(&core.catalog);
                            let tt = catalog.type_template(&la.assembly, la.id)?;
                            match core.check_generic_arguments(&la.assembly, &tt.generic, &la)? {
                                None => {
                                    self.deduct(t, TermKind::Fail);
                                    return Ok(());
                                }
                                Some(exports) => {
                                    let ty = core.load_type_internal(&la, Some(exports))?;
                                    self.deduct(t, TermKind::Rt { ty });
                                }
                            }
                            Ok(())
                        } else {
                            let ty = core.load_type_internal(&la, None)?;
                            self.deduct(t, TermKind::Rt { ty });
                            Ok(())
                        }
                    }
                }
            }
        }
    }

    /// Simplifies every child of `t`; `Ok(None)` when some child is still
    /// undetermined (a failing child deducts `t` itself to `Fail`).
    fn simplify_children(
        &mut self,
        core: &mut LoaderCore,
        t: TermId,
    ) -> Result<Option<Vec<TypeId>>> {
        let args = self.terms[t].args.clone();
        let mut resolved = Vec::with_capacity(args.len());
        for a in args {
            self.simplify(core, a)?;
            match self.terms[a].kind {
                TermKind::Rt { ty } => resolved.push(ty),
                TermKind::Fail => {
                    self.deduct(t, TermKind::Fail);
                    return Ok(None);
                }
                _ => return Ok(None),
            }
        }
        Ok(Some(resolved))
    }

    fn check_simplified(&mut self, core: &mut LoaderCore, t: TermId) -> Result<bool> {
        self.simplify(core, t)?;
        Ok(matches!(self.terms[t].kind, TermKind::Rt { .. }))
    }

    // ----- unification -----

    /// One deduction step toward making `a` and `b` the same type.
    /// Returns 1 when something was determined, 0 on no change, -1 when
    /// the two can never be equal.
    fn unify(&mut self, core: &mut LoaderCore, a: TermId, b: TermId) -> Result<i32> {
        self.simplify(core, a)?;
        self.simplify(core, b)?;
        let (ka, kb) = (self.terms[a].kind.clone(), self.terms[b].kind.clone());
        match (&ka, &kb) {
            (TermKind::Fail, _) | (_, TermKind::Fail) => Ok(-1),
            (TermKind::Any { slot }, TermKind::Rt { ty }) => {
                self.set_slot(*slot, *ty);
                Ok(1)
            }
            (TermKind::Rt { ty }, TermKind::Any { slot }) => {
                self.set_slot(*slot, *ty);
                Ok(1)
            }
            (TermKind::Any { .. }, _) | (_, TermKind::Any { .. }) => Ok(0),
            (TermKind::Subtype { .. }, _) | (_, TermKind::Subtype { .. }) => Ok(0),
            (TermKind::Rt { ty: ta }, TermKind::Rt { ty: tb }) => {
                Ok(if ta == tb { 0 } else { -1 })
            }
            (
                TermKind::Generic {
                    assembly: aa,
                    id: ia,
                },
                TermKind::Generic {
                    assembly: ab,
                    id: ib,
                },
            ) => {
                let argsa = self.terms[a].args.clone();
                let argsb = self.terms[b].args.clone();
                if aa != ab || ia != ib || argsa.len() != argsb.len() {
                    return Ok(-1);
                }
                for (&x, &y) in argsa.iter().zip(argsb.iter()) {
                    let r = self.unify(core, x, y)?;
                    if r != 0 {
                        return Ok(r);
                    }
                }
                Ok(0)
            }
            (TermKind::Rt { ty }, TermKind::Generic { .. }) => {
                self.unify_concrete_generic(core, *ty, b)
            }
            (TermKind::Generic { .. }, TermKind::Rt { ty }) => {
                self.unify_concrete_generic(core, *ty, a)
            }
        }
    }

    /// Unifies a concrete type against an uninstantiated generic form by
    /// walking the concrete type's own loading arguments.
    fn unify_concrete_generic(
        &mut self,
        core: &mut LoaderCore,
        concrete: TypeId,
        generic: TermId,
    ) -> Result<i32> {
        let (assembly, id) = match &self.terms[generic].kind {
            TermKind::Generic { assembly, id } => (assembly.clone(), *id),
            _ => return Ok(0),
        };
        let gargs = self.terms[generic].args.clone();
        let cargs = core.type_view(concrete).args.clone();
        if cargs.assembly != assembly || cargs.id != id || cargs.arguments.len() != gargs.len() {
            return Ok(-1);
        }
        for (&g, &c) in gargs.iter().zip(cargs.arguments.iter()) {
            let rt = self.rt_term(c);
            let r = self.unify(core, g, rt)?;
            if r != 0 {
                return Ok(r);
            }
        }
        Ok(0)
    }

    // ----- the check loop -----

    fn check_cached(&mut self, core: &mut LoaderCore, idx: usize) -> Result<bool> {
        loop {
            let undetermined = self.caches[idx]
                .arguments
                .clone()
                .iter()
                .any(|&a| self.is_undetermined(a))
                || self.is_undetermined(self.caches[idx].target);
            if !undetermined {
                break;
            }
            match self.try_determine(core, idx)? {
                1 => continue,
                _ => return Ok(false),
            }
        }
        self.check_determined(core, idx)
    }

    /// One deduction step for the cache; only `Same` and trait field
    /// matching drive deduction.
    fn try_determine(&mut self, core: &mut LoaderCore, idx: usize) -> Result<i32> {
        match self.caches[idx].kind {
            ConstraintKind::Exist | ConstraintKind::Base | ConstraintKind::Interface => Ok(0),
            ConstraintKind::Same => {
                if self.caches[idx].arguments.len() != 1 {
                    return Err(LoadError::program("Invalid constraint arguments"));
                }
                let a = self.caches[idx].arguments[0];
                let t = self.caches[idx].target;
                self.unify(core, a, t)
            }
            ConstraintKind::Trait | ConstraintKind::TraitImport => {
                self.ensure_sub_caches(core, idx)?;
                let resolved = self.try_resolve_members(core, idx)?;
                if resolved <= 0 {
                    return Ok(resolved);
                }
                // Sub-caches are deliberately not used for deduction:
                // placeholder-carrying trait-to-trait chains would grow
                // without being circular, so an unresolved placeholder
                // simply fails at this level.
                for i in 0..self.caches[idx].trait_fields.len() {
                    let slot = self.caches[idx].trait_fields[i].clone();
                    let Some(in_target) = slot.ty_in_target else {
                        continue;
                    };
                    let r = self.unify(core, in_target, slot.ty)?;
                    if r != 0 {
                        return Ok(r);
                    }
                }
                Ok(0)
            }
        }
    }

    /// Resolves the trait's required members against the (now concrete)
    /// target type. 1 = resolved, 0 = target still undetermined, -1 = a
    /// member is missing.
    fn try_resolve_members(&mut self, core: &mut LoaderCore, idx: usize) -> Result<i32> {
        if self.caches[idx].trait_member_resolved {
            return Ok(1);
        }
        let target = self.caches[idx].target;
        self.simplify(core, target)?;
        let Some(target_ty) = self.determined(target) else {
            return Ok(0);
        };

        let (tasm, tid) = self.trait_ref(idx)?;
        let catalog = Arc::clone(&core.catalog);
        let tr = catalog.trait_template(&tasm, tid)?;
        let target_args = core.type_view(target_ty).args.clone();
        let tt = catalog.type_template(&target_args.assembly, target_args.id)?;

        for i in 0..tr.fields.len() {
            let field_name = &tr.fields[i].name;
            let Some(member) = tt.public_fields.iter().find(|m| &m.name == field_name) else {
                return Ok(-1);
            };
            let fid = member.id;

            let loaded_field = core.type_view(target_ty).fields.get(fid).map(|f| f.ty);
            let in_target = match loaded_field {
                Some(fty) => self.rt_term(fty),
                None => {
                    // Field layout not computed yet (a reference type in
                    // flight); resolve the field type from the template.
                    let &type_ref = tt
                        .fields
                        .get(fid)
                        .ok_or(LoadError::InvalidTypeReference)?;
                    let env = RefEnv::for_type(target_ty, &target_args, &tt.generic);
                    let fty = core
                        .ref_type(&env, type_ref)?
                        .ok_or_else(|| LoadError::program("Invalid field type"))?;
                    self.rt_term(fty)
                }
            };
            self.caches[idx].trait_fields[i].ty_in_target = Some(in_target);
        }

        for i in 0..tr.functions.len() {
            let fn_name = tr.functions[i].name.clone();
            let member_ids: Vec<usize> = tt
                .public_functions
                .iter()
                .filter(|m| m.name == fn_name)
                .map(|m| m.id)
                .collect();
            let mut overloads = Vec::new();
            for member in member_ids {
                if let Some(o) =
                    self.load_overload(core, tt, &target_args, target_ty, member)?
                {
                    let slot = &self.caches[idx].trait_functions[i];
                    if o.params.len() == slot.params.len()
                        && o.ret.is_some() == slot.ret.is_some()
                    {
                        overloads.push(o);
                    }
                }
            }
            if overloads.is_empty() {
                return Ok(-1);
            }
            self.caches[idx].trait_functions[i].overloads = overloads;
        }

        self.caches[idx].trait_member_resolved = true;
        Ok(1)
    }

    /// Builds the signature terms of one member-function candidate. The
    /// candidate's generic arguments are the target's own arguments plus
    /// fresh placeholders for each additional position the reference
    /// names.
    fn load_overload(
        &mut self,
        core: &mut LoaderCore,
        tt: &silica_assembly::model::TypeTemplate,
        target_args: &LoadingArguments,
        target_ty: TypeId,
        fn_ref: usize,
    ) -> Result<Option<Overload>> {
        let entries = &tt.generic.functions.entries;
        let mut idx = fn_ref;
        let mut hops = 0usize;
        loop {
            let entry = *entries
                .get(idx)
                .ok_or(LoadError::InvalidFunctionReference)?;
            if entry.kind != RefKind::Clone {
                break;
            }
            hops += 1;
            if hops > entries.len() {
                return Err(LoadError::InvalidFunctionReference);
            }
            idx = entry.index;
        }
        let head = entries[idx];
        let (fasm, fid) = match head.kind {
            RefKind::Assembly => (target_args.assembly.clone(), head.index),
            RefKind::Import => {
                let catalog = Arc::clone(&core.catalog);
                let a = catalog.assembly(&target_args.assembly)?;
                let import = a
                    .import_functions
                    .get(head.index)
                    .ok_or(LoadError::InvalidFunctionReference)?;
                catalog
                    .find_export_function(&import.assembly, &import.name, import.arity)
                    .ok_or_else(|| LoadError::program("Import function not found"))?
            }
            _ => return Err(LoadError::InvalidFunctionReference),
        };

        let needed = self.function_type_args_needed(&tt.generic, idx)?;
        let mut type_args: Vec<TermId> = target_args
            .arguments
            .iter()
            .map(|&t| self.rt_term(t))
            .collect();
        while type_args.len() < needed {
            type_args.push(self.any_term());
        }

        let mut fn_args = Vec::new();
        let mut i = idx + 1;
        loop {
            let entry = *entries
                .get(i)
                .ok_or(LoadError::InvalidFunctionReference)?;
            match entry.kind {
                RefKind::ListEnd => break,
                RefKind::Segment => i += 1,
                RefKind::CloneType => {
                    fn_args.push(self.construct_reflist_term(
                        core,
                        &tt.generic,
                        &target_args.assembly,
                        entry.index,
                        &type_args,
                        Some(target_ty),
                        0,
                    )?);
                    i += 1;
                }
                _ => return Err(LoadError::InvalidFunctionReference),
            }
        }

        let catalog = Arc::clone(&core.catalog);
        let ft = catalog.function_template(&fasm, fid)?;
        let ret = match ft.return_type {
            Some(r) => Some(self.construct_reflist_term(
                core,
                &ft.generic,
                &fasm,
                r,
                &fn_args,
                None,
                0,
            )?),
            None => None,
        };
        let mut params = Vec::with_capacity(ft.parameters.len());
        for &p in &ft.parameters {
            params.push(self.construct_reflist_term(
                core,
                &ft.generic,
                &fasm,
                p,
                &fn_args,
                None,
                0,
            )?);
        }
        Ok(Some(Overload {
            fn_args,
            ret,
            params,
            assembly: fasm,
            template: fid,
        }))
    }

    /// Number of generic-argument positions a member-function reference
    /// needs: one past the highest argument index any of its generic
    /// arguments mentions.
    fn function_type_args_needed(&self, decl: &GenericDecl, head: usize) -> Result<usize> {
        let entries = &decl.functions.entries;
        let mut needed = 0usize;
        let mut i = head + 1;
        loop {
            let Some(entry) = entries.get(i) else { break };
            match entry.kind {
                RefKind::ListEnd => break,
                RefKind::Segment => {}
                RefKind::CloneType => {
                    needed = needed.max(self.type_args_needed(decl, entry.index, 0)?);
                }
                _ => break,
            }
            i += 1;
        }
        Ok(needed)
    }

    fn type_args_needed(&self, decl: &GenericDecl, index: usize, depth: usize) -> Result<usize> {
        let entries = &decl.types.entries;
        if depth > entries.len() {
            return Err(LoadError::InvalidTypeReference);
        }
        let entry = *entries
            .get(index)
            .ok_or(LoadError::InvalidTypeReference)?;
        match entry.kind {
            RefKind::Clone => self.type_args_needed(decl, entry.index, depth + 1),
            RefKind::Argument => Ok(argument_position(decl, entries, index)? + 1),
            RefKind::Assembly | RefKind::Import | RefKind::Subtype => {
                let mut needed = 0usize;
                let mut i = index + 1;
                loop {
                    let Some(next) = entries.get(i) else { break };
                    match next.kind {
                        RefKind::ListEnd => break,
                        RefKind::Segment => i += 1,
                        RefKind::Clone | RefKind::SelfType | RefKind::Argument => {
                            needed = needed.max(self.type_args_needed(decl, i, depth + 1)?);
                            let has_seg = next.kind == RefKind::Argument
                                && matches!(
                                    entries.get(i + 1).map(|e| e.kind),
                                    Some(RefKind::ArgumentSeg)
                                );
                            i += if has_seg { 2 } else { 1 };
                        }
                        _ => break,
                    }
                }
                Ok(needed)
            }
            _ => Ok(0),
        }
    }

    // ----- final checks -----

    fn check_determined(&mut self, core: &mut LoaderCore, idx: usize) -> Result<bool> {
        match self.caches[idx].kind {
            ConstraintKind::Exist => {
                if !self.caches[idx].arguments.is_empty() {
                    return Err(LoadError::program("Invalid constraint arguments"));
                }
                let target = self.caches[idx].target;
                self.check_simplified(core, target)
            }
            ConstraintKind::Same => {
                let (target, arg) = self.single_argument(idx)?;
                if !self.check_simplified(core, target)? || !self.check_simplified(core, arg)? {
                    return Ok(false);
                }
                Ok(self.determined(target) == self.determined(arg))
            }
            ConstraintKind::Base => {
                let (target, arg) = self.single_argument(idx)?;
                if !self.check_simplified(core, target)? || !self.check_simplified(core, arg)? {
                    return Ok(false);
                }
                let (t, b) = (self.require_rt(target)?, self.require_rt(arg)?);
                let mut seen = Vec::new();
                core.check_type_base(t, b, &mut seen)
            }
            ConstraintKind::Interface => {
                let (target, arg) = self.single_argument(idx)?;
                if !self.check_simplified(core, target)? || !self.check_simplified(core, arg)? {
                    return Ok(false);
                }
                let (t, b) = (self.require_rt(target)?, self.require_rt(arg)?);
                let mut seen = Vec::new();
                core.check_type_interface(t, b, &mut seen)
            }
            ConstraintKind::Trait | ConstraintKind::TraitImport => {
                self.check_trait_determined(core, idx)
            }
        }
    }

    fn single_argument(&self, idx: usize) -> Result<(TermId, TermId)> {
        if self.caches[idx].arguments.len() != 1 {
            return Err(LoadError::program("Invalid constraint arguments"));
        }
        Ok((self.caches[idx].target, self.caches[idx].arguments[0]))
    }

    fn require_rt(&self, t: TermId) -> Result<TypeId> {
        self.determined(t)
            .ok_or_else(|| LoadError::program("Invalid constraint arguments"))
    }

    /// Full structural trait check: sub-constraints, fields by name and
    /// type, then function matching with overload backtracking.
    fn check_trait_determined(&mut self, core: &mut LoaderCore, idx: usize) -> Result<bool> {
        self.ensure_sub_caches(core, idx)?;
        if self.try_resolve_members(core, idx)? != 1 {
            return Ok(false);
        }
        for child in self.caches[idx].children.clone() {
            if !self.check_cached(core, child)? {
                return Ok(false);
            }
        }
        for i in 0..self.caches[idx].trait_fields.len() {
            let slot = self.caches[idx].trait_fields[i].clone();
            if !self.check_simplified(core, slot.ty)? {
                return Ok(false);
            }
            let in_target = slot
                .ty_in_target
                .and_then(|t| self.determined(t));
            if in_target.is_none() || in_target != self.determined(slot.ty) {
                return Ok(false);
            }
        }
        self.match_trait_functions(core, idx, 0)
    }

    /// Depth-first search over overload choices for every required
    /// function; shared placeholders make earlier choices constrain later
    /// ones, so failures unwind through the backtrack log.
    fn match_trait_functions(&mut self, core: &mut LoaderCore, idx: usize, fi: usize) -> Result<bool> {
        if fi == self.caches[idx].trait_functions.len() {
            return Ok(true);
        }
        let slot = self.caches[idx].trait_functions[fi].clone();
        for overload in &slot.overloads {
            let level = self.start_backtrack();
            if self.try_overload(core, &slot, overload)?
                && self.match_trait_functions(core, idx, fi + 1)?
            {
                return Ok(true);
            }
            self.backtrack(level);
        }
        Ok(false)
    }

    /// A candidate matches when its signature unifies with the trait's,
    /// both sides simplify to equal runtime types, and the candidate's own
    /// declared constraints hold under the deduced arguments.
    fn try_overload(
        &mut self,
        core: &mut LoaderCore,
        slot: &TraitFunctionSlot,
        overload: &Overload,
    ) -> Result<bool> {
        let mut pairs: Vec<(TermId, TermId)> = Vec::new();
        match (slot.ret, overload.ret) {
            (None, None) => {}
            (Some(a), Some(b)) => pairs.push((a, b)),
            _ => return Ok(false),
        }
        if slot.params.len() != overload.params.len() {
            return Ok(false);
        }
        pairs.extend(slot.params.iter().copied().zip(overload.params.iter().copied()));

        loop {
            let mut changed = false;
            for &(a, b) in &pairs {
                match self.unify(core, a, b)? {
                    -1 => return Ok(false),
                    1 => changed = true,
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }

        for &(a, b) in &pairs {
            if !self.check_simplified(core, a)? || !self.check_simplified(core, b)? {
                return Ok(false);
            }
            if self.determined(a) != self.determined(b) {
                return Ok(false);
            }
        }

        let mut concrete = Vec::with_capacity(overload.fn_args.len());
        for &fa in &overload.fn_args {
            if !self.check_simplified(core, fa)? {
                return Ok(false);
            }
            match self.determined(fa) {
                Some(t) => concrete.push(t),
                None => return Ok(false),
            }
        }
        let catalog = Arc::clone(&core.catalog);
        let ft = catalog.function_template(&overload.assembly, overload.template)?;
        let la = LoadingArguments::new(overload.assembly.clone(), overload.template, concrete);
        Ok(core
            .check_generic_arguments(&overload.assembly, &ft.generic, &la)?
            .is_some())
    }

    /// Resolves the exportable references of a successful constraint:
    /// the deduction target and any trait type aliases.
    fn collect_exports(
        &mut self,
        core: &mut LoaderCore,
        cache: usize,
        name: &str,
        exports: &mut Vec<(String, TypeId)>,
    ) -> Result<()> {
        let target = self.caches[cache].target;
        self.simplify(core, target)?;
        let target_ty = self
            .determined(target)
            .ok_or_else(|| LoadError::program("Invalid constraint export"))?;
        exports.push((format!("{name}/.target"), target_ty));

        if matches!(
            self.caches[cache].kind,
            ConstraintKind::Trait | ConstraintKind::TraitImport
        ) {
            let (tasm, tid) = self.trait_ref(cache)?;
            let catalog = Arc::clone(&core.catalog);
            let tr = catalog.trait_template(&tasm, tid)?;
            for export in &tr.types {
                let term = self.construct_trait_term(core, cache, export.type_ref, 0)?;
                self.simplify(core, term)?;
                let ty = self
                    .determined(term)
                    .ok_or_else(|| LoadError::program("Invalid constraint export"))?;
                exports.push((format!("{name}/{}", export.export_name), ty));
            }
        }
        Ok(())
    }
}

impl LoaderCore {
    /// Whether `base` appears in `checked`'s transitive base chain. Falls
    /// back to the resolver for types whose base is not wired yet.
    pub(crate) fn check_type_base(
        &mut self,
        checked: TypeId,
        base: TypeId,
        seen: &mut Vec<TypeId>,
    ) -> Result<bool> {
        if checked == base {
            return Ok(true);
        }
        if seen.contains(&checked) {
            return Ok(false);
        }
        seen.push(checked);
        if let Some(b) = self.type_view(checked).base {
            return self.check_type_base(b, base, seen);
        }
        let catalog = Arc::clone(&self.catalog);
        let args = self.type_view(checked).args.clone();
        let tt = catalog.type_template(&args.assembly, args.id)?;
        let Some(bref) = tt.base else {
            return Ok(false);
        };
        let env = RefEnv::for_type(checked, &args, &tt.generic);
        match self.ref_type(&env, bref)? {
            Some(b) => self.check_type_base(b, base, seen),
            None => Ok(false),
        }
    }

    /// Whether `target` appears in `checked`'s transitive interface set.
    /// Value types contribute the interfaces their template declares (the
    /// boxed form implements them).
    pub(crate) fn check_type_interface(
        &mut self,
        checked: TypeId,
        target: TypeId,
        seen: &mut Vec<TypeId>,
    ) -> Result<bool> {
        if checked == target {
            return Ok(true);
        }
        if seen.contains(&checked) {
            return Ok(false);
        }
        seen.push(checked);
        let loaded: Vec<TypeId> = self
            .type_view(checked)
            .interfaces
            .iter()
            .map(|i| i.ty)
            .collect();
        if !loaded.is_empty() {
            for i in loaded {
                if self.check_type_interface(i, target, seen)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        let catalog = Arc::clone(&self.catalog);
        let args = self.type_view(checked).args.clone();
        let tt = catalog.type_template(&args.assembly, args.id)?;
        let env = RefEnv::for_type(checked, &args, &tt.generic);
        for decl in &tt.interfaces {
            if let Some(i) = self.ref_type(&env, decl.ty)? {
                if self.check_type_interface(i, target, seen)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
