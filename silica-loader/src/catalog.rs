use std::collections::{HashMap, HashSet};

use silica_assembly::model::{
    Assembly, AssemblyList, ExportEntry, FunctionTemplate, ImportEntry, TraitTemplate,
    TypeTemplate,
};

use crate::error::{LoadError, Result};

/// Selects one export/import table pair of an assembly, together with the
/// number of local templates (export ids past it designate imports).
type TableSelector = fn(&Assembly) -> (&[ExportEntry], usize, &[ImportEntry]);

/// Read-only store of every assembly a loader may draw templates from.
#[derive(Debug)]
pub struct AssemblyCatalog {
    assemblies: Vec<Assembly>,
    by_name: HashMap<String, usize>,
}

impl AssemblyCatalog {
    pub fn new(list: AssemblyList) -> Self {
        let mut by_name = HashMap::new();
        for (i, a) in list.assemblies.iter().enumerate() {
            by_name.entry(a.name.clone()).or_insert(i);
        }
        AssemblyCatalog {
            assemblies: list.assemblies,
            by_name,
        }
    }

    pub fn find_assembly(&self, name: &str) -> Option<&Assembly> {
        self.by_name.get(name).map(|&i| &self.assemblies[i])
    }

    pub fn assembly(&self, name: &str) -> Result<&Assembly> {
        self.find_assembly(name)
            .ok_or_else(|| LoadError::program("Referenced assembly not found"))
    }

    pub fn type_template(&self, assembly: &str, id: usize) -> Result<&TypeTemplate> {
        self.assembly(assembly)?
            .types
            .get(id)
            .ok_or(LoadError::InvalidTypeReference)
    }

    pub fn function_template(&self, assembly: &str, id: usize) -> Result<&FunctionTemplate> {
        self.assembly(assembly)?
            .functions
            .get(id)
            .ok_or(LoadError::InvalidFunctionReference)
    }

    pub fn trait_template(&self, assembly: &str, id: usize) -> Result<&TraitTemplate> {
        self.assembly(assembly)?
            .traits
            .get(id)
            .ok_or_else(|| LoadError::program("Invalid trait reference"))
    }

    /// Resolves an exported type name to `(assembly, template id)`,
    /// transparently following re-exports. A re-export chain that revisits
    /// an `(assembly, name)` pair is treated as not found.
    pub fn find_export_type(
        &self,
        assembly: &str,
        name: &str,
        arity: Option<usize>,
    ) -> Option<(String, usize)> {
        let mut visited = HashSet::new();
        self.find_export_in(assembly, name, &mut visited, type_tables)
            .filter(|(asm, id)| match arity {
                Some(n) => self
                    .find_assembly(asm)
                    .map(|a| a.types[*id].generic.param_count == n)
                    .unwrap_or(false),
                None => true,
            })
    }

    /// Dual of [`find_export_type`](Self::find_export_type) for functions.
    pub fn find_export_function(
        &self,
        assembly: &str,
        name: &str,
        arity: Option<usize>,
    ) -> Option<(String, usize)> {
        let mut visited = HashSet::new();
        self.find_export_in(assembly, name, &mut visited, function_tables)
            .filter(|(asm, id)| match arity {
                Some(n) => self
                    .find_assembly(asm)
                    .map(|a| a.functions[*id].generic.param_count == n)
                    .unwrap_or(false),
                None => true,
            })
    }

    /// Dual of [`find_export_type`](Self::find_export_type) for traits.
    pub fn find_export_trait(&self, assembly: &str, name: &str) -> Option<(String, usize)> {
        let mut visited = HashSet::new();
        self.find_export_in(assembly, name, &mut visited, trait_tables)
    }

    /// Resolves an exported constant name to its value, following
    /// re-exports the same way.
    pub fn find_export_constant(&self, assembly: &str, name: &str) -> Option<u32> {
        let mut visited = HashSet::new();
        let (asm, id) = self.find_export_in(assembly, name, &mut visited, constant_tables)?;
        self.find_assembly(&asm)
            .and_then(|a| a.constants.get(id))
            .copied()
    }

    fn find_export_in(
        &self,
        assembly: &str,
        name: &str,
        visited: &mut HashSet<(String, String)>,
        tables: TableSelector,
    ) -> Option<(String, usize)> {
        if !visited.insert((assembly.to_string(), name.to_string())) {
            return None;
        }
        let a = self.find_assembly(assembly)?;
        let (exports, local_count, imports) = tables(a);
        let entry = exports.iter().find(|e| e.name == name)?;
        if entry.internal_id >= local_count {
            let import = imports.get(entry.internal_id - local_count)?;
            return self.find_export_in(&import.assembly, &import.name, visited, tables);
        }
        Some((assembly.to_string(), entry.internal_id))
    }

    /// Looks up a name in a native export table, returning the template id.
    pub fn find_native_id(table: &[ExportEntry], name: &str) -> Option<usize> {
        table.iter().find(|e| e.name == name).map(|e| e.internal_id)
    }
}

fn type_tables(a: &Assembly) -> (&[ExportEntry], usize, &[ImportEntry]) {
    (&a.export_types, a.types.len(), &a.import_types)
}

fn function_tables(a: &Assembly) -> (&[ExportEntry], usize, &[ImportEntry]) {
    (&a.export_functions, a.functions.len(), &a.import_functions)
}

fn trait_tables(a: &Assembly) -> (&[ExportEntry], usize, &[ImportEntry]) {
    (&a.export_traits, a.traits.len(), &a.import_traits)
}

fn constant_tables(a: &Assembly) -> (&[ExportEntry], usize, &[ImportEntry]) {
    (&a.export_constants, a.constants.len(), &a.import_constants)
}
