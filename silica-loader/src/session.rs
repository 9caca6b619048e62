use std::collections::{HashMap, VecDeque};

use crate::entities::{
    FunctionId, LoadingArguments, RuntimeFunction, RuntimeType, SubtypeArguments, TypeId,
};

/// Per-request loading state: the in-flight entities and the ordered
/// queues driving the pipeline. Cleared before and after every entry-point
/// invocation, so a failed request leaves no residue.
#[derive(Debug, Default)]
pub(crate) struct LoadingSession {
    /// Every in-flight type, keyed by id. An entity is in exactly one of
    /// the stage queues below (or currently being processed).
    pub types: HashMap<u32, RuntimeType>,
    pub functions: HashMap<u32, RuntimeFunction>,

    /// Types whose fields are being computed right now; a stack. Used to
    /// detect value-type cycles and duplicate in-flight work.
    pub loading_types: Vec<TypeId>,
    /// Reference types published before field layout; this is what lets
    /// reference cycles terminate.
    pub loading_ref_types: VecDeque<TypeId>,
    /// Field layout done, awaiting relation wiring.
    pub post_loading_types: VecDeque<TypeId>,
    /// Allocated functions awaiting signature and reference wiring.
    pub loading_functions: VecDeque<FunctionId>,
    pub finished_types: VecDeque<TypeId>,
    pub finished_functions: VecDeque<FunctionId>,

    /// Arguments whose constraints are being checked; a repeat is a cyclic
    /// constraint.
    pub constraint_checking_types: Vec<LoadingArguments>,
    pub constraint_checking_functions: Vec<LoadingArguments>,
    /// Subtype navigations in flight; a repeat is a cyclic navigation.
    pub loading_subtypes: Vec<SubtypeArguments>,
}

impl LoadingSession {
    pub fn clear(&mut self) {
        self.types.clear();
        self.functions.clear();
        self.loading_types.clear();
        self.loading_ref_types.clear();
        self.post_loading_types.clear();
        self.loading_functions.clear();
        self.finished_types.clear();
        self.finished_functions.clear();
        self.constraint_checking_types.clear();
        self.constraint_checking_functions.clear();
        self.loading_subtypes.clear();
    }

    pub fn find_type_by_args(&self, args: &LoadingArguments) -> Option<TypeId> {
        self.types
            .values()
            .find(|t| &t.args == args)
            .map(|t| t.id)
    }

    pub fn find_function_by_args(&self, args: &LoadingArguments) -> Option<FunctionId> {
        self.functions
            .values()
            .find(|f| &f.args == args)
            .map(|f| f.id)
    }

    /// Combined live-entity count gated by the loading limit.
    pub fn live_count(&self) -> usize {
        self.loading_types.len() + self.loading_functions.len() + self.loading_subtypes.len()
    }
}
