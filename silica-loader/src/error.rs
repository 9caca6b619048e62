use thiserror::Error;

/// Broad classification of a loading failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed template: bad indices, wrong storage mode, illegal
    /// relation. The request is rolled back.
    Program,
    /// A generic-argument check that legitimately failed.
    Constraint,
    /// The loading-object limit was exceeded.
    Limit,
}

/// Error produced by a loader entry point. The `Display` texts of the
/// named variants are stable diagnostics callers may match on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Invalid type reference")]
    InvalidTypeReference,
    #[error("Invalid function reference")]
    InvalidFunctionReference,
    #[error("Invalid generic arguments")]
    InvalidGenericArguments,
    #[error("Cyclic type dependence")]
    CyclicTypeDependence,
    #[error("Cyclic constraint")]
    CyclicConstraint,
    #[error("Circular constraint check")]
    CircularConstraintCheck,
    #[error("Loading object limit exceeded")]
    LoadingLimitExceeded,
    #[error("Vtab not matching base type")]
    VtabMismatch,
    /// Any other malformed-template diagnostic.
    #[error("{0}")]
    Program(String),
}

impl LoadError {
    pub fn program(msg: impl Into<String>) -> Self {
        LoadError::Program(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::InvalidGenericArguments => ErrorKind::Constraint,
            LoadError::LoadingLimitExceeded => ErrorKind::Limit,
            _ => ErrorKind::Program,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
