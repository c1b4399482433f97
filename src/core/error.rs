//! Exposes the deimos error type

use std::sync::PoisonError;

use thiserror::Error;

/// Error type that deimos can return. Pipeline creation returns at most one
/// of these per call; every intermediate object is released before it
/// propagates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Host allocation failed.
    #[error("Out of host memory.")]
    OutOfHostMemory,
    /// The shader code slab could not satisfy an allocation.
    #[error("Out of device memory: shader code slab exhausted.")]
    OutOfDeviceMemory,
    /// A cache miss occurred while the caller forbade compilation.
    #[error("Shader variant not in cache and compilation was disallowed.")]
    CompileRequired,
    /// The shader front-end rejected the bytecode.
    #[error("Invalid shader: `{0}`")]
    InvalidShader(String),
    /// A requested attachment format has no hardware encoding and cannot be
    /// masked out.
    #[error("Format `{0:?}` has no hardware encoding.")]
    UnsupportedFormat(ash::vk::Format),
    /// An internal invariant check failed. The code is stable across
    /// releases so it can be reported.
    #[error("Internal assertion failed: {0}")]
    InternalAssertion(&'static str),
    /// Tried to add a vertex attribute to a vertex binding that does not exist.
    #[error("Tried to add a vertex attribute to a vertex binding that does not exist.")]
    NoVertexBinding,
    /// A pipeline was described with a stage combination the hardware cannot
    /// execute (for example two shaders with the same stage kind).
    #[error("Invalid stage combination: {0}")]
    InvalidStageCombination(&'static str),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
