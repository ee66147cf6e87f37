//! Error types for the pass graph and its backends.

use thiserror::Error;

/// Errors raised by a graphics backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("GPU device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised while recording or executing a pass graph.
///
/// Configuration problems (a missing material, a descriptor that cannot be
/// derived) are not represented here as hard failures at the feature level;
/// they are logged and the affected pass is skipped or degraded. The variants
/// below are invariant violations that abort the current frame's graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The source handle for a transient allocation does not resolve to a
    /// valid resource.
    #[error("cannot derive descriptor for transient '{name}': source handle is not valid")]
    InvalidDescriptor { name: String },
    /// A pass declared more than one write target.
    #[error("pass '{pass}' declares more than one write target")]
    MultipleWriteTargets { pass: String },
    /// A pass declared the same resource for both read and write.
    #[error("pass '{pass}' declares the same resource for read and write")]
    AccessHazard { pass: String },
    /// A pass has no backing resource bound for its write target.
    #[error("pass '{pass}' has no backing resource for its write target")]
    UnboundAttachment { pass: String },
    /// A handle from a previous frame's graph was used in the current one.
    #[error("pass '{pass}' references a resource handle from a previous frame")]
    StaleHandle { pass: String },
    /// The declared dependencies cannot be ordered.
    #[error("pass graph contains a cyclic dependency")]
    CyclicDependency,
    #[error(transparent)]
    Backend(#[from] BackendError),
}
