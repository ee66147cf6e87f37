//! # postfx-graph
//!
//! A render graph-based scheduler for screen-space post effects.
//!
//! Passes declare what they read and write; the graph resolves those
//! declarations into an execution order, a transient pool provides
//! textures whose lifetime is scoped to one graph execution, and a blitter
//! dispatches fullscreen draws through a shared per-draw parameter block.
//!
//! The crate ships the copy-then-composite effect the scheduler was built
//! for ([`CompositeFeature`]): copy the frame's color target into a
//! transient texture, then composite it back through a host-supplied
//! material.
//!
//! # Backends
//! - [`DummyBackend`] - no GPU work, records commands; used by the tests.
//! - `WgpuBackend` (feature `wgpu-backend`, on by default) - real execution
//!   on a host-supplied `wgpu` device.
//!
//! # Threading
//! Recording and execution are strictly single-threaded: the host calls them
//! on the thread that owns the frame's GPU work, and the shared parameter
//! block is reached only through `&mut`.

pub mod backend;
pub mod blit;
pub mod error;
pub mod feature;
pub mod graph;
pub mod types;

pub use backend::dummy::{BackendCommand, DummyBackend};
#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{
    BlendMode, ColorAttachment, FrameContext, LoadOp, PipelineDescriptor, PipelineHandle,
    RenderBackend, RenderPassDescriptor, StoreOp, TextureHandle,
};
pub use blit::{
    Blitter, Material, SharedParameterBlock, SourceBinding, BLIT_SHADER, FULL_RECT_SCALE_BIAS,
};
pub use error::{BackendError, BackendResult, GraphError};
pub use feature::{CompatibilityExecutor, CompositeConfig, CompositeFeature, InjectionPoint};
pub use graph::{
    AccessKind, CompiledGraph, GraphExecutor, PassBuilder, PassContext, PassGraph, PassHandle,
    PassRecord, ResourceAccess, ResourceHandle, TransientPool, VirtualResource,
};
pub use types::{TextureDescriptor, TextureFormat, TextureUsage};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version. Call once at system start if desired.
pub fn init() {
    log::info!("postfx-graph v{VERSION} initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn empty_graph_compiles() {
        let graph = PassGraph::new();
        let compiled = graph.compile().unwrap();
        assert!(compiled.pass_order().is_empty());
    }
}
