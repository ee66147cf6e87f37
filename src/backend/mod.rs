//! GPU backend abstraction layer.
//!
//! The pass graph records and executes against the [`RenderBackend`] trait so
//! the scheduling core stays independent of the GPU API. Two implementations
//! are provided:
//!
//! - [`DummyBackend`](dummy::DummyBackend) (always compiled): performs no GPU
//!   work but records every command it receives, which is what the test suite
//!   asserts against.
//! - [`WgpuBackend`](wgpu_backend::WgpuBackend) (`wgpu-backend` feature):
//!   executes for real on a `wgpu` device supplied by the host.

pub mod dummy;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

use std::ops::Range;

use crate::blit::SharedParameterBlock;
use crate::error::BackendResult;
use crate::types::{TextureDescriptor, TextureFormat};

/// Handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a compiled render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub(crate) u64);

/// Load operation for a render attachment.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

/// Store operation for a render attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Color attachment for a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub target: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Render pass descriptor.
///
/// A single color attachment is supported: every pass in this design writes
/// one target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachment: ColorAttachment,
}

/// Blend behavior of a pipeline's color output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Output replaces the framebuffer contents.
    Replace,
    /// Framebuffer contents are kept (source factor zero, destination factor
    /// one). Used by the fetch shader variant, where the already-present
    /// framebuffer value is the result.
    KeepDestination,
}

/// Descriptor for compiling a render pipeline from WGSL source.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    /// WGSL module containing both entry points.
    pub shader: String,
    pub vs_entry: String,
    pub fs_entry: String,
    pub target_format: TextureFormat,
    pub blend: BlendMode,
}

/// Per-frame context handed in by the hosting pipeline.
///
/// The active color target is owned by the host; the graph only reads it and
/// eventually writes back into it.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub active_color_target: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// Trait implemented by graphics backends.
///
/// The trait is object safe; the graph executor and pass callbacks work with
/// `&mut dyn RenderBackend`. Render-pass scoped calls (`set_pipeline`,
/// `bind_parameters`, `draw`, ...) are only meaningful between
/// `begin_render_pass` and `end_render_pass`.
pub trait RenderBackend {
    /// Backend name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Create a texture.
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Destroy a texture. Destroying an unknown handle is a no-op.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Look up the descriptor of an existing texture.
    ///
    /// Returns `None` for handles this backend did not issue (or has
    /// destroyed). Used to size transient allocations off existing resources.
    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor>;

    /// Compile a render pipeline.
    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle>;

    /// Begin a render pass targeting the descriptor's color attachment.
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass.
    fn end_render_pass(&mut self);

    /// Select the pipeline for subsequent draws.
    fn set_pipeline(&mut self, pipeline: PipelineHandle);

    /// Set the viewport.
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);

    /// Bind a snapshot of the shared parameter block for the next draw.
    ///
    /// The block is captured at call time; later mutation of the block does
    /// not affect draws that were already recorded.
    fn bind_parameters(&mut self, params: &SharedParameterBlock);

    /// Draw primitives.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
}
