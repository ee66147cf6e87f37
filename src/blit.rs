//! Fullscreen blit dispatch.
//!
//! A blit draws a single triangle whose three corners are generated in the
//! vertex stage from the vertex index alone, covering the whole viewport
//! without a dedicated mesh. Per-draw shader inputs go through one
//! [`SharedParameterBlock`] that is cleared and repopulated immediately before
//! every draw, so consecutive draws in the same frame cannot observe each
//! other's bindings.

use glam::Vec4;

use crate::backend::{BlendMode, PipelineDescriptor, PipelineHandle, RenderBackend, TextureHandle};
use crate::error::BackendResult;
use crate::types::TextureFormat;

/// Scale/bias covering the full source rect (scale 1,1 and offset 0,0).
pub const FULL_RECT_SCALE_BIAS: Vec4 = Vec4::new(1.0, 1.0, 0.0, 0.0);

/// Where a blit reads its color from.
///
/// An explicit tagged variant instead of an optional texture, so "no source"
/// cannot be confused with "sample the framebuffer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceBinding {
    /// Sample the given texture.
    Texture(TextureHandle),
    /// Read the currently bound framebuffer contents via the fetch shader
    /// variant. Selected when an intermediate copy has been elided.
    FramebufferFetch,
}

/// An externally compiled shader program used by a composite pass.
///
/// Materials are immutable; this crate references them but never builds the
/// host's own. The optional fetch variant is used when the source texture is
/// unavailable and the framebuffer must be read in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    name: String,
    pipeline: PipelineHandle,
    fetch_pipeline: Option<PipelineHandle>,
}

impl Material {
    pub fn new(name: impl Into<String>, pipeline: PipelineHandle) -> Self {
        Self {
            name: name.into(),
            pipeline,
            fetch_pipeline: None,
        }
    }

    /// Attach the framebuffer-fetch variant of the program.
    pub fn with_fetch_variant(mut self, pipeline: PipelineHandle) -> Self {
        self.fetch_pipeline = Some(pipeline);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    pub fn fetch_pipeline(&self) -> Option<PipelineHandle> {
        self.fetch_pipeline
    }
}

/// The shared, mutable per-draw parameter set.
///
/// One instance exists per [`Blitter`] and is reused for every draw in a
/// frame. It must be cleared before each draw that populates it; `blit` does
/// this unconditionally. Exclusive `&mut` access enforces the single-threaded
/// usage contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedParameterBlock {
    texture: Option<TextureHandle>,
    scale_bias: Vec4,
}

impl SharedParameterBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every slot. O(1): the slot set is fixed.
    pub fn clear(&mut self) {
        self.texture = None;
        self.scale_bias = Vec4::ZERO;
    }

    pub fn set_texture(&mut self, texture: TextureHandle) {
        self.texture = Some(texture);
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn set_scale_bias(&mut self, scale_bias: Vec4) {
        self.scale_bias = scale_bias;
    }

    pub fn scale_bias(&self) -> Vec4 {
        self.scale_bias
    }
}

/// GPU-visible uniform data for a blit draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlitUniform {
    pub scale_bias: Vec4,
}

/// WGSL for the built-in blit pipelines.
///
/// `vs_main` emits the fullscreen triangle from the vertex index. `fs_blit`
/// samples the bound source texture through the scale/bias transform.
/// `fs_fetch` is the no-source variant: its output is discarded by a
/// destination-preserving blend, leaving the framebuffer contents in place.
pub const BLIT_SHADER: &str = r#"
struct BlitParams {
    scale_bias: vec4<f32>,
}

@group(0) @binding(0) var blit_texture: texture_2d<f32>;
@group(0) @binding(1) var blit_sampler: sampler;
@group(0) @binding(2) var<uniform> params: BlitParams;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);

    return output;
}

@fragment
fn fs_blit(input: VertexOutput) -> @location(0) vec4<f32> {
    let uv = input.uv * params.scale_bias.xy + params.scale_bias.zw;
    return textureSample(blit_texture, blit_sampler, uv);
}

@fragment
fn fs_fetch(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(0.0);
}
"#;

/// Issues fullscreen draws and owns the shared parameter block.
///
/// Holds the built-in copy material (textured pipeline plus fetch variant)
/// created once at startup; host materials are passed per call.
pub struct Blitter {
    params: SharedParameterBlock,
    copy_material: Material,
}

impl Blitter {
    /// Create the blitter, compiling the built-in blit pipelines for the
    /// given color target format.
    pub fn new(backend: &mut dyn RenderBackend, format: TextureFormat) -> BackendResult<Self> {
        let pipeline = backend.create_pipeline(&PipelineDescriptor {
            label: Some("blit".to_string()),
            shader: BLIT_SHADER.to_string(),
            vs_entry: "vs_main".to_string(),
            fs_entry: "fs_blit".to_string(),
            target_format: format,
            blend: BlendMode::Replace,
        })?;

        let fetch_pipeline = backend.create_pipeline(&PipelineDescriptor {
            label: Some("blit_fetch".to_string()),
            shader: BLIT_SHADER.to_string(),
            vs_entry: "vs_main".to_string(),
            fs_entry: "fs_fetch".to_string(),
            target_format: format,
            blend: BlendMode::KeepDestination,
        })?;

        Ok(Self {
            params: SharedParameterBlock::new(),
            copy_material: Material::new("blit", pipeline).with_fetch_variant(fetch_pipeline),
        })
    }

    /// The built-in identity-copy material.
    pub fn copy_material(&self) -> &Material {
        &self.copy_material
    }

    /// Draw a fullscreen triangle with the given material.
    ///
    /// Clears the parameter block, binds the source texture only when one is
    /// given, sets the scale/bias vector, and issues a single three-vertex
    /// draw with the parameters captured at draw time. With
    /// [`SourceBinding::FramebufferFetch`] the material's fetch variant is
    /// selected (falling back to the built-in one if the material has none).
    pub fn blit(
        &mut self,
        backend: &mut dyn RenderBackend,
        material: &Material,
        source: SourceBinding,
        scale_bias: Vec4,
    ) {
        self.params.clear();

        let pipeline = match source {
            SourceBinding::Texture(texture) => {
                self.params.set_texture(texture);
                material.pipeline()
            }
            SourceBinding::FramebufferFetch => {
                log::debug!(
                    "blit '{}': no source texture, using framebuffer fetch variant",
                    material.name()
                );
                material
                    .fetch_pipeline()
                    .unwrap_or_else(|| self.fallback_fetch_pipeline(material))
            }
        };
        self.params.set_scale_bias(scale_bias);

        backend.set_pipeline(pipeline);
        backend.bind_parameters(&self.params);
        backend.draw(0..3, 0..1);
    }

    /// Draw a fullscreen identity copy using the built-in material.
    pub fn blit_copy(
        &mut self,
        backend: &mut dyn RenderBackend,
        source: SourceBinding,
        scale_bias: Vec4,
    ) {
        let material = self.copy_material.clone();
        self.blit(backend, &material, source, scale_bias);
    }

    fn fallback_fetch_pipeline(&self, material: &Material) -> PipelineHandle {
        log::debug!(
            "material '{}' has no fetch variant, using built-in",
            material.name()
        );
        // The built-in material always carries one.
        self.copy_material
            .fetch_pipeline()
            .unwrap_or_else(|| self.copy_material.pipeline())
    }
}

static_assertions::assert_impl_all!(SharedParameterBlock: Send);
static_assertions::assert_impl_all!(Material: Send, Sync);
