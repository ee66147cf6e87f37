//! Dummy backend for testing and development.
//!
//! Performs no GPU work. Every command is recorded into an inspectable log so
//! tests can assert on pass ordering, attachments, bound parameter snapshots
//! and vertex counts without GPU hardware.

use std::collections::HashMap;
use std::ops::Range;

use crate::blit::SharedParameterBlock;
use crate::error::BackendResult;
use crate::types::TextureDescriptor;

use super::{
    PipelineDescriptor, PipelineHandle, RenderBackend, RenderPassDescriptor, TextureHandle,
};

/// A command received by the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateTexture {
        handle: TextureHandle,
        desc: TextureDescriptor,
    },
    DestroyTexture(TextureHandle),
    BeginRenderPass(RenderPassDescriptor),
    EndRenderPass,
    SetPipeline(PipelineHandle),
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// Snapshot of the parameter block at bind time.
    BindParameters {
        texture: Option<TextureHandle>,
        scale_bias: [f32; 4],
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
}

/// Dummy backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    textures: HashMap<u64, TextureDescriptor>,
    pipelines: HashMap<u64, PipelineDescriptor>,
    next_texture_id: u64,
    next_pipeline_id: u64,
    commands: Vec<BackendCommand>,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All commands recorded so far, in order.
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Forget recorded commands. Resource registries are kept.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of textures currently alive.
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Descriptor of a pipeline this backend compiled.
    pub fn pipeline_descriptor(&self, pipeline: PipelineHandle) -> Option<&PipelineDescriptor> {
        self.pipelines.get(&pipeline.0)
    }

    /// Recorded draws, in order.
    pub fn draws(&self) -> impl Iterator<Item = &BackendCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, BackendCommand::Draw { .. }))
    }
}

impl RenderBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let handle = TextureHandle(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(handle.0, desc.clone());
        log::trace!(
            "DummyBackend: created texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        self.commands.push(BackendCommand::CreateTexture {
            handle,
            desc: desc.clone(),
        });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            log::trace!("DummyBackend: destroyed texture {:?}", texture);
            self.commands.push(BackendCommand::DestroyTexture(texture));
        }
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.textures.get(&texture.0).cloned()
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle> {
        let handle = PipelineHandle(self.next_pipeline_id);
        self.next_pipeline_id += 1;
        self.pipelines.insert(handle.0, desc.clone());
        log::trace!("DummyBackend: compiled pipeline {:?}", desc.label);
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.commands
            .push(BackendCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(BackendCommand::EndRenderPass);
    }

    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(BackendCommand::SetPipeline(pipeline));
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.commands.push(BackendCommand::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    fn bind_parameters(&mut self, params: &SharedParameterBlock) {
        self.commands.push(BackendCommand::BindParameters {
            texture: params.texture(),
            scale_bias: params.scale_bias().to_array(),
        });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(BackendCommand::Draw {
            vertices,
            instances,
        });
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureFormat, TextureUsage};

    #[test]
    fn records_texture_lifecycle() {
        let mut backend = DummyBackend::new();
        let handle = backend
            .create_texture(&TextureDescriptor::new_2d(
                64,
                64,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING,
            ))
            .unwrap();
        assert_eq!(backend.live_texture_count(), 1);
        assert!(backend.texture_descriptor(handle).is_some());

        backend.destroy_texture(handle);
        assert_eq!(backend.live_texture_count(), 0);
        assert!(backend.texture_descriptor(handle).is_none());
        // Destroying again is a no-op and records nothing further.
        backend.destroy_texture(handle);
        assert_eq!(
            backend
                .commands()
                .iter()
                .filter(|c| matches!(c, BackendCommand::DestroyTexture(_)))
                .count(),
            1
        );
    }

    #[test]
    fn parameter_snapshot_is_captured_at_bind_time() {
        let mut backend = DummyBackend::new();
        let mut params = SharedParameterBlock::new();
        params.set_texture(TextureHandle(3));
        backend.bind_parameters(&params);

        // Mutating the block after binding must not affect the snapshot.
        params.clear();

        match &backend.commands()[0] {
            BackendCommand::BindParameters { texture, .. } => {
                assert_eq!(*texture, Some(TextureHandle(3)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
