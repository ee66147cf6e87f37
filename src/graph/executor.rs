//! Sequential graph execution.

use std::collections::HashSet;

use crate::backend::{
    ColorAttachment, FrameContext, LoadOp, RenderBackend, RenderPassDescriptor, StoreOp,
    TextureHandle,
};
use crate::blit::{Blitter, SourceBinding};
use crate::error::GraphError;

use super::pass::PassContext;
use super::pool::TransientPool;
use super::resource::{ResourceHandle, VirtualResource};
use super::{CompiledGraph, PassGraph};

/// Runs a compiled graph, one pass at a time.
///
/// Execution is strictly sequential on the calling thread: no pass callback
/// overlaps another, so a later pass always observes the fully written output
/// of the passes it depends on. The executor consumes the graph; each pass
/// callback runs exactly once.
#[derive(Debug, Default)]
pub struct GraphExecutor {
    frames_executed: u64,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute every pass in compiled order, then retire the transient pool's
    /// cycle. Transients are released even when a pass fails.
    pub fn execute(
        &mut self,
        mut graph: PassGraph,
        compiled: &CompiledGraph,
        pool: &mut TransientPool,
        backend: &mut dyn RenderBackend,
        blitter: &mut Blitter,
        frame: &FrameContext,
    ) -> Result<(), GraphError> {
        let result = run_passes(&mut graph, compiled, pool, backend, blitter, frame);
        pool.end_cycle(backend);
        self.frames_executed += 1;
        result
    }

    /// Number of graphs this executor has run.
    pub fn frames_executed(&self) -> u64 {
        self.frames_executed
    }
}

fn run_passes(
    graph: &mut PassGraph,
    compiled: &CompiledGraph,
    pool: &mut TransientPool,
    backend: &mut dyn RenderBackend,
    blitter: &mut Blitter,
    frame: &FrameContext,
) -> Result<(), GraphError> {
    pool.materialize(graph, backend)?;

    let mut produced: HashSet<u32> = HashSet::new();

    for &pass_handle in compiled.pass_order() {
        // Detach what the pass needs up front; the callback is consumed here
        // and cannot run twice.
        let (name, callback, write, first_read) = {
            let Some(record) = graph.passes.get_mut(pass_handle.index()) else {
                continue;
            };
            (
                record.name().to_string(),
                record.execute.take(),
                record.write(),
                record.reads().first().copied(),
            )
        };

        let Some((write_handle, _attachment)) = write else {
            log::error!("pass '{name}' has no write target, aborting graph");
            return Err(GraphError::UnboundAttachment { pass: name });
        };
        let Some(target) = resolve(graph, pool, write_handle) else {
            log::error!("pass '{name}' write target has no backing, aborting graph");
            return Err(GraphError::UnboundAttachment { pass: name });
        };

        let source = match first_read {
            Some(read) => match resolve(graph, pool, read) {
                Some(texture) => SourceBinding::Texture(texture),
                None => {
                    log::debug!("pass '{name}': source elided, sampling framebuffer");
                    SourceBinding::FramebufferFetch
                }
            },
            None => SourceBinding::FramebufferFetch,
        };

        // First write into a transient clears it; everything else loads, so
        // partially covering draws compose over prior contents.
        let is_transient = matches!(
            graph.resource(write_handle),
            Some(VirtualResource::Transient { .. })
        );
        let load_op = if is_transient && !produced.contains(&write_handle.index()) {
            LoadOp::Clear([0.0, 0.0, 0.0, 0.0])
        } else {
            LoadOp::Load
        };

        log::trace!("executing pass '{name}'");
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some(name),
            color_attachment: ColorAttachment {
                target,
                load_op,
                store_op: StoreOp::Store,
            },
        });
        backend.set_viewport(0.0, 0.0, frame.width as f32, frame.height as f32);

        if let Some(callback) = callback {
            let mut ctx = PassContext {
                backend: &mut *backend,
                blitter: &mut *blitter,
                source,
                width: frame.width,
                height: frame.height,
            };
            callback(&mut ctx);
        }

        backend.end_render_pass();
        produced.insert(write_handle.index());
    }

    Ok(())
}

fn resolve(
    graph: &PassGraph,
    pool: &TransientPool,
    handle: ResourceHandle,
) -> Option<TextureHandle> {
    match graph.resource(handle)? {
        VirtualResource::External { texture } => Some(*texture),
        VirtualResource::Transient { .. } => pool.backing(handle),
    }
}
