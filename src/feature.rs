//! The copy-then-composite screen effect, assembled on the pass graph.
//!
//! Each frame, [`CompositeFeature::record_graph`] appends two passes:
//!
//! 1. `copy_color` - samples the frame's active color target and writes it
//!    into a freshly allocated transient copy;
//! 2. `composite` - samples that copy with the configured material and writes
//!    the result back into the active color target.
//!
//! The intermediate copy exists because a pass cannot sample the very target
//! it renders into; the transient pool owns the copy for exactly one graph
//! execution.

use crate::backend::{FrameContext, RenderBackend};
use crate::blit::{Blitter, Material, FULL_RECT_SCALE_BIAS};
use crate::error::{BackendResult, GraphError};
use crate::graph::{GraphExecutor, PassGraph, TransientPool};
use crate::types::TextureFormat;

/// Where in the host's frame the effect runs. Fixed in this design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionPoint {
    /// After opaque geometry has been rendered.
    #[default]
    AfterOpaque,
}

/// Configuration for [`CompositeFeature`].
#[derive(Debug, Clone, Default)]
pub struct CompositeConfig {
    /// Shader program for the composite pass. With no material configured the
    /// composite pass degrades to an identity copy (deterministically; a
    /// warning is logged once per recording).
    pub material: Option<Material>,
    pub injection_point: InjectionPoint,
}

/// Records and runs the two-pass composite effect.
pub struct CompositeFeature {
    config: CompositeConfig,
    blitter: Blitter,
    pool: TransientPool,
    executor: GraphExecutor,
}

impl CompositeFeature {
    /// Create the feature, compiling the built-in blit pipelines for the
    /// host's color target format.
    pub fn new(
        backend: &mut dyn RenderBackend,
        target_format: TextureFormat,
        config: CompositeConfig,
    ) -> BackendResult<Self> {
        Ok(Self {
            config,
            blitter: Blitter::new(backend, target_format)?,
            pool: TransientPool::new(),
            executor: GraphExecutor::new(),
        })
    }

    /// The configured composite material, if any.
    pub fn material(&self) -> Option<&Material> {
        self.config.material.as_ref()
    }

    /// Replace the composite material.
    pub fn set_material(&mut self, material: Option<Material>) {
        self.config.material = material;
    }

    pub fn injection_point(&self) -> InjectionPoint {
        self.config.injection_point
    }

    /// Record this frame's passes into the graph.
    ///
    /// Returns `Ok` for any valid frame context. Configuration problems (a
    /// transient descriptor that cannot be derived) are logged and the passes
    /// are skipped for this frame; only recording invariant violations
    /// surface as errors.
    pub fn record_graph(
        &mut self,
        graph: &mut PassGraph,
        backend: &dyn RenderBackend,
        frame: &FrameContext,
    ) -> Result<(), GraphError> {
        let active = graph.register_external(frame.active_color_target);

        let scratch = match self
            .pool
            .allocate_like(graph, backend, active, "color_copy")
        {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("skipping composite this frame: {err}");
                return Ok(());
            }
        };

        graph
            .begin_pass("copy_color")
            .declare_read(active)
            .declare_write(scratch, 0)
            .execute(move |ctx| {
                let source = ctx.source;
                ctx.blitter
                    .blit_copy(ctx.backend, source, FULL_RECT_SCALE_BIAS);
            })
            .end()?;

        let material = self.config.material.clone();
        if material.is_none() {
            log::warn!("no composite material configured, degrading to identity copy");
        }

        let mut composite = graph
            .begin_pass("composite")
            .declare_read(scratch)
            .declare_write(active, 0);
        if let Some(ref m) = material {
            composite = composite.material(m.clone());
        }
        composite
            .execute(move |ctx| {
                let source = ctx.source;
                match material {
                    Some(ref m) => ctx.blitter.blit(ctx.backend, m, source, FULL_RECT_SCALE_BIAS),
                    None => ctx.blitter.blit_copy(ctx.backend, source, FULL_RECT_SCALE_BIAS),
                }
            })
            .end()?;

        Ok(())
    }

    /// Compile and execute a recorded graph, then release its transients.
    pub fn run_frame(
        &mut self,
        graph: PassGraph,
        backend: &mut dyn RenderBackend,
        frame: &FrameContext,
    ) -> Result<(), GraphError> {
        let compiled = graph.compile()?;
        self.executor.execute(
            graph,
            &compiled,
            &mut self.pool,
            backend,
            &mut self.blitter,
            frame,
        )
    }

    /// The transient pool backing this feature's allocations.
    pub fn pool(&self) -> &TransientPool {
        &self.pool
    }

    /// The blitter (and its built-in copy material).
    pub fn blitter(&self) -> &Blitter {
        &self.blitter
    }
}

/// Entry points for hosts that do not support graph-style recording.
///
/// All three are intentional no-ops: the graph path is the only supported
/// execution path, but exposing these keeps host dispatch code free of
/// graph-support special cases.
#[derive(Debug, Default)]
pub struct CompatibilityExecutor;

impl CompatibilityExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Called before the pass executes. No-op.
    pub fn setup_pass(&mut self, _backend: &mut dyn RenderBackend, _frame: &FrameContext) {}

    /// Legacy execution entry point. No-op.
    pub fn execute_pass(&mut self, _backend: &mut dyn RenderBackend, _frame: &FrameContext) {}

    /// Called after the pass executes. No-op.
    pub fn cleanup_pass(&mut self, _backend: &mut dyn RenderBackend) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::backend::TextureHandle;
    use crate::types::{TextureDescriptor, TextureUsage};

    fn setup() -> (DummyBackend, CompositeFeature, FrameContext) {
        let mut backend = DummyBackend::new();
        let target = backend
            .create_texture(
                &TextureDescriptor::new_2d(
                    1920,
                    1080,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                )
                .with_label("camera_color"),
            )
            .unwrap();
        let feature = CompositeFeature::new(
            &mut backend,
            TextureFormat::Rgba8Unorm,
            CompositeConfig::default(),
        )
        .unwrap();
        let frame = FrameContext {
            active_color_target: target,
            width: 1920,
            height: 1080,
        };
        (backend, feature, frame)
    }

    #[test]
    fn records_two_passes_in_fixed_order() {
        let (backend, mut feature, frame) = setup();
        let mut graph = PassGraph::new();
        feature.record_graph(&mut graph, &backend, &frame).unwrap();

        assert_eq!(graph.pass_count(), 2);
        assert_eq!(graph.passes()[0].name(), "copy_color");
        assert_eq!(graph.passes()[1].name(), "composite");
    }

    #[test]
    fn composite_reads_what_copy_writes() {
        let (backend, mut feature, frame) = setup();
        let mut graph = PassGraph::new();
        feature.record_graph(&mut graph, &backend, &frame).unwrap();

        let (copy_write, _) = graph.passes()[0].write().unwrap();
        assert!(graph.passes()[1].reads_resource(copy_write));

        // And the chain ends where it started: the composite writes the
        // resource the copy read.
        let (composite_write, _) = graph.passes()[1].write().unwrap();
        assert!(graph.passes()[0].reads_resource(composite_write));
    }

    #[test]
    fn invalid_frame_target_skips_recording() {
        let (backend, mut feature, _) = setup();
        let mut graph = PassGraph::new();
        // A target the backend never issued.
        let frame = FrameContext {
            active_color_target: TextureHandle(9999),
            width: 1920,
            height: 1080,
        };

        // Surfaced through the diagnostic channel, not as an error.
        feature.record_graph(&mut graph, &backend, &frame).unwrap();
        assert_eq!(graph.pass_count(), 0);
    }

    #[test]
    fn compatibility_path_is_a_no_op() {
        let (mut backend, _, frame) = setup();
        backend.clear_commands();

        let mut compat = CompatibilityExecutor::new();
        compat.setup_pass(&mut backend, &frame);
        compat.execute_pass(&mut backend, &frame);
        compat.cleanup_pass(&mut backend);

        assert!(backend.commands().is_empty());
    }
}
