//! Transient resource pool.
//!
//! Transient textures live exactly as long as one graph execution. The pool
//! derives their descriptors from existing resources at record time, commits
//! backing GPU memory just before execution, and releases everything when the
//! cycle ends. No explicit free is exposed: pass callbacks that captured a
//! handle cannot outlive the texture behind it within the frame, and the
//! handle itself goes stale once the cycle is over.

use crate::backend::{RenderBackend, TextureHandle};
use crate::error::GraphError;
use crate::types::TextureUsage;

use super::resource::{ResourceHandle, VirtualResource};
use super::PassGraph;

#[derive(Debug)]
struct TransientEntry {
    handle: ResourceHandle,
    backing: Option<TextureHandle>,
}

/// Allocates and recycles graph-lifetime textures.
#[derive(Debug, Default)]
pub struct TransientPool {
    entries: Vec<TransientEntry>,
    cycle: u64,
}

impl TransientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a transient texture matching the format and dimensions of an
    /// existing resource.
    ///
    /// The source must resolve through the given graph; a handle the graph
    /// does not know (stale, or from another graph) fails with
    /// [`GraphError::InvalidDescriptor`]. Backing memory is not committed
    /// here - only when the graph executes.
    pub fn allocate_like(
        &mut self,
        graph: &mut PassGraph,
        backend: &dyn RenderBackend,
        source: ResourceHandle,
        name: &str,
    ) -> Result<ResourceHandle, GraphError> {
        let desc = match graph.resource(source) {
            Some(VirtualResource::External { texture }) => backend.texture_descriptor(*texture),
            Some(VirtualResource::Transient { desc, .. }) => Some(desc.clone()),
            None => None,
        }
        .ok_or_else(|| GraphError::InvalidDescriptor {
            name: name.to_string(),
        })?;

        let mut desc = desc.derived(name);
        // A transient is always written by one pass and sampled by a later one.
        desc.usage |= TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;

        let handle = graph.add_resource(VirtualResource::Transient {
            name: name.to_string(),
            desc,
        });
        self.entries.push(TransientEntry {
            handle,
            backing: None,
        });

        log::trace!("TransientPool: reserved '{name}' for cycle {}", self.cycle);
        Ok(handle)
    }

    /// Commit backing textures for every reservation of the current cycle.
    pub fn materialize(
        &mut self,
        graph: &PassGraph,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), GraphError> {
        for entry in &mut self.entries {
            if entry.backing.is_some() {
                continue;
            }
            let Some(VirtualResource::Transient { desc, name }) = graph.resource(entry.handle)
            else {
                continue;
            };
            let texture = backend.create_texture(desc)?;
            log::trace!("TransientPool: materialized '{name}'");
            entry.backing = Some(texture);
        }
        Ok(())
    }

    /// The backing texture of a transient, if committed this cycle.
    pub fn backing(&self, handle: ResourceHandle) -> Option<TextureHandle> {
        self.entries
            .iter()
            .find(|entry| entry.handle == handle)
            .and_then(|entry| entry.backing)
    }

    /// Whether the handle belongs to the current cycle.
    pub fn is_valid(&self, handle: ResourceHandle) -> bool {
        self.entries.iter().any(|entry| entry.handle == handle)
    }

    /// Release every transient of the finished cycle. All handles issued this
    /// cycle become stale.
    pub fn end_cycle(&mut self, backend: &mut dyn RenderBackend) {
        for entry in self.entries.drain(..) {
            if let Some(texture) = entry.backing {
                backend.destroy_texture(texture);
            }
        }
        self.cycle += 1;
        log::trace!("TransientPool: cycle {} complete", self.cycle);
    }

    /// Index of the current allocation cycle.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{TextureDescriptor, TextureFormat};

    fn external_target(backend: &mut DummyBackend) -> TextureHandle {
        backend
            .create_texture(&TextureDescriptor::new_2d(
                1920,
                1080,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RENDER_ATTACHMENT,
            ))
            .unwrap()
    }

    #[test]
    fn allocation_derives_descriptor_from_source() {
        let mut backend = DummyBackend::new();
        let target = external_target(&mut backend);

        let mut graph = PassGraph::new();
        let source = graph.register_external(target);

        let mut pool = TransientPool::new();
        let scratch = pool
            .allocate_like(&mut graph, &backend, source, "color_copy")
            .unwrap();

        let Some(VirtualResource::Transient { desc, .. }) = graph.resource(scratch) else {
            panic!("expected transient resource");
        };
        assert_eq!(desc.width, 1920);
        assert_eq!(desc.height, 1080);
        assert_eq!(desc.format, TextureFormat::Rgba8Unorm);
        assert_eq!(desc.label.as_deref(), Some("color_copy"));
        assert!(desc.usage.contains(TextureUsage::TEXTURE_BINDING));

        // Reserved, not yet committed.
        assert!(pool.backing(scratch).is_none());
        assert_eq!(backend.live_texture_count(), 1);
    }

    #[test]
    fn unknown_source_is_rejected() {
        let backend = DummyBackend::new();
        let mut graph = PassGraph::new();
        // Handle minted by a different graph.
        let foreign = PassGraph::new().register_external(TextureHandle(99));

        let mut pool = TransientPool::new();
        let result = pool.allocate_like(&mut graph, &backend, foreign, "color_copy");
        assert_eq!(
            result,
            Err(GraphError::InvalidDescriptor {
                name: "color_copy".to_string()
            })
        );
    }

    #[test]
    fn end_cycle_releases_backings_and_invalidates_handles() {
        let mut backend = DummyBackend::new();
        let target = external_target(&mut backend);

        let mut graph = PassGraph::new();
        let source = graph.register_external(target);

        let mut pool = TransientPool::new();
        let scratch = pool
            .allocate_like(&mut graph, &backend, source, "color_copy")
            .unwrap();
        pool.materialize(&graph, &mut backend).unwrap();

        assert!(pool.is_valid(scratch));
        assert_eq!(backend.live_texture_count(), 2);

        pool.end_cycle(&mut backend);

        assert!(!pool.is_valid(scratch));
        assert!(pool.backing(scratch).is_none());
        // Only the external target remains.
        assert_eq!(backend.live_texture_count(), 1);
    }
}
