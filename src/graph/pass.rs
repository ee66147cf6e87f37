//! Pass records and the builder that validates them.

use crate::backend::RenderBackend;
use crate::blit::{Blitter, Material, SourceBinding};
use crate::error::GraphError;

use super::resource::{AccessKind, ResourceAccess, ResourceHandle};
use super::{PassGraph, PassHandle};

/// Execution context handed to a pass callback.
///
/// Carries only execution-time state: everything a pass needs beyond this
/// must have been captured when the pass was recorded. A render pass on the
/// write target is already open when the callback runs.
pub struct PassContext<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub blitter: &'a mut Blitter,
    /// The pass's declared read, resolved to its backing texture - or the
    /// framebuffer-fetch fallback when the source was elided or the pass
    /// declared no read.
    pub source: SourceBinding,
    pub width: u32,
    pub height: u32,
}

/// Callback invoked when the pass executes. Consumed exactly once.
pub type PassExecuteFn = Box<dyn FnOnce(&mut PassContext<'_>) + Send>;

/// A recorded unit of GPU work.
///
/// Created during graph recording, consumed during execution, then discarded.
pub struct PassRecord {
    name: String,
    reads: Vec<ResourceHandle>,
    write: Option<(ResourceHandle, u32)>,
    material: Option<Material>,
    pub(crate) execute: Option<PassExecuteFn>,
}

impl PassRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    /// The single write target and its attachment index, if declared.
    pub fn write(&self) -> Option<(ResourceHandle, u32)> {
        self.write
    }

    pub fn material(&self) -> Option<&Material> {
        self.material.as_ref()
    }

    pub fn reads_resource(&self, handle: ResourceHandle) -> bool {
        self.reads.contains(&handle)
    }

    pub fn writes_resource(&self, handle: ResourceHandle) -> bool {
        self.write.map(|(h, _)| h == handle).unwrap_or(false)
    }

    /// All declared accesses, reads first.
    pub fn accesses(&self) -> impl Iterator<Item = ResourceAccess> + '_ {
        self.reads
            .iter()
            .map(|&handle| ResourceAccess {
                handle,
                kind: AccessKind::Read,
            })
            .chain(self.write.map(|(handle, attachment)| ResourceAccess {
                handle,
                kind: AccessKind::Write { attachment },
            }))
    }
}

impl std::fmt::Debug for PassRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassRecord")
            .field("name", &self.name)
            .field("reads", &self.reads)
            .field("write", &self.write)
            .field("material", &self.material.as_ref().map(Material::name))
            .field("has_callback", &self.execute.is_some())
            .finish()
    }
}

/// Records one pass and appends it to the graph on [`end`](Self::end).
///
/// Declarations are validated when the builder finishes; an invalid pass is
/// reported as an error and not added to the graph.
pub struct PassBuilder<'g> {
    graph: &'g mut PassGraph,
    name: String,
    reads: Vec<ResourceHandle>,
    write: Option<(ResourceHandle, u32)>,
    material: Option<Material>,
    execute: Option<PassExecuteFn>,
    error: Option<GraphError>,
}

impl<'g> PassBuilder<'g> {
    pub(crate) fn new(graph: &'g mut PassGraph, name: String) -> Self {
        Self {
            graph,
            name,
            reads: Vec::new(),
            write: None,
            material: None,
            execute: None,
            error: None,
        }
    }

    /// Declare that this pass samples the given resource.
    pub fn declare_read(mut self, handle: ResourceHandle) -> Self {
        if self.graph.resource(handle).is_none() {
            self.record_error(GraphError::StaleHandle {
                pass: self.name.clone(),
            });
            return self;
        }
        self.reads.push(handle);
        self
    }

    /// Declare this pass's write target.
    ///
    /// Exactly one write target is supported; a second declaration is an
    /// invariant violation surfaced by [`end`](Self::end).
    pub fn declare_write(mut self, handle: ResourceHandle, attachment: u32) -> Self {
        if self.graph.resource(handle).is_none() {
            self.record_error(GraphError::StaleHandle {
                pass: self.name.clone(),
            });
            return self;
        }
        if self.write.is_some() {
            self.record_error(GraphError::MultipleWriteTargets {
                pass: self.name.clone(),
            });
            return self;
        }
        self.write = Some((handle, attachment));
        self
    }

    /// Attach the material reference this pass will draw with.
    pub fn material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    /// Register the execution callback.
    pub fn execute(mut self, f: impl FnOnce(&mut PassContext<'_>) + Send + 'static) -> Self {
        self.execute = Some(Box::new(f));
        self
    }

    /// Validate and append the pass to the graph.
    ///
    /// On error the pass is discarded and the graph is left unchanged.
    pub fn end(mut self) -> Result<PassHandle, GraphError> {
        if let Some(err) = self.error.take() {
            log::error!("pass '{}' rejected: {err}", self.name);
            return Err(err);
        }

        if let Some((write, _)) = self.write {
            if self.reads.contains(&write) {
                let err = GraphError::AccessHazard {
                    pass: self.name.clone(),
                };
                log::error!("pass '{}' rejected: {err}", self.name);
                return Err(err);
            }
        }

        Ok(self.graph.push_pass(PassRecord {
            name: self.name,
            reads: self.reads,
            write: self.write,
            material: self.material,
            execute: self.execute,
        }))
    }

    fn record_error(&mut self, err: GraphError) {
        // Keep the first error; later ones are usually consequences.
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureHandle;

    #[test]
    fn multiple_write_targets_are_rejected() {
        let mut graph = PassGraph::new();
        let a = graph.register_external(TextureHandle(1));
        let b = graph.register_external(TextureHandle(2));

        let result = graph
            .begin_pass("broken")
            .declare_write(a, 0)
            .declare_write(b, 0)
            .end();

        assert_eq!(
            result,
            Err(GraphError::MultipleWriteTargets {
                pass: "broken".to_string()
            })
        );
        assert_eq!(graph.pass_count(), 0);
    }

    #[test]
    fn read_write_hazard_is_rejected() {
        let mut graph = PassGraph::new();
        let a = graph.register_external(TextureHandle(1));

        let result = graph
            .begin_pass("hazard")
            .declare_read(a)
            .declare_write(a, 0)
            .end();

        assert_eq!(
            result,
            Err(GraphError::AccessHazard {
                pass: "hazard".to_string()
            })
        );
        assert_eq!(graph.pass_count(), 0);
    }

    #[test]
    fn handle_from_another_graph_is_stale() {
        let mut old_graph = PassGraph::new();
        let old = old_graph.register_external(TextureHandle(1));

        let mut graph = PassGraph::new();
        let target = graph.register_external(TextureHandle(2));
        let result = graph
            .begin_pass("uses_old")
            .declare_read(old)
            .declare_write(target, 0)
            .end();

        assert_eq!(
            result,
            Err(GraphError::StaleHandle {
                pass: "uses_old".to_string()
            })
        );
        assert_eq!(graph.pass_count(), 0);
    }
}
