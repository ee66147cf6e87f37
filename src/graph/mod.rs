//! Pass graph: declarative recording of GPU passes and their dependencies.
//!
//! A [`PassGraph`] collects the passes for one frame. Each pass declares what
//! it reads and what it writes; [`PassGraph::compile`] derives dependency
//! edges from those declarations and orders the passes with a topological
//! sort, and [`GraphExecutor`](executor::GraphExecutor) runs the result
//! sequentially with every declaration resolved to a backing texture.
//!
//! Graphs are frame-scoped: record, compile, execute, discard. Handles issued
//! by one graph are rejected by the next (see
//! [`ResourceHandle`](resource::ResourceHandle)).
//!
//! ```ignore
//! let mut graph = PassGraph::new();
//! let target = graph.register_external(frame.active_color_target);
//! graph
//!     .begin_pass("copy_color")
//!     .declare_read(target)
//!     .declare_write(scratch, 0)
//!     .execute(move |ctx| { /* draw */ })
//!     .end()?;
//! ```

pub mod executor;
pub mod pass;
pub mod pool;
pub mod resource;

pub use executor::GraphExecutor;
pub use pass::{PassBuilder, PassContext, PassRecord};
pub use pool::TransientPool;
pub use resource::{AccessKind, ResourceAccess, ResourceHandle, VirtualResource};

use std::collections::HashMap;

use crate::backend::TextureHandle;
use crate::error::GraphError;

/// Handle to a pass in the graph. Only valid within the graph that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The ordered collection of passes for one frame.
#[derive(Debug, Default)]
pub struct PassGraph {
    resources: Vec<ResourceSlot>,
    passes: Vec<PassRecord>,
    /// Explicit ordering constraints as (dependent, dependency) pairs, in
    /// addition to the edges derived from resource accesses.
    edges: Vec<(PassHandle, PassHandle)>,
    externals: HashMap<TextureHandle, ResourceHandle>,
}

#[derive(Debug)]
struct ResourceSlot {
    generation: u64,
    resource: VirtualResource,
}

impl PassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a texture owned by the hosting pipeline (such as the frame's
    /// active color target). Registering the same texture twice returns the
    /// same handle.
    pub fn register_external(&mut self, texture: TextureHandle) -> ResourceHandle {
        if let Some(&handle) = self.externals.get(&texture) {
            return handle;
        }
        let handle = self.add_resource(VirtualResource::External { texture });
        self.externals.insert(texture, handle);
        handle
    }

    pub(crate) fn add_resource(&mut self, resource: VirtualResource) -> ResourceHandle {
        let handle = ResourceHandle::new(self.resources.len() as u32);
        self.resources.push(ResourceSlot {
            generation: handle.generation(),
            resource,
        });
        handle
    }

    /// Look up a resource, returning `None` for handles this graph did not
    /// issue (including handles from a previous frame's graph).
    pub fn resource(&self, handle: ResourceHandle) -> Option<&VirtualResource> {
        self.resources
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .map(|slot| &slot.resource)
    }

    /// Start recording a pass. The pass joins the graph when the builder's
    /// `end` succeeds.
    pub fn begin_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_> {
        PassBuilder::new(self, name.into())
    }

    pub(crate) fn push_pass(&mut self, pass: PassRecord) -> PassHandle {
        let handle = PassHandle::new(self.passes.len() as u32);
        self.passes.push(pass);
        handle
    }

    /// Add an explicit ordering constraint: `dependent` executes after
    /// `dependency`. Accesses already imply most edges; this is for
    /// constraints the resource declarations cannot express.
    pub fn add_dependency(&mut self, dependent: PassHandle, dependency: PassHandle) {
        assert!(dependent.index() < self.passes.len(), "invalid dependent");
        assert!(dependency.index() < self.passes.len(), "invalid dependency");
        assert_ne!(dependent, dependency, "pass cannot depend on itself");
        if !self.edges.contains(&(dependent, dependency)) {
            self.edges.push((dependent, dependency));
        }
    }

    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Resolve dependencies into an execution order.
    ///
    /// A pass depends on the latest earlier pass that writes a resource it
    /// reads, on the latest earlier writer of its own write target, and on
    /// every earlier reader of its write target. Declaration order breaks
    /// ties, so a linear chain executes exactly as recorded while arbitrary
    /// DAGs still order correctly.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        let n = self.passes.len();

        // dependencies[i] holds the pass indices that must run before pass i.
        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, pass) in self.passes.iter().enumerate() {
            for &read in pass.reads() {
                if let Some(j) = self.latest_writer_before(i, read) {
                    dependencies[i].push(j);
                }
            }
            if let Some((write, _)) = pass.write() {
                if let Some(j) = self.latest_writer_before(i, write) {
                    dependencies[i].push(j);
                }
                for (j, earlier) in self.passes.iter().enumerate().take(i) {
                    if earlier.reads_resource(write) {
                        dependencies[i].push(j);
                    }
                }
            }
        }

        for &(dependent, dependency) in &self.edges {
            dependencies[dependent.index()].push(dependency.index());
        }

        for deps in &mut dependencies {
            deps.sort_unstable();
            deps.dedup();
        }

        let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
        let mut emitted = vec![false; n];
        let mut pass_order = Vec::with_capacity(n);

        // Kahn's algorithm; always pick the lowest-index ready pass so the
        // order is deterministic and follows declaration order where the
        // dependencies allow it.
        while pass_order.len() < n {
            let next = (0..n).find(|&i| !emitted[i] && in_degree[i] == 0);
            let Some(next) = next else {
                return Err(GraphError::CyclicDependency);
            };
            emitted[next] = true;
            pass_order.push(PassHandle::new(next as u32));
            for (i, deps) in dependencies.iter().enumerate() {
                if !emitted[i] && deps.contains(&next) {
                    in_degree[i] -= 1;
                }
            }
        }

        // Resource lifetimes in execution-order steps.
        let mut resource_lifetimes: HashMap<u32, ResourceLifetime> = HashMap::new();
        for (step, handle) in pass_order.iter().enumerate() {
            let pass = &self.passes[handle.index()];
            for access in pass.accesses() {
                let lifetime = resource_lifetimes
                    .entry(access.handle.index())
                    .or_insert(ResourceLifetime {
                        first_use: step,
                        last_use: step,
                    });
                lifetime.last_use = step;
            }
        }

        Ok(CompiledGraph {
            pass_order,
            resource_lifetimes,
        })
    }

    fn latest_writer_before(&self, index: usize, resource: ResourceHandle) -> Option<usize> {
        self.passes[..index]
            .iter()
            .rposition(|pass| pass.writes_resource(resource))
    }
}

/// Resource lifetime in execution-order steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// A compiled graph: execution order plus resource lifetimes.
#[derive(Debug)]
pub struct CompiledGraph {
    pass_order: Vec<PassHandle>,
    resource_lifetimes: HashMap<u32, ResourceLifetime>,
}

impl CompiledGraph {
    pub fn pass_order(&self) -> &[PassHandle] {
        &self.pass_order
    }

    /// Whether a resource is used at the given execution step.
    pub fn is_resource_alive(&self, handle: ResourceHandle, step: usize) -> bool {
        self.resource_lifetimes
            .get(&handle.index())
            .map(|lifetime| step >= lifetime.first_use && step <= lifetime.last_use)
            .unwrap_or(false)
    }
}

static_assertions::assert_impl_all!(PassGraph: Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_external_is_idempotent() {
        let mut graph = PassGraph::new();
        let a = graph.register_external(TextureHandle(1));
        let b = graph.register_external(TextureHandle(1));
        let c = graph.register_external(TextureHandle(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn linear_chain_compiles_in_declaration_order() {
        let mut graph = PassGraph::new();
        let target = graph.register_external(TextureHandle(1));
        let scratch = graph.add_resource(VirtualResource::Transient {
            name: "scratch".to_string(),
            desc: Default::default(),
        });

        let copy = graph
            .begin_pass("copy")
            .declare_read(target)
            .declare_write(scratch, 0)
            .end()
            .unwrap();
        let composite = graph
            .begin_pass("composite")
            .declare_read(scratch)
            .declare_write(target, 0)
            .end()
            .unwrap();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[copy, composite]);
    }

    #[test]
    fn explicit_dependency_reorders_passes() {
        let mut graph = PassGraph::new();
        let a_target = graph.register_external(TextureHandle(1));
        let b_target = graph.register_external(TextureHandle(2));

        let a = graph
            .begin_pass("declared_first")
            .declare_write(a_target, 0)
            .end()
            .unwrap();
        let b = graph
            .begin_pass("declared_second")
            .declare_write(b_target, 0)
            .end()
            .unwrap();

        // declared_first must run after declared_second.
        graph.add_dependency(a, b);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[b, a]);
    }

    #[test]
    fn cycle_is_reported() {
        let mut graph = PassGraph::new();
        let a_target = graph.register_external(TextureHandle(1));
        let b_target = graph.register_external(TextureHandle(2));

        let a = graph
            .begin_pass("a")
            .declare_write(a_target, 0)
            .end()
            .unwrap();
        let b = graph
            .begin_pass("b")
            .declare_write(b_target, 0)
            .end()
            .unwrap();

        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        assert_eq!(graph.compile().unwrap_err(), GraphError::CyclicDependency);
    }

    #[test]
    fn write_after_read_keeps_reader_first() {
        let mut graph = PassGraph::new();
        let shared = graph.register_external(TextureHandle(1));
        let other = graph.register_external(TextureHandle(2));

        let reader = graph
            .begin_pass("reader")
            .declare_read(shared)
            .declare_write(other, 0)
            .end()
            .unwrap();
        let writer = graph
            .begin_pass("writer")
            .declare_read(other)
            .declare_write(shared, 0)
            .end()
            .unwrap();

        // reader samples `shared` before writer overwrites it; the derived
        // edges must not invert that, nor report a false cycle.
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[reader, writer]);
    }

    #[test]
    fn resource_lifetimes_span_uses() {
        let mut graph = PassGraph::new();
        let target = graph.register_external(TextureHandle(1));
        let scratch = graph.add_resource(VirtualResource::Transient {
            name: "scratch".to_string(),
            desc: Default::default(),
        });

        graph
            .begin_pass("copy")
            .declare_read(target)
            .declare_write(scratch, 0)
            .end()
            .unwrap();
        graph
            .begin_pass("composite")
            .declare_read(scratch)
            .declare_write(target, 0)
            .end()
            .unwrap();

        let compiled = graph.compile().unwrap();
        assert!(compiled.is_resource_alive(scratch, 0));
        assert!(compiled.is_resource_alive(scratch, 1));
        assert!(!compiled.is_resource_alive(scratch, 2));
    }
}
