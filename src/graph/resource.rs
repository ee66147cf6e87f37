//! Virtual resources referenced by graph passes.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::TextureHandle;
use crate::types::TextureDescriptor;

/// Handle to a resource registered with a pass graph.
///
/// Handles carry a generation counter so references that outlive the frame
/// that issued them are detected instead of silently resolving to whatever
/// now occupies the same slot. A transient handle from one frame's graph is
/// never valid in the next frame's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: u32,
    generation: u64,
}

impl ResourceHandle {
    pub(crate) fn new(index: u32) -> Self {
        static GENERATION: AtomicU64 = AtomicU64::new(1);
        Self {
            index,
            generation: GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Slot index within the graph that issued this handle.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation stamp used for staleness detection.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// How a pass accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Sampled as a texture.
    Read,
    /// Written as a color attachment at the given index.
    Write { attachment: u32 },
}

impl AccessKind {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// A declared access: which resource, and with what intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub handle: ResourceHandle,
    pub kind: AccessKind,
}

/// A resource slot in the graph.
#[derive(Debug, Clone)]
pub enum VirtualResource {
    /// A long-lived texture owned by the hosting pipeline (the frame's
    /// active color target). The graph holds a non-owning reference.
    External { texture: TextureHandle },
    /// A texture whose lifetime is scoped to one graph execution. Backing
    /// memory is committed by the transient pool when the graph runs.
    Transient {
        name: String,
        desc: TextureDescriptor,
    },
}

impl VirtualResource {
    pub fn name(&self) -> &str {
        match self {
            Self::External { .. } => "external",
            Self::Transient { name, .. } => name,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
