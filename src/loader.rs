//! Ownership tracking for native class-loader resources.
//!
//! Foreign loader resources have use-after-free hazards when freed out of
//! order: a child loader depends on its parent's continued existence. The
//! registry records the parent/child graph explicitly and refuses to release
//! any node that still has registered children, enforcing strict bottom-up
//! release independent of whatever collection behavior the embedding
//! technology provides.
//!
//! Operations on a given hierarchy are not internally synchronized; a
//! hierarchy is owned by one thread unless the caller adds a lock.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Identity of a native loader resource (e.g. a global reference address).
pub type NativeHandle = u64;

/// Key of a registered loader node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(u64);

#[derive(Debug)]
struct LoaderNode {
    handle: NativeHandle,
    parent: Option<LoaderId>,
    /// Children keyed by their native handle's identity.
    children: HashMap<NativeHandle, LoaderId>,
}

/// Registry of loader nodes with parent/child release discipline.
#[derive(Debug, Default)]
pub struct LoaderRegistry {
    nodes: HashMap<LoaderId, LoaderNode>,
    next_id: u64,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root node owning `handle`, with an empty children set.
    pub fn wrap_root(&mut self, handle: NativeHandle) -> LoaderId {
        self.insert(handle, None)
    }

    /// Register a child node owning `handle` under `parent`.
    ///
    /// The child is recorded in the parent's children set keyed by the
    /// native handle's identity.
    pub fn wrap_child(&mut self, handle: NativeHandle, parent: LoaderId) -> Result<LoaderId> {
        if !self.nodes.contains_key(&parent) {
            return Err(Error::configuration(format!(
                "unknown parent loader id {:?}",
                parent
            )));
        }
        let id = self.insert(handle, Some(parent));
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(handle, id);
        }
        Ok(id)
    }

    /// Release a node, returning its native handle for the actual free.
    ///
    /// Fails with [`Error::LoaderInUse`] while the node has registered
    /// children; the caller must release children first (never cascaded
    /// automatically). A released child is detached from its parent's
    /// children set before the handle is handed back.
    pub fn release(&mut self, id: LoaderId) -> Result<NativeHandle> {
        let (parent, handle) = {
            let node = self
                .nodes
                .get(&id)
                .ok_or_else(|| Error::configuration(format!("unknown loader id {:?}", id)))?;
            if !node.children.is_empty() {
                return Err(Error::loader_in_use(node.children.len()));
            }
            (node.parent, node.handle)
        };

        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                if parent_node.children.get(&handle) == Some(&id) {
                    parent_node.children.remove(&handle);
                }
            }
        }

        self.nodes.remove(&id);
        Ok(handle)
    }

    /// Number of children currently registered under a node.
    pub fn child_count(&self, id: LoaderId) -> Option<usize> {
        self.nodes.get(&id).map(|n| n.children.len())
    }

    /// The native handle owned by a node.
    pub fn handle(&self, id: LoaderId) -> Option<NativeHandle> {
        self.nodes.get(&id).map(|n| n.handle)
    }

    /// Whether a node is still registered.
    pub fn contains(&self, id: LoaderId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, handle: NativeHandle, parent: Option<LoaderId>) -> LoaderId {
        let id = LoaderId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            LoaderNode {
                handle,
                parent,
                children: HashMap::new(),
            },
        );
        id
    }
}
