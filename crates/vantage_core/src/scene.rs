//! # Scene Graph
//!
//! In-memory stand-in for the host's live scene graph. Every structural and
//! attribute change is appended to a mutation log; the adapter graph drains
//! the log and keeps derived state in sync.
//!
//! Removing a child only detaches it. The detached subtree stays in the store
//! so it can be re-inserted, and so its adapters can still be found while
//! they are being disposed.
//!
//! `id` lookups skip detached subtrees. When several nodes share an `id`,
//! the one that took it first wins; removing it hands the id to the next
//! owner.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;
use vantage_shared::NodeId;

/// Errors raised by scene-graph edits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The node does not exist in this scene.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// The child already has a parent.
    #[error("{child} is already attached to {parent}")]
    AlreadyAttached {
        /// Node that was being appended.
        child: NodeId,
        /// Its current parent.
        parent: NodeId,
    },

    /// Appending would make a node its own ancestor.
    #[error("appending {child} under {parent} would create a cycle")]
    WouldCycle {
        /// Intended parent.
        parent: NodeId,
        /// Intended child.
        child: NodeId,
    },

    /// The node is not a child of the given parent.
    #[error("{child} is not a child of {parent}")]
    NotAChild {
        /// Claimed parent.
        parent: NodeId,
        /// Claimed child.
        child: NodeId,
    },
}

/// One entry of the mutation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `node` was appended under `parent`.
    Inserted {
        /// New parent.
        parent: NodeId,
        /// Inserted subtree root.
        node: NodeId,
    },
    /// `node` was detached from `parent`.
    Removed {
        /// Former parent.
        parent: NodeId,
        /// Removed subtree root.
        node: NodeId,
    },
    /// An attribute was set, changed or removed.
    AttributeChanged {
        /// Node whose attribute changed.
        node: NodeId,
        /// Attribute name.
        name: String,
        /// Previous value.
        old: Option<String>,
        /// New value.
        new: Option<String>,
    },
}

impl Mutation {
    /// Returns true for insertions and removals.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Removed { .. })
    }
}

/// A scene-graph node.
#[derive(Debug, Clone)]
pub struct VisualNode {
    id: NodeId,
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: BTreeMap<String, String>,
    endpoints: Option<Vec<NodeId>>,
}

impl VisualNode {
    fn new(id: NodeId, tag: &str) -> Self {
        Self {
            id,
            tag: tag.to_ascii_lowercase(),
            parent: None,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            endpoints: None,
        }
    }

    /// Node id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Lower-case tag name.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Parent, if attached.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered children.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `id` attribute.
    #[must_use]
    pub fn dom_id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// Nodes this node is distributed to, if it takes part in distribution.
    #[must_use]
    pub fn endpoints(&self) -> Option<&[NodeId]> {
        self.endpoints.as_deref()
    }
}

/// The scene graph.
pub struct SceneGraph {
    nodes: HashMap<NodeId, VisualNode>,
    ids: HashMap<String, Vec<NodeId>>,
    detached: HashSet<NodeId>,
    pending: Vec<Mutation>,
    next_id: u64,
}

impl SceneGraph {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::with_capacity(256),
            ids: HashMap::new(),
            detached: HashSet::new(),
            pending: Vec::new(),
            next_id: 1,
        }
    }

    /// Creates a node with no parent.
    pub fn create_node(&mut self, tag: &str) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, VisualNode::new(id, tag));
        id
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&VisualNode> {
        self.nodes.get(&id)
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, attached or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the scene has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut VisualNode, SceneError> {
        self.nodes.get_mut(&id).ok_or(SceneError::NodeNotFound(id))
    }

    /// Appends `child` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Fails if either node is unknown, the child already has a parent, or
    /// the child is `parent` or one of its ancestors.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        let current = self.node(child).ok_or(SceneError::NodeNotFound(child))?.parent;
        if let Some(current) = current {
            return Err(SceneError::AlreadyAttached { child, parent: current });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::WouldCycle { parent, child });
        }

        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.detached.remove(&child);
        self.pending.push(Mutation::Inserted { parent, node: child });
        Ok(())
    }

    /// Detaches `child` from `parent`. The subtree is kept.
    ///
    /// # Errors
    ///
    /// Fails if `child` is not currently a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        let children = &mut self.node_mut(parent)?.children;
        let Some(index) = children.iter().position(|&c| c == child) else {
            return Err(SceneError::NotAChild { parent, child });
        };
        children.remove(index);
        self.node_mut(child)?.parent = None;
        self.detached.insert(child);
        self.pending.push(Mutation::Removed { parent, node: child });
        Ok(())
    }

    /// Sets an attribute, returning the previous value.
    ///
    /// Setting an attribute to its current value records nothing.
    ///
    /// # Errors
    ///
    /// Fails if the node is unknown.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<Option<String>, SceneError> {
        let entry = self.node_mut(node)?;
        let old = entry.attributes.insert(name.to_owned(), value.to_owned());
        if old.as_deref() == Some(value) {
            return Ok(old);
        }
        if name == "id" {
            self.reindex(node, old.as_deref(), Some(value));
        }
        self.pending.push(Mutation::AttributeChanged {
            node,
            name: name.to_owned(),
            old: old.clone(),
            new: Some(value.to_owned()),
        });
        Ok(old)
    }

    /// Removes an attribute, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails if the node is unknown.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<Option<String>, SceneError> {
        let old = self.node_mut(node)?.attributes.remove(name);
        if old.is_some() {
            if name == "id" {
                self.reindex(node, old.as_deref(), None);
            }
            self.pending.push(Mutation::AttributeChanged {
                node,
                name: name.to_owned(),
                old: old.clone(),
                new: None,
            });
        }
        Ok(old)
    }

    fn reindex(&mut self, node: NodeId, old: Option<&str>, new: Option<&str>) {
        if let Some(old) = old {
            if let Some(owners) = self.ids.get_mut(old) {
                owners.retain(|&owner| owner != node);
                if owners.is_empty() {
                    self.ids.remove(old);
                }
            }
        }
        if let Some(new) = new {
            self.ids.entry(new.to_owned()).or_default().push(node);
        }
    }

    /// Resolves an `id` attribute value to its node.
    ///
    /// Nodes inside a removed subtree are skipped.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids
            .get(id)?
            .iter()
            .copied()
            .find(|&owner| !self.is_detached(owner))
    }

    /// Returns true if `node` lies inside a subtree removed with
    /// [`SceneGraph::remove_child`] and not re-appended since.
    #[must_use]
    pub fn is_detached(&self, node: NodeId) -> bool {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .any(|id| self.detached.contains(&id))
    }

    /// Declares the nodes `host` is distributed to.
    ///
    /// # Errors
    ///
    /// Fails if `host` or any endpoint is unknown.
    pub fn set_distribution_endpoints(
        &mut self,
        host: NodeId,
        endpoints: Vec<NodeId>,
    ) -> Result<(), SceneError> {
        if let Some(&missing) = endpoints.iter().find(|&&e| !self.contains(e)) {
            return Err(SceneError::NodeNotFound(missing));
        }
        self.node_mut(host)?.endpoints = Some(endpoints);
        Ok(())
    }

    /// Clears a node's distribution endpoints.
    ///
    /// # Errors
    ///
    /// Fails if `host` is unknown.
    pub fn clear_distribution_endpoints(&mut self, host: NodeId) -> Result<(), SceneError> {
        self.node_mut(host)?.endpoints = None;
        Ok(())
    }

    /// Nodes that currently declare distribution endpoints.
    pub fn endpoint_hosts(&self) -> impl Iterator<Item = &VisualNode> + '_ {
        self.nodes.values().filter(|n| n.endpoints.is_some())
    }

    /// Returns true if `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(VisualNode::parent);
        }
        false
    }

    /// Ancestors of `node`, nearest first, excluding `node`.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(node).and_then(VisualNode::parent), |&id| {
            self.node(id).and_then(VisualNode::parent)
        })
    }

    /// `root` and all its descendants in depth-first pre-order.
    pub fn descendants(&self, root: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        SceneDfsIterator {
            scene: self,
            stack: if self.contains(root) { vec![root] } else { Vec::new() },
        }
    }

    /// First descendant of `root` (excluding `root`) with the given tag.
    #[must_use]
    pub fn first_descendant_with_tag(&self, root: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(root)
            .skip(1)
            .find(|&id| self.node(id).is_some_and(|n| n.tag.eq_ignore_ascii_case(tag)))
    }

    /// First direct child of `parent` with the given tag.
    #[must_use]
    pub fn first_child_with_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.node(parent)?
            .children
            .iter()
            .copied()
            .find(|&id| self.node(id).is_some_and(|n| n.tag.eq_ignore_ascii_case(tag)))
    }

    /// Drains the mutation log.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.pending)
    }

    /// Returns true if mutations are waiting to be processed.
    #[must_use]
    pub fn has_pending_mutations(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

struct SceneDfsIterator<'a> {
    scene: &'a SceneGraph,
    stack: Vec<NodeId>,
}

impl Iterator for SceneDfsIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        if let Some(node) = self.scene.node(id) {
            self.stack.extend(node.children.iter().rev().copied());
        }
        Some(id)
    }
}
