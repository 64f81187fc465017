/*
 * The ownership structure of the scoring model: an ordered list of dimensions,
 * each owning its factors, each owning its layers. Nodes are addressed by
 * `NodePath`, the child indices from the root, which doubles as the parent
 * back-reference (`path.parent()`) without conferring ownership.
 *
 * Every structural change that touches a factor's layer set refreshes that
 * factor's derived weight and the owning dimension's aggregate status before
 * returning, so callers never observe a stale total.
 */
use super::models::{Node, NodeKind, NodeStatus};
use super::weights;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// The root itself; its children are the dimensions.
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    pub fn new(indices: &[usize]) -> Self {
        NodePath(indices.to_vec())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn parent(&self) -> Option<NodePath> {
        if self.0.is_empty() {
            None
        } else {
            Some(NodePath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, index: usize) -> NodePath {
        let mut indices = self.0.clone();
        indices.push(index);
        NodePath(indices)
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &NodePath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// The path truncated to `depth` components, if it is at least that deep.
    pub fn ancestor_at(&self, depth: usize) -> Option<NodePath> {
        if depth <= self.0.len() {
            Some(NodePath(self.0[..depth].to_vec()))
        } else {
            None
        }
    }
}

impl From<Vec<usize>> for NodePath {
    fn from(indices: Vec<usize>) -> Self {
        NodePath(indices)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for index in &self.0 {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    InvalidPath(NodePath),
    KindMismatch {
        parent: NodePath,
        expected: Option<NodeKind>,
        found: NodeKind,
    },
    CyclicMove {
        node: NodePath,
        target: NodePath,
    },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::InvalidPath(path) => write!(f, "No node at path {path}"),
            StructuralError::KindMismatch {
                parent,
                expected: Some(expected),
                found,
            } => write!(
                f,
                "Node at {parent} holds {expected} children, cannot take a {found}"
            ),
            StructuralError::KindMismatch {
                parent,
                expected: None,
                found,
            } => write!(f, "Node at {parent} cannot have children (got a {found})"),
            StructuralError::CyclicMove { node, target } => write!(
                f,
                "Cannot move node {node} under {target}: target is inside the moved subtree"
            ),
        }
    }
}

impl std::error::Error for StructuralError {}

pub type Result<T> = std::result::Result<T, StructuralError>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelTree {
    dimensions: Vec<Node>,
}

impl ModelTree {
    pub fn new() -> Self {
        ModelTree {
            dimensions: Vec::new(),
        }
    }

    /*
     * Builds a tree from already-constructed dimension subtrees and brings
     * every factor total and dimension status up to date. Used by the codec
     * once a whole document has been read.
     */
    pub fn from_dimensions(dimensions: Vec<Node>) -> Self {
        let mut tree = ModelTree { dimensions };
        for dimension in tree.dimensions.iter_mut() {
            for factor in dimension.children_mut().iter_mut() {
                weights::recompute_factor(factor);
            }
            weights::aggregate_dimension_status(dimension);
        }
        tree
    }

    /// The ordered top-level dimensions.
    pub fn root(&self) -> &[Node] {
        &self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Walks `path` from the root; `None` for the root path or any bad index.
    pub fn node_at(&self, path: &NodePath) -> Option<&Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.dimensions.get(*first)?;
        for index in rest {
            node = node.child(*index)?;
        }
        Some(node)
    }

    pub(crate) fn node_at_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = self.dimensions.get_mut(*first)?;
        for index in rest {
            node = node.children_mut().get_mut(*index)?;
        }
        Some(node)
    }

    /// Kind of the node at `path`; the root reports `None`.
    pub fn kind_at(&self, path: &NodePath) -> Result<Option<NodeKind>> {
        if path.is_root() {
            return Ok(None);
        }
        self.node_at(path)
            .map(|node| Some(node.kind()))
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))
    }

    pub fn child_count(&self, path: &NodePath) -> Result<usize> {
        if path.is_root() {
            return Ok(self.dimensions.len());
        }
        self.node_at(path)
            .map(Node::child_count)
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))
    }

    fn children_of_mut(&mut self, path: &NodePath) -> Result<&mut Vec<Node>> {
        if path.is_root() {
            return Ok(&mut self.dimensions);
        }
        self.node_at_mut(path)
            .map(Node::children_mut)
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))
    }

    fn check_child_kind(&self, parent: &NodePath, kind: NodeKind) -> Result<()> {
        let expected = match self.kind_at(parent)? {
            None => Some(NodeKind::Dimension),
            Some(parent_kind) => parent_kind.child_kind(),
        };
        if expected == Some(kind) {
            Ok(())
        } else {
            Err(StructuralError::KindMismatch {
                parent: parent.clone(),
                expected,
                found: kind,
            })
        }
    }

    pub(crate) fn require_kind(&self, path: &NodePath, kind: NodeKind) -> Result<()> {
        match self.kind_at(path)? {
            Some(found) if found == kind => Ok(()),
            Some(found) => Err(StructuralError::KindMismatch {
                parent: path.parent().unwrap_or_default(),
                expected: Some(kind),
                found,
            }),
            None => Err(StructuralError::InvalidPath(path.clone())),
        }
    }

    /*
     * Inserts `node` (with its subtree) as child `position` of `parent`.
     * `position` may equal the current child count to append.
     */
    pub fn insert(&mut self, parent: &NodePath, node: Node, position: usize) -> Result<NodePath> {
        self.check_child_kind(parent, node.kind())?;
        let children = self.children_of_mut(parent)?;
        if position > children.len() {
            return Err(StructuralError::InvalidPath(parent.child(position)));
        }
        log::debug!(
            "ModelTree: Inserting {} '{}' at {}",
            node.kind(),
            node.name(),
            parent.child(position)
        );
        children.insert(position, node);
        let inserted = parent.child(position);
        self.refresh_around(&inserted);
        Ok(inserted)
    }

    /// Appends `node` as the last child of `parent`.
    pub fn push(&mut self, parent: &NodePath, node: Node) -> Result<NodePath> {
        let position = self.child_count(parent)?;
        self.insert(parent, node, position)
    }

    /// Detaches the node at `path` together with its whole subtree.
    pub fn remove(&mut self, path: &NodePath) -> Result<Node> {
        let removed = self.detach(path)?;
        log::debug!(
            "ModelTree: Removed {} '{}' from {path}",
            removed.kind(),
            removed.name()
        );
        if let Some(parent) = path.parent() {
            self.refresh_around(&parent);
        }
        Ok(removed)
    }

    fn detach(&mut self, path: &NodePath) -> Result<Node> {
        let (parent, index) = match (path.parent(), path.last()) {
            (Some(parent), Some(index)) => (parent, index),
            _ => return Err(StructuralError::InvalidPath(path.clone())),
        };
        let children = self.children_of_mut(&parent)?;
        if index >= children.len() {
            return Err(StructuralError::InvalidPath(path.clone()));
        }
        Ok(children.remove(index))
    }

    /*
     * Reparents the node at `from` as child `position` of `new_parent`.
     * `position` is interpreted after the node has been detached, so moving
     * within the same parent uses the final index. All checks run before the
     * tree is touched; a rejected move leaves it unchanged.
     */
    pub fn move_node(
        &mut self,
        from: &NodePath,
        new_parent: &NodePath,
        position: usize,
    ) -> Result<NodePath> {
        let kind = self
            .kind_at(from)?
            .ok_or_else(|| StructuralError::InvalidPath(from.clone()))?;
        if from.contains(new_parent) {
            log::warn!("ModelTree: Rejected move of {from} under its own subtree {new_parent}");
            return Err(StructuralError::CyclicMove {
                node: from.clone(),
                target: new_parent.clone(),
            });
        }
        self.check_child_kind(new_parent, kind)?;

        let old_parent = from.parent().unwrap_or_default();
        let mut available = self.child_count(new_parent)?;
        if old_parent == *new_parent {
            available -= 1;
        }
        if position > available {
            return Err(StructuralError::InvalidPath(new_parent.child(position)));
        }

        // The kind check puts `new_parent` one level above `from`, so detaching
        // cannot renumber it.
        let node = self.detach(from)?;
        self.refresh_around(&old_parent);
        let children = self.children_of_mut(new_parent)?;
        children.insert(position, node);
        let moved = new_parent.child(position);
        log::debug!("ModelTree: Moved {kind} from {from} to {moved}");
        self.refresh_around(&moved);
        Ok(moved)
    }

    pub fn rename(&mut self, path: &NodePath, name: String) -> Result<()> {
        let node = self
            .node_at_mut(path)
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))?;
        log::debug!("ModelTree: Renaming '{}' at {path} to '{name}'", node.name());
        node.set_name(name);
        Ok(())
    }

    pub fn set_status(&mut self, path: &NodePath, status: NodeStatus) -> Result<()> {
        let node = self
            .node_at_mut(path)
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))?;
        log::trace!("ModelTree: Status of {path} set to {status:?}");
        node.set_status(status);
        Ok(())
    }

    /*
     * Sets one attribute of the layer at `path`, returning the previous value.
     * New keys are appended after the existing ones.
     */
    pub fn set_attribute(
        &mut self,
        path: &NodePath,
        key: String,
        value: Value,
    ) -> Result<Option<Value>> {
        self.require_kind(path, NodeKind::Layer)?;
        let layer = self
            .node_at_mut(path)
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))?;
        log::debug!("ModelTree: Layer '{}' attribute '{key}' set", layer.name());
        Ok(layer.attributes_mut().insert(key, value))
    }

    /// Paths of every layer, in document order.
    pub fn leaves(&self) -> Vec<NodePath> {
        let mut leaves = Vec::new();
        for (d, dimension) in self.dimensions.iter().enumerate() {
            for (f, factor) in dimension.children().iter().enumerate() {
                for l in 0..factor.child_count() {
                    leaves.push(NodePath::new(&[d, f, l]));
                }
            }
        }
        leaves
    }

    /// Paths of every factor, in document order.
    pub fn factor_paths(&self) -> Vec<NodePath> {
        let mut factors = Vec::new();
        for (d, dimension) in self.dimensions.iter().enumerate() {
            for f in 0..dimension.child_count() {
                factors.push(NodePath::new(&[d, f]));
            }
        }
        factors
    }

    /// Path of the factor enclosing `path` (the node itself if it is a factor).
    pub fn enclosing_factor(&self, path: &NodePath) -> Option<NodePath> {
        let factor = path.ancestor_at(2)?;
        match self.node_at(&factor)?.kind() {
            NodeKind::Factor => Some(factor),
            _ => None,
        }
    }

    /*
     * Recomputes the factor enclosing `path` (if any) and the aggregate status
     * of the dimension enclosing it. A dimension-level change also recomputes
     * all of that dimension's factors, since they may have arrived with layers.
     */
    pub(crate) fn refresh_around(&mut self, path: &NodePath) {
        let Some(dimension_path) = path.ancestor_at(1) else {
            return;
        };
        let factor_path = path.ancestor_at(2);
        let Some(dimension) = self.node_at_mut(&dimension_path) else {
            return;
        };
        match factor_path.and_then(|p| p.last()) {
            Some(factor_index) => {
                if let Some(factor) = dimension.children_mut().get_mut(factor_index) {
                    weights::recompute_factor(factor);
                }
            }
            None => {
                for factor in dimension.children_mut().iter_mut() {
                    weights::recompute_factor(factor);
                }
            }
        }
        weights::aggregate_dimension_status(dimension);
    }
}
