use super::error::TreeError;
use super::node::{Node, NodeId};
use super::writer;

#[derive(Debug, Default, Clone)]
pub struct Tree {
    /// Arena storage for all nodes
    nodes: Vec<Node>,

    /// Optional root ID (a tree might be empty or in construction)
    root: Option<NodeId>,
}

impl Tree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new node to the tree. Returns the new node's ID.
    /// The node is initially detached (no parent).
    pub fn add_node(&mut self) -> NodeId {
        let id = self.nodes.len();
        let node = Node::new(id);
        self.nodes.push(node);
        id
    }

    /// Get a reference to a node by ID. Returns None if ID is invalid or node is deleted.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).filter(|n| !n.deleted)
    }

    /// Get a mutable reference to a node by ID.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).filter(|n| !n.deleted)
    }

    /// Set a node as the root of the tree.
    pub fn set_root(&mut self, id: NodeId) {
        if self.get_node(id).is_some() {
            self.root = Some(id);
        }
    }

    /// Get the root node ID
    pub fn get_root(&self) -> Option<NodeId> {
        self.root
    }

    /// Add a child to a parent node.
    /// Updates both parent's `children` list and child's `parent` field.
    pub fn add_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<(), TreeError> {
        if parent_id == child_id {
            return Err(TreeError::LogicError(
                "Cannot add node as child of itself".to_string(),
            ));
        }
        if self.get_node(parent_id).is_none() {
            return Err(TreeError::LogicError(format!(
                "Parent node {} not found or deleted",
                parent_id
            )));
        }
        if self.get_node(child_id).is_none() {
            return Err(TreeError::LogicError(format!(
                "Child node {} not found or deleted",
                child_id
            )));
        }
        if let Some(old_parent) = self.nodes[child_id].parent {
            return Err(TreeError::LogicError(format!(
                "Node {} already has parent {}",
                child_id, old_parent
            )));
        }

        self.nodes[child_id].parent = Some(parent_id);
        self.nodes[parent_id].children.push(child_id);

        Ok(())
    }

    /// Number of active nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Perform a preorder traversal starting from a given node.
    /// Children are visited left-to-right in their stored order.
    pub fn preorder(&self, start_node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        if self.get_node(*start_node).is_none() {
            return Err(TreeError::LogicError(format!(
                "Node {} not found",
                start_node
            )));
        }

        let mut result = Vec::new();
        let mut stack = vec![*start_node];

        while let Some(curr) = stack.pop() {
            result.push(curr);
            if let Some(node) = self.get_node(curr) {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        Ok(result)
    }

    /// Perform a postorder traversal starting from a given node
    /// (children before parent).
    pub fn postorder(&self, start_node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        if self.get_node(*start_node).is_none() {
            return Err(TreeError::LogicError(format!(
                "Node {} not found",
                start_node
            )));
        }

        // Preorder with children visited right-to-left, then reversed.
        let mut stack = vec![*start_node];
        let mut output_stack = Vec::new();

        while let Some(curr) = stack.pop() {
            output_stack.push(curr);
            if let Some(node) = self.get_node(curr) {
                for &child in node.children.iter() {
                    stack.push(child);
                }
            }
        }

        output_stack.reverse();
        Ok(output_stack)
    }

    /// Get the path from the root to the specified node, inclusive at both ends.
    pub fn get_path_from_root(&self, target_node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        if self.get_node(*target_node).is_none() {
            return Err(TreeError::LogicError(format!(
                "Node {} not found",
                target_node
            )));
        }

        let mut path = Vec::new();
        let mut curr = *target_node;

        loop {
            path.push(curr);
            match self.get_node(curr).and_then(|n| n.parent) {
                Some(parent) => curr = parent,
                None => break,
            }
        }

        path.reverse();
        Ok(path)
    }

    /// Find the lowest common ancestor of two nodes.
    pub fn get_common_ancestor(&self, a: &NodeId, b: &NodeId) -> Result<NodeId, TreeError> {
        let path_a = self.get_path_from_root(a)?;
        let path_b = self.get_path_from_root(b)?;

        let mut lca = None;
        for (u, v) in path_a.iter().zip(path_b.iter()) {
            if u == v {
                lca = Some(*u);
            } else {
                break;
            }
        }

        lca.ok_or_else(|| {
            TreeError::LogicError("Nodes are not in the same tree (no common ancestor)".to_string())
        })
    }

    /// Sum of branch lengths (missing treated as 0) on the path between two nodes.
    pub fn get_distance(&self, a: &NodeId, b: &NodeId) -> Result<f64, TreeError> {
        let lca = self.get_common_ancestor(a, b)?;

        let dist_to_lca = |start: NodeId| -> f64 {
            let mut weighted = 0.0;
            let mut curr = start;
            while curr != lca {
                if let Some(node) = self.get_node(curr) {
                    weighted += node.length.unwrap_or(0.0);
                    match node.parent {
                        Some(p) => curr = p,
                        None => break,
                    }
                } else {
                    break;
                }
            }
            weighted
        };

        Ok(dist_to_lca(*a) + dist_to_lca(*b))
    }

    /// Sum of branch lengths from the root down to `id`.
    /// The root's own length is not counted.
    pub fn distance_from_root(&self, id: NodeId) -> Result<f64, TreeError> {
        if self.get_node(id).is_none() {
            return Err(TreeError::LogicError(format!("Node {} not found", id)));
        }
        let mut weighted = 0.0;
        let mut curr = id;
        while let Some(parent) = self.get_node(curr).and_then(|n| n.parent) {
            weighted += self.get_node(curr).unwrap().length.unwrap_or(0.0);
            curr = parent;
        }
        Ok(weighted)
    }

    /// Leaf IDs in tree order (preorder).
    pub fn leaves(&self) -> Vec<NodeId> {
        match self.root {
            Some(root) => self
                .preorder(&root)
                .unwrap_or_default()
                .into_iter()
                .filter(|&id| self.get_node(id).map(|n| n.is_leaf()).unwrap_or(false))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Leaf labels in tree order. Unnamed leaves are skipped.
    pub fn leaf_names(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.get_node(id).and_then(|n| n.name.clone()))
            .collect()
    }

    /// Internal node IDs in preorder; the first entry is the root.
    pub fn internals(&self) -> Vec<NodeId> {
        match self.root {
            Some(root) => self
                .preorder(&root)
                .unwrap_or_default()
                .into_iter()
                .filter(|&id| self.get_node(id).map(|n| !n.is_leaf()).unwrap_or(false))
                .collect(),
            None => Vec::new(),
        }
    }

    fn combine_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
        match (a, b) {
            (None, None) => None,
            _ => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        }
    }

    /// Remove a leaf and keep the topology tidy.
    ///
    /// Detaches the leaf from its parent; if the parent is left with a single
    /// child, the parent is spliced out and its branch length is added to that
    /// child's. A root left with a lone child is replaced by it. Runs in
    /// O(depth) using the arena's parent links.
    pub fn prune_leaf(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self
            .get_node(id)
            .ok_or_else(|| TreeError::LogicError(format!("Node {} not found", id)))?;
        if !node.is_leaf() {
            return Err(TreeError::LogicError(format!(
                "Node {} is not a leaf",
                id
            )));
        }
        let parent_id = node.parent.ok_or_else(|| {
            TreeError::LogicError("Cannot prune the root of the tree".to_string())
        })?;

        self.nodes[parent_id].children.retain(|&c| c != id);
        self.nodes[id].parent = None;
        self.nodes[id].deleted = true;

        if self.nodes[parent_id].children.len() == 1 {
            self.splice_out(parent_id)?;
        }

        Ok(())
    }

    /// Splice out a node with exactly one child: the child takes the node's
    /// place (same position in the grandparent's child list) and inherits the
    /// node's branch length added to its own. A spliced root promotes its
    /// child to root.
    fn splice_out(&mut self, id: NodeId) -> Result<(), TreeError> {
        if self.nodes[id].children.len() != 1 {
            return Err(TreeError::LogicError(format!(
                "Node {} does not have exactly one child",
                id
            )));
        }
        let child_id = self.nodes[id].children[0];
        let node_length = self.nodes[id].length;
        let child_length = self.nodes[child_id].length;
        self.nodes[child_id].length = Self::combine_lengths(child_length, node_length);

        match self.nodes[id].parent {
            Some(grandparent) => {
                let idx = self.nodes[grandparent]
                    .children
                    .iter()
                    .position(|&c| c == id)
                    .ok_or_else(|| {
                        TreeError::LogicError(format!(
                            "Node {} missing from its parent's child list",
                            id
                        ))
                    })?;
                self.nodes[grandparent].children[idx] = child_id;
                self.nodes[child_id].parent = Some(grandparent);
            }
            None => {
                self.nodes[child_id].parent = None;
                self.root = Some(child_id);
            }
        }

        self.nodes[id].children.clear();
        self.nodes[id].parent = None;
        self.nodes[id].deleted = true;

        Ok(())
    }

    /// Remove an internal node by reattaching its children to its parent
    /// (multifurcating splice). Children inherit the removed node's branch
    /// length added to their own and are appended at the end of the parent's
    /// child list.
    pub fn collapse_into_parent(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self
            .get_node(id)
            .ok_or_else(|| TreeError::LogicError(format!("Node {} not found", id)))?;
        if node.is_leaf() {
            return Err(TreeError::LogicError(format!(
                "Node {} is a leaf and cannot be collapsed",
                id
            )));
        }
        let parent_id = node.parent.ok_or_else(|| {
            TreeError::LogicError("Cannot collapse the root of the tree".to_string())
        })?;

        let node_length = self.nodes[id].length;
        let children = std::mem::take(&mut self.nodes[id].children);

        self.nodes[parent_id].children.retain(|&c| c != id);
        for &child in &children {
            let child_length = self.nodes[child].length;
            self.nodes[child].length = Self::combine_lengths(child_length, node_length);
            self.nodes[child].parent = Some(parent_id);
        }
        self.nodes[parent_id].children.extend(children);

        self.nodes[id].parent = None;
        self.nodes[id].deleted = true;

        Ok(())
    }

    /// Deep-copy the subtree rooted at `id` into a standalone tree.
    ///
    /// Iterative (explicit stack); the copy shares no nodes with `self`.
    pub fn clone_subtree(&self, id: NodeId) -> Result<Tree, TreeError> {
        if self.get_node(id).is_none() {
            return Err(TreeError::LogicError(format!("Node {} not found", id)));
        }

        let mut cloned = Tree::new();
        let new_root = cloned.add_node();
        cloned.set_root(new_root);

        let mut stack = vec![(id, new_root)];
        while let Some((src_id, dst_id)) = stack.pop() {
            let src = self.get_node(src_id).unwrap();
            {
                let dst = cloned.get_node_mut(dst_id).unwrap();
                dst.name = src.name.clone();
                dst.length = src.length;
                dst.support = src.support;
            }
            for &child in &src.children {
                let dst_child = cloned.add_node();
                cloned.add_child(dst_id, dst_child)?;
                stack.push((child, dst_child));
            }
        }

        Ok(cloned)
    }

    /// Insert a new node on the edge above `child`, splitting the edge.
    /// `child_side_len` becomes the child's new branch length; the remainder
    /// of the original length goes to the inserted node. Returns the new
    /// node's ID.
    pub fn insert_on_edge(
        &mut self,
        child: NodeId,
        child_side_len: f64,
    ) -> Result<NodeId, TreeError> {
        let parent = self
            .get_node(child)
            .ok_or_else(|| TreeError::LogicError(format!("Node {} not found", child)))?
            .parent
            .ok_or_else(|| {
                TreeError::LogicError("Cannot insert above the root of the tree".to_string())
            })?;

        let edge_len = self.nodes[child].length.unwrap_or(0.0);
        let upper = (edge_len - child_side_len).max(0.0);

        let mid = self.add_node();
        let idx = self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                TreeError::LogicError(format!(
                    "Node {} missing from its parent's child list",
                    child
                ))
            })?;
        self.nodes[parent].children[idx] = mid;
        self.nodes[mid].parent = Some(parent);
        self.nodes[mid].length = Some(upper);
        self.nodes[mid].children.push(child);
        self.nodes[child].parent = Some(mid);
        self.nodes[child].length = Some(child_side_len);

        Ok(mid)
    }

    /// Reroot the tree at the specified node by reversing the edges along
    /// the path from the old root.
    pub fn reroot_at(&mut self, new_root_id: NodeId) -> Result<(), TreeError> {
        if self.get_node(new_root_id).is_none() {
            return Err(TreeError::LogicError(format!(
                "Node {} not found",
                new_root_id
            )));
        }
        let old_root_id = self
            .root
            .ok_or_else(|| TreeError::LogicError("Tree has no root".to_string()))?;
        if old_root_id == new_root_id {
            return Ok(());
        }

        let path = self.get_path_from_root(&new_root_id)?;
        let lengths: Vec<Option<f64>> = path
            .iter()
            .map(|&id| self.get_node(id).unwrap().length)
            .collect();

        // Reverse edges bottom-up: each former parent becomes a child and
        // takes over the reversed edge's length.
        for i in (1..path.len()).rev() {
            let child_id = path[i];
            let parent_id = path[i - 1];

            self.nodes[parent_id].children.retain(|&x| x != child_id);
            self.nodes[child_id].children.push(parent_id);
            self.nodes[parent_id].parent = Some(child_id);
            self.nodes[parent_id].length = lengths[i];
        }

        self.nodes[new_root_id].parent = None;
        self.nodes[new_root_id].length = None;
        self.root = Some(new_root_id);

        Ok(())
    }

    /// Splice out all non-root nodes with exactly one child and promote the
    /// lone child of a single-child root. Branch lengths are summed across
    /// each splice.
    pub fn remove_degree_two_nodes(&mut self) {
        let root = match self.root {
            Some(r) => r,
            None => return,
        };
        let ids = self.postorder(&root).unwrap_or_default();
        for id in ids {
            if let Some(node) = self.get_node(id) {
                if !node.is_leaf() && node.children.len() == 1 {
                    self.splice_out(id).ok();
                }
            }
        }
    }

    /// Farthest leaf from `start` across the tree treated as an undirected
    /// graph, with each edge weighted by the child node's branch length.
    /// Ties keep the first leaf found (deterministic: children in stored
    /// order, then the parent).
    fn farthest_leaf_from(&self, start: NodeId) -> (NodeId, f64) {
        let mut best = (start, 0.0_f64);
        let mut stack = vec![(start, start, 0.0_f64)];

        while let Some((curr, from, dist)) = stack.pop() {
            let node = match self.get_node(curr) {
                Some(n) => n,
                None => continue,
            };
            if node.is_leaf() && dist > best.1 {
                best = (curr, dist);
            }
            for &child in node.children.iter().rev() {
                if child != from {
                    let w = self.get_node(child).and_then(|n| n.length).unwrap_or(0.0);
                    stack.push((child, curr, dist + w));
                }
            }
            if let Some(parent) = node.parent {
                if parent != from {
                    let w = node.length.unwrap_or(0.0);
                    stack.push((parent, curr, dist + w));
                }
            }
        }

        best
    }

    /// Node path from `a` to `b` through their common ancestor.
    fn path_between(&self, a: NodeId, b: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let lca = self.get_common_ancestor(&a, &b)?;
        let path_a = self.get_path_from_root(&a)?;
        let path_b = self.get_path_from_root(&b)?;

        let lca_pos_a = path_a.iter().position(|&x| x == lca).unwrap();
        let lca_pos_b = path_b.iter().position(|&x| x == lca).unwrap();

        let mut path: Vec<NodeId> = path_a[lca_pos_a..].iter().rev().cloned().collect();
        path.extend_from_slice(&path_b[lca_pos_b + 1..]);
        Ok(path)
    }

    fn edge_length(&self, a: NodeId, b: NodeId) -> f64 {
        // The edge between adjacent nodes is stored on whichever is the child.
        let node_a = self.get_node(a);
        if node_a.and_then(|n| n.parent) == Some(b) {
            node_a.and_then(|n| n.length).unwrap_or(0.0)
        } else {
            self.get_node(b).and_then(|n| n.length).unwrap_or(0.0)
        }
    }

    /// Reroot at the midpoint of the longest leaf-to-leaf path.
    ///
    /// The two ends of the tree's diameter are located with a double sweep;
    /// the edge containing the path midpoint is split with a new root node.
    /// Degree-2 remnants of the old root are spliced away. A tree without
    /// positive branch lengths is left unchanged.
    pub fn midpoint_root(&mut self) -> Result<(), TreeError> {
        let leaves = self.leaves();
        if leaves.len() < 2 {
            return Ok(());
        }

        let (u, _) = self.farthest_leaf_from(leaves[0]);
        let (v, total) = self.farthest_leaf_from(u);
        if total <= 0.0 {
            return Ok(());
        }

        let half = total / 2.0;
        let path = self.path_between(u, v)?;

        let mut cum = 0.0;
        for i in 0..path.len() - 1 {
            let a = path[i];
            let b = path[i + 1];
            let l = self.edge_length(a, b);
            if cum + l >= half {
                let off = half - cum;
                let new_root = if off <= 0.0 {
                    a
                } else if off >= l {
                    b
                } else {
                    // Orient the split onto the edge's child node.
                    let (child, child_side) =
                        if self.get_node(a).and_then(|n| n.parent) == Some(b) {
                            (a, off)
                        } else {
                            (b, l - off)
                        };
                    self.insert_on_edge(child, child_side)?
                };
                self.reroot_at(new_root)?;
                self.remove_degree_two_nodes();
                return Ok(());
            }
            cum += l;
        }

        Err(TreeError::LogicError(
            "Failed to locate the midpoint of the tree diameter".to_string(),
        ))
    }

    /// Serialize the tree to a Newick string (compact format).
    pub fn to_newick(&self) -> String {
        writer::write_newick(self)
    }
}
