use crate::libs::phylo::Tree;
use fixedbitset::FixedBitSet;
use std::collections::{HashMap, HashSet};

/// Bitmask index over the clades of one working tree.
///
/// Every leaf gets a bit (lexicographic assignment, stable for the index's
/// lifetime) and every clade's exact leaf set is stored as a mask. This
/// answers "does this leaf set currently form a clade" in O(1) and absorbs
/// prunes in O(removed leaves) instead of re-deriving leaf sets per round.
#[derive(Debug, Clone)]
pub struct CladeMembershipIndex {
    tip_bits: HashMap<String, usize>,
    masks: HashSet<FixedBitSet>,
    width: usize,
}

impl CladeMembershipIndex {
    /// Build the index for the current state of a tree.
    pub fn build(tree: &Tree) -> Self {
        let mut names = tree.leaf_names();
        names.sort();

        let width = names.len();
        let tip_bits: HashMap<String, usize> = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name, idx))
            .collect();

        let mut masks = HashSet::new();
        let mut node_masks: HashMap<usize, FixedBitSet> = HashMap::new();

        if let Some(root) = tree.get_root() {
            for id in tree.postorder(&root).unwrap_or_default() {
                let node = match tree.get_node(id) {
                    Some(n) => n,
                    None => continue,
                };
                let mut mask = FixedBitSet::with_capacity(width);
                if node.is_leaf() {
                    if let Some(&bit) = node.name.as_ref().and_then(|n| tip_bits.get(n)) {
                        mask.insert(bit);
                    }
                } else {
                    for child in &node.children {
                        if let Some(child_mask) = node_masks.get(child) {
                            mask.union_with(child_mask);
                        }
                    }
                }
                masks.insert(mask.clone());
                node_masks.insert(id, mask);
            }
        }

        Self {
            tip_bits,
            masks,
            width,
        }
    }

    /// True iff the given labels are exactly the leaf set of some current
    /// clade. Unknown or already-pruned labels yield false.
    pub fn is_sister_group(&self, labels: &[String]) -> bool {
        let mut mask = FixedBitSet::with_capacity(self.width);
        for label in labels {
            match self.tip_bits.get(label) {
                Some(&bit) => mask.insert(bit),
                None => return false,
            }
        }
        if mask.is_clear() {
            return false;
        }
        self.masks.contains(&mask)
    }

    /// Clear the pruned leaves' bits from every stored mask and drop masks
    /// that become empty. Batching is equivalent to pruning one label at a
    /// time; labels never in the index are ignored.
    pub fn update_after_prune(&mut self, pruned: &[String]) {
        let mut prune_mask = FixedBitSet::with_capacity(self.width);
        for label in pruned {
            if let Some(&bit) = self.tip_bits.get(label) {
                prune_mask.insert(bit);
            }
        }
        if prune_mask.is_clear() {
            return;
        }

        let mut updated = HashSet::with_capacity(self.masks.len());
        for mut mask in self.masks.drain() {
            mask.difference_with(&prune_mask);
            if !mask.is_clear() {
                updated.insert(mask);
            }
        }
        self.masks = updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::phylo::NodeId;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    // Leaf-name sets of all stored masks, for comparing two indexes that may
    // use different bit assignments.
    fn mask_leaf_sets(index: &CladeMembershipIndex) -> BTreeSet<BTreeSet<String>> {
        let mut by_bit: HashMap<usize, &String> = HashMap::new();
        for (name, &bit) in &index.tip_bits {
            by_bit.insert(bit, name);
        }
        index
            .masks
            .iter()
            .map(|mask| {
                mask.ones()
                    .filter_map(|bit| by_bit.get(&bit).map(|s| (*s).clone()))
                    .collect()
            })
            .collect()
    }

    fn leaf_id(tree: &Tree, name: &str) -> NodeId {
        tree.leaves()
            .into_iter()
            .find(|&id| tree.get_node(id).unwrap().name.as_deref() == Some(name))
            .unwrap()
    }

    fn s(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_sister_group_exact_leaf_sets_only() {
        let tree = Tree::from_newick("(((A,B),C),(D,E));").unwrap();
        let index = CladeMembershipIndex::build(&tree);

        assert!(index.is_sister_group(&s(&["A", "B"])));
        assert!(index.is_sister_group(&s(&["A", "B", "C"])));
        assert!(index.is_sister_group(&s(&["D", "E"])));
        assert!(index.is_sister_group(&s(&["A"])));

        // Not exact clades
        assert!(!index.is_sister_group(&s(&["A", "C"])));
        assert!(!index.is_sister_group(&s(&["B", "C"])));
        assert!(!index.is_sister_group(&s(&["A", "B", "D"])));
        assert!(!index.is_sister_group(&s(&["C", "D", "E"])));
    }

    #[test]
    fn test_sister_group_unknown_label_is_false() {
        let tree = Tree::from_newick("((A,B),C);").unwrap();
        let index = CladeMembershipIndex::build(&tree);
        assert!(!index.is_sister_group(&s(&["A", "Z"])));
        assert!(!index.is_sister_group(&[]));
    }

    #[test]
    fn test_update_after_prune_merges_clades() {
        let mut tree = Tree::from_newick("((A,B),C);").unwrap();
        let mut index = CladeMembershipIndex::build(&tree);

        tree.prune_leaf(leaf_id(&tree, "B")).unwrap();
        index.update_after_prune(&s(&["B"]));

        assert!(index.is_sister_group(&s(&["A"])));
        assert!(!index.is_sister_group(&s(&["B"])));
        assert!(!index.is_sister_group(&s(&["A", "B"])));
        assert_eq!(mask_leaf_sets(&index), mask_leaf_sets(&CladeMembershipIndex::build(&tree)));
    }

    #[test]
    fn test_update_after_prune_is_idempotent_per_label() {
        let tree = Tree::from_newick("((A,B),(C,D));").unwrap();
        let mut once = CladeMembershipIndex::build(&tree);
        once.update_after_prune(&s(&["B"]));

        let mut twice = once.clone();
        twice.update_after_prune(&s(&["B"]));
        assert_eq!(mask_leaf_sets(&once), mask_leaf_sets(&twice));

        // Labels that never existed are inert too.
        twice.update_after_prune(&s(&["nope"]));
        assert_eq!(mask_leaf_sets(&once), mask_leaf_sets(&twice));
    }

    #[test]
    fn test_batch_equals_sequential_updates() {
        let tree = Tree::from_newick("(((A,B),(C,D)),((E,F),G));").unwrap();

        let mut batch = CladeMembershipIndex::build(&tree);
        batch.update_after_prune(&s(&["B", "D", "G"]));

        let mut seq = CladeMembershipIndex::build(&tree);
        for label in ["B", "D", "G"] {
            seq.update_after_prune(&s(&[label]));
        }

        assert_eq!(mask_leaf_sets(&batch), mask_leaf_sets(&seq));
    }

    // Random binary tree over n labeled leaves, by repeatedly splitting the
    // leaf range at a random point.
    fn random_tree(rng: &mut SmallRng, n: usize) -> Tree {
        fn build(tree: &mut Tree, rng: &mut SmallRng, lo: usize, hi: usize) -> NodeId {
            let id = tree.add_node();
            if hi - lo == 1 {
                tree.get_node_mut(id).unwrap().set_name(format!("t{:02}", lo));
            } else {
                let split = rng.gen_range(lo + 1..hi);
                let left = build(tree, rng, lo, split);
                let right = build(tree, rng, split, hi);
                tree.add_child(id, left).unwrap();
                tree.add_child(id, right).unwrap();
            }
            id
        }
        let mut tree = Tree::new();
        let root = build(&mut tree, rng, 0, n);
        tree.set_root(root);
        tree
    }

    #[test]
    fn test_incremental_index_matches_rebuild_on_random_prunes() {
        let mut rng = SmallRng::seed_from_u64(42);

        for _ in 0..50 {
            let n = rng.gen_range(4..12);
            let mut tree = random_tree(&mut rng, n);
            let mut index = CladeMembershipIndex::build(&tree);

            let mut names = tree.leaf_names();
            let prunes = rng.gen_range(1..n - 1);
            for _ in 0..prunes {
                let victim = names.remove(rng.gen_range(0..names.len()));
                tree.prune_leaf(leaf_id(&tree, &victim)).unwrap();
                index.update_after_prune(&[victim]);

                let rebuilt = CladeMembershipIndex::build(&tree);
                assert_eq!(mask_leaf_sets(&index), mask_leaf_sets(&rebuilt));

                // Spot-check sister answers agree on random subsets.
                for _ in 0..10 {
                    let k = rng.gen_range(1..=names.len());
                    let mut subset = names.clone();
                    while subset.len() > k {
                        subset.remove(rng.gen_range(0..subset.len()));
                    }
                    assert_eq!(
                        index.is_sister_group(&subset),
                        rebuilt.is_sister_group(&subset),
                        "disagreement on {:?}",
                        subset
                    );
                }
            }
        }
    }
}
