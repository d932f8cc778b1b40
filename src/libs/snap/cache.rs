use super::error::SnapError;
use super::taxa::taxon_of;
use crate::libs::phylo::{NodeId, Tree};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Cached leaf data for one internal clade of the original tree.
#[derive(Debug, Clone)]
pub struct SubtreeRecord {
    /// Tip labels in tree order
    pub terms: Vec<String>,
    /// The same labels as a set, for overlap tests
    pub term_set: HashSet<String>,
    /// Taxon -> copy count, keyed in first-appearance order
    pub taxon_counts: IndexMap<String, usize>,
}

impl SubtreeRecord {
    pub fn distinct_taxa(&self) -> usize {
        self.taxon_counts.len()
    }

    pub fn is_all_single_copy(&self) -> bool {
        self.taxon_counts.values().all(|&c| c == 1)
    }
}

/// Per-internal-clade leaf lists and taxon counts, built in one post-order
/// pass over the original tree.
///
/// Each internal clade's leaf list is the concatenation of its children's
/// cached lists and its counts are the merge of its children's counts, so no
/// subtree is ever re-walked. The cache describes the tree as it was at
/// build time; queries against a tree mutated afterwards are invalid, which
/// is why the classifier only ever mutates working clones.
#[derive(Debug, Default)]
pub struct SubtreeTaxonCache {
    records: HashMap<NodeId, SubtreeRecord>,
}

impl SubtreeTaxonCache {
    pub fn build(tree: &Tree, delimiter: &str) -> Result<Self, SnapError> {
        let root = match tree.get_root() {
            Some(r) => r,
            None => return Ok(Self::default()),
        };

        let mut term_cache: HashMap<NodeId, Vec<String>> = HashMap::new();
        let mut count_cache: HashMap<NodeId, IndexMap<String, usize>> = HashMap::new();
        let mut records = HashMap::new();

        for id in tree.postorder(&root)? {
            let node = tree
                .get_node(id)
                .ok_or_else(|| SnapError::Logic(format!("node {} vanished mid-pass", id)))?;

            if node.is_leaf() {
                let name = node.name.clone().ok_or_else(|| {
                    SnapError::Logic(format!("leaf node {} has no label", id))
                })?;
                let taxon = taxon_of(&name, delimiter)?.to_string();
                term_cache.insert(id, vec![name]);
                count_cache.insert(id, IndexMap::from([(taxon, 1)]));
                continue;
            }

            let mut terms: Vec<String> = Vec::new();
            let mut counts: IndexMap<String, usize> = IndexMap::new();
            for child in &node.children {
                terms.extend(term_cache[child].iter().cloned());
                for (taxon, n) in &count_cache[child] {
                    *counts.entry(taxon.clone()).or_insert(0) += n;
                }
            }

            records.insert(
                id,
                SubtreeRecord {
                    term_set: terms.iter().cloned().collect(),
                    terms: terms.clone(),
                    taxon_counts: counts.clone(),
                },
            );
            term_cache.insert(id, terms);
            count_cache.insert(id, counts);
        }

        Ok(Self { records })
    }

    /// Record for an internal clade; None for leaves and unknown IDs.
    pub fn get(&self, id: NodeId) -> Option<&SubtreeRecord> {
        self.records.get(&id)
    }
}
