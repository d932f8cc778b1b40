use super::error::SnapError;
use crate::libs::fasta::{ungapped_len, FastaMap};
use crate::libs::phylo::{NodeId, Tree};
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::HashMap;

/// Which species-specific duplicate to keep when a set of inparalogs is
/// mutually sister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InparalogToKeep {
    ShortestSeqLen,
    MedianSeqLen,
    #[default]
    LongestSeqLen,
    ShortestBranchLen,
    MedianBranchLen,
    LongestBranchLen,
}

impl InparalogToKeep {
    pub const NAMES: [&'static str; 6] = [
        "shortest_seq_len",
        "median_seq_len",
        "longest_seq_len",
        "shortest_branch_len",
        "median_branch_len",
        "longest_branch_len",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shortest_seq_len" => Some(Self::ShortestSeqLen),
            "median_seq_len" => Some(Self::MedianSeqLen),
            "longest_seq_len" => Some(Self::LongestSeqLen),
            "shortest_branch_len" => Some(Self::ShortestBranchLen),
            "median_branch_len" => Some(Self::MedianBranchLen),
            "longest_branch_len" => Some(Self::LongestBranchLen),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ShortestSeqLen => "shortest_seq_len",
            Self::MedianSeqLen => "median_seq_len",
            Self::LongestSeqLen => "longest_seq_len",
            Self::ShortestBranchLen => "shortest_branch_len",
            Self::MedianBranchLen => "median_branch_len",
            Self::LongestBranchLen => "longest_branch_len",
        }
    }

    fn uses_sequence_length(&self) -> bool {
        matches!(
            self,
            Self::ShortestSeqLen | Self::MedianSeqLen | Self::LongestSeqLen
        )
    }

    fn is_shortest(&self) -> bool {
        matches!(self, Self::ShortestSeqLen | Self::ShortestBranchLen)
    }

    fn is_median(&self) -> bool {
        matches!(self, Self::MedianSeqLen | Self::MedianBranchLen)
    }
}

/// Result of one duplicate-resolution round.
#[derive(Debug)]
pub struct Resolution {
    pub kept: String,
    pub pruned: Vec<String>,
}

/// Keep one leaf among mutually-sister duplicates and prune the rest from
/// the working tree.
///
/// The measurement is either the ungapped residue count of each duplicate's
/// sequence or its branch distance to the working tree's root. Shortest and
/// longest take the extreme, ties broken by ascending label. Median over two
/// duplicates behaves as longest; median over more sorts by
/// (measurement, label) and keeps the element at index n/2.
///
/// The kept -> discarded mapping is recorded into `handling`; the pruned
/// labels are returned so the caller can refresh its clade index.
pub fn resolve_inparalogs(
    working: &mut Tree,
    leaf_lookup: &mut HashMap<String, NodeId>,
    dups: &[String],
    policy: InparalogToKeep,
    fasta: &FastaMap,
    handling: &mut IndexMap<String, Vec<String>>,
) -> Result<Resolution, SnapError> {
    if dups.len() < 2 {
        return Err(SnapError::Logic(format!(
            "duplicate set must contain at least two tips, got {}",
            dups.len()
        )));
    }

    let mut measured: Vec<(String, f64)> = Vec::with_capacity(dups.len());
    for dup in dups {
        let value = if policy.uses_sequence_length() {
            let record = fasta.get(dup).ok_or_else(|| SnapError::MissingSequence {
                label: dup.clone(),
            })?;
            ungapped_len(record) as f64
        } else {
            let id = *leaf_lookup.get(dup).ok_or_else(|| SnapError::UnknownLeaf {
                label: dup.clone(),
            })?;
            working.distance_from_root(id)?
        };
        measured.push((dup.clone(), value));
    }

    let sorted: Vec<(String, f64)> = measured
        .iter()
        .cloned()
        .sorted_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .collect();

    let kept = if policy.is_shortest() {
        sorted[0].0.clone()
    } else if policy.is_median() && sorted.len() > 2 {
        sorted[sorted.len() / 2].0.clone()
    } else {
        // longest, and the two-duplicate median quirk
        let max = sorted[sorted.len() - 1].1;
        sorted
            .iter()
            .find(|(_, v)| *v == max)
            .map(|(label, _)| label.clone())
            .unwrap()
    };

    let mut pruned = Vec::new();
    for (label, _) in &measured {
        if *label == kept {
            continue;
        }
        let id = leaf_lookup.remove(label).ok_or_else(|| SnapError::UnknownLeaf {
            label: label.clone(),
        })?;
        working.prune_leaf(id)?;
        pruned.push(label.clone());
    }

    handling.insert(
        kept.clone(),
        dups.iter().filter(|d| **d != kept).cloned().collect(),
    );

    Ok(Resolution { kept, pruned })
}
