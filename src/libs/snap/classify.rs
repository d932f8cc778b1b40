use super::cache::SubtreeTaxonCache;
use super::collapse::collapse_low_support;
use super::error::SnapError;
use super::index::CladeMembershipIndex;
use super::output::OutputSink;
use super::resolver::{resolve_inparalogs, InparalogToKeep};
use super::taxa::{count_taxa, taxon_of, tips_and_taxa};
use crate::libs::fasta::FastaMap;
use crate::libs::phylo::{NodeId, Tree};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct SnapOptions {
    /// Support threshold for collapsing bipartitions, 0-100
    pub support: f64,
    /// Minimum number of distinct taxa a candidate subtree must contain
    pub occupancy: f64,
    /// Taxon/gene delimiter inside tip labels
    pub delimiter: String,
    pub inparalog_to_keep: InparalogToKeep,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            support: 80.0,
            occupancy: 1.0,
            delimiter: "|".to_string(),
            inparalog_to_keep: InparalogToKeep::default(),
        }
    }
}

/// Mutable state of one extraction run, threaded through the classification
/// loop so independent runs compose without shared globals.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Tips already claimed by an emitted subgroup; grows monotonically
    pub assigned_tips: HashSet<String>,
    /// Kept tip -> discarded sister duplicates, for the whole run
    pub inparalog_handling: IndexMap<String, Vec<String>>,
    /// Next subgroup id (0-based)
    pub subgroup_counter: usize,
    /// (id, tips) per emitted subgroup
    pub subgroup_records: Vec<(usize, Vec<String>)>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The input tree has one tip per taxon; nothing to extract.
    AlreadySingleCopy,
    Partitioned { subgroups: usize },
}

/// Partition a rooted gene-family tree into maximal single-copy subgroups.
///
/// Walks the non-root internal clades in preorder, exactly once. Each
/// eligible clade is cloned into a working tree, low-support bipartitions
/// are collapsed, and species-specific duplicates that prove mutually sister
/// are reduced to one tip. Clades that end up single-copy are handed to the
/// sink; everything else is discarded without touching the original tree.
pub fn partition_tree(
    tree: &Tree,
    fasta: &FastaMap,
    opts: &SnapOptions,
    sink: &mut dyn OutputSink,
    ctx: &mut RunContext,
) -> Result<RunOutcome, SnapError> {
    let (taxa, all_tips) = tips_and_taxa(tree, &opts.delimiter)?;
    if taxa.len() == all_tips.len() {
        return Ok(RunOutcome::AlreadySingleCopy);
    }

    let cache = SubtreeTaxonCache::build(tree, &opts.delimiter)?;
    let before = ctx.subgroup_counter;

    for inter in tree.internals().into_iter().skip(1) {
        let rec = cache
            .get(inter)
            .ok_or_else(|| SnapError::Logic(format!("no cached record for clade {}", inter)))?;

        if rec.terms.iter().any(|t| ctx.assigned_tips.contains(t)) {
            continue;
        }
        if (rec.distinct_taxa() as f64) < opts.occupancy {
            continue;
        }

        let mut working = tree.clone_subtree(inter)?;
        collapse_low_support(&mut working, opts.support)?;

        if rec.is_all_single_copy() {
            emit(sink, ctx, rec.terms.clone(), &working)?;
            continue;
        }

        let mut terms = rec.terms.clone();
        let mut index = CladeMembershipIndex::build(&working);
        let mut leaf_lookup = leaf_lookup(&working);

        // Resolve each originally over-represented taxon against the
        // progressively pruned working tree.
        for (taxon, &count) in &rec.taxon_counts {
            if count < 2 {
                continue;
            }
            let dups: Vec<String> = terms
                .iter()
                .filter(|t| {
                    taxon_of(t, &opts.delimiter)
                        .map(|x| x == taxon.as_str())
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            if dups.len() < 2 {
                continue;
            }
            if !index.is_sister_group(&dups) {
                continue;
            }

            let resolution = resolve_inparalogs(
                &mut working,
                &mut leaf_lookup,
                &dups,
                opts.inparalog_to_keep,
                fasta,
                &mut ctx.inparalog_handling,
            )?;
            terms.retain(|t| !resolution.pruned.contains(t));
            index.update_after_prune(&resolution.pruned);
        }

        let final_counts = count_taxa(&working.leaf_names(), &opts.delimiter)?;
        if !final_counts.is_empty() && final_counts.values().all(|&c| c == 1) {
            emit(sink, ctx, terms, &working)?;
        }
    }

    Ok(RunOutcome::Partitioned {
        subgroups: ctx.subgroup_counter - before,
    })
}

fn leaf_lookup(tree: &Tree) -> HashMap<String, NodeId> {
    tree.leaves()
        .into_iter()
        .filter_map(|id| {
            tree.get_node(id)
                .and_then(|n| n.name.clone())
                .map(|name| (name, id))
        })
        .collect()
}

fn emit(
    sink: &mut dyn OutputSink,
    ctx: &mut RunContext,
    terms: Vec<String>,
    working: &Tree,
) -> Result<(), SnapError> {
    sink.emit(
        ctx.subgroup_counter,
        &terms,
        working,
        &ctx.inparalog_handling,
    )?;
    for term in &terms {
        ctx.assigned_tips.insert(term.clone());
    }
    ctx.subgroup_records.push((ctx.subgroup_counter, terms));
    ctx.subgroup_counter += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::fasta::from_reader;
    use crate::libs::snap::output::MemorySink;

    fn fasta_for(tips: &[(&str, usize)]) -> FastaMap {
        let fa: String = tips
            .iter()
            .map(|(label, len)| format!(">{}\n{}\n", label, "A".repeat(*len)))
            .collect();
        from_reader(fa.as_bytes()).unwrap()
    }

    fn opts(occupancy: f64) -> SnapOptions {
        SnapOptions {
            occupancy,
            ..Default::default()
        }
    }

    #[test]
    fn test_fast_exit_on_single_copy_input() {
        let tree = Tree::from_newick("((A|g1,B|g1),C|g1);").unwrap();
        let fasta = fasta_for(&[("A|g1", 4), ("B|g1", 4), ("C|g1", 4)]);
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();

        let outcome = partition_tree(&tree, &fasta, &opts(1.0), &mut sink, &mut ctx).unwrap();

        assert_eq!(outcome, RunOutcome::AlreadySingleCopy);
        assert!(sink.emitted.is_empty());
        assert!(ctx.assigned_tips.is_empty());
    }

    #[test]
    fn test_non_sister_duplicates_yield_no_subgroup() {
        // A's copies sit on opposite sides of the root; the only clades
        // containing both are never candidates.
        let tree = Tree::from_newick("((A|g1,B|g1)100,(A|g2,C|g1)100);").unwrap();
        let fasta = fasta_for(&[("A|g1", 4), ("B|g1", 4), ("A|g2", 6), ("C|g1", 4)]);
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();

        let outcome = partition_tree(&tree, &fasta, &opts(3.0), &mut sink, &mut ctx).unwrap();

        assert_eq!(outcome, RunOutcome::Partitioned { subgroups: 0 });
        assert!(sink.emitted.is_empty());
    }

    #[test]
    fn test_sister_duplicates_are_resolved_and_emitted() {
        let tree =
            Tree::from_newick("(((A|g1:2,A|g2:1)100:1,(B|g1:1,C|g1:1)100:1)100:1,D|g1:1);")
                .unwrap();
        let fasta = fasta_for(&[
            ("A|g1", 4),
            ("A|g2", 9),
            ("B|g1", 4),
            ("C|g1", 4),
            ("D|g1", 4),
        ]);
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();

        let outcome = partition_tree(&tree, &fasta, &opts(3.0), &mut sink, &mut ctx).unwrap();

        // The clade ((A,A),(B,C)) resolves its A duplicates (longest_seq_len
        // keeps A|g2) and is emitted as a 3-tip subgroup.
        assert_eq!(outcome, RunOutcome::Partitioned { subgroups: 1 });
        assert_eq!(sink.emitted.len(), 1);
        let (id, tips, newick) = &sink.emitted[0];
        assert_eq!(*id, 0);
        assert_eq!(tips, &vec!["A|g2", "B|g1", "C|g1"]);
        assert!(!newick.contains("A|g1"));
        assert_eq!(ctx.inparalog_handling["A|g2"], vec!["A|g1"]);
        assert!(ctx.assigned_tips.contains("A|g2"));
        assert!(!ctx.assigned_tips.contains("D|g1"));
    }

    #[test]
    fn test_assigned_tips_exclude_later_overlapping_clades() {
        // The outermost candidate ((B,C),(D,D)) wins first in preorder and
        // claims B, C and the kept D; the nested clades then overlap
        // assigned tips and are skipped.
        let tree = Tree::from_newick("(((B|g1,C|g1)100,(D|g1,D|g2)100)100,A|g1);").unwrap();
        let fasta = fasta_for(&[
            ("A|g1", 4),
            ("B|g1", 4),
            ("C|g1", 4),
            ("D|g1", 8),
            ("D|g2", 4),
        ]);
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();

        partition_tree(&tree, &fasta, &opts(2.0), &mut sink, &mut ctx).unwrap();

        assert_eq!(sink.emitted.len(), 1);
        assert_eq!(sink.emitted[0].1, vec!["B|g1", "C|g1", "D|g1"]);
    }

    #[test]
    fn test_partition_property_disjoint_union() {
        let tree = Tree::from_newick(
            "(((A|g1,B|g1)100,(C|g1,C|g2)100)100,((A|g2,B|g2)100,(D|g1,E|g1)100)100);",
        )
        .unwrap();
        let fasta = fasta_for(&[
            ("A|g1", 4),
            ("B|g1", 4),
            ("C|g1", 4),
            ("C|g2", 6),
            ("A|g2", 4),
            ("B|g2", 4),
            ("D|g1", 4),
            ("E|g1", 4),
        ]);
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();

        partition_tree(&tree, &fasta, &opts(2.0), &mut sink, &mut ctx).unwrap();

        let mut seen: HashSet<String> = HashSet::new();
        for (_, tips, _) in &sink.emitted {
            for tip in tips {
                // Pairwise disjoint
                assert!(seen.insert(tip.clone()), "tip {} assigned twice", tip);
            }
        }

        // Emitted tips are exactly the assigned tips, and together with the
        // never-assigned remainder they cover the full leaf set.
        assert_eq!(seen, ctx.assigned_tips);
        let all: HashSet<String> = tree.leaf_names().into_iter().collect();
        let never_assigned: HashSet<String> = all.difference(&seen).cloned().collect();
        let mut union = seen.clone();
        union.extend(never_assigned);
        assert_eq!(union, all);
    }

    #[test]
    fn test_discarded_candidate_leaves_no_trace_on_assignments() {
        // B's duplicates are not sister inside the candidate clade, so the
        // candidate fails and assigns nothing.
        let tree = Tree::from_newick("(((B|g1,A|g1)100,(B|g2,C|g1)100)100,D|g1);").unwrap();
        let fasta = fasta_for(&[
            ("A|g1", 4),
            ("B|g1", 4),
            ("B|g2", 4),
            ("C|g1", 4),
            ("D|g1", 4),
        ]);
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();

        let outcome = partition_tree(&tree, &fasta, &opts(3.0), &mut sink, &mut ctx).unwrap();

        assert_eq!(outcome, RunOutcome::Partitioned { subgroups: 0 });
        assert!(ctx.assigned_tips.is_empty());
    }

    #[test]
    fn test_low_support_sister_pair_is_not_trusted() {
        // Same topology twice; only the support on the duplicate pair
        // differs. A weakly supported (A,A) bipartition is collapsed before
        // the sister test, dissolving the pair into a multifurcation with B,
        // so the duplicates are not resolved and the candidate fails.
        let weak =
            Tree::from_newick("((((A|g1,A|g2)40,B|g1)90,C|g1)90,D|g1);").unwrap();
        let strong =
            Tree::from_newick("((((A|g1,A|g2)95,B|g1)90,C|g1)90,D|g1);").unwrap();
        let fasta = fasta_for(&[
            ("A|g1", 9),
            ("A|g2", 4),
            ("B|g1", 4),
            ("C|g1", 4),
            ("D|g1", 4),
        ]);

        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();
        partition_tree(&weak, &fasta, &opts(3.0), &mut sink, &mut ctx).unwrap();
        assert!(sink.emitted.is_empty());

        let mut sink = MemorySink::default();
        let mut ctx = RunContext::new();
        partition_tree(&strong, &fasta, &opts(3.0), &mut sink, &mut ctx).unwrap();
        assert_eq!(sink.emitted.len(), 1);
        assert_eq!(sink.emitted[0].1, vec!["A|g1", "B|g1", "C|g1"]);
    }
}
