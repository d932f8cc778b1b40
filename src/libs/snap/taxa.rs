use super::error::SnapError;
use crate::libs::phylo::Tree;
use indexmap::IndexMap;

/// Taxon part of a leaf label: the substring before the first delimiter.
pub fn taxon_of<'a>(label: &'a str, delimiter: &str) -> Result<&'a str, SnapError> {
    match label.split_once(delimiter) {
        Some((taxon, _)) => Ok(taxon),
        None => Err(SnapError::MissingDelimiter {
            label: label.to_string(),
            delimiter: delimiter.to_string(),
        }),
    }
}

/// All taxa (unique, in first-appearance order) and all tip labels of a tree.
pub fn tips_and_taxa(tree: &Tree, delimiter: &str) -> Result<(Vec<String>, Vec<String>), SnapError> {
    let mut taxa: Vec<String> = Vec::new();
    let mut all_tips: Vec<String> = Vec::new();

    for tip in tree.leaf_names() {
        let taxon = taxon_of(&tip, delimiter)?;
        if !taxa.iter().any(|t| t == taxon) {
            taxa.push(taxon.to_string());
        }
        all_tips.push(tip);
    }

    Ok((taxa, all_tips))
}

/// Per-taxon copy counts for a list of tip labels, keyed in
/// first-appearance order.
pub fn count_taxa(tips: &[String], delimiter: &str) -> Result<IndexMap<String, usize>, SnapError> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for tip in tips {
        let taxon = taxon_of(tip, delimiter)?;
        *counts.entry(taxon.to_string()).or_insert(0) += 1;
    }
    Ok(counts)
}
