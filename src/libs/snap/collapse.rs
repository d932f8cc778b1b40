use crate::libs::phylo::{Tree, TreeError};

/// Collapse every non-root internal clade whose support is defined and
/// strictly below `threshold`, splicing its children into its parent.
///
/// Leaves and clades without a support value are never touched, so applying
/// the same threshold twice is a no-op.
pub fn collapse_low_support(tree: &mut Tree, threshold: f64) -> Result<(), TreeError> {
    let root = match tree.get_root() {
        Some(r) => r,
        None => return Ok(()),
    };

    // Post-order so nested low-support clades dissolve bottom-up.
    let candidates: Vec<_> = tree
        .postorder(&root)?
        .into_iter()
        .filter(|&id| {
            id != root
                && tree
                    .get_node(id)
                    .map(|n| {
                        !n.is_leaf() && n.support.map(|s| s < threshold).unwrap_or(false)
                    })
                    .unwrap_or(false)
        })
        .collect();

    for id in candidates {
        tree.collapse_into_parent(id)?;
    }

    Ok(())
}
