use crate::libs::phylo::TreeError;
use std::fmt;

#[derive(Debug)]
pub enum SnapError {
    /// A leaf label does not contain the taxon/gene delimiter.
    MissingDelimiter { label: String, delimiter: String },
    /// A duplicate leaf has no corresponding sequence record.
    MissingSequence { label: String },
    /// A leaf label is absent from the working tree's adjacency maps.
    /// This is a programmer error, not a data error.
    UnknownLeaf { label: String },
    /// Invariant violation inside the classification engine.
    Logic(String),
    /// Tree-level failure (parse or structural).
    Tree(TreeError),
    /// Output file failure.
    Io(std::io::Error),
}

impl fmt::Display for SnapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapError::MissingDelimiter { label, delimiter } => write!(
                f,
                "Delimiter \"{}\" does not exist in tip label \"{}\"",
                delimiter, label
            ),
            SnapError::MissingSequence { label } => {
                write!(f, "No sequence record for tip \"{}\"", label)
            }
            SnapError::UnknownLeaf { label } => {
                write!(f, "Tip \"{}\" is not present in the working tree", label)
            }
            SnapError::Logic(msg) => write!(f, "Internal error: {}", msg),
            SnapError::Tree(e) => write!(f, "{}", e),
            SnapError::Io(e) => write!(f, "Output error: {}", e),
        }
    }
}

impl std::error::Error for SnapError {}

impl From<TreeError> for SnapError {
    fn from(e: TreeError) -> Self {
        SnapError::Tree(e)
    }
}

impl From<std::io::Error> for SnapError {
    fn from(e: std::io::Error) -> Self {
        SnapError::Io(e)
    }
}
