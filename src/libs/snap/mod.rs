pub mod cache;
pub mod classify;
pub mod collapse;
pub mod error;
pub mod index;
pub mod output;
pub mod resolver;
pub mod taxa;

pub use cache::{SubtreeRecord, SubtreeTaxonCache};
pub use classify::{partition_tree, RunContext, RunOutcome, SnapOptions};
pub use collapse::collapse_low_support;
pub use error::SnapError;
pub use index::CladeMembershipIndex;
pub use output::{FileSink, MemorySink, OutputSink};
pub use resolver::{resolve_inparalogs, InparalogToKeep, Resolution};
