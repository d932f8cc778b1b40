use super::error::SnapError;
use crate::libs::fasta::FastaMap;
use crate::libs::phylo::Tree;
use indexmap::IndexMap;
use noodles_fasta as fasta;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Receiver for emitted subgroups. The classifier stays ignorant of file
/// layout; tests use an in-memory sink.
pub trait OutputSink {
    fn emit(
        &mut self,
        subgroup_id: usize,
        terms: &[String],
        tree: &Tree,
        handling: &IndexMap<String, Vec<String>>,
    ) -> Result<(), SnapError>;
}

/// Writes one FASTA file per subgroup, plus the optional subgroup tree and
/// the optional inparalog report, into the output directory.
pub struct FileSink<'a> {
    fasta: &'a FastaMap,
    outdir: PathBuf,
    basename: String,
    snap_trees: bool,
    report_inparalogs: bool,
}

impl<'a> FileSink<'a> {
    pub fn new(
        fasta: &'a FastaMap,
        fasta_path: &str,
        outdir: &Path,
        snap_trees: bool,
        report_inparalogs: bool,
    ) -> Self {
        let basename = Path::new(fasta_path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| fasta_path.to_string());

        Self {
            fasta,
            outdir: outdir.to_path_buf(),
            basename,
            snap_trees,
            report_inparalogs,
        }
    }

    /// `<outdir>/<fasta-basename>.orthosnap.<i>.<ext>`
    pub fn subgroup_path(&self, subgroup_id: usize, ext: &str) -> PathBuf {
        self.outdir
            .join(format!("{}.orthosnap.{}.{}", self.basename, subgroup_id, ext))
    }
}

impl OutputSink for FileSink<'_> {
    fn emit(
        &mut self,
        subgroup_id: usize,
        terms: &[String],
        tree: &Tree,
        handling: &IndexMap<String, Vec<String>>,
    ) -> Result<(), SnapError> {
        let fa_path = self.subgroup_path(subgroup_id, "fa");
        let mut fa_out = fasta::io::Writer::new(std::fs::File::create(&fa_path)?);
        for term in terms {
            let record = self
                .fasta
                .get(term)
                .ok_or_else(|| SnapError::MissingSequence {
                    label: term.clone(),
                })?;
            fa_out.write_record(record)?;
        }

        if self.snap_trees {
            let tre_path = self.subgroup_path(subgroup_id, "tre");
            std::fs::write(&tre_path, tree.to_newick() + "\n")?;
        }

        if self.report_inparalogs {
            let report_path = self
                .outdir
                .join(format!("{}.inparalog_report.txt", self.basename));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&report_path)?;
            let mut out = std::io::BufWriter::new(file);
            // The accumulated handling map is filtered down to kept tips
            // that made it into this subgroup's final tip set.
            for (kept, discarded) in handling {
                if terms.contains(kept) {
                    writeln!(
                        out,
                        "{}.orthosnap.{}\t{}\t{}",
                        self.basename,
                        subgroup_id,
                        kept,
                        discarded.join(";")
                    )?;
                }
            }
        }

        Ok(())
    }
}

/// Collects emitted subgroups as `(id, tips, newick)`; used by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub emitted: Vec<(usize, Vec<String>, String)>,
}

impl OutputSink for MemorySink {
    fn emit(
        &mut self,
        subgroup_id: usize,
        terms: &[String],
        tree: &Tree,
        _handling: &IndexMap<String, Vec<String>>,
    ) -> Result<(), SnapError> {
        self.emitted
            .push((subgroup_id, terms.to_vec(), tree.to_newick()));
        Ok(())
    }
}
