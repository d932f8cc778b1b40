use anyhow::Context;
use indexmap::IndexMap;
use noodles_fasta as fasta;
use std::io::BufRead;

/// Sequence records keyed by identifier, in file order.
/// Identifiers must match tree leaf labels exactly.
pub type FastaMap = IndexMap<String, fasta::Record>;

/// Read FASTA records from a buffered reader into an identifier-keyed map.
/// Duplicate identifiers are a data error.
pub fn from_reader<R: BufRead>(reader: R) -> anyhow::Result<FastaMap> {
    let mut fa_in = fasta::io::Reader::new(reader);
    let mut map = FastaMap::new();

    for result in fa_in.records() {
        let record = result?;
        let name = String::from_utf8(record.name().into())?;
        if map.insert(name.clone(), record).is_some() {
            anyhow::bail!("Duplicate FASTA identifier: {}", name);
        }
    }

    Ok(map)
}

/// Read a FASTA file (plain or gzipped, or "stdin") into a map.
pub fn read_fasta(infile: &str) -> anyhow::Result<FastaMap> {
    from_reader(crate::reader(infile)).with_context(|| format!("Failed to read FASTA {}", infile))
}

/// Residue count ignoring gap characters.
pub fn ungapped_len(record: &fasta::Record) -> usize {
    record
        .sequence()
        .get(..)
        .unwrap_or_default()
        .iter()
        .filter(|&&b| b != b'-')
        .count()
}
