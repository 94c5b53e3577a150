//src/seqstore.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use bio::alphabets::dna;
use bio::io::fasta;
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;

use crate::error::{TaxatorError, TaxatorResult};

/// Serves reference/query subsequences by identifier and 1-based inclusive
/// coordinates. The placement core only ever reads through this trait.
pub trait SequenceStorage {
    /// Total length of a stored sequence; used to clamp range requests.
    fn sequence_length(&self, id: &str) -> TaxatorResult<u64>;

    fn get_sequence(&self, id: &str, start: u64, stop: u64) -> TaxatorResult<Vec<u8>>;

    /// Same contract as [`get_sequence`] (`stop >= start`), returning the
    /// reverse complement of the selected range.
    ///
    /// [`get_sequence`]: SequenceStorage::get_sequence
    fn get_sequence_reverse_complement(
        &self,
        id: &str,
        start: u64,
        stop: u64,
    ) -> TaxatorResult<Vec<u8>>;
}

/// Whole-sequence in-memory store backed by FASTA files. Identifiers are the
/// first whitespace-delimited token of each header; bases are uppercased on
/// load so edit distances are case-insensitive.
pub struct InMemorySequenceStorage {
    sequences: AHashMap<String, Vec<u8>>,
}

impl InMemorySequenceStorage {
    pub fn new() -> Self {
        Self {
            sequences: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sequences.contains_key(id)
    }

    /// Insert a sequence directly; used by builders and tests.
    pub fn insert(&mut self, id: String, seq: Vec<u8>) {
        self.sequences.insert(id, seq.to_ascii_uppercase());
    }

    /// Load every record of one FASTA file, `.gz` aware.
    pub fn from_fasta_file<P: AsRef<Path>>(path: P) -> TaxatorResult<Self> {
        let mut storage = Self::new();
        for (id, seq) in read_fasta_records(path.as_ref())? {
            storage.sequences.insert(id, seq);
        }
        Ok(storage)
    }

    /// Load several FASTA files in parallel and merge them into one store.
    pub fn from_fasta_files(paths: &[PathBuf]) -> TaxatorResult<Self> {
        let loaded: Vec<Vec<(String, Vec<u8>)>> = paths
            .par_iter()
            .map(|path| read_fasta_records(path))
            .collect::<TaxatorResult<Vec<_>>>()?;

        let mut storage = Self::new();
        for records in loaded {
            for (id, seq) in records {
                storage.sequences.insert(id, seq);
            }
        }
        log::info!(
            "sequence store holds {} sequences from {} file(s)",
            storage.len(),
            paths.len()
        );
        Ok(storage)
    }

    fn subrange(&self, id: &str, start: u64, stop: u64) -> TaxatorResult<&[u8]> {
        let seq = self
            .sequences
            .get(id)
            .ok_or_else(|| TaxatorError::MissingSequence { id: id.to_string() })?;
        if start == 0 || start > stop || stop > seq.len() as u64 {
            return Err(TaxatorError::InvalidSequenceRange {
                id: id.to_string(),
                start,
                stop,
            });
        }
        Ok(&seq[(start - 1) as usize..stop as usize])
    }
}

impl Default for InMemorySequenceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceStorage for InMemorySequenceStorage {
    fn sequence_length(&self, id: &str) -> TaxatorResult<u64> {
        self.sequences
            .get(id)
            .map(|s| s.len() as u64)
            .ok_or_else(|| TaxatorError::MissingSequence { id: id.to_string() })
    }

    fn get_sequence(&self, id: &str, start: u64, stop: u64) -> TaxatorResult<Vec<u8>> {
        Ok(self.subrange(id, start, stop)?.to_vec())
    }

    fn get_sequence_reverse_complement(
        &self,
        id: &str,
        start: u64,
        stop: u64,
    ) -> TaxatorResult<Vec<u8>> {
        Ok(dna::revcomp(self.subrange(id, start, stop)?))
    }
}

fn read_fasta_records(path: &Path) -> TaxatorResult<Vec<(String, Vec<u8>)>> {
    let file = File::open(path)?;
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut records = Vec::new();
    for result in fasta::Reader::from_bufread(reader).records() {
        let record = result.map_err(|e| TaxatorError::Parse(format!(
            "FASTA record in '{}': {e}",
            path.display()
        )))?;
        records.push((record.id().to_string(), record.seq().to_ascii_uppercase()));
    }
    Ok(records)
}
