// src/lib.rs

pub mod align;
pub mod alnparse;
pub mod error;
pub mod predict;
pub mod seqstore;
pub mod taxdb;
pub mod taxonomy;
pub mod types;

use std::fmt::Write as FmtWrite;
use std::path::PathBuf;
use std::time::Instant;

pub use error::{TaxatorError, TaxatorResult};
pub use types::{AlignmentRecord, PredictionRecord, RecordSet};

use crate::predict::{predict_queries, RpaPredictionModel};
use crate::seqstore::InMemorySequenceStorage;
use crate::taxonomy::default_ranks;

/// The two placement knobs plus the rank ladder used for normalization.
pub struct PlacementConfig {
    /// Records scoring below `best score * factor` are screened out, in `(0, 1]`.
    pub exclude_alignments_factor: f32,
    /// Width of the pass-0 re-evaluation band, in `[0, 1)`.
    pub reeval_bandwidth: f32,
    pub ranks: Vec<String>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            exclude_alignments_factor: 0.5,
            reeval_bandwidth: 0.1,
            ranks: default_ranks(),
        }
    }
}

/// A struct to hold placement results, with output text built on demand.
pub struct PredictionResults {
    pub prediction_records: Vec<PredictionRecord>,
    pub placement_log: String,
    pub queries_total: usize,
    pub queries_placed: usize,
}

impl PredictionResults {
    /// Generate GFF3 output text on demand.
    pub fn get_gff3_output(&self) -> String {
        let mut output = String::from("##gff-version 3\n");
        for prec in &self.prediction_records {
            let _ = writeln!(output, "{}", prec.to_gff3_line());
        }
        output
    }

    /// The concatenated per-query placement traces.
    pub fn get_log_output(&self) -> &str {
        &self.placement_log
    }
}

/// End-to-end placement over files: load and normalize the taxonomy, load
/// the identifier map and both sequence stores, parse the grouped alignment
/// records and place every query sequentially.
#[allow(clippy::too_many_arguments)]
pub fn run_pipeline(
    nodes_path: &str,
    names_path: &str,
    seqid2taxid_path: &str,
    alignments_path: &str,
    query_fasta_paths: Vec<PathBuf>,
    reference_fasta_paths: Vec<PathBuf>,
    config: &PlacementConfig,
) -> TaxatorResult<PredictionResults> {
    // 1. Load and normalize the taxonomy
    let t0 = Instant::now();
    let mut taxonomy = taxdb::load_ncbi_taxonomy(nodes_path, names_path)?;
    taxonomy.normalize_ranks(&config.ranks);
    eprintln!("Step 1 (Load & normalize taxonomy) took: {:?}", t0.elapsed());

    // 2. Load the sequence identifier to taxon mapping
    let t1 = Instant::now();
    let seqid2taxid = taxdb::read_seqid2taxid(seqid2taxid_path)?;
    eprintln!("Step 2 (Load seqid2taxid map) took: {:?}", t1.elapsed());

    // 3. Load query and reference sequences (parallel I/O)
    let t2 = Instant::now();
    let query_store = InMemorySequenceStorage::from_fasta_files(&query_fasta_paths)?;
    let db_store = InMemorySequenceStorage::from_fasta_files(&reference_fasta_paths)?;
    eprintln!("Step 3 (Load FASTA stores) took: {:?}", t2.elapsed());

    // 4. Parse and group the alignment records
    let t3 = Instant::now();
    let mut recordsets = alnparse::read_alignment_records(alignments_path, &seqid2taxid, &taxonomy)?;
    eprintln!("Step 4 (Parse alignments) took: {:?}", t3.elapsed());

    // 5. Place every query sequentially
    let t4 = Instant::now();
    let model = RpaPredictionModel::new(
        &taxonomy,
        &query_store,
        &db_store,
        config.exclude_alignments_factor,
        config.reeval_bandwidth,
    );
    let queries_total = recordsets.len();
    let (prediction_records, placement_log) = predict_queries(&model, &mut recordsets);
    eprintln!("Step 5 (Placement) took: {:?}", t4.elapsed());

    let queries_placed = prediction_records.len();
    Ok(PredictionResults {
        prediction_records,
        placement_log,
        queries_total,
        queries_placed,
    })
}
