//src/types.rs

use std::fmt::Write as FmtWrite;

/// One candidate local alignment of a query segment against a reference
/// sequence, as produced by an external search tool. All fields except
/// `filtered` are read-only to the placement core.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub query_identifier: String,
    /// 1-based inclusive query coordinates.
    pub query_start: u64,
    pub query_stop: u64,
    pub query_length: u64,
    pub reference_identifier: String,
    /// 1-based inclusive reference coordinates; `reference_start >
    /// reference_stop` means the alignment is on the reverse strand.
    pub reference_start: u64,
    pub reference_stop: u64,
    /// Local alignment bit-score (higher is better).
    pub score: f32,
    pub evalue: f64,
    /// Number of matching bases in the local alignment.
    pub identities: u64,
    pub alignment_length: u64,
    /// Taxon of the reference sequence, resolved against the taxonomy.
    pub reference_node: u32,
    /// Set by score screening; filtered records take no part in placement.
    pub filtered: bool,
}

impl AlignmentRecord {
    #[inline]
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    #[inline]
    pub fn filter_out(&mut self) {
        self.filtered = true;
    }
}

/// All candidate alignments for a single query segment.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub query_identifier: String,
    pub query_length: u64,
    pub records: Vec<AlignmentRecord>,
}

impl RecordSet {
    pub fn new(query_identifier: String, query_length: u64) -> Self {
        Self {
            query_identifier,
            query_length,
            records: Vec::new(),
        }
    }
}

/// The taxonomic range predicted for one query: a lower (most specific) and
/// upper (most general) bound, with an interpolation value locating the
/// query between them on the score axis.
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub query_identifier: String,
    pub query_length: u64,
    /// Query feature range covered by the retained alignments, 1-based.
    pub qrstart: u64,
    pub qrstop: u64,
    pub lower_node: u32,
    pub upper_node: u32,
    pub best_reference_taxon: u32,
    /// Position of the query between lower and upper node, in `[0, 1]`.
    pub interpolation_value: f32,
    pub signal_strength: f32,
    /// Best supporting match count over all anchors.
    pub anchors_support: u64,
}

impl PredictionRecord {
    pub fn new(query_identifier: String, query_length: u64) -> Self {
        Self {
            query_identifier,
            query_length,
            qrstart: 0,
            qrstop: 0,
            lower_node: 0,
            upper_node: 0,
            best_reference_taxon: 0,
            interpolation_value: 0.0,
            signal_strength: 0.0,
            anchors_support: 0,
        }
    }

    pub fn set_query_feature_begin(&mut self, start: u64) {
        self.qrstart = start;
    }

    pub fn set_query_feature_end(&mut self, stop: u64) {
        self.qrstop = stop;
    }

    pub fn set_interpolation_value(&mut self, ival: f32) {
        self.interpolation_value = ival;
    }

    pub fn set_signal_strength(&mut self, taxsig: f32) {
        self.signal_strength = taxsig;
    }

    pub fn set_node_range(&mut self, lower: u32, upper: u32, support: u64) {
        self.lower_node = lower;
        self.upper_node = upper;
        self.anchors_support = support;
    }

    pub fn set_best_reference_taxon(&mut self, taxon: u32) {
        self.best_reference_taxon = taxon;
    }

    /// Render this prediction as one GFF3 feature line.
    pub fn to_gff3_line(&self) -> String {
        let mut line = String::new();
        let _ = write!(
            line,
            "{}\ttaxator-rs\tsequence_feature\t{}\t{}\t{:.3}\t.\t.\t",
            self.query_identifier, self.qrstart, self.qrstop, self.interpolation_value
        );
        let _ = write!(
            line,
            "seqlen={};tax={};rtax={};support={}",
            self.query_length, self.lower_node, self.best_reference_taxon, self.anchors_support
        );
        line
    }
}
