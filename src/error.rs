// src/error.rs

use thiserror::Error;

/// Error type for all fallible taxator operations.
#[derive(Error, Debug)]
pub enum TaxatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("taxon {taxid} not found in taxonomy")]
    MissingTaxon { taxid: u32 },

    #[error("no taxon mapping for sequence identifier '{seqid}'")]
    MissingTaxonMapping { seqid: String },

    #[error("sequence '{id}' not present in storage")]
    MissingSequence { id: String },

    #[error("range {start}..={stop} is outside sequence '{id}'")]
    InvalidSequenceRange { id: String, start: u64, stop: u64 },

    #[error("invalid taxonomy: {0}")]
    InvalidTaxonomy(String),

    #[error("duplicate taxon {taxid} inserted into taxonomy")]
    DuplicateTaxon { taxid: u32 },
}

/// Result type alias for taxator operations.
pub type TaxatorResult<T> = Result<T, TaxatorError>;
