//src/alnparse.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::TaxatorResult;
use crate::taxdb::SeqId2TaxId;
use crate::taxonomy::Taxonomy;
use crate::types::{AlignmentRecord, RecordSet};

/// Tab-separated alignment columns, one local alignment per line:
///
/// ```text
/// query_id  query_start  query_stop  query_length  reference_id
/// reference_start  reference_stop  score  evalue  identities  alignment_length
/// ```
///
/// `#`-comment and blank lines are ignored. Consecutive lines sharing a
/// `query_id` form one record set; the input is expected to be grouped by
/// query, as produced by the upstream search.
pub const ALIGNMENT_COLUMNS: usize = 11;

/// Read and group alignment records, resolving each reference identifier to
/// its taxon. A malformed line is skipped with a warning; a record whose
/// reference cannot be resolved poisons its whole query (that record set is
/// dropped with a warning, everything else is kept).
pub fn read_alignment_records<P: AsRef<Path>>(
    path: P,
    seqid2taxid: &SeqId2TaxId,
    tax: &Taxonomy,
) -> TaxatorResult<Vec<RecordSet>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut recordsets: Vec<RecordSet> = Vec::new();
    let mut current: Option<RecordSet> = None;
    let mut current_poisoned = false;
    let mut n_records = 0usize;
    let mut n_dropped_queries = 0usize;

    for line_result in reader.lines() {
        let line = line_result?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some(mut record) = parse_alignment_line(trimmed) else {
            log::warn!("skipping malformed alignment line: '{trimmed}'");
            continue;
        };

        // flush on query change
        if current
            .as_ref()
            .map(|set| set.query_identifier != record.query_identifier)
            .unwrap_or(false)
        {
            flush(&mut current, current_poisoned, &mut recordsets, &mut n_dropped_queries);
            current_poisoned = false;
        }
        if current.is_none() {
            current = Some(RecordSet::new(
                record.query_identifier.clone(),
                record.query_length,
            ));
        }

        let set = current.as_mut().expect("record set present");
        if current_poisoned {
            continue;
        }
        match seqid2taxid.get(&record.reference_identifier) {
            Ok(taxid) if tax.node(taxid).is_some() => {
                record.reference_node = taxid;
                set.records.push(record);
                n_records += 1;
            }
            Ok(taxid) => {
                log::warn!(
                    "query '{}' dropped: reference taxon {} absent from taxonomy",
                    set.query_identifier,
                    taxid
                );
                current_poisoned = true;
            }
            Err(_) => {
                log::warn!(
                    "query '{}' dropped: no taxon mapping for reference '{}'",
                    set.query_identifier,
                    record.reference_identifier
                );
                current_poisoned = true;
            }
        }
    }
    flush(&mut current, current_poisoned, &mut recordsets, &mut n_dropped_queries);

    log::info!(
        "parsed {} alignment records in {} record sets ({} queries dropped)",
        n_records,
        recordsets.len(),
        n_dropped_queries
    );
    Ok(recordsets)
}

fn flush(
    current: &mut Option<RecordSet>,
    poisoned: bool,
    recordsets: &mut Vec<RecordSet>,
    n_dropped: &mut usize,
) {
    if let Some(set) = current.take() {
        if poisoned {
            *n_dropped += 1;
        } else if !set.records.is_empty() {
            recordsets.push(set);
        }
    }
}

fn parse_alignment_line(line: &str) -> Option<AlignmentRecord> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < ALIGNMENT_COLUMNS {
        return None;
    }
    Some(AlignmentRecord {
        query_identifier: fields[0].to_string(),
        query_start: fields[1].parse().ok()?,
        query_stop: fields[2].parse().ok()?,
        query_length: fields[3].parse().ok()?,
        reference_identifier: fields[4].to_string(),
        reference_start: fields[5].parse().ok()?,
        reference_stop: fields[6].parse().ok()?,
        score: fields[7].parse().ok()?,
        evalue: fields[8].parse().ok()?,
        identities: fields[9].parse().ok()?,
        alignment_length: fields[10].parse().ok()?,
        reference_node: 0,
        filtered: false,
    })
}
