//src/taxdb.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{TaxatorError, TaxatorResult};
use crate::taxonomy::Taxonomy;

/// Mapping from sequence identifier to reference taxon id.
pub struct SeqId2TaxId {
    map: AHashMap<String, u32>,
}

impl SeqId2TaxId {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Resolve an identifier; a missing key is an error for the caller to
    /// handle (usually by skipping the affected query).
    pub fn get(&self, seqid: &str) -> TaxatorResult<u32> {
        self.map
            .get(seqid)
            .copied()
            .ok_or_else(|| TaxatorError::MissingTaxonMapping {
                seqid: seqid.to_string(),
            })
    }
}

/// Split one NCBI dump line into trimmed fields.
/// Lines look like `562\t|\t561\t|\tspecies\t|...` with a trailing `\t|`.
fn split_dmp_line(line: &str) -> Vec<&str> {
    line.split('|').map(|f| f.trim_matches(['\t', ' '])).collect()
}

/// Load a taxonomy from the two NCBI-style flat tables:
/// a nodes relation (`taxid | parent_taxid | rank | ...`) and a names
/// relation (`taxid | name | unique name | name class |`). Only
/// `scientific name` rows are used from the names table; when the names
/// table carries no class column every row counts.
///
/// Rows are re-ordered parent-first internally, so dump files need not be
/// topologically sorted. Malformed lines are skipped with a warning. The
/// returned taxonomy is indexed and validated.
pub fn load_ncbi_taxonomy<P: AsRef<Path>, Q: AsRef<Path>>(
    nodes_path: P,
    names_path: Q,
) -> TaxatorResult<Taxonomy> {
    // nodes relation
    let mut parent_of: AHashMap<u32, u32> = AHashMap::new();
    let mut rank_of: AHashMap<u32, String> = AHashMap::new();
    let mut root: Option<u32> = None;

    let reader = BufReader::new(File::open(&nodes_path)?);
    for line_result in reader.lines() {
        let line = line_result?;
        if ignore_line(&line) {
            continue;
        }
        let fields = split_dmp_line(&line);
        if fields.len() < 3 {
            log::warn!("skipping malformed nodes line: '{line}'");
            continue;
        }
        let (taxid, parentid) = match (fields[0].parse::<u32>(), fields[1].parse::<u32>()) {
            (Ok(t), Ok(p)) => (t, p),
            _ => {
                log::warn!("skipping malformed nodes line: '{line}'");
                continue;
            }
        };
        if taxid == parentid {
            root = Some(taxid);
        }
        parent_of.insert(taxid, parentid);
        rank_of.insert(taxid, fields[2].to_string());
    }

    let root = root.ok_or_else(|| {
        TaxatorError::InvalidTaxonomy("nodes table contains no self-parented root".to_string())
    })?;

    // children relation for parent-first insertion
    let mut children_of: AHashMap<u32, Vec<u32>> = AHashMap::new();
    for (&taxid, &parentid) in &parent_of {
        if taxid != parentid {
            children_of.entry(parentid).or_default().push(taxid);
        }
    }
    for kids in children_of.values_mut() {
        kids.sort_unstable();
    }

    let mut tax = Taxonomy::new(root);
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(root);
    while let Some(taxid) = queue.pop_front() {
        if let Some(kids) = children_of.get(&taxid) {
            for &child in kids {
                tax.insert_node(child, taxid)?;
                queue.push_back(child);
            }
        }
    }
    if tax.index_size() != parent_of.len() {
        log::warn!(
            "{} nodes unreachable from root {} and dropped",
            parent_of.len() - tax.index_size(),
            root
        );
    }

    // names relation
    let reader = BufReader::new(File::open(&names_path)?);
    for line_result in reader.lines() {
        let line = line_result?;
        if ignore_line(&line) {
            continue;
        }
        let fields = split_dmp_line(&line);
        if fields.len() < 2 {
            log::warn!("skipping malformed names line: '{line}'");
            continue;
        }
        let Ok(taxid) = fields[0].parse::<u32>() else {
            log::warn!("skipping malformed names line: '{line}'");
            continue;
        };
        if fields.len() > 3 && fields[3] != "scientific name" {
            continue;
        }
        if tax.node(taxid).is_none() {
            continue;
        }
        let name = fields[1].to_string();
        let rank = rank_of.get(&taxid).cloned().unwrap_or_default();
        if name == rank {
            log::warn!("taxon {taxid} name equals its rank '{name}', annotation dropped");
            continue;
        }
        tax.set_annotation(taxid, name, rank)?;
    }

    tax.reindex();
    tax.validate()?;
    log::info!("loaded taxonomy with {} nodes, root {}", tax.size(), root);
    Ok(tax)
}

/// Read the 2-column tab-separated `seqid\ttaxid` mapping.
pub fn read_seqid2taxid<P: AsRef<Path>>(path: P) -> TaxatorResult<SeqId2TaxId> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut map = AHashMap::new();
    for line_result in reader.lines() {
        let line = line_result?;
        if ignore_line(&line) {
            continue;
        }
        let mut parts = line.trim_end().split('\t');
        let (Some(seqid), Some(taxid_str)) = (parts.next(), parts.next()) else {
            log::warn!("skipping malformed seqid2taxid line: '{line}'");
            continue;
        };
        let Ok(taxid) = taxid_str.trim().parse::<u32>() else {
            log::warn!("skipping malformed seqid2taxid line: '{line}'");
            continue;
        };
        map.insert(seqid.to_string(), taxid);
    }
    Ok(SeqId2TaxId { map })
}

#[inline]
fn ignore_line(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}
