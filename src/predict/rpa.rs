//src/predict/rpa.rs

use std::collections::BTreeSet;
use std::fmt::Write as FmtWrite;

use crate::align::{alignment_matches, global_edit_distance};
use crate::error::TaxatorResult;
use crate::predict::band_factor::BandFactor;
use crate::predict::{set_unclassified, PredictionModel};
use crate::seqstore::SequenceStorage;
use crate::taxonomy::{Taxonomy, TaxonomyInterface};
use crate::types::{AlignmentRecord, PredictionRecord, RecordSet};

/// Score sentinel for references that were never aligned against the query.
const SCORE_UNKNOWN: u32 = u32::MAX;

/// Three-pass realignment placement model.
///
/// Pass 0 re-aligns the best-scoring references against the query range to
/// pick the anchor group; pass 1 aligns everything against each anchor to
/// expand the lower/upper taxon bounds, widening the ingroup band with the
/// [`BandFactor`]; pass 2 re-checks the retained outgroup anchors until the
/// upper bound is stable. The triangle inequality is used to skip and to
/// reuse alignments throughout.
pub struct RpaPredictionModel<'a, Q, D> {
    taxinter: TaxonomyInterface<'a>,
    query_sequences: &'a Q,
    db_sequences: &'a D,
    exclude_alignments_factor: f32,
    reeval_bandwidth_factor: f32,
}

impl<'a, Q, D> RpaPredictionModel<'a, Q, D>
where
    Q: SequenceStorage,
    D: SequenceStorage,
{
    /// `exclude_factor` in `(0, 1]` screens records against the best local
    /// score; `reeval_bandwidth` in `[0, 1)` sets which records are
    /// re-aligned against the query in pass 0.
    pub fn new(
        taxonomy: &'a Taxonomy,
        query_sequences: &'a Q,
        db_sequences: &'a D,
        exclude_factor: f32,
        reeval_bandwidth: f32,
    ) -> Self {
        Self {
            taxinter: TaxonomyInterface::new(taxonomy),
            query_sequences,
            db_sequences,
            exclude_alignments_factor: exclude_factor,
            reeval_bandwidth_factor: 1.0 - reeval_bandwidth,
        }
    }

    fn node_name(&self, taxid: u32) -> String {
        match self.taxinter.get_node(taxid) {
            Some(node) => node.display_name(),
            None => format!("taxid:{taxid}"),
        }
    }

    /// Fetch the reference segment of `rec`, extended on each side by the
    /// query overhang and clamped to the reference bounds. Reverse-strand
    /// records (descending coordinates) come back reverse-complemented.
    fn fetch_reference_segment(
        &self,
        rec: &AlignmentRecord,
        qrstart: u64,
        qrstop: u64,
    ) -> TaxatorResult<Vec<u8>> {
        let rid = &rec.reference_identifier;
        let rlen = self.db_sequences.sequence_length(rid)?;
        let left_ext = rec.query_start - qrstart;
        let right_ext = qrstop - rec.query_stop;

        if rec.reference_start <= rec.reference_stop {
            let start = if left_ext < rec.reference_start {
                rec.reference_start - left_ext
            } else {
                1
            };
            let stop = (rec.reference_stop + right_ext).min(rlen);
            self.db_sequences.get_sequence(rid, start, stop)
        } else {
            let start = if right_ext < rec.reference_stop {
                rec.reference_stop - right_ext
            } else {
                1
            };
            let stop = (rec.reference_start + left_ext).min(rlen);
            self.db_sequences
                .get_sequence_reverse_complement(rid, start, stop)
        }
    }
}

impl<'a, Q, D> PredictionModel for RpaPredictionModel<'a, Q, D>
where
    Q: SequenceStorage,
    D: SequenceStorage,
{
    fn predict(
        &self,
        recordset: &mut RecordSet,
        prec: &mut PredictionRecord,
        logsink: &mut String,
    ) -> TaxatorResult<()> {
        prec.query_identifier = recordset.query_identifier.clone();
        prec.query_length = recordset.query_length;
        let qid = recordset.query_identifier.clone();
        let root = self.taxinter.get_root();

        // screen records against the best local score
        let mut n = 0usize;
        let mut qmaxscore = 0.0f32;
        for rec in recordset.records.iter().filter(|r| !r.is_filtered()) {
            qmaxscore = qmaxscore.max(rec.score);
            n += 1;
        }
        let n_pre = n;
        let threshold = qmaxscore * self.exclude_alignments_factor;
        for rec in recordset.records.iter_mut() {
            if !rec.is_filtered() && rec.score < threshold {
                rec.filter_out();
                n -= 1;
            }
        }

        // with no unmasked alignment, set to unclassified and return
        if n == 0 {
            let _ = writeln!(logsink, "ID\t-1:-1@{qid}");
            let _ = writeln!(logsink, "  NUMREF\t{n_pre}\t{n}\n");
            set_unclassified(prec, root);
            return Ok(());
        }

        // with one alignment, don't align and return
        if n == 1 {
            let rec = recordset
                .records
                .iter()
                .find(|r| !r.is_filtered())
                .expect("one unfiltered record");
            let _ = writeln!(logsink, "ID\t{}:{}@{qid}", rec.query_start, rec.query_stop);
            let _ = writeln!(logsink, "  NUMREF\t{n_pre}\t{n}\n");

            prec.set_query_feature_begin(rec.query_start);
            prec.set_query_feature_end(rec.query_stop);
            prec.set_interpolation_value(1.0);
            prec.set_node_range(rec.reference_node, root, rec.identities);
            prec.set_best_reference_taxon(rec.reference_node);
            return Ok(());
        }

        // n > 1: determine query range over the retained records
        let records_ordered: Vec<&AlignmentRecord> = recordset
            .records
            .iter()
            .filter(|r| !r.is_filtered())
            .collect();
        let qrstart = records_ordered.iter().map(|r| r.query_start).min().expect("records");
        let qrstop = records_ordered.iter().map(|r| r.query_stop).max().expect("records");
        let qrlength = qrstop - qrstart + 1;

        let qrseqname = format!("{qrstart}:{qrstop}@{qid}");
        let _ = writeln!(logsink, "ID\t{qrseqname}");
        let _ = writeln!(logsink, "  NUMREF\t{n_pre}\t{n}\n");

        let mut pass_0_counter = 0u64;
        let mut pass_1_counter = 0u64;
        let mut pass_2_counter = 0u64;

        // retrieve segment sequences
        let qrseq = self.query_sequences.get_sequence(&qid, qrstart, qrstop)?;
        let mut rrseqs: Vec<Vec<u8>> = Vec::with_capacity(n);
        for rec in &records_ordered {
            rrseqs.push(self.fetch_reference_segment(rec, qrstart, qrstop)?);
        }

        let mut rrseqs_qscores: Vec<u32> = Vec::with_capacity(n);
        let mut rrseqs_matches: Vec<u64> = Vec::with_capacity(n);
        let mut qgroup: BTreeSet<usize> = BTreeSet::new();
        let mut anchors_support: u64 = 0;
        let mut lca_allnodes = records_ordered[0].reference_node;
        let rtax;

        {
            // pass 0: re-alignment to most similar reference segments
            let _ = writeln!(logsink, "  PASS\t0");
            let reeval_threshold = self.reeval_bandwidth_factor * qmaxscore;
            let mut index_best = 0usize;

            for (i, rec) in records_ordered.iter().enumerate() {
                let score: u32;
                let matches: u64;
                if rec.alignment_length == qrlength && rec.identities == qrlength {
                    // reference segment is identical to the query range
                    qgroup.insert(i);
                    score = 0;
                    matches = rec.identities;
                    let _ = writeln!(
                        logsink,
                        "    *ALN {i} <=> query\tscore = {score}; matches = {matches}"
                    );
                } else if rec.score >= reeval_threshold {
                    qgroup.insert(i);
                    score = global_edit_distance(&rrseqs[i], &qrseq);
                    pass_0_counter += 1;
                    matches =
                        alignment_matches(rrseqs[i].len(), qrseq.len(), score).max(rec.identities);
                    let _ = writeln!(
                        logsink,
                        "    +ALN {i} <=> query\tscore = {score}; matches = {matches}"
                    );
                } else {
                    // not similar enough, fill in sentinel values
                    score = SCORE_UNKNOWN;
                    matches = 0;
                }
                rrseqs_qscores.push(score);
                rrseqs_matches.push(matches);

                if score < rrseqs_qscores[index_best]
                    || (score == rrseqs_qscores[index_best] && matches > rrseqs_matches[index_best])
                {
                    index_best = i;
                }
                anchors_support = anchors_support.max(matches);
                lca_allnodes = self.taxinter.get_lca(lca_allnodes, rec.reference_node);
            }

            // only keep and use the best-scoring reference sequences
            let best_score = rrseqs_qscores[index_best];
            let best_matches = rrseqs_matches[index_best];
            qgroup.retain(|&i| rrseqs_qscores[i] == best_score && rrseqs_matches[i] == best_matches);

            let mut rtax_acc = records_ordered[index_best].reference_node;
            for &i in &qgroup {
                let cnode = records_ordered[i].reference_node;
                rtax_acc = self.taxinter.get_lca(rtax_acc, cnode);
                let _ = writeln!(
                    logsink,
                    "      current ref node: ({}) {} (+ {} )",
                    rrseqs_qscores[i],
                    self.node_name(rtax_acc),
                    self.node_name(cnode)
                );
            }
            rtax = rtax_acc;
            debug_assert!(!qgroup.is_empty());

            let _ = writeln!(logsink, "    NUMALN\t{pass_0_counter}\n");
        }

        let mut anchors_taxsig = 1.0f32;
        let mut ival_global = 0.0f32;
        let mut lnode_global = rtax;
        let mut unode_global = rtax;
        let mut outgroup: BTreeSet<usize> = BTreeSet::new();
        let mut bandfactor_max = 1.0f32;

        {
            // pass 1: align everything against each best-reference anchor
            let _ = writeln!(logsink, "  PASS\t1");
            let mut alignments_counter = 0u64;
            let mut alignments_counter_naive = 0u64;
            let mut lca_root_dist_min = u32::MAX;

            loop {
                let Some(index_anchor) = qgroup.pop_first() else {
                    break;
                };
                let mut bandfactor1 = BandFactor::new(self.taxinter, n);
                let qscore = rrseqs_qscores[index_anchor];
                let rnode = records_ordered[index_anchor].reference_node;
                bandfactor1.add_sequence(0, rnode);
                let mut lnode = rtax;
                let mut unode: Option<u32> = None;
                let mut lscore: u32 = 0;
                let mut uscore: u32 = SCORE_UNKNOWN;
                let mut outgroup_tmp: Vec<(usize, u32)> = Vec::new();

                let _ = writeln!(logsink, "      query: ({qscore}) unknown");
                alignments_counter_naive += (n - 1) as u64;

                // reverse order saves some alignments
                for i in (0..n).rev() {
                    if lnode == root {
                        break;
                    }
                    let cnode = records_ordered[i].reference_node;
                    let score: u32;
                    if i == index_anchor {
                        score = 0;
                    } else if rrseqs_qscores[i] == 0 && rrseqs_qscores[index_anchor] == 0 {
                        // triangle shortcut: both identical to the query
                        // implies identical to each other
                        score = rrseqs_qscores[i];
                    } else {
                        score = global_edit_distance(&rrseqs[i], &rrseqs[index_anchor]);
                        pass_1_counter += 1;
                        alignments_counter += 1;
                        let matches = alignment_matches(
                            rrseqs[i].len(),
                            rrseqs[index_anchor].len(),
                            score,
                        );
                        let _ = writeln!(
                            logsink,
                            "    +ALN {i} <=> {index_anchor}\tscore = {score}; matches = {matches}"
                        );
                        // update query alignment scores using the triangle
                        // relation: the anchor is sequence-identical to the
                        // query, so anchor distances are query distances
                        if rrseqs_qscores[index_anchor] == 0 && rrseqs_matches[i] > 0 {
                            rrseqs_qscores[i] = score;
                            rrseqs_matches[i] = matches;
                        }
                    }

                    bandfactor1.add_sequence(score, cnode);

                    if score == 0 {
                        // sequence-identical to the anchor, already represented
                        qgroup.remove(&i);
                    } else if score <= qscore {
                        lnode = self.taxinter.get_lca(lnode, cnode);
                        if score > lscore {
                            lscore = score;
                        }
                        let _ = writeln!(
                            logsink,
                            "      current lower node: ({}) {} (+ {} at {})",
                            score,
                            self.node_name(lnode),
                            self.node_name(cnode),
                            self.taxinter
                                .root_path_length(self.taxinter.get_lca(cnode, rnode))
                        );
                    } else {
                        if score < uscore {
                            uscore = score;
                        }
                        outgroup_tmp.push((i, score));
                    }
                }

                let bandfactor = bandfactor1.get_factor();
                bandfactor_max = bandfactor_max.max(bandfactor);
                let qscore_ex = (qscore as f32 * bandfactor) as u32;
                let mut min_upper_score = SCORE_UNKNOWN;

                let _ = writeln!(
                    logsink,
                    "\n    EXT\tqscore = {qscore}; threshold = {qscore_ex}; bandfactor = {bandfactor}"
                );
                let mut outgroup_kept: Vec<(usize, u32)> = Vec::with_capacity(outgroup_tmp.len());
                for (i, score) in outgroup_tmp {
                    if score > qscore_ex {
                        if score > min_upper_score {
                            continue; // drop, cannot define the upper bound
                        }
                        if score < min_upper_score {
                            min_upper_score = score;
                        }
                        outgroup_kept.push((i, score));
                    } else {
                        // within the widened band: the worst such score
                        // becomes the boundary
                        if min_upper_score > qscore_ex {
                            min_upper_score = score;
                        } else {
                            min_upper_score = min_upper_score.max(score);
                        }
                        outgroup_kept.push((i, score));
                    }
                }

                if min_upper_score != SCORE_UNKNOWN {
                    unode = Some(lnode);
                }
                for &(i, score) in &outgroup_kept {
                    if score > min_upper_score {
                        continue;
                    }
                    let cnode = records_ordered[i].reference_node;
                    let merged = self.taxinter.get_lca(cnode, unode.unwrap_or(lnode));
                    unode = Some(merged);
                    let _ = writeln!(
                        logsink,
                        "      current upper node: ({}) {} (+ {} at {})",
                        score,
                        self.node_name(merged),
                        self.node_name(cnode),
                        self.taxinter
                            .root_path_length(self.taxinter.get_lca(cnode, rnode))
                    );

                    // curate a minimal outgroup: keep only candidates whose
                    // LCA with the best reference sits closest to the root
                    let lca_root_dist = self
                        .taxinter
                        .root_path_length(self.taxinter.get_lca(cnode, rtax));
                    if lca_root_dist > lca_root_dist_min {
                        continue;
                    }
                    if lca_root_dist < lca_root_dist_min {
                        lca_root_dist_min = lca_root_dist;
                        outgroup.clear();
                    }
                    outgroup.insert(i);
                }

                // adjust interpolation value and upper node
                let mut ival = 0.0f32;
                let mut uscore_log = uscore as i64;
                let unode = match unode {
                    None => {
                        uscore_log = -1;
                        ival = 1.0;
                        root
                    }
                    Some(u) => {
                        if u != lnode && lscore < qscore {
                            ival = (qscore - lscore) as f32 / (uscore - lscore) as f32;
                        }
                        u
                    }
                };

                let _ = writeln!(
                    logsink,
                    "\n    SCORE\tlscore = {lscore}; uscore = {uscore_log}; qscore = {qscore}; qscore_ex = {qscore_ex}; ival = {ival}\n"
                );
                let taxsig = 0.0f32;

                // combine interpolation and signal values conservatively
                ival_global = ival_global.max(ival);
                anchors_taxsig = anchors_taxsig.min(taxsig);
                unode_global = self.taxinter.get_lca(unode_global, unode);
                lnode_global = self.taxinter.get_lca(lnode_global, lnode);

                if qgroup.is_empty() || lnode_global == root {
                    break;
                }
            }

            let _ = writeln!(
                logsink,
                "    NUMALN\t{}\t{}",
                alignments_counter,
                alignments_counter_naive - alignments_counter
            );
            let _ = writeln!(logsink, "    NUMOUTGRP\t{}", outgroup.len());
        }

        let _ = writeln!(
            logsink,
            "    RANGE\t{}\t{}\t{}\n",
            self.node_name(rtax),
            self.node_name(lnode_global),
            self.node_name(unode_global)
        );

        {
            // pass 2: stable upper node estimation
            let _ = writeln!(logsink, "  PASS\t2");
            let mut alignments_counter = 0u64;
            let mut alignments_counter_naive = 0u64;

            while let Some(index_anchor) = outgroup.pop_first() {
                if unode_global == lca_allnodes {
                    // the upper bound cannot grow any further
                    if rrseqs_matches[index_anchor] == 0 {
                        alignments_counter_naive += n as u64;
                    } else {
                        alignments_counter_naive += (n - 1) as u64;
                    }
                    continue;
                }

                if rrseqs_matches[index_anchor] == 0 {
                    // pass 0 sentinel: align query <=> anchor now
                    let score = global_edit_distance(&rrseqs[index_anchor], &qrseq);
                    let matches =
                        alignment_matches(rrseqs[index_anchor].len(), qrseq.len(), score);
                    let _ = writeln!(
                        logsink,
                        "    +ALN query <=> {index_anchor}\tscore = {score}; matches = {matches}"
                    );
                    rrseqs_qscores[index_anchor] = score;
                    pass_2_counter += 1;
                    alignments_counter += 1;
                    alignments_counter_naive += 1;
                    rrseqs_matches[index_anchor] = matches;
                }

                let qscore = rrseqs_qscores[index_anchor];
                let qscore_ex = (qscore as f32 * bandfactor_max) as u32;
                let _ = writeln!(logsink, "      query: ({qscore_ex}) unknown");

                for i in 0..n {
                    let cnode = records_ordered[i].reference_node;
                    let score: u32;
                    if i == index_anchor {
                        score = 0;
                    } else {
                        if self.taxinter.is_parent_of(unode_global, cnode) {
                            // already inside the upper bound, no alignment needed
                            score = SCORE_UNKNOWN;
                        } else {
                            score = global_edit_distance(&rrseqs[i], &rrseqs[index_anchor]);
                            let _ = writeln!(
                                logsink,
                                "    +ALN {i} <=> {index_anchor}\tscore = {score}"
                            );
                            pass_2_counter += 1;
                            alignments_counter += 1;
                            rrseqs_qscores[i] = score;
                        }
                        alignments_counter_naive += 1;
                    }

                    if score == 0 {
                        outgroup.remove(&i);
                    }
                    if score <= qscore_ex {
                        unode_global = self.taxinter.get_lca(unode_global, cnode);
                        let _ = writeln!(
                            logsink,
                            "      current upper node: ({}) {} (+ {} at {})",
                            score,
                            self.node_name(unode_global),
                            self.node_name(cnode),
                            self.taxinter.root_path_length(
                                self.taxinter
                                    .get_lca(cnode, records_ordered[index_anchor].reference_node)
                            )
                        );
                    }
                }
                let _ = writeln!(logsink);
            }
            let _ = writeln!(
                logsink,
                "    NUMALN\t{}\t{}",
                alignments_counter,
                alignments_counter_naive - alignments_counter
            );
        }

        if unode_global == lnode_global {
            ival_global = 1.0;
        }

        let _ = writeln!(
            logsink,
            "    RANGE\t{}\t{}\t{}\n",
            self.node_name(rtax),
            self.node_name(lnode_global),
            self.node_name(unode_global)
        );

        prec.set_signal_strength(anchors_taxsig);
        prec.set_query_feature_begin(qrstart);
        prec.set_query_feature_end(qrstop);
        prec.set_interpolation_value(ival_global);
        prec.set_node_range(lnode_global, unode_global, anchors_support);
        prec.set_best_reference_taxon(rtax);

        let gcounter = pass_0_counter + pass_1_counter + pass_2_counter;
        let normalised_rt = gcounter as f32 / n as f32;
        let _ = writeln!(
            logsink,
            "STATS \"{qrseqname}\"\t{n}\t{pass_0_counter}\t{pass_1_counter}\t{pass_2_counter}\t{gcounter}\t{normalised_rt:.2}\n"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqstore::InMemorySequenceStorage;

    /// 1 root
    /// ├── 2 Bacteria (superkingdom)
    /// │   ├── 10 GenusA ── 11 SpeciesA1, 12 SpeciesA2
    /// │   └── 20 GenusB ── 21 SpeciesB1
    /// └── 3 Archaea (superkingdom)
    ///     └── 30 GenusC ── 31 SpeciesC1
    fn fixture_taxonomy() -> Taxonomy {
        let mut tax = Taxonomy::new(1);
        tax.set_annotation(1, "root".to_string(), "no rank".to_string())
            .unwrap();
        let lineage = [
            (2, 1, "Bacteria", "superkingdom"),
            (10, 2, "GenusA", "genus"),
            (11, 10, "SpeciesA1", "species"),
            (12, 10, "SpeciesA2", "species"),
            (20, 2, "GenusB", "genus"),
            (21, 20, "SpeciesB1", "species"),
            (3, 1, "Archaea", "superkingdom"),
            (30, 3, "GenusC", "genus"),
            (31, 30, "SpeciesC1", "species"),
        ];
        for (taxid, parent, name, rank) in lineage {
            tax.insert_node(taxid, parent).unwrap();
            tax.set_annotation(taxid, name.to_string(), rank.to_string())
                .unwrap();
        }
        tax.reindex();
        tax
    }

    /// 30 bp periodic query plus derived reference sequences with known
    /// pairwise edit distances (asserted in `fixture_distances_hold`).
    fn q_seq() -> Vec<u8> {
        b"ACGT".iter().copied().cycle().take(30).collect()
    }

    fn y_seq() -> Vec<u8> {
        let mut y = q_seq();
        y[4] = b'T';
        y[14] = b'A';
        y
    }

    fn w_seq() -> Vec<u8> {
        let mut w = y_seq();
        w[24] = b'G';
        w
    }

    fn z_seq() -> Vec<u8> {
        let mut z = q_seq();
        z[..10].copy_from_slice(b"TTTTTTTTTT");
        z
    }

    fn v_seq() -> Vec<u8> {
        let mut v = z_seq();
        v[25] = b'A';
        v[27] = b'A';
        v[29] = b'G';
        v
    }

    fn record(rid: &str, score: f32, identities: u64, taxid: u32) -> AlignmentRecord {
        AlignmentRecord {
            query_identifier: "q1".to_string(),
            query_start: 1,
            query_stop: 30,
            query_length: 30,
            reference_identifier: rid.to_string(),
            reference_start: 1,
            reference_stop: 30,
            score,
            evalue: 1e-20,
            identities,
            alignment_length: 30,
            reference_node: taxid,
            filtered: false,
        }
    }

    fn query_store() -> InMemorySequenceStorage {
        let mut s = InMemorySequenceStorage::new();
        s.insert("q1".to_string(), q_seq());
        s
    }

    fn db_store() -> InMemorySequenceStorage {
        let mut s = InMemorySequenceStorage::new();
        s.insert("ry".to_string(), y_seq());
        s.insert("rw".to_string(), bio::alphabets::dna::revcomp(w_seq()));
        s.insert("rz".to_string(), z_seq());
        s.insert("rv".to_string(), v_seq());
        s.insert("rq1".to_string(), q_seq());
        s.insert("rq2".to_string(), q_seq());
        s
    }

    fn run(
        tax: &Taxonomy,
        qstore: &InMemorySequenceStorage,
        dbstore: &InMemorySequenceStorage,
        exclude: f32,
        reeval: f32,
        recordset: &mut RecordSet,
    ) -> (PredictionRecord, String) {
        let model = RpaPredictionModel::new(tax, qstore, dbstore, exclude, reeval);
        let mut prec = PredictionRecord::new(
            recordset.query_identifier.clone(),
            recordset.query_length,
        );
        let mut logsink = String::new();
        model
            .predict(recordset, &mut prec, &mut logsink)
            .expect("placement succeeds");
        (prec, logsink)
    }

    fn recordset(records: Vec<AlignmentRecord>) -> RecordSet {
        let mut set = RecordSet::new("q1".to_string(), 30);
        set.records = records;
        set
    }

    #[test]
    fn fixture_distances_hold() {
        let (q, y, w, z, v) = (q_seq(), y_seq(), w_seq(), z_seq(), v_seq());
        assert_eq!(global_edit_distance(&q, &y), 2);
        assert_eq!(global_edit_distance(&y, &w), 1);
        assert_eq!(global_edit_distance(&q, &w), 3);
        assert!(global_edit_distance(&z, &y) > 2);
        assert!(global_edit_distance(&v, &y) > global_edit_distance(&z, &y));
        assert!(global_edit_distance(&v, &z) <= global_edit_distance(&z, &q));
    }

    #[test]
    fn zero_candidates_yield_unclassified() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut filtered = record("ry", 60.0, 28, 11);
        filtered.filter_out();
        let mut set = recordset(vec![filtered]);
        let (prec, log) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        assert_eq!(prec.lower_node, 1);
        assert_eq!(prec.upper_node, 1);
        assert_eq!(prec.interpolation_value, 1.0);
        assert_eq!(prec.anchors_support, 0);
        assert!(log.contains("NUMREF\t0\t0"));
    }

    #[test]
    fn single_candidate_spans_to_root() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut rec = record("ry", 60.0, 90, 11);
        rec.query_start = 100;
        rec.query_stop = 200;
        let mut set = recordset(vec![rec]);
        let (prec, log) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        assert_eq!(prec.lower_node, 11);
        assert_eq!(prec.upper_node, 1);
        assert_eq!(prec.best_reference_taxon, 11);
        assert_eq!(prec.interpolation_value, 1.0);
        assert_eq!(prec.anchors_support, 90);
        assert_eq!((prec.qrstart, prec.qrstop), (100, 200));
        assert!(log.contains("NUMREF\t1\t1"));
    }

    #[test]
    fn two_identical_references_same_taxon() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut set = recordset(vec![
            record("rq1", 60.0, 30, 11),
            record("rq2", 60.0, 30, 11),
        ]);
        let (prec, log) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        assert_eq!(prec.best_reference_taxon, 11);
        assert_eq!(prec.lower_node, 11);
        // no outgroup exists, so nothing constrains the upper bound
        assert_eq!(prec.upper_node, 1);
        assert_eq!(prec.interpolation_value, 1.0);
        assert_eq!(prec.anchors_support, 30);
        // the second identical reference is resolved by the triangle
        // shortcut, no pairwise alignment is computed in pass 1
        assert!(log.contains("  PASS\t1"));
        assert!(!log.contains("+ALN 1 <=> 0"));
    }

    #[test]
    fn two_identical_references_sibling_taxa() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut set = recordset(vec![
            record("rq1", 60.0, 30, 11),
            record("rq2", 60.0, 30, 12),
        ]);
        let (prec, _) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        // both anchors are exact, so the best reference is their LCA
        assert_eq!(prec.best_reference_taxon, 10);
        assert_eq!(prec.lower_node, 10);
        assert_eq!(prec.upper_node, 1);
        assert_eq!(prec.interpolation_value, 1.0);
    }

    #[test]
    fn distant_record_is_filtered_then_single_candidate() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut set = recordset(vec![
            record("ry", 60.0, 28, 11),
            record("rz", 20.0, 20, 21),
        ]);
        let (prec, _) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        assert!(set.records[1].is_filtered());
        assert_eq!(prec.lower_node, 11);
        assert_eq!(prec.upper_node, 1);
        assert_eq!(prec.interpolation_value, 1.0);
    }

    #[test]
    fn close_sibling_joins_the_ingroup() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        // rw is stored reverse-complemented and aligned on the minus strand
        let mut w_rec = record("rw", 58.0, 27, 12);
        w_rec.reference_start = 30;
        w_rec.reference_stop = 1;
        let mut set = recordset(vec![record("ry", 60.0, 28, 11), w_rec]);
        let (prec, _) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        // anchor distance 2, sibling within it: lower bound is the genus
        assert_eq!(prec.best_reference_taxon, 11);
        assert_eq!(prec.lower_node, 10);
        assert_eq!(prec.upper_node, 1);
        assert_eq!(prec.interpolation_value, 1.0);
        assert_eq!(prec.anchors_support, 28);
    }

    #[test]
    fn true_outgroup_caps_the_upper_bound() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut set = recordset(vec![
            record("ry", 60.0, 28, 11),
            record("rz", 40.0, 20, 21),
        ]);
        let (prec, _) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        assert_eq!(prec.lower_node, 11);
        assert_eq!(prec.upper_node, 2);
        assert!(prec.interpolation_value > 0.0 && prec.interpolation_value < 1.0);
        assert_eq!(prec.best_reference_taxon, 11);
        // the upper bound must contain the lower bound
        let inter = TaxonomyInterface::new(&tax);
        assert!(inter.is_parent_of(prec.upper_node, prec.lower_node));
    }

    #[test]
    fn pass_two_extends_upper_bound_through_distant_anchor() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut w_rec = record("rw", 58.0, 27, 12);
        w_rec.reference_start = 30;
        w_rec.reference_stop = 1;
        let mut set = recordset(vec![
            record("ry", 60.0, 28, 11),
            w_rec,
            record("rz", 40.0, 20, 21),
            record("rv", 40.0, 20, 31),
        ]);
        let (prec, log) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        // pass 1 keeps only the shallowest outgroup candidate; pass 2 then
        // aligns the sentinel anchor against the query and discovers that
        // the archaeal reference sits within its band, pushing the upper
        // bound to the root
        assert_eq!(prec.lower_node, 10);
        assert_eq!(prec.upper_node, 1);
        assert!(prec.interpolation_value > 0.0 && prec.interpolation_value < 1.0);
        assert_eq!(prec.anchors_support, 28);
        assert!(log.contains("NUMREF\t4\t4"));
        assert!(log.contains("+ALN query <=> 2"));
        let inter = TaxonomyInterface::new(&tax);
        assert!(inter.is_parent_of(prec.upper_node, prec.lower_node));
    }

    #[test]
    fn placement_is_deterministic() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let records = vec![record("ry", 60.0, 28, 11), record("rz", 40.0, 20, 21)];

        let mut first = recordset(records.clone());
        let (prec_a, log_a) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut first);
        let mut second = recordset(records);
        let (prec_b, log_b) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut second);

        assert_eq!(prec_a.lower_node, prec_b.lower_node);
        assert_eq!(prec_a.upper_node, prec_b.upper_node);
        assert_eq!(prec_a.interpolation_value, prec_b.interpolation_value);
        assert_eq!(log_a, log_b);
    }

    #[test]
    fn lower_exclude_factor_keeps_more_records() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let records = vec![record("ry", 60.0, 28, 11), record("rz", 40.0, 20, 21)];

        let mut strict = recordset(records.clone());
        run(&tax, &qstore, &dbstore, 0.9, 0.1, &mut strict);
        let kept_strict = strict.records.iter().filter(|r| !r.is_filtered()).count();

        let mut lax = recordset(records);
        run(&tax, &qstore, &dbstore, 0.3, 0.1, &mut lax);
        let kept_lax = lax.records.iter().filter(|r| !r.is_filtered()).count();

        assert!(kept_lax >= kept_strict);
        assert_eq!(kept_strict, 1);
        assert_eq!(kept_lax, 2);
    }

    #[test]
    fn trace_carries_the_contractual_lines() {
        let tax = fixture_taxonomy();
        let (qstore, dbstore) = (query_store(), db_store());
        let mut set = recordset(vec![
            record("ry", 60.0, 28, 11),
            record("rz", 40.0, 20, 21),
        ]);
        let (_, log) = run(&tax, &qstore, &dbstore, 0.5, 0.1, &mut set);

        assert!(log.contains("NUMREF"));
        assert!(log.contains("  PASS\t0"));
        assert!(log.contains("  PASS\t1"));
        assert!(log.contains("  PASS\t2"));
        assert!(log.contains("NUMALN"));
        assert!(log.contains("    RANGE\tSpeciesA1\tSpeciesA1\tBacteria"));
        assert!(log.contains("STATS \"1:30@q1\""));
    }
}

