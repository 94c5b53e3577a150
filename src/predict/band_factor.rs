//src/predict/band_factor.rs

use std::collections::BTreeMap;

use crate::taxonomy::TaxonomyInterface;

const MIN_BANDFACTOR: f32 = 1.0;
const MAX_BANDFACTOR: f32 = i32::MAX as f32;

/// Accumulates `(score, taxon)` pairs seen while aligning references against
/// one anchor and derives the band factor: a multiplier >= 1 expressing how
/// far the scores stray from tree-monotone behaviour. Scores of candidates
/// whose LCA with the anchor sits deeper than an already-seen shallower rank
/// ("disorder") inflate the factor by their ratio to the shallower rank's
/// recorded score.
pub struct BandFactor<'t> {
    taxinter: TaxonomyInterface<'t>,
    /// `data[0]` is the anchor itself with score 0.
    data: Vec<(u32, u32)>,
    bandfactor: Option<f32>,
}

impl<'t> BandFactor<'t> {
    pub fn new(taxinter: TaxonomyInterface<'t>, reserve: usize) -> Self {
        Self {
            taxinter,
            data: Vec::with_capacity(reserve),
            bandfactor: None,
        }
    }

    pub fn add_sequence(&mut self, score: u32, node: u32) {
        self.data.push((score, node));
    }

    pub fn get_factor(&mut self) -> f32 {
        if self.bandfactor.is_none() {
            self.sort();
            self.set_band_factor();
        }
        self.bandfactor.expect("factor computed")
    }

    fn sort(&mut self) {
        // ascending by score; the anchor entry stays in front
        if self.data.len() > 2 {
            self.data[1..].sort_unstable_by_key(|&(score, _)| score);
        }
    }

    fn set_band_factor(&mut self) {
        let mut bandfactor = MIN_BANDFACTOR;
        let (anchor_score, anchor) = self.data[0];
        let mut worstscore_per_rank: BTreeMap<u32, u32> = BTreeMap::new();
        let mut last_rank = self.taxinter.root_path_length(anchor);
        worstscore_per_rank.insert(last_rank, anchor_score);

        for &(score, node) in &self.data[1..] {
            let lca = self.taxinter.get_lca(node, anchor);
            let rank = self.taxinter.root_path_length(lca);
            if rank == last_rank {
                // same depth as before, nothing to record
            } else if rank < last_rank {
                worstscore_per_rank.insert(rank, score);
                last_rank = rank;
            } else {
                // disorder: a deeper placement with a worse score than an
                // already recorded shallower one
                let mut r = rank - 1;
                loop {
                    if let Some(&refscore) = worstscore_per_rank.get(&r) {
                        if refscore != 0 {
                            bandfactor = bandfactor.max(score as f32 / refscore as f32);
                        }
                    }
                    if r == 0 {
                        break;
                    }
                    r -= 1;
                }
            }
        }
        self.bandfactor = Some(bandfactor.min(MAX_BANDFACTOR));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{Taxonomy, TaxonomyInterface};

    /// 1 root
    /// ├── 2 ── 10 ── 11, 12
    /// └── 3 ── 30 ── 31
    fn fixture() -> Taxonomy {
        let mut tax = Taxonomy::new(1);
        for (taxid, parent) in [(2, 1), (10, 2), (11, 10), (12, 10), (3, 1), (30, 3), (31, 30)] {
            tax.insert_node(taxid, parent).unwrap();
        }
        tax.reindex();
        tax
    }

    #[test]
    fn monotone_scores_give_factor_one() {
        let tax = fixture();
        let inter = TaxonomyInterface::new(&tax);
        let mut bf = BandFactor::new(inter, 4);
        bf.add_sequence(0, 11); // anchor at depth 3
        bf.add_sequence(1, 12); // LCA depth 2
        bf.add_sequence(5, 31); // LCA depth 0
        assert_eq!(bf.get_factor(), 1.0);
    }

    #[test]
    fn disorder_inflates_factor_by_score_ratio() {
        let tax = fixture();
        let inter = TaxonomyInterface::new(&tax);
        let mut bf = BandFactor::new(inter, 4);
        bf.add_sequence(0, 11); // anchor
        bf.add_sequence(2, 31); // LCA depth 0, score 2
        bf.add_sequence(8, 12); // LCA depth 2 with worse score: disorder
        // sorted walk sees (2, depth 0) then (8, depth 2); rank 1 and 0 are
        // checked, rank 0 recorded score 2 -> factor 8/2
        assert_eq!(bf.get_factor(), 4.0);
    }

    #[test]
    fn zero_reference_scores_do_not_divide() {
        let tax = fixture();
        let inter = TaxonomyInterface::new(&tax);
        let mut bf = BandFactor::new(inter, 3);
        bf.add_sequence(0, 11);
        bf.add_sequence(0, 31); // records score 0 at rank 0
        bf.add_sequence(7, 12); // disorder against rank 0, but refscore is 0
        assert_eq!(bf.get_factor(), 1.0);
    }

    #[test]
    fn factor_is_cached_after_first_computation() {
        let tax = fixture();
        let inter = TaxonomyInterface::new(&tax);
        let mut bf = BandFactor::new(inter, 2);
        bf.add_sequence(0, 11);
        bf.add_sequence(3, 12);
        let first = bf.get_factor();
        assert_eq!(first, bf.get_factor());
    }
}
