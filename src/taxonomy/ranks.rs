//src/taxonomy/ranks.rs

use ahash::AHashMap;
use std::collections::VecDeque;

use super::tree::Taxonomy;

/// The canonical NCBI rank ladder, shallowest first. After normalization a
/// node at `default_ranks()[i]` reports `root_pathlength == i + 1`.
pub fn default_ranks() -> Vec<String> {
    [
        "superkingdom",
        "phylum",
        "class",
        "order",
        "family",
        "genus",
        "species",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Taxonomy {
    /// Set the normalization mark on every node whose rank appears in
    /// `ranks`. The root is always marked.
    pub fn mark_ranks(&mut self, ranks: &[String]) {
        let rank_set: ahash::AHashSet<&str> = ranks.iter().map(|r| r.as_str()).collect();
        let root = self.root_taxid();
        let taxids: Vec<u32> = self.iter().map(|n| n.taxid).collect();
        for taxid in taxids {
            let node = self.node_mut(taxid).expect("indexed node");
            node.mark = taxid == root
                || node
                    .annotation
                    .as_ref()
                    .map(|a| rank_set.contains(a.rank.as_str()))
                    .unwrap_or(false);
        }
    }

    /// Delete every unmarked node, attaching each surviving child to its
    /// nearest marked ancestor. The root is never deleted. Nested-set
    /// intervals keep their values: containment still holds, contiguity
    /// does not.
    pub fn delete_unmarked_nodes(&mut self) {
        let root = self.root_taxid();

        // Resolve every kept node's nearest marked ancestor in one pass.
        let mut kept: Vec<(u32, u32)> = Vec::new();
        let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
        queue.push_back((root, root));
        while let Some((taxid, nearest_marked)) = queue.pop_front() {
            let node = self.node(taxid).expect("indexed node");
            let next_anchor = if node.mark {
                if taxid != root {
                    kept.push((taxid, nearest_marked));
                }
                taxid
            } else {
                nearest_marked
            };
            for &child in &node.children {
                queue.push_back((child, next_anchor));
            }
        }

        let deleted = self.index_size() - kept.len() - 1;
        let taxids: Vec<u32> = self.iter().map(|n| n.taxid).collect();
        for taxid in taxids {
            if taxid == root {
                self.node_mut(taxid).expect("root").children.clear();
                continue;
            }
            let mark = self.node(taxid).map(|n| n.mark).unwrap_or(false);
            if mark {
                self.node_mut(taxid).expect("kept node").children.clear();
            } else {
                // children are re-attached through the kept list below
                self.node_mut(taxid).expect("doomed node").children.clear();
                self.remove_node_reparent(taxid, root);
            }
        }
        for &(taxid, parent) in &kept {
            self.node_mut(taxid).expect("kept node").parent = parent;
            self.node_mut(parent).expect("kept parent").children.push(taxid);
        }
        log::info!("rank normalization removed {deleted} nodes");
    }

    /// Rewrite `root_pathlength` so that every node with a canonical rank
    /// reports that rank's 1-based position in `ranks` as its depth; nodes
    /// without a canonical rank sit one edge below their parent.
    pub fn set_rank_distances(&mut self, ranks: &[String]) {
        let rank_depth: AHashMap<&str, u32> = ranks
            .iter()
            .enumerate()
            .map(|(i, r)| (r.as_str(), i as u32 + 1))
            .collect();

        let root = self.root_taxid();
        let mut queue: VecDeque<u32> = VecDeque::new();
        self.node_mut(root).expect("root").root_pathlength = 0;
        queue.push_back(root);
        while let Some(taxid) = queue.pop_front() {
            let (depth, children) = {
                let node = self.node(taxid).expect("indexed node");
                (node.root_pathlength, node.children.clone())
            };
            for child in children {
                let child_node = self.node_mut(child).expect("indexed child");
                let canonical = child_node
                    .annotation
                    .as_ref()
                    .and_then(|a| rank_depth.get(a.rank.as_str()).copied());
                child_node.root_pathlength = canonical.unwrap_or(depth + 1);
                queue.push_back(child);
            }
        }
    }

    /// Run the full normalization sequence: mark, delete, re-assign depths.
    pub fn normalize_ranks(&mut self, ranks: &[String]) {
        self.mark_ranks(ranks);
        self.delete_unmarked_nodes();
        self.set_rank_distances(ranks);
    }

}
