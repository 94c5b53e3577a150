//src/taxonomy/interface.rs

use super::tree::{TaxonNode, Taxonomy};

/// Read-only query layer over a frozen [`Taxonomy`].
///
/// All queries borrow the taxonomy immutably and are safe to run from many
/// threads at once. Taxids passed to the walk-based queries are expected to
/// come out of the taxonomy itself (e.g. resolved alignment records); an
/// unknown taxid degrades to the root, mirroring the root fallback of the
/// ancestor walk.
#[derive(Clone, Copy)]
pub struct TaxonomyInterface<'t> {
    tax: &'t Taxonomy,
}

impl<'t> TaxonomyInterface<'t> {
    pub fn new(tax: &'t Taxonomy) -> Self {
        Self { tax }
    }

    pub fn taxonomy(&self) -> &'t Taxonomy {
        self.tax
    }

    pub fn get_root(&self) -> u32 {
        self.tax.root_taxid()
    }

    pub fn get_node(&self, taxid: u32) -> Option<&'t TaxonNode> {
        self.tax.node(taxid)
    }

    /// Nested-set containment test: true iff `a` is `b` or an ancestor of
    /// `b`. O(1) via the interval bounds.
    pub fn is_parent_of(&self, a: u32, b: u32) -> bool {
        match (self.tax.node(a), self.tax.node(b)) {
            (Some(a), Some(b)) => contains(a, b),
            _ => false,
        }
    }

    /// Lowest common ancestor of two nodes: the deeper node walks upward
    /// until one interval-contains the other. O(depth).
    pub fn get_lca(&self, a: u32, b: u32) -> u32 {
        let root = self.tax.root_taxid();
        let mut a = match self.tax.node(a) {
            Some(n) => n,
            None => return root,
        };
        let mut b = match self.tax.node(b) {
            Some(n) => n,
            None => return root,
        };
        loop {
            if contains(a, b) {
                return a.taxid;
            }
            if contains(b, a) {
                return b.taxid;
            }
            if a.root_pathlength >= b.root_pathlength {
                a = match self.tax.node(a.parent) {
                    Some(n) => n,
                    None => return root,
                };
            } else {
                b = match self.tax.node(b.parent) {
                    Some(n) => n,
                    None => return root,
                };
            }
        }
    }

    /// Fold a set of nodes with pairwise LCA; the empty set yields the root.
    pub fn get_lca_all<I>(&self, taxids: I) -> u32
    where
        I: IntoIterator<Item = u32>,
    {
        let mut iter = taxids.into_iter();
        let mut acc = match iter.next() {
            Some(t) => t,
            None => return self.tax.root_taxid(),
        };
        for t in iter {
            acc = self.get_lca(acc, t);
        }
        acc
    }

    /// Edge counts `(up, down)` from `a` up to `LCA(a, b)` and from there
    /// down to `b`. `(0, 0)` for `a == b`.
    pub fn get_path_length(&self, a: u32, b: u32) -> (u32, u32) {
        if a == b {
            return (0, 0);
        }
        let lca = self.get_lca(a, b);
        let lca_depth = self.root_path_length(lca);
        let up = self.root_path_length(a).saturating_sub(lca_depth);
        let down = self.root_path_length(b).saturating_sub(lca_depth);
        (up, down)
    }

    /// Depth of a node; the root is 0.
    pub fn root_path_length(&self, taxid: u32) -> u32 {
        self.tax.node(taxid).map(|n| n.root_pathlength).unwrap_or(0)
    }
}

#[inline]
fn contains(a: &TaxonNode, b: &TaxonNode) -> bool {
    a.leftvalue <= b.leftvalue && a.rightvalue >= b.rightvalue
}
