pub mod interface;
pub mod ranks;
pub mod tree;

pub use interface::TaxonomyInterface;
pub use ranks::default_ranks;
pub use tree::{TaxonAnnotation, TaxonNode, Taxonomy};
