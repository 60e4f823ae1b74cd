pub mod fasta;
pub mod paf;
pub mod screen;
pub mod taxonomy;

pub use paf::PafRecord;
pub use screen::ScreenRow;
pub use taxonomy::{Rank, TaxonomyStore};
