//! Output rendering for harvested tables.

mod tsv;

pub use tsv::{write_raw, write_tsv};
