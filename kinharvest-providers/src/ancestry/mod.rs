//! AncestryDNA portal integration.
//!
//! The portal authenticates with a plain form POST, signals overload and
//! stale sessions with real HTTP statuses, and pages its match listings
//! until an empty group list. [`endpoints`] captures the URLs and session
//! wiring, [`parser`] the response shapes, and [`AncestryHarvester`] the
//! account walk.

pub mod endpoints;
pub mod harvest;
pub mod parser;

pub use endpoints::Endpoints;
pub use harvest::{AncestryHarvest, AncestryHarvester, TestHarvest};
