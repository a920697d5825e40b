//! 23andMe portal integration.
//!
//! The portal authenticates with a CSRF two-step form login, keeps the
//! active profile as server-side session state, and serves a rate-limit
//! soft block as an HTTP-200 body. [`endpoints`] captures the URLs and
//! session wiring, [`parser`] the response shapes, and
//! [`TwentyThreeHarvester`] the account walk.

pub mod endpoints;
pub mod harvest;
pub mod parser;

pub use harvest::{AccountHarvest, ProfileHarvest, TwentyThreeHarvester};
pub use parser::IbdPair;
