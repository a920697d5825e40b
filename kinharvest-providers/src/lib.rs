// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # KinHarvest Providers
//!
//! Vendor portal integrations built on the fetch core. Each provider
//! module contributes its endpoint descriptors, response parsers, session
//! wiring, and a harvest driver that walks a whole account into tables.

pub mod ancestry;
pub mod twentythree;
