// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # KinHarvest Core
//!
//! Core types and models for the KinHarvest harvester.
//!
//! This crate provides the foundational abstractions used across the other
//! KinHarvest crates:
//!
//! - [`Credentials`] - vendor account credentials (password redacted in Debug)
//! - [`RequestDescriptor`] / [`RequestScope`] - immutable per-request descriptions
//! - [`ProfileId`] - opaque managed sub-profile identity
//! - [`Record`] / [`Table`] - row-tabular harvest output for the TSV sink
//! - [`ParseError`] - fatal markup-shape errors

pub mod error;
pub mod models;

pub use error::ParseError;
pub use models::{
    record_from_object, Credentials, Method, ProfileId, Record, RequestDescriptor, RequestScope,
    Table, MISSING,
};
