//! Domain models shared across the KinHarvest crates.

mod credentials;
mod descriptor;
mod record;

pub use credentials::Credentials;
pub use descriptor::{Method, ProfileId, RequestDescriptor, RequestScope};
pub use record::{record_from_object, Record, Table, MISSING};
