// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # KinHarvest Fetch
//!
//! The authenticated scraping core: everything between a vendor account's
//! credentials and a harvested result set.
//!
//! - [`Transport`] / [`ReqwestTransport`] - cookie-jar HTTP seam
//! - [`token`] - anti-forgery token and embedded-payload extraction
//! - [`RetryPolicy`] - attempt classification with a fixed retry delay
//! - [`AuthSession`] - login/re-login and the single perform chokepoint
//! - [`ProfileContext`] - serialized server-side active-profile switching
//! - [`PageCollector`] - sequential paged listing collection
//! - [`BatchFetcher`] - bounded-parallelism fan-out with per-key accounting

pub mod batch;
pub mod error;
pub mod page;
pub mod profile;
pub mod retry;
pub mod session;
pub mod token;
pub mod transport;

pub use batch::{BatchFetcher, BatchResult, DEFAULT_PARALLELISM};
pub use error::{FetchError, TransportError};
pub use page::PageCollector;
pub use profile::{ProfileContext, ProfileScopedSession};
pub use retry::{AbortReason, AttemptOutcome, Decision, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use session::{AuthSession, LoginFlow, PerformRequest, SessionConfig, SessionState};
pub use token::{extract, TokenKind};
pub use transport::{ReqwestTransport, Transport, WireRequest, WireResponse, DEFAULT_TIMEOUT_SECS};
