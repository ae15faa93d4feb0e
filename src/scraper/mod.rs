//! Portal access: HTTP client with timeout retries, login, and category listings.

mod client;
mod error;

pub mod auth;
pub mod listing;

pub use auth::{authenticate, discover_student_number};
pub use client::{
    retry_on_timeout, PortalClient, PortalClientBuilder, RetryFailure, DEFAULT_PORTAL_URL,
    DEFAULT_TIMEOUT_RETRIES,
};
pub use error::FetchError;
pub use listing::{extract_documents, list_documents, listing_url};

use regex::Regex;

/// Compile one of the crate's fixed patterns, reporting failure as an error instead of panicking.
pub(crate) fn compile(pattern: &'static str) -> Result<Regex, FetchError> {
    Regex::new(pattern).map_err(|source| FetchError::Pattern { pattern, source })
}

/// [`compile`] for patterns matched against undecoded page bytes.
pub(crate) fn compile_bytes(pattern: &'static str) -> Result<regex::bytes::Regex, FetchError> {
    regex::bytes::Regex::new(pattern).map_err(|source| FetchError::Pattern { pattern, source })
}
