//! Shared error type for the portal pipeline: login, listing, download and disk writes.

use std::path::PathBuf;
use thiserror::Error;

/// Error for every stage of a run. All variants are fatal to the run.
#[derive(Debug, Error)]
pub enum FetchError {
    // Authentication
    #[error("Incorrect user credentials: the portal rejected the login.")]
    InvalidCredentials,

    #[error("Login succeeded but the portal did not send a session cookie.")]
    MissingSessionCookie,

    #[error("Could not find the student number on the portal home page.")]
    StudentNumberNotFound,

    // HTTP and network
    #[error("HTTP {status} when fetching: {url}")]
    RequestFailed {
        status: u16,
        url: String,
        /// What the request was for (e.g. "login", "listing Exames").
        context: Option<String>,
    },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Request to {url} timed out {attempts} times; giving up.")]
    TimeoutExhausted {
        url: String,
        attempts: u32,
        source: reqwest::Error,
    },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    // Scraping
    #[error("Could not parse a filename from document URL: {url}")]
    MalformedDocumentUrl { url: String },

    #[error("Invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: &'static str,
        source: regex::Error,
    },

    // Filesystem
    #[error("Cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    /// True for the login-stage failures (bad credentials, failed login request, no cookie).
    pub fn is_auth_failure(&self) -> bool {
        match self {
            FetchError::InvalidCredentials | FetchError::MissingSessionCookie => true,
            FetchError::RequestFailed { context, .. } => context.as_deref() == Some("login"),
            _ => false,
        }
    }

    /// True when the error came from the local filesystem rather than the portal.
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            FetchError::CreateDir { .. } | FetchError::WriteFailure { .. }
        )
    }
}
