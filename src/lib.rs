//! clipfetch: log into the CLIP portal and download a course's documents by category.

pub mod cli;
pub mod config;
pub mod download;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod scraper;

#[cfg(test)]
mod test_support;

// Re-exports for CLI and consumers.
pub use download::{download_category, persist, CategoryProgress, CategoryReport, DownloadSet};
pub use model::{Category, CourseSelector, Credentials, DocumentRef, Session, CATEGORIES};
pub use pipeline::{sync_course, RunObserver, RunSummary};
pub use scraper::{
    authenticate, discover_student_number, list_documents, FetchError, PortalClient,
    PortalClientBuilder,
};
