//! One course run: list every category in order, dispatch downloads, then wait for all writers.
//!
//! The session must already exist (see [`crate::scraper::authenticate`]). The first error of any
//! kind stops the run: no further categories are listed, in-flight writers are joined, and the
//! error is returned.

use crate::download::{download_category, ensure_dir, CategoryProgress, DownloadSet};
use crate::model::{Category, CourseSelector, Session, CATEGORIES};
use crate::scraper::{list_documents, FetchError, PortalClient};
use std::path::Path;
use tracing::info;

/// What a completed run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub listed: usize,
    pub skipped: usize,
    pub written: usize,
}

/// Callbacks for per-category progress output.
pub struct RunObserver<'a> {
    /// Called once for a category whose listing is empty (category, 1-based position).
    pub on_empty: Option<&'a dyn Fn(&Category, usize)>,
    /// Called after each document of a non-empty category.
    pub on_progress: Option<&'a dyn Fn(&CategoryProgress<'_>)>,
}

impl RunObserver<'_> {
    pub fn silent() -> Self {
        RunObserver {
            on_empty: None,
            on_progress: None,
        }
    }
}

/// Download every new document of `course` into `course_dir/<category>/`.
pub fn sync_course(
    client: &PortalClient,
    session: &Session,
    course: &CourseSelector,
    course_dir: &Path,
    observer: &RunObserver<'_>,
) -> Result<RunSummary, FetchError> {
    ensure_dir(course_dir)?;
    let mut downloads = DownloadSet::new();
    match sync_categories(client, session, course, course_dir, observer, &mut downloads) {
        Ok(mut summary) => {
            summary.written = downloads.drain()?;
            info!(
                listed = summary.listed,
                skipped = summary.skipped,
                written = summary.written,
                "course up to date"
            );
            Ok(summary)
        }
        Err(e) => Err(downloads.abandon(e)),
    }
}

fn sync_categories(
    client: &PortalClient,
    session: &Session,
    course: &CourseSelector,
    course_dir: &Path,
    observer: &RunObserver<'_>,
    downloads: &mut DownloadSet,
) -> Result<RunSummary, FetchError> {
    let mut summary = RunSummary::default();
    for (i, category) in CATEGORIES.iter().enumerate() {
        downloads.check()?;
        let position = i + 1;

        let documents = list_documents(client, session, course, category)?;
        summary.listed += documents.len();
        if documents.is_empty() {
            if let Some(cb) = observer.on_empty {
                cb(category, position);
            }
            continue;
        }

        let dir = course_dir.join(category.name);
        ensure_dir(&dir)?;
        let report = download_category(
            client,
            session,
            category,
            position,
            &documents,
            &dir,
            downloads,
            observer.on_progress,
        )?;
        summary.skipped += report.skipped;
    }
    Ok(summary)
}
