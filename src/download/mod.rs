//! Download dispatch. Decides skip-vs-fetch per document and hands each fetched body to its own
//! writer thread. Writers from every category are collected in one [`DownloadSet`] that the caller
//! drains before the run ends.
//!
//! Writers are unbounded (one thread per file). Listings hold tens of documents; a listing in the
//! thousands would need a bounded pool instead.

pub mod writer;

pub use writer::{already_present, ensure_dir, persist};

use crate::model::{Category, DocumentRef, Session};
use crate::scraper::{FetchError, PortalClient};
use std::collections::HashSet;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Progress of one category, reported after each document is skipped or dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryProgress<'a> {
    pub category: &'a Category,
    /// 1-based position of the category in the run.
    pub position: usize,
    /// Documents handled so far in this category.
    pub done: usize,
    pub total: usize,
    /// Downloads started so far in this category.
    pub new_files: usize,
    /// Whether the last document was skipped because it already exists.
    pub skipped: bool,
}

/// Outcome of dispatching one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryReport {
    pub listed: usize,
    pub skipped: usize,
    pub dispatched: usize,
}

struct PendingWrite {
    path: PathBuf,
    handle: JoinHandle<Result<PathBuf, FetchError>>,
}

/// Writer threads that have been started and not yet joined.
#[derive(Default)]
pub struct DownloadSet {
    pending: Vec<PendingWrite>,
    written: usize,
}

impl DownloadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writers started and not yet joined.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Start a writer thread that streams `body` into `dir/filename`.
    pub fn spawn<R>(&mut self, body: R, dir: PathBuf, filename: String) -> Result<(), FetchError>
    where
        R: Read + Send + 'static,
    {
        let path = dir.join(&filename);
        let handle = thread::Builder::new()
            .name(format!("write-{}", filename))
            .spawn(move || persist(body, &dir, &filename))
            .map_err(|source| FetchError::WriteFailure {
                path: path.clone(),
                source,
            })?;
        self.pending.push(PendingWrite { path, handle });
        Ok(())
    }

    /// Join writers that have already finished. Returns the first failure among them; unfinished
    /// writers stay pending.
    pub fn check(&mut self) -> Result<(), FetchError> {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.handle.is_finished());
        self.pending = running;
        let mut first_err = None;
        for pending in finished {
            if let Err(e) = self.join(pending) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Wait for every writer. Returns the number of files written during the run, or the first
    /// failure once all writers have stopped.
    pub fn drain(mut self) -> Result<usize, FetchError> {
        let mut first_err = None;
        for pending in std::mem::take(&mut self.pending) {
            if let Err(e) = self.join(pending) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(self.written),
        }
    }

    /// Wait for in-flight writers after `err` stopped the run, then hand `err` back.
    pub fn abandon(self, err: FetchError) -> FetchError {
        if self.outstanding() > 0 {
            warn!(
                outstanding = self.outstanding(),
                "waiting for in-flight downloads before stopping"
            );
        }
        if let Err(other) = self.drain() {
            warn!(error = %other, "download also failed while stopping");
        }
        err
    }

    fn join(&mut self, pending: PendingWrite) -> Result<(), FetchError> {
        match pending.handle.join() {
            Ok(Ok(path)) => {
                self.written += 1;
                debug!(path = %path.display(), "file written");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::WriteFailure {
                path: pending.path,
                source: io::Error::new(io::ErrorKind::Other, "writer thread panicked"),
            }),
        }
    }
}

/// Fetch every document of `category` that is not yet in `destination` and queue its writer.
///
/// Documents already on disk are skipped without a request. Two links with the same filename are
/// fetched once. The writers are added to `downloads`; this function does not wait for them.
#[allow(clippy::too_many_arguments)]
pub fn download_category(
    client: &PortalClient,
    session: &Session,
    category: &Category,
    position: usize,
    documents: &[DocumentRef],
    destination: &Path,
    downloads: &mut DownloadSet,
    progress: Option<&dyn Fn(&CategoryProgress<'_>)>,
) -> Result<CategoryReport, FetchError> {
    let mut report = CategoryReport {
        listed: documents.len(),
        ..CategoryReport::default()
    };
    let mut claimed: HashSet<&str> = HashSet::new();

    for (i, doc) in documents.iter().enumerate() {
        let skipped = !claimed.insert(doc.filename.as_str())
            || already_present(destination, &doc.filename);
        if skipped {
            debug!(category = category.name, file = %doc.filename, "already present, skipping");
            report.skipped += 1;
        } else {
            let url = client.url_for(&doc.path);
            let response = client.download(&url, session)?;
            downloads.spawn(response, destination.to_path_buf(), doc.filename.clone())?;
            report.dispatched += 1;
            info!(category = category.name, file = %doc.filename, "downloading");
        }
        if let Some(cb) = progress {
            cb(&CategoryProgress {
                category,
                position,
                done: i + 1,
                total: documents.len(),
                new_files: report.dispatched,
                skipped,
            });
        }
    }
    Ok(report)
}
