//! Disk side of a download: create the category directory and stream a body into a file.

use crate::scraper::FetchError;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Mode applied to created directories. Set again after creation since the umask masks it.
pub const DIR_MODE: u32 = 0o777;

/// Create `dir` and its parents if missing, then apply [`DIR_MODE`].
pub fn ensure_dir(dir: &Path) -> Result<(), FetchError> {
    let create_err = |source| FetchError::CreateDir {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(create_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_MODE)).map_err(create_err)?;
    }
    Ok(())
}

/// Whether `dir/filename` is already on disk. Anything but "not found" counts as present, so an
/// unreadable entry is never overwritten.
pub fn already_present(dir: &Path, filename: &str) -> bool {
    match fs::symlink_metadata(dir.join(filename)) {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

/// Stream `body` into `dir/filename`, creating `dir` first. Returns the written path.
///
/// The file is created by full path; both the body and the file are dropped on every exit path.
/// A failed copy leaves the partial file in place.
pub fn persist<R: Read>(mut body: R, dir: &Path, filename: &str) -> Result<PathBuf, FetchError> {
    ensure_dir(dir)?;
    let path = dir.join(filename);
    let write_err = |source| FetchError::WriteFailure {
        path: path.clone(),
        source,
    };
    let mut file = File::create(&path).map_err(write_err)?;
    io::copy(&mut body, &mut file).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    Ok(path)
}
