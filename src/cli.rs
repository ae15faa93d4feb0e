//! CLI parsing and orchestration. Loads config, logs in, syncs one course, maps errors to exit
//! codes.

use crate::config::{self, ConfigError, UserRecord};
use crate::download::CategoryProgress;
use crate::model::{Category, CourseSelector, CATEGORIES};
use crate::pipeline::{sync_course, RunObserver};
use crate::scraper::{authenticate, discover_student_number, FetchError, PortalClient};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Width of the category column in progress output (longest category name plus one).
const NAME_COLUMN: usize = 20;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to create HTTP client: {0}")]
    ClientSetup(reqwest::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Config(_) => 2,
            CliRunError::Fetch(e) if e.is_filesystem() => 4,
            CliRunError::Fetch(_) | CliRunError::ClientSetup(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "clipfetch")]
#[command(about = "Download a course's documents from the CLIP portal, skipping files already on disk")]
#[command(
    after_help = "Settings file keys (portal_url, user_agent, timeout_secs, timeout_retries, config_dir, files_dir) are read from ./clipfetch.toml or ~/.config/clipfetch/config.toml. CLI flags override settings."
)]
pub struct Args {
    /// Course identifier, as keyed in classes.json (e.g. ia).
    pub course: String,

    /// Two-digit academic year (e.g. 22 for 2022).
    #[arg(value_parser = parse_year)]
    pub year: u32,

    /// Directory holding user.json and classes.json. Default: ./config.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory for downloaded files. Default: current directory.
    #[arg(long)]
    pub files: Option<PathBuf>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Log each request and print the error chain on failure.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_year(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if s.is_empty() || s.len() > 2 || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!(
            "Invalid year: '{}'. Use two digits, e.g. 22 for 2022.",
            s
        ));
    }
    let yy: u32 = s
        .parse()
        .map_err(|_| format!("Invalid year: '{}'.", s))?;
    Ok(2000 + yy)
}

/// Progress line prefix: category name padded to a fixed column, then `[i/8]`.
fn progress_prefix(category: &Category, position: usize) -> String {
    format!(
        "{:<width$}[{}/{}]",
        category.name,
        position,
        CATEGORIES.len(),
        width = NAME_COLUMN
    )
}

/// Renders one indicatif bar per category.
struct ProgressView {
    current: RefCell<Option<(usize, indicatif::ProgressBar)>>,
}

impl ProgressView {
    fn new() -> Self {
        ProgressView {
            current: RefCell::new(None),
        }
    }

    fn empty(&self, category: &Category, position: usize) {
        eprintln!("{} (no files)", progress_prefix(category, position));
    }

    fn update(&self, p: &CategoryProgress<'_>) {
        let mut current = self.current.borrow_mut();
        let stale = current.as_ref().map_or(true, |(pos, _)| *pos != p.position);
        if stale {
            if let Some((_, old)) = current.take() {
                old.finish();
            }
            let bar = indicatif::ProgressBar::new(p.total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{prefix} [{bar:20}] {percent:>3}% ({msg})")
            {
                bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
            }
            bar.set_prefix(progress_prefix(p.category, p.position));
            *current = Some((p.position, bar));
        }
        if let Some((_, bar)) = current.as_ref() {
            bar.set_position(p.done as u64);
            bar.set_message(format!("{} new files", p.new_files));
            if p.done == p.total {
                bar.finish();
            }
        }
    }

    fn clear(&self) {
        if let Some((_, bar)) = self.current.borrow_mut().take() {
            bar.finish();
        }
    }
}

fn build_client(settings: Option<&config::Settings>) -> Result<PortalClient, CliRunError> {
    let mut builder = PortalClient::builder();
    if let Some(s) = settings {
        if let Some(url) = &s.portal_url {
            builder = builder.base_url(url.clone());
        }
        if let Some(ua) = &s.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        if let Some(secs) = s.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(n) = s.timeout_retries {
            builder = builder.timeout_retries(n);
        }
    }
    builder.build().map_err(CliRunError::ClientSetup)
}

/// Student number from user.json, or looked up on the portal and saved back.
fn resolve_student_number(
    client: &PortalClient,
    session: &crate::model::Session,
    user: &mut UserRecord,
    config_dir: &Path,
) -> Result<u64, CliRunError> {
    if let Some(n) = user.known_number() {
        return Ok(n);
    }
    info!("student number unknown, looking it up");
    let number = discover_student_number(client, session)?;
    user.number = i64::try_from(number)
        .map_err(|_| CliRunError::InvalidInput(format!("Student number {} out of range", number)))?;
    config::save_user(config_dir, user)?;
    Ok(number)
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let settings = config::load_settings()?;
    let config_dir = args
        .config
        .clone()
        .or_else(|| settings.as_ref().and_then(|s| s.config_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("config"));
    let files_dir = args
        .files
        .clone()
        .or_else(|| settings.as_ref().and_then(|s| s.files_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut user = config::load_user(&config_dir)?;
    let classes = config::load_classes(&config_dir)?;
    let class = config::find_class(&classes, &args.course)?;

    let client = build_client(settings.as_ref())?;
    let session = authenticate(&client, &user.credentials())?;
    let number = resolve_student_number(&client, &session, &mut user, &config_dir)?;

    let course = CourseSelector {
        semester: class.semester,
        course_code: class.code,
        academic_year: args.year,
        enrollment_number: number,
    };
    let course_dir = files_dir.join(&args.course);
    info!(course = %args.course, year = args.year, dir = %course_dir.display(), "syncing course");

    let view = ProgressView::new();
    let on_empty = |c: &Category, pos: usize| view.empty(c, pos);
    let on_progress = |p: &CategoryProgress<'_>| view.update(p);
    let observer = if args.quiet {
        RunObserver::silent()
    } else {
        RunObserver {
            on_empty: Some(&on_empty),
            on_progress: Some(&on_progress),
        }
    };

    let result = sync_course(&client, &session, &course, &course_dir, &observer);
    view.clear();
    let summary = result?;

    if !args.quiet {
        eprintln!(
            "{} new files, {} already present, in {}",
            summary.written,
            summary.skipped,
            course_dir.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_year_two_digits() {
        assert_eq!(parse_year("22").unwrap(), 2022);
        assert_eq!(parse_year("09").unwrap(), 2009);
        assert_eq!(parse_year(" 5 ").unwrap(), 2005);
    }

    #[test]
    fn parse_year_rejects_bad_input() {
        assert!(parse_year("2022").is_err());
        assert!(parse_year("ab").is_err());
        assert!(parse_year("").is_err());
        assert!(parse_year("-1").is_err());
    }

    #[test]
    fn positional_arguments_are_required_and_bounded() {
        assert!(Args::try_parse_from(["clipfetch", "ia"]).is_err());
        assert!(Args::try_parse_from(["clipfetch", "ia", "22", "extra"]).is_err());
        let args = Args::try_parse_from(["clipfetch", "--files", "out", "ia", "22"]).unwrap();
        assert_eq!(args.course, "ia");
        assert_eq!(args.year, 2022);
        assert_eq!(args.files.as_deref(), Some(Path::new("out")));
        assert!(args.config.is_none());
    }

    #[test]
    fn progress_prefix_pads_names() {
        assert_eq!(
            progress_prefix(&CATEGORIES[4], 5),
            "Exames              [5/8]"
        );
        assert_eq!(
            progress_prefix(&CATEGORIES[0], 1),
            "Material-multimédia [1/8]"
        );
    }

    #[test]
    fn client_setup_failure_is_a_network_error() {
        let settings = config::Settings {
            user_agent: Some("bad\nagent".into()),
            ..config::Settings::default()
        };
        match build_client(Some(&settings)) {
            Err(e @ CliRunError::ClientSetup(_)) => assert_eq!(e.exit_code(), 3),
            other => panic!("expected ClientSetup, got {:?}", other.map(|c| c.base_url().to_string())),
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Config(ConfigError::UnknownCourse { name: "x".into() }).exit_code(),
            2
        );
        assert_eq!(CliRunError::Fetch(FetchError::InvalidCredentials).exit_code(), 3);
        assert_eq!(
            CliRunError::Fetch(FetchError::WriteFailure {
                path: PathBuf::from("a"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "x"),
            })
            .exit_code(),
            4
        );
    }
}
