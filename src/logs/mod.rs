//! Log file management
//!
//! The node writes its log to a single file sink, `<logs dir>/main.log`. The
//! sink is owned by a [`LogFileManager`] handle that is passed explicitly to
//! whoever needs it: the orchestrator switches it on before deploying a unit
//! that exposes logging endpoints, the serving unit reads and exports it, and
//! the global tracing subscriber writes through [`LogFileManager::make_writer`].
//!
//! One launch at a time is assumed to drive a manager; concurrent launches
//! against the same manager must be serialized by the caller.

pub mod format;
pub mod tail;

pub use format::{abbreviate_target, LinePattern, SinkWriter};
pub use tail::{read_tail, LINE_SEPARATOR};

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Environment variable overriding the logs directory
pub const LOG_DIR_ENV: &str = "KONDUIT_SERVING_LOG_DIR";

/// File name of the active log
pub const LOG_FILE_NAME: &str = "main.log";

/// File name of the export archive
pub const ZIP_FILE_NAME: &str = "logs.zip";

/// Name of the file sink
pub const SINK_NAME: &str = "FILE";

/// Errors from log file operations
#[derive(Error, Debug)]
pub enum LogError {
    #[error("The path specified by {source_name}={path} doesn't exist or is an invalid directory.")]
    InvalidDirectory { source_name: String, path: PathBuf },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Number of lines to read must be positive")]
    InvalidLineCount,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// What `ensure_file_sink` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkChange {
    /// A sink at the target path was already active
    Unchanged,
    /// No sink was active; one was created
    Attached,
    /// A sink at another path was detached and replaced
    Replaced,
}

/// The active file sink
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    pub(crate) file: File,
}

impl LogSink {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn name(&self) -> &'static str {
        SINK_NAME
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) type SinkSlot = Arc<Mutex<Option<LogSink>>>;

pub(crate) fn lock_slot(slot: &SinkSlot) -> MutexGuard<'_, Option<LogSink>> {
    // A panic while holding the lock leaves the sink itself intact.
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to the node's single log sink. Clones share the same sink.
#[derive(Debug, Clone, Default)]
pub struct LogFileManager {
    slot: SinkSlot,
    logs_dir: Option<PathBuf>,
}

impl LogFileManager {
    /// A manager that resolves its directory from `KONDUIT_SERVING_LOG_DIR`
    /// or the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with an explicit logs directory, taking the place of the
    /// environment override.
    pub fn with_logs_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            slot: SinkSlot::default(),
            logs_dir: Some(dir.into()),
        }
    }

    /// Directory holding `main.log` and `logs.zip`
    pub fn logs_dir(&self) -> Result<PathBuf, LogError> {
        match &self.logs_dir {
            Some(dir) => validate_directory(dir, "logs directory"),
            None => resolve_logs_dir(std::env::var(LOG_DIR_ENV).ok(), std::env::current_dir()),
        }
    }

    /// Path of the active sink, if one was ever configured
    pub fn active_log_file(&self) -> Option<PathBuf> {
        lock_slot(&self.slot)
            .as_ref()
            .map(|sink| sink.path.clone())
    }

    /// Point the sink at `<logs dir>/main.log`. Idempotent for an unchanged
    /// path; otherwise the previous sink is detached before the new one is
    /// attached.
    pub fn ensure_file_sink(&self) -> Result<SinkChange, LogError> {
        let target = self.logs_dir()?.join(LOG_FILE_NAME);

        if self.active_log_file().as_deref() == Some(target.as_path()) {
            return Ok(SinkChange::Unchanged);
        }

        let sink = LogSink::open(target.clone())?;

        // Nothing may log while the slot is locked: the writer takes the same lock.
        let previous = lock_slot(&self.slot).replace(sink);

        let change = match previous {
            Some(old) => {
                debug!("Detached {} sink at {}", SINK_NAME, old.path.display());
                SinkChange::Replaced
            }
            None => SinkChange::Attached,
        };
        info!("Logging to {}", target.display());
        Ok(change)
    }

    /// Detach the active sink, if any
    pub fn detach(&self) -> Option<PathBuf> {
        let previous = lock_slot(&self.slot).take();
        previous.map(|sink| sink.path)
    }

    /// Writer for a tracing fmt layer that follows sink switches
    pub fn make_writer(&self) -> SinkWriter {
        SinkWriter::new(Arc::clone(&self.slot))
    }

    /// The fixed event format used for the log file
    pub fn line_pattern(&self) -> LinePattern {
        LinePattern::default()
    }

    /// Contents of the active log: the last `lines` lines when positive, the
    /// whole file otherwise. Empty when no log file exists.
    pub fn get_all_logs(&self, lines: i64) -> Result<String, LogError> {
        let path = match self.active_log_file() {
            Some(path) if path.exists() => path,
            _ => return Ok(String::new()),
        };

        if lines > 0 {
            read_tail(&path, lines as usize)
        } else {
            Ok(String::from_utf8_lossy(&std::fs::read(&path)?).into_owned())
        }
    }

    /// Bundle the active log into `<logs dir>/logs.zip`, replacing any
    /// previous archive.
    pub fn export_zip(&self) -> Result<PathBuf, LogError> {
        let log_file = self
            .active_log_file()
            .ok_or_else(|| LogError::NotFound("No logs file found!".to_string()))?;

        let zip_path = self.logs_dir()?.join(ZIP_FILE_NAME);
        let entry_name = log_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| LOG_FILE_NAME.to_string());

        let mut input = File::open(&log_file)?;
        let mut zip = ZipWriter::new(File::create(&zip_path)?);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file(entry_name, options)?;
        io::copy(&mut input, &mut zip)?;
        zip.finish()?;

        debug!("Exported {} to {}", log_file.display(), zip_path.display());
        Ok(zip_path)
    }
}

// ============================================================================
// Directory resolution
// ============================================================================

/// Pick the logs directory from an environment override or the working
/// directory. An empty override counts as unset; a relative override is
/// taken from the working directory. Either way the result is absolute and
/// must be an existing directory.
pub fn resolve_logs_dir(
    env_value: Option<String>,
    working_dir: io::Result<PathBuf>,
) -> Result<PathBuf, LogError> {
    match env_value.filter(|value| !value.is_empty()) {
        Some(value) => {
            let dir = PathBuf::from(value);
            let dir = if dir.is_absolute() {
                dir
            } else {
                working_dir?.join(dir)
            };
            validate_directory(&dir, LOG_DIR_ENV)
        }
        None => validate_directory(&working_dir?, "working directory"),
    }
}

fn validate_directory(dir: &Path, source_name: &str) -> Result<PathBuf, LogError> {
    if dir.is_dir() {
        Ok(dir.to_path_buf())
    } else {
        Err(LogError::InvalidDirectory {
            source_name: source_name.to_string(),
            path: dir.to_path_buf(),
        })
    }
}
