/// Failure log sinks
///
/// Failures and retries are written to a [`LogSink`] under a key derived
/// from the database name, so each database gets its own log stream.
use chrono::Local;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Durable destination for failure messages. Implementations must not
/// fail the caller; write errors are theirs to handle.
pub trait LogSink: Send {
    /// Records a failure.
    fn write(&self, message: &str, key: &str);

    /// Records a recoverable event such as a retry. Sinks without levels
    /// treat it like any other line.
    fn notice(&self, message: &str, key: &str) {
        self.write(message, key);
    }
}

/// Builds the log key for a database: its name followed by the SHA-256 of
/// the password, so logs for different credentials stay apart without
/// recording the credential.
pub fn log_key(database: &str, password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    format!("{}{}", database, hex::encode(digest))
}

/// Forwards log lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn write(&self, message: &str, key: &str) {
        error!(target: "sqlrun::log", key = key, "{}", message);
    }

    fn notice(&self, message: &str, key: &str) {
        warn!(target: "sqlrun::log", key = key, "{}", message);
    }
}

/// Appends timestamped lines to `<dir>/<key>/<YYYY-MM-DD>.log`.
#[derive(Debug, Clone)]
pub struct FileLog {
    dir: PathBuf,
}

impl FileLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileLog { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that today's lines for `key` go to.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir
            .join(safe_key)
            .join(format!("{}.log", Local::now().format("%Y-%m-%d")))
    }

    fn append(&self, message: &str, key: &str) -> std::io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
    }
}

impl LogSink for FileLog {
    fn write(&self, message: &str, key: &str) {
        if let Err(e) = self.append(message, key) {
            warn!("Could not write failure log under {:?}: {}", self.dir, e);
        }
    }
}
