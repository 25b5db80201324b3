//! Best-effort append-only log of every emitted SSE unit.
//!
//! Write failures are swallowed entirely; the debug log must never affect
//! the primary stream.

use parking_lot::Mutex;
use roundscope_core::EmittedEvent;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only file of formatted SSE units, one blank-line-separated block
/// per event.
pub struct DebugLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl DebugLog {
    /// Open (or create) the log for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Append one event. Best-effort: failures are logged at debug level
    /// and otherwise ignored.
    pub fn append(&self, event: &EmittedEvent) {
        let mut file = self.file.lock();
        if let Err(error) = file.write_all(event.to_sse().as_bytes()) {
            debug!(path = %self.path.display(), %error, "debug log write failed");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_appends_sse_units() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.log");
        let log = DebugLog::open(&path).unwrap();

        log.append(&EmittedEvent {
            eid: 1,
            json: "{\"eid\":1}".to_string(),
        });
        log.append(&EmittedEvent {
            eid: 2,
            json: "{\"eid\":2}".to_string(),
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "id: 1\ndata: {\"eid\":1}\n\nid: 2\ndata: {\"eid\":2}\n\n"
        );
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.log");
        {
            let log = DebugLog::open(&path).unwrap();
            log.append(&EmittedEvent {
                eid: 1,
                json: "{}".to_string(),
            });
        }
        {
            let log = DebugLog::open(&path).unwrap();
            log.append(&EmittedEvent {
                eid: 2,
                json: "{}".to_string(),
            });
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("id: ").count(), 2);
    }
}
