use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Side channel for upload events. Every hook defaults to a no-op.
pub trait UploadLogger: Send + Sync {
    fn opened(&self, _path: &Path) {}
    fn finished(&self, _path: &Path, _bytes: u64, _chunks: u64) {}
    fn webhook_failed(&self, _path: &Path, _chunk_len: usize, _msg: &str) {}
    fn error(&self, _context: &str, _path: &Path, _msg: &str) {}
}

pub struct NoopLogger;
impl UploadLogger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl UploadLogger for TextLogger {
    fn opened(&self, path: &Path) {
        self.line(&format!("OPEN path={}", path.display()));
    }
    fn finished(&self, path: &Path, bytes: u64, chunks: u64) {
        self.line(&format!(
            "STORED path={} bytes={} chunks={}",
            path.display(),
            bytes,
            chunks
        ));
    }
    fn webhook_failed(&self, path: &Path, chunk_len: usize, msg: &str) {
        self.line(&format!(
            "WEBHOOK_FAILED path={} chunk_bytes={} msg={}",
            path.display(),
            chunk_len,
            msg
        ));
    }
    fn error(&self, context: &str, path: &Path, msg: &str) {
        self.line(&format!("ERROR ctx={} path={} msg={}", context, path.display(), msg));
    }
}

/// Captures events in memory so tests can observe the side channel
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingLogger {
    pub events: Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingLogger {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
impl UploadLogger for RecordingLogger {
    fn opened(&self, path: &Path) {
        self.events.lock().push(format!("opened {}", path.display()));
    }
    fn finished(&self, path: &Path, bytes: u64, chunks: u64) {
        self.events
            .lock()
            .push(format!("finished {} {} {}", path.display(), bytes, chunks));
    }
    fn webhook_failed(&self, path: &Path, chunk_len: usize, _msg: &str) {
        self.events
            .lock()
            .push(format!("webhook_failed {} {}", path.display(), chunk_len));
    }
    fn error(&self, context: &str, path: &Path, _msg: &str) {
        self.events
            .lock()
            .push(format!("error {} {}", context, path.display()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_logger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs/uploads.log");
        let logger = TextLogger::new(&log_path).unwrap();

        logger.opened(Path::new("/srv/a.txt"));
        logger.webhook_failed(Path::new("/srv/a.txt"), 4, "connection refused");
        logger.finished(Path::new("/srv/a.txt"), 4, 1);
        drop(logger);

        let text = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("OPEN path=/srv/a.txt"));
        assert!(lines[1].contains("WEBHOOK_FAILED path=/srv/a.txt chunk_bytes=4"));
        assert!(lines[2].ends_with("STORED path=/srv/a.txt bytes=4 chunks=1"));
    }
}
