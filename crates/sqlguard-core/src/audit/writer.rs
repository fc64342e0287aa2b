//! Buffered line sinks for audit records.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use super::event::AuditEvent;
use crate::error::{SecurityError, SecurityResult};

/// Path value that selects standard output.
pub const STDOUT_PATH: &str = "stdout";

/// Destination of serialized audit lines.
pub enum AuditWriter {
    /// Process standard output.
    Stdout(BufWriter<Stdout>),
    /// Append-only file.
    File(BufWriter<File>),
    /// Any other writer, e.g. an in-memory buffer.
    Custom(BufWriter<Box<dyn Write + Send>>),
}

impl AuditWriter {
    /// Open the sink named by `path`.
    ///
    /// An empty path or `"stdout"` selects standard output. Anything else is
    /// opened for appending, creating parent directories as needed.
    pub fn open(path: &str) -> SecurityResult<Self> {
        if path.is_empty() || path.eq_ignore_ascii_case(STDOUT_PATH) {
            return Ok(Self::stdout());
        }

        let path = Path::new(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(AuditWriter::File(BufWriter::new(file)))
    }

    /// Standard output sink.
    pub fn stdout() -> Self {
        AuditWriter::Stdout(BufWriter::new(io::stdout()))
    }

    /// Wrap an arbitrary writer.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        AuditWriter::Custom(BufWriter::new(Box::new(writer)))
    }

    /// Append one event as a JSON line. Does not flush.
    ///
    /// The event is fully serialized before anything is written, so a
    /// serialization failure never leaves a partial line behind.
    pub fn write_event(&mut self, event: &AuditEvent) -> SecurityResult<()> {
        let mut line = serde_json::to_vec(event).map_err(|e| SecurityError::Audit(e.to_string()))?;
        line.push(b'\n');
        self.inner().write_all(&line)?;
        Ok(())
    }

    /// Push buffered lines to the underlying sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner().flush()
    }

    /// Flush and release the sink. Files are also synced to disk.
    pub fn close(self) -> io::Result<()> {
        match self {
            AuditWriter::Stdout(mut w) => w.flush(),
            AuditWriter::File(w) => {
                let file = w.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()
            }
            AuditWriter::Custom(mut w) => w.flush(),
        }
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            AuditWriter::Stdout(w) => w,
            AuditWriter::File(w) => w,
            AuditWriter::Custom(w) => w,
        }
    }
}

impl std::fmt::Debug for AuditWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditWriter::Stdout(_) => write!(f, "AuditWriter::Stdout"),
            AuditWriter::File(_) => write!(f, "AuditWriter::File"),
            AuditWriter::Custom(_) => write!(f, "AuditWriter::Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_empty_path_is_stdout() {
        assert!(matches!(AuditWriter::open("").unwrap(), AuditWriter::Stdout(_)));
        assert!(matches!(AuditWriter::open("STDOUT").unwrap(), AuditWriter::Stdout(_)));
    }

    #[test]
    fn test_file_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let path_str = path.to_str().unwrap();

        let mut writer = AuditWriter::open(path_str).unwrap();
        writer
            .write_event(&AuditEvent::authentication("alice", "10.0.0.1", true))
            .unwrap();
        writer.close().unwrap();

        let mut writer = AuditWriter::open(path_str).unwrap();
        writer
            .write_event(&AuditEvent::authentication("bob", "10.0.0.2", false))
            .unwrap();
        writer.close().unwrap();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"alice\""));
        assert!(lines[1].contains("\"bob\""));
    }
}
