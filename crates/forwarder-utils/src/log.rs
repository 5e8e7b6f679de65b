use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A file-backed log sink that mirrors every write to stdout (the serial
/// mirror) and rotates the underlying file once it grows past `max_bytes`.
///
/// Wrap it in a `Mutex` and hand it to
/// `tracing_subscriber::fmt().with_writer(...)`; `tracing-subscriber` has a
/// blanket `MakeWriter` impl for `Mutex<W: Write>`.
pub struct RotatingLogWriter {
    path: PathBuf,
    max_bytes: u64,
    written: u64,
    file: File,
}

impl RotatingLogWriter {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> eyre::Result<Self> {
        let path = path.into();
        let file = Self::open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            max_bytes,
            written,
            file,
        })
    }

    fn open(path: &Path) -> eyre::Result<File> {
        Ok(OpenOptions::new().create(true).append(true).open(path)?)
    }

    fn rotate(&mut self) -> io::Result<()> {
        let rotated = self.path.with_extension("log.1");
        let _ = std::fs::remove_file(&rotated);
        std::fs::rename(&self.path, &rotated)?;
        self.file = Self::open(&self.path).map_err(io::Error::other)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        io::stdout().write_all(buf)?;
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn rotates_when_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forwarder.log");
        let mut writer = RotatingLogWriter::new(&path, 8).unwrap();

        writer.write_all(b"12345678").unwrap();
        writer.write_all(b"rotateme").unwrap();

        let rotated = path.with_extension("log.1");
        assert!(rotated.exists());

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "rotateme");
    }

    #[test]
    fn appends_across_writer_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forwarder.log");
        {
            let mut writer = RotatingLogWriter::new(&path, 1024).unwrap();
            writer.write_all(b"first\n").unwrap();
        }
        {
            let mut writer = RotatingLogWriter::new(&path, 1024).unwrap();
            writer.write_all(b"second\n").unwrap();
        }

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
