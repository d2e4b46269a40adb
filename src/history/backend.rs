use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

/// Where the serialized ledger lives.
///
/// A backend only moves whole documents. Parsing, corruption handling and
/// write serialization belong to [`super::HistoryStore`].
pub trait LedgerBackend: Send + Sync {
    /// Returns `None` when nothing has been written yet.
    fn read(&self) -> io::Result<Option<String>>;

    /// Replaces the stored document. Readers must never observe a partial write.
    fn write(&self, contents: &str) -> io::Result<()>;

    fn describe(&self) -> String;
}

/// Ledger stored as a JSON file on the operator's machine.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerBackend for FileBackend {
    fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, contents: &str) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write beside the target and rename over it
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Ledger written to {}", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
pub use memory::MemoryBackend;

#[cfg(test)]
mod memory {
    use std::io;
    use std::sync::Mutex;

    use super::LedgerBackend;

    #[derive(Default)]
    pub struct MemoryBackend {
        contents: Mutex<Option<String>>,
    }

    impl MemoryBackend {
        pub fn with_contents(contents: &str) -> Self {
            Self {
                contents: Mutex::new(Some(contents.to_string())),
            }
        }
    }

    impl LedgerBackend for MemoryBackend {
        fn read(&self) -> io::Result<Option<String>> {
            Ok(self.contents.lock().unwrap().clone())
        }

        fn write(&self, contents: &str) -> io::Result<()> {
            *self.contents.lock().unwrap() = Some(contents.to_string());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }
}
