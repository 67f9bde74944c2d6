use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

// Where non-volatile cartridge contents (SRAM, flash, EEPROM) live between sessions. Keys are
// derived from the cartridge image name plus a storage-specific suffix.
pub trait SaveStore {
    // Fills `destination` with the saved contents. Returns false if nothing was saved yet.
    fn load(&mut self, key: &str, destination: &mut [u8]) -> Result<bool, PersistenceError>;
    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;
}

#[derive(Debug)]
pub enum PersistenceError {
    Io { key: String, source: io::Error },
    WrongSize { key: String, expected: usize, found: usize },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io { key, source } => write!(f, "Failed to access save '{key}': {source}"),
            PersistenceError::WrongSize { key, expected, found } =>
                write!(f, "Save '{key}' is {found} bytes but the cartridge expects {expected}."),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io { source, .. } => Some(source),
            PersistenceError::WrongSize { .. } => None,
        }
    }
}

// One flat file per key.
pub struct DirectorySaveStore {
    directory: PathBuf,
}

impl DirectorySaveStore {
    pub fn new(directory: &Path) -> Self {
        Self { directory: directory.to_path_buf() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(key)
    }
}

impl SaveStore for DirectorySaveStore {
    fn load(&mut self, key: &str, destination: &mut [u8]) -> Result<bool, PersistenceError> {
        let path = self.path_for(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => return Err(PersistenceError::Io { key: key.to_owned(), source }),
        };

        if data.len() != destination.len() {
            return Err(PersistenceError::WrongSize { key: key.to_owned(), expected: destination.len(), found: data.len() });
        }

        destination.copy_from_slice(&data);
        info!("Loaded save data from {}.", path.display());
        Ok(true)
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let to_io_error = |source| PersistenceError::Io { key: key.to_owned(), source };
        fs::create_dir_all(&self.directory).map_err(to_io_error)?;
        let path = self.path_for(key);
        fs::write(&path, data).map_err(|source| PersistenceError::Io { key: key.to_owned(), source })?;
        info!("Saved {} bytes to {}.", data.len(), path.display());
        Ok(())
    }
}

// Keeps saves for the lifetime of the process. Used when saving to disk is disabled.
#[derive(Clone, Debug, Default)]
pub struct MemorySaveStore {
    saves: HashMap<String, Vec<u8>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.saves.get(key).map(Vec::as_slice)
    }

    pub fn insert(&mut self, key: &str, data: Vec<u8>) {
        self.saves.insert(key.to_owned(), data);
    }

    pub fn len(&self) -> usize {
        self.saves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty()
    }
}

impl SaveStore for MemorySaveStore {
    fn load(&mut self, key: &str, destination: &mut [u8]) -> Result<bool, PersistenceError> {
        let Some(data) = self.saves.get(key) else {
            return Ok(false);
        };

        if data.len() != destination.len() {
            return Err(PersistenceError::WrongSize { key: key.to_owned(), expected: destination.len(), found: data.len() });
        }

        destination.copy_from_slice(data);
        Ok(true)
    }

    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.saves.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}
