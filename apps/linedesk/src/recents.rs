use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;
use tracing::warn;

pub const RECENT_NUMBERS_CAP: usize = 20;

#[derive(Debug, Error)]
pub enum RecentsError {
    #[error("unable to determine home directory")]
    NoHome,
    #[error("recent numbers file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode recent numbers: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Dialed numbers, most recent first, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentNumbers {
    numbers: Vec<String>,
}

impl RecentNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(numbers: Vec<String>) -> Self {
        let mut recents = Self::new();
        // Oldest first so the head of `numbers` ends up at the front.
        for number in numbers.into_iter().rev() {
            recents.record(&number);
        }
        recents
    }

    /// Moves `number` to the front, inserting it if new. Blank input is ignored.
    pub fn record(&mut self, number: &str) {
        let number = number.trim();
        if number.is_empty() {
            return;
        }
        self.numbers.retain(|existing| existing != number);
        self.numbers.insert(0, number.to_string());
        self.numbers.truncate(RECENT_NUMBERS_CAP);
    }

    pub fn as_slice(&self) -> &[String] {
        &self.numbers
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn clear(&mut self) {
        self.numbers.clear();
    }
}

/// JSON array on disk, `~/.linedesk/recent_numbers.json` unless overridden.
#[derive(Debug, Clone)]
pub struct RecentsFile {
    path: PathBuf,
}

impl RecentsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self, RecentsError> {
        let base = BaseDirs::new().ok_or(RecentsError::NoHome)?;
        Ok(Self::new(
            base.home_dir().join(".linedesk").join("recent_numbers.json"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file yields an empty list.
    pub fn load(&self) -> RecentNumbers {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return RecentNumbers::new(),
            Err(err) => {
                warn!(target: "linedesk::recents", path = %self.path.display(), error = %err, "failed to read recent numbers");
                return RecentNumbers::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(numbers) => {
                let mut numbers = numbers;
                numbers.truncate(RECENT_NUMBERS_CAP);
                RecentNumbers::from_vec(numbers)
            }
            Err(err) => {
                warn!(target: "linedesk::recents", path = %self.path.display(), error = %err, "ignoring corrupt recent numbers file");
                RecentNumbers::new()
            }
        }
    }

    pub fn save(&self, recents: &RecentNumbers) -> Result<(), RecentsError> {
        let io_err = |source: std::io::Error| RecentsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let numbers = &recents.as_slice()[..recents.len().min(RECENT_NUMBERS_CAP)];
        let serialized = serde_json::to_string_pretty(numbers)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(serialized.as_bytes()).map_err(io_err)?;
        Ok(())
    }
}
