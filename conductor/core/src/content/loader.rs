//! Content Loading
//!
//! Reads every `*.json` file in a content directory. A file that cannot be
//! read or parsed is skipped with a warning, as is any single malformed entry
//! inside an otherwise valid file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use super::{ContentEntry, ContentLibrary, FileContext};

/// Errors raised while loading content
#[derive(Debug, Error)]
pub enum ContentError {
    /// The directory or file could not be read
    #[error("Failed to read content at {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON
    #[error("Invalid JSON in {source_name}: {error}")]
    Parse {
        /// File name or label
        source_name: String,
        /// Underlying error
        #[source]
        error: serde_json::Error,
    },

    /// The top level is not an object with a `lines` array
    #[error("Content file {0} must be an object with a \"lines\" array")]
    Shape(String),
}

/// One parsed content file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentFile {
    /// The `_context` block
    pub context: FileContext,
    /// Valid entries, in file order
    pub entries: Vec<ContentEntry>,
    /// File name or label used in logs
    pub source: String,
}

impl ContentFile {
    /// Parse file contents; `source` labels log lines
    pub fn parse(source: &str, json: &str) -> Result<Self, ContentError> {
        let root: Value = serde_json::from_str(json).map_err(|error| ContentError::Parse {
            source_name: source.to_string(),
            error,
        })?;

        let Value::Object(mut root) = root else {
            return Err(ContentError::Shape(source.to_string()));
        };
        let Some(Value::Array(raw_entries)) = root.remove("lines") else {
            return Err(ContentError::Shape(source.to_string()));
        };

        let context = match root.remove("_context") {
            None | Some(Value::Null) => FileContext::default(),
            Some(raw) => serde_json::from_value(raw).unwrap_or_else(|error| {
                tracing::warn!(source, %error, "Ignoring malformed _context");
                FileContext::default()
            }),
        };

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, raw) in raw_entries.into_iter().enumerate() {
            match serde_json::from_value::<ContentEntry>(raw) {
                Ok(entry) if entry.lines.is_empty() => {
                    tracing::warn!(source, index, "Skipping entry with no lines");
                }
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    tracing::warn!(source, index, %error, "Skipping malformed entry");
                }
            }
        }

        Ok(Self {
            context,
            entries,
            source: source.to_string(),
        })
    }
}

/// Load and partition every `*.json` file under `dir`
///
/// Files are read in name order so the library layout is stable.
pub fn load_dir(dir: &Path) -> Result<ContentLibrary, ContentError> {
    let read = fs::read_dir(dir).map_err(|source| ContentError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = read
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let label = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(error) => {
                tracing::warn!(file = %label, %error, "Skipping unreadable content file");
                continue;
            }
        };

        match ContentFile::parse(&label, &json) {
            Ok(file) => {
                tracing::debug!(file = %label, entries = file.entries.len(), "Loaded content file");
                files.push(file);
            }
            Err(error) => tracing::warn!(file = %label, %error, "Skipping content file"),
        }
    }

    Ok(ContentLibrary::from_files(files))
}
