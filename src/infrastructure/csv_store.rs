//! Semicolon-delimited catalog files
//!
//! Source files come either as UTF-8 or as legacy Windows-1250. Output is
//! written in one declared encoding; when that encoding is Windows-1250,
//! characters it cannot represent are replaced with a space and every
//! replacement is logged.

use encoding_rs::WINDOWS_1250;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::Dataset;

pub const DELIMITER: u8 = b';';
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// File name of the enrichment checkpoint inside the work directory
pub const CHECKPOINT_FILE_NAME: &str = "processed_tmp.csv";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to flush CSV buffer: {0}")]
    Flush(#[source] std::io::Error),

    #[error("Input is neither valid UTF-8 nor Windows-1250")]
    UndecodableText,

    #[error("Text could not be encoded as {encoding:?}")]
    Unencodable { encoding: OutputEncoding },

    #[error("File has no header row")]
    MissingHeader,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Encoding detected when reading a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Utf8Bom,
    Windows1250,
}

/// Encoding used when writing a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputEncoding {
    #[default]
    Utf8,
    /// UTF-8 with a byte order mark, preferred by spreadsheet tools
    Utf8Bom,
    Windows1250,
}

impl From<SourceEncoding> for OutputEncoding {
    /// Write back in the family a file was read in
    fn from(source: SourceEncoding) -> Self {
        match source {
            SourceEncoding::Utf8 => Self::Utf8,
            SourceEncoding::Utf8Bom => Self::Utf8Bom,
            SourceEncoding::Windows1250 => Self::Windows1250,
        }
    }
}

/// Serialized file content plus the number of substituted characters
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    pub encoding: OutputEncoding,
    pub substitutions: usize,
}

/// Decode file bytes: UTF-8 (with or without BOM) first, then strict Windows-1250
pub fn decode_text(bytes: &[u8]) -> StorageResult<(String, SourceEncoding)> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if let Ok(text) = std::str::from_utf8(rest) {
            return Ok((text.to_string(), SourceEncoding::Utf8Bom));
        }
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), SourceEncoding::Utf8));
    }
    WINDOWS_1250
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| (text.into_owned(), SourceEncoding::Windows1250))
        .ok_or(StorageError::UndecodableText)
}

/// Parse semicolon-delimited text with a header row
pub fn read_dataset(text: &str) -> StorageResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.iter().all(String::is_empty) {
        return Err(StorageError::MissingHeader);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(ToString::to_string).collect());
    }

    Ok(Dataset::with_rows(columns, rows))
}

pub async fn load_dataset(path: &Path) -> StorageResult<(Dataset, SourceEncoding)> {
    let bytes = tokio::fs::read(path).await.map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (text, encoding) = decode_text(&bytes)?;
    let dataset = read_dataset(&text)?;
    info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.column_count(),
        ?encoding,
        "📂 Loaded dataset"
    );
    Ok((dataset, encoding))
}

/// Serialize a dataset in the requested encoding
pub fn encode_dataset(dataset: &Dataset, encoding: OutputEncoding) -> StorageResult<EncodedOutput> {
    let mut substitutions = 0;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_writer(Vec::new());

    match encoding {
        OutputEncoding::Utf8 | OutputEncoding::Utf8Bom => {
            writer.write_record(dataset.columns())?;
            for row in dataset.rows() {
                writer.write_record(row)?;
            }
        }
        OutputEncoding::Windows1250 => {
            let header: Vec<Cow<'_, str>> = dataset
                .columns()
                .iter()
                .map(|c| substitute_unencodable(c, None, c, &mut substitutions))
                .collect();
            writer.write_record(header.iter().map(|c| c.as_bytes()))?;

            for (row_index, row) in dataset.rows().iter().enumerate() {
                let cells: Vec<Cow<'_, str>> = row
                    .iter()
                    .zip(dataset.columns())
                    .map(|(cell, column)| {
                        substitute_unencodable(cell, Some(row_index), column, &mut substitutions)
                    })
                    .collect();
                writer.write_record(cells.iter().map(|c| c.as_bytes()))?;
            }
        }
    }

    let utf8 = writer.into_inner().map_err(|e| StorageError::Flush(e.into_error()))?;

    let bytes = match encoding {
        OutputEncoding::Utf8 => utf8,
        OutputEncoding::Utf8Bom => [UTF8_BOM, utf8.as_slice()].concat(),
        OutputEncoding::Windows1250 => {
            let text = String::from_utf8(utf8).map_err(|_| StorageError::Unencodable { encoding })?;
            let (bytes, _, had_errors) = WINDOWS_1250.encode(&text);
            if had_errors {
                return Err(StorageError::Unencodable { encoding });
            }
            bytes.into_owned()
        }
    };

    Ok(EncodedOutput {
        bytes,
        encoding,
        substitutions,
    })
}

fn encodable_in_1250(c: char) -> bool {
    if c.is_ascii() {
        return true;
    }
    let mut buffer = [0u8; 4];
    let (_, _, had_errors) = WINDOWS_1250.encode(c.encode_utf8(&mut buffer));
    !had_errors
}

/// Replace characters Windows-1250 cannot hold with a space, logging each one
fn substitute_unencodable<'a>(
    value: &'a str,
    row: Option<usize>,
    column: &str,
    substitutions: &mut usize,
) -> Cow<'a, str> {
    if value.chars().all(encodable_in_1250) {
        return Cow::Borrowed(value);
    }

    let replaced = value
        .chars()
        .map(|c| {
            if encodable_in_1250(c) {
                c
            } else {
                *substitutions += 1;
                warn!(
                    row = ?row,
                    column,
                    character = %c.escape_unicode(),
                    "Character not representable in Windows-1250, replaced with space"
                );
                ' '
            }
        })
        .collect();
    Cow::Owned(replaced)
}

/// Write a dataset, creating parent directories.
///
/// A Windows-1250 encoding failure falls back to UTF-8.
pub async fn save_dataset(
    path: &Path,
    dataset: &Dataset,
    encoding: OutputEncoding,
) -> StorageResult<EncodedOutput> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let encoded = match encode_dataset(dataset, encoding) {
        Ok(encoded) => encoded,
        Err(e) if encoding == OutputEncoding::Windows1250 => {
            warn!(error = %e, "Windows-1250 encoding failed, falling back to UTF-8");
            encode_dataset(dataset, OutputEncoding::Utf8)?
        }
        Err(e) => return Err(e),
    };

    tokio::fs::write(path, &encoded.bytes)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(encoded)
}

/// Best-effort full-dataset snapshot at a fixed path
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    path: PathBuf,
    encoding: OutputEncoding,
}

impl CheckpointWriter {
    pub const fn new(path: PathBuf, encoding: OutputEncoding) -> Self {
        Self { path, encoding }
    }

    /// Checkpoint at `<work_dir>/processed_tmp.csv`
    pub fn in_work_dir(work_dir: &Path, encoding: OutputEncoding) -> Self {
        Self::new(work_dir.join(CHECKPOINT_FILE_NAME), encoding)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot; failures are logged and reported as `false`
    pub async fn write(&self, dataset: &Dataset) -> bool {
        match save_dataset(&self.path, dataset, self.encoding).await {
            Ok(encoded) => {
                info!(
                    path = %self.path.display(),
                    rows = dataset.len(),
                    encoding = ?encoded.encoding,
                    substitutions = encoded.substitutions,
                    "💾 Checkpoint saved"
                );
                true
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "❌ Checkpoint write failed");
                false
            }
        }
    }
}
