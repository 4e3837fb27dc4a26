//! Append-merge persistence.
//!
//! A table file is a sequence of independently encoded records. Writers only
//! ever append; readers decode records until end of file and merge them, so a
//! shard flushed once or a hundred times reads back to the same table.

use crate::FrequencyTable;
use bincode::Options;
use lmd_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// Upper bound for a single encoded record.
const MAX_RECORD_BYTES: u64 = 1 << 30;

/// Decoding fails as soon as a length prefix claims more than `limit` bytes,
/// before anything is allocated for it.
fn codec(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

/// Encode `value` as one record at the end of `path`, creating the file if needed.
pub fn append_record<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    codec(MAX_RECORD_BYTES)
        .serialize_into(&mut writer, value)
        .map_err(|e| Error::Serialization(format!("cannot encode {}: {}", path.display(), e)))?;
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

/// Append a table, skipping empty ones. Returns whether a record was written.
pub fn append_table<T: FrequencyTable>(path: &Path, table: &T) -> Result<bool> {
    if table.is_empty() {
        return Ok(false);
    }
    debug!("appending {} occurrences to {}", table.total(), path.display());
    append_record(path, table)?;
    Ok(true)
}

/// Iterator over the records of a table file.
///
/// Stops after the first error.
pub struct Records<T, R> {
    reader: R,
    limit: u64,
    failed: bool,
    _marker: PhantomData<T>,
}

impl<T, R: BufRead> Records<T, R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_RECORD_BYTES)
    }

    /// Reject any record larger than `limit` bytes.
    pub fn with_limit(reader: R, limit: u64) -> Self {
        Self {
            reader,
            limit: limit.min(MAX_RECORD_BYTES),
            failed: false,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned, R: BufRead> Iterator for Records<T, R> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let at_end = match self.reader.fill_buf() {
            Ok(buf) => buf.is_empty(),
            Err(e) => {
                self.failed = true;
                return Some(Err(e.into()));
            }
        };
        if at_end {
            return None;
        }
        let item = codec(self.limit)
            .deserialize_from(&mut self.reader)
            .map_err(|e| Error::Serialization(e.to_string()));
        self.failed = item.is_err();
        Some(item)
    }
}

/// Open a table file for record-wise reading. `None` if the file does not exist.
///
/// No record can be larger than the file itself, so its length bounds every
/// decode.
pub fn open_records<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<Records<T, BufReader<File>>>> {
    match File::open(path) {
        Ok(file) => {
            let len = file.metadata()?.len();
            Ok(Some(Records::with_limit(BufReader::new(file), len)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decode every record of a reader and merge them into one table.
pub fn merge_records<T: FrequencyTable, R: BufRead>(reader: R) -> Result<T> {
    let mut merged = T::default();
    for record in Records::<T, R>::new(reader) {
        merged.append(record?);
    }
    Ok(merged)
}

/// Read and merge a table file. A missing file reads as `None`.
pub fn read_merged<T: FrequencyTable>(path: &Path) -> Result<Option<T>> {
    let Some(records) = open_records::<T>(path)? else {
        return Ok(None);
    };
    let mut merged = T::default();
    for record in records {
        let record = record.map_err(|e| match e {
            Error::Serialization(msg) => {
                Error::Serialization(format!("cannot decode {}: {}", path.display(), msg))
            }
            other => other,
        })?;
        merged.append(record);
    }
    Ok(Some(merged))
}

/// Replace `path` with `value`, encoded as a single record.
///
/// Writes to a sibling temporary file and renames it into place.
pub fn overwrite_record<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        codec(MAX_RECORD_BYTES)
            .serialize_into(&mut writer, value)
            .map_err(|e| Error::Serialization(format!("cannot encode {}: {}", path.display(), e)))?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Persist the grand total, replacing any previous value.
pub fn write_total(path: &Path, total: u64) -> Result<()> {
    overwrite_record(path, &total)
}

/// Read the grand total. A missing file reads as `None`.
pub fn read_total(path: &Path) -> Result<Option<u64>> {
    let Some(mut records) = open_records::<u64>(path)? else {
        return Ok(None);
    };
    match records.next() {
        Some(total) => total.map(Some),
        None => Ok(Some(0)),
    }
}

/// Rewrite a table file as a single merged record.
///
/// Returns the merged table's total, or `None` if the file does not exist.
/// Any undecodable record aborts the compaction and leaves the file untouched.
pub fn compact<T: FrequencyTable>(path: &Path) -> Result<Option<u64>> {
    let Some(merged) = read_merged::<T>(path)? else {
        return Ok(None);
    };
    let total = merged.total();
    if merged.is_empty() {
        std::fs::remove_file(path)?;
    } else {
        overwrite_record(path, &merged)?;
    }
    Ok(Some(total))
}
