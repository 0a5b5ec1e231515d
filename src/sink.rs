use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
    sync::RwLock,
};

use polars::prelude::{
    CsvWriterOptions, DataFrame, IntoLazy, LazyCsvReader, LazyFileListReader, ParquetReader,
    ParquetWriteOptions, PlPath, SerReader, SinkOptions, SinkTarget,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

use crate::error::{CollaboratorError, LabelerResult};

/// Opaque reference to a table persisted by a [`TableSink`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableHandle {
    id: String,
}

impl TableHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Persists labeled tables and reads them back.
pub trait TableSink {
    /// Stores `table` under `key`, replacing any table previously stored there.
    fn write(&self, table: &DataFrame, key: &str) -> LabelerResult<TableHandle>;

    fn read(&self, handle: &TableHandle) -> LabelerResult<DataFrame>;

    /// Returns the handle of the table stored under `key`, if any.
    fn lookup(&self, key: &str) -> LabelerResult<Option<TableHandle>>;
}

impl<T: TableSink + ?Sized> TableSink for &T {
    fn write(&self, table: &DataFrame, key: &str) -> LabelerResult<TableHandle> {
        (**self).write(table, key)
    }

    fn read(&self, handle: &TableHandle) -> LabelerResult<DataFrame> {
        (**self).read(handle)
    }

    fn lookup(&self, key: &str) -> LabelerResult<Option<TableHandle>> {
        (**self).lookup(key)
    }
}

// ================================================================================================
// In-memory
// ================================================================================================

/// Keeps tables in memory for the lifetime of the sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: RwLock<HashMap<String, DataFrame>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CollaboratorError {
    CollaboratorError::Sink("Memory sink lock poisoned".to_string())
}

impl TableSink for MemorySink {
    fn write(&self, table: &DataFrame, key: &str) -> LabelerResult<TableHandle> {
        self.tables
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), table.clone());
        Ok(TableHandle::new(key))
    }

    fn read(&self, handle: &TableHandle) -> LabelerResult<DataFrame> {
        self.tables
            .read()
            .map_err(poisoned)?
            .get(handle.id())
            .cloned()
            .ok_or_else(|| {
                CollaboratorError::Sink(format!("Unknown table '{}'", handle.id())).into()
            })
    }

    fn lookup(&self, key: &str) -> LabelerResult<Option<TableHandle>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.contains_key(key).then(|| TableHandle::new(key)))
    }
}

// ================================================================================================
// Files
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileFormat {
    Csv,
    #[default]
    Parquet,
}

/// Writes each table to `<dir>/<key>.<format>`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    format: FileFormat,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: FileFormat::default(),
        }
    }

    pub fn with_format(self, format: FileFormat) -> Self {
        Self { format, ..self }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{}", self.format))
    }
}

impl TableSink for FileSink {
    fn write(&self, table: &DataFrame, key: &str) -> LabelerResult<TableHandle> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                CollaboratorError::Sink(format!(
                    "Failed to create directory {}: {e}",
                    self.dir.display()
                ))
            })?;
        }

        let file_path = self.path_of(key);
        let target = SinkTarget::Path(PlPath::new(utf8(&file_path)?));
        let lf = table.clone().lazy();

        let sink_plan = match self.format {
            FileFormat::Csv => {
                lf.sink_csv(target, CsvWriterOptions::default(), None, SinkOptions::default())
            }
            FileFormat::Parquet => lf.sink_parquet(
                target,
                ParquetWriteOptions::default(),
                None,
                SinkOptions::default(),
            ),
        }
        .map_err(|e| {
            CollaboratorError::Sink(format!("Failed to build {} sink plan: {e}", self.format))
        })?;

        let _ = sink_plan.collect().map_err(|e| {
            CollaboratorError::Sink(format!(
                "Failed to write {} to '{}': {e}",
                self.format,
                file_path.display()
            ))
        })?;

        debug!(path = %file_path.display(), rows = table.height(), "Wrote labeled table");
        Ok(TableHandle::new(key))
    }

    fn read(&self, handle: &TableHandle) -> LabelerResult<DataFrame> {
        let file_path = self.path_of(handle.id());
        let read_err = |e: polars::error::PolarsError| {
            CollaboratorError::Sink(format!("Failed to read '{}': {e}", file_path.display()))
        };

        let df = match self.format {
            FileFormat::Csv => LazyCsvReader::new(PlPath::new(utf8(&file_path)?))
                .with_has_header(true)
                .with_try_parse_dates(true)
                .finish()
                .and_then(|lf| lf.collect())
                .map_err(read_err)?,
            FileFormat::Parquet => {
                let file = File::open(&file_path).map_err(CollaboratorError::Io)?;
                ParquetReader::new(file).finish().map_err(read_err)?
            }
        };
        Ok(df)
    }

    fn lookup(&self, key: &str) -> LabelerResult<Option<TableHandle>> {
        Ok(self.path_of(key).is_file().then(|| TableHandle::new(key)))
    }
}

fn utf8(path: &Path) -> Result<&str, CollaboratorError> {
    path.to_str().ok_or_else(|| {
        CollaboratorError::Sink(format!(
            "Path contains invalid UTF-8 characters: {}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use polars::df;

    use super::*;
    use crate::error::LabelerError;

    fn table() -> DataFrame {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date");
        df![
            "date" => [day(2), day(3)],
            "instrument" => ["A", "A"],
            "m:close" => [1.5, 2.5],
            "label" => [0i64, 3],
        ]
        .expect("Failed to create table")
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.lookup("k").expect("lookup").is_none());

        let handle = sink.write(&table(), "k").expect("write");
        assert_eq!(sink.lookup("k").expect("lookup"), Some(handle.clone()));
        assert!(sink.read(&handle).expect("read").equals_missing(&table()));
        assert_eq!(sink.len(), 1);

        let err = sink.read(&TableHandle::new("other")).expect_err("unknown handle");
        assert!(matches!(
            err,
            LabelerError::Collaborator(CollaboratorError::Sink(_))
        ));
    }

    #[test]
    fn test_file_sink_formats() {
        let dir = std::env::temp_dir().join(format!("auto_labeler_sink_{}", std::process::id()));

        for format in [FileFormat::Parquet, FileFormat::Csv] {
            let sink = FileSink::new(&dir).with_format(format);
            assert!(sink.lookup("labels").expect("lookup").is_none());

            let handle = sink.write(&table(), "labels").expect("write");
            assert!(sink.path_of("labels").is_file(), "missing {format} file");
            assert_eq!(sink.lookup("labels").expect("lookup"), Some(handle.clone()));

            let have = sink.read(&handle).expect("read");
            assert!(have.equals_missing(&table()), "{format} round trip: {have}");
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
