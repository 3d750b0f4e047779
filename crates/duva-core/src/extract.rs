//! Extract builder: bulk-loads a normalized CSV into a columnar extract file.
//!
//! # Architecture
//!
//! ```text
//! EngineHandle<E>  (owned by the service, shared by all runs)
//!   │  lazily starts E on first use, refuses work after shutdown()
//!   ▼
//! ExtractEngine::load_csv(output, table, csv, copy options)
//!   │  recreate `output`, create the "Extract"."Extract" table,
//!   │  bulk copy with delimiter / NULL token / header skip
//!   ▼
//! row count
//! ```
//!
//! Every build recreates the extract from scratch; there is no append mode.
//! The bundled engine writes Parquet with Zstd compression and records the
//! schema and table names in the Arrow schema metadata.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::AppError;
use crate::normalize::{Column, ColumnType, NULL_TOKEN};

/// Schema name inside every extract.
pub const EXTRACT_SCHEMA: &str = "Extract";

/// Table name inside every extract.
pub const EXTRACT_TABLE: &str = "Extract";

const BATCH_SIZE: usize = 8192;

// =============================================================================
// Table and copy definitions
// =============================================================================

/// The single table created inside an extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableDefinition {
    /// The fixed `"Extract"."Extract"` table.
    pub fn extract(columns: Vec<Column>) -> Self {
        Self {
            schema: EXTRACT_SCHEMA.to_string(),
            name: EXTRACT_TABLE.to_string(),
            columns,
        }
    }

    /// Fully qualified, quoted name.
    pub fn qualified_name(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }
}

/// Bulk copy options, mirroring `COPY ... (format csv, NULL 'NULL', delimiter ',', header)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub delimiter: u8,
    pub null_token: String,
    pub header: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            null_token: NULL_TOKEN.to_string(),
            header: true,
        }
    }
}

// =============================================================================
// Engine trait and handle
// =============================================================================

/// A bulk-load engine producing extract files.
///
/// Work is synchronous and CPU bound; callers run it on the blocking pool.
pub trait ExtractEngine: Send + Sync + 'static {
    /// File extension of produced extracts, without the dot.
    const FILE_EXTENSION: &'static str;

    /// Start the engine. Called once, on first use.
    fn start() -> Result<Self, AppError>
    where
        Self: Sized;

    /// Recreate `output` and bulk-load `csv` into `table`. Returns rows loaded.
    fn load_csv(
        &self,
        output: &Path,
        table: &TableDefinition,
        csv: &Path,
        options: &CopyOptions,
    ) -> Result<u64, AppError>;

    /// Release engine resources.
    fn shutdown(&self) {}
}

/// Owned, lazily started engine shared by all sync runs.
pub struct EngineHandle<E: ExtractEngine> {
    inner: Arc<HandleInner<E>>,
}

struct HandleInner<E> {
    engine: OnceCell<Arc<E>>,
    closed: AtomicBool,
}

impl<E: ExtractEngine> Clone for EngineHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ExtractEngine> Default for EngineHandle<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ExtractEngine> EngineHandle<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                engine: OnceCell::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The running engine, starting it on first call.
    pub async fn get(&self) -> Result<Arc<E>, AppError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(AppError::ExtractBuild("extract engine has been shut down".to_string()));
        }
        self.inner
            .engine
            .get_or_try_init(|| async {
                info!(extension = E::FILE_EXTENSION, "Starting extract engine");
                E::start().map(Arc::new)
            })
            .await
            .cloned()
    }

    pub fn is_started(&self) -> bool {
        self.inner.engine.initialized()
    }

    /// Stop accepting work and shut the engine down if it was started.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(engine) = self.inner.engine.get() {
            info!("Shutting down extract engine");
            engine.shutdown();
        }
    }

    /// Build the extract at `output` from the normalized CSV.
    pub async fn build_extract(
        &self,
        columns: &[Column],
        csv: &Path,
        output: &Path,
    ) -> Result<u64, AppError> {
        let engine = self.get().await?;
        let table = TableDefinition::extract(columns.to_vec());
        let csv = csv.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            engine.load_csv(&output, &table, &csv, &CopyOptions::default())
        })
        .await
        .map_err(|e| AppError::ExtractBuild(format!("extract task failed: {}", e)))?
    }
}

// =============================================================================
// Parquet engine
// =============================================================================

/// Engine writing Zstd-compressed Parquet extracts via Arrow.
#[derive(Debug)]
pub struct ParquetEngine {
    properties: WriterProperties,
}

fn build_error(err: impl std::fmt::Display) -> AppError {
    AppError::ExtractBuild(err.to_string())
}

fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Text => DataType::Utf8,
    }
}

/// Arrow schema for `table`, carrying the schema and table names as metadata.
pub fn arrow_schema(table: &TableDefinition) -> Arc<Schema> {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.column_type), true))
        .collect();
    let metadata = HashMap::from([
        ("extract.schema".to_string(), table.schema.clone()),
        ("extract.table".to_string(), table.name.clone()),
    ]);
    Arc::new(Schema::new_with_metadata(fields, metadata))
}

fn temp_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    output.with_file_name(name)
}

impl ExtractEngine for ParquetEngine {
    const FILE_EXTENSION: &'static str = "parquet";

    fn start() -> Result<Self, AppError> {
        let level = ZstdLevel::try_new(3).map_err(build_error)?;
        Ok(Self {
            properties: WriterProperties::builder()
                .set_compression(Compression::ZSTD(level))
                .build(),
        })
    }

    fn load_csv(
        &self,
        output: &Path,
        table: &TableDefinition,
        csv: &Path,
        options: &CopyOptions,
    ) -> Result<u64, AppError> {
        if table.columns.is_empty() {
            return Err(AppError::ExtractBuild(format!(
                "table {} has no columns",
                table.qualified_name()
            )));
        }

        let schema = arrow_schema(table);
        let null_regex =
            Regex::new(&format!("^{}$", regex::escape(&options.null_token))).map_err(build_error)?;
        let reader = ReaderBuilder::new(schema.clone())
            .with_header(options.header)
            .with_delimiter(options.delimiter)
            .with_null_regex(null_regex)
            .with_batch_size(BATCH_SIZE)
            .build(File::open(csv)?)
            .map_err(build_error)?;

        // Write beside the target and rename, so a failed load never leaves
        // a truncated extract behind.
        let partial = temp_path(output);
        let file = File::create(&partial)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(self.properties.clone()))
            .map_err(build_error)?;

        let mut rows = 0u64;
        let loaded: Result<(), AppError> = (|| {
            for batch in reader {
                let batch = batch.map_err(build_error)?;
                rows += batch.num_rows() as u64;
                writer.write(&batch).map_err(build_error)?;
            }
            writer.close().map_err(build_error)?;
            Ok(())
        })();

        if let Err(e) = loaded {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }

        std::fs::rename(&partial, output)?;
        debug!(
            table = %table.qualified_name(),
            rows,
            path = %output.display(),
            "Extract built"
        );
        Ok(rows)
    }
}
