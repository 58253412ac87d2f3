use async_trait::async_trait;
use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::gateway::{GatewayError, SheetGateway, is_blank};
use crate::record::{Row, header_row};

pub fn save_rows(rows: &[Row], filename: impl AsRef<Path>) -> std::io::Result<()> {
    let path = filename.as_ref();
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);

        serialize_into(&mut writer, rows)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
    }
    fs::rename(&tmp, path)
}

pub fn load_rows(filename: impl AsRef<Path>) -> std::io::Result<Vec<Row>> {
    let file = File::open(filename)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let rows: Vec<Row> = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(rows)
}

/// A sheet kept in a local gzip file, for development and demos.
///
/// Rows live in memory and the whole table is rewritten after every
/// change. Cleared rows stay in place as empty rows, so row numbers are
/// never reused.
pub struct LocalSheet {
    path: PathBuf,
    rows: Mutex<Vec<Row>>,
}

impl LocalSheet {
    /// Open the sheet at `path`, creating it with just the header row when
    /// the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            load_rows(&path)?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let rows = vec![header_row()];
            save_rows(&rows, &path)?;
            log::info!("created local sheet at {}", path.display());
            rows
        };

        Ok(LocalSheet {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Row>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index(rows: &[Row], row: usize) -> Result<usize, GatewayError> {
        if row == 0 || row > rows.len() {
            return Err(GatewayError::RowOutOfRange(row));
        }
        Ok(row - 1)
    }

    /// Apply `change` to a copy of the table and keep it only once the file
    /// has been rewritten, so memory never runs ahead of disk.
    fn write<T>(
        &self,
        change: impl FnOnce(&mut Vec<Row>) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let mut rows = self.lock();
        let mut next = rows.clone();
        let out = change(&mut next)?;
        save_rows(&next, &self.path)?;
        *rows = next;
        Ok(out)
    }
}

#[async_trait]
impl SheetGateway for LocalSheet {
    async fn fetch_all(&self) -> Result<Vec<Row>, GatewayError> {
        Ok(self.lock().clone())
    }

    async fn fetch_row(&self, row: usize) -> Result<Option<Row>, GatewayError> {
        let rows = self.lock();
        if row == 0 {
            return Err(GatewayError::RowOutOfRange(row));
        }
        Ok(rows.get(row - 1).filter(|r| !is_blank(r)).cloned())
    }

    async fn append(&self, values: Row) -> Result<usize, GatewayError> {
        self.write(|rows| {
            rows.push(values);
            Ok(rows.len())
        })
    }

    async fn update(&self, row: usize, values: Row) -> Result<(), GatewayError> {
        self.write(|rows| {
            let i = Self::index(rows, row)?;
            rows[i] = values;
            Ok(())
        })
    }

    async fn clear(&self, row: usize) -> Result<(), GatewayError> {
        self.write(|rows| {
            let i = Self::index(rows, row)?;
            rows[i].clear();
            Ok(())
        })
    }

    async fn row_count(&self) -> Result<usize, GatewayError> {
        Ok(self.lock().len())
    }

    fn describe(&self) -> String {
        format!("local sheet {}", self.path.display())
    }
}
