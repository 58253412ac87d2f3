use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::gateway::{GatewayError, SheetGateway};
use crate::record::{Record, RecordInput, Row, header_row};

/// Position of a record among the data rows, starting at 1.
///
/// Ids are stable: deleting a record clears its row in place, so later
/// records keep their ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub usize);

impl RecordId {
    /// Sheet row holding this record (row 1 is the header).
    pub fn sheet_row(&self) -> usize {
        self.0 + 1
    }

    pub fn from_sheet_row(row: usize) -> Option<Self> {
        if row >= 2 { Some(RecordId(row - 1)) } else { None }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("no record at row number {0}")]
    NotFound(RecordId),

    #[error("the sheet placed the new record on row {0}, above the data rows")]
    MisplacedAppend(usize),
}

/// Typed record access over a sheet gateway.
#[derive(Clone)]
pub struct RecordStore {
    gateway: Arc<dyn SheetGateway>,
}

impl RecordStore {
    pub fn new(gateway: Arc<dyn SheetGateway>) -> Self {
        RecordStore { gateway }
    }

    pub fn describe(&self) -> String {
        self.gateway.describe()
    }

    /// Raw rows, header included.
    pub async fn table(&self) -> Result<Vec<Row>, StoreError> {
        Ok(self.gateway.fetch_all().await?)
    }

    /// Live records with their ids; cleared rows are skipped.
    pub async fn list(&self) -> Result<Vec<(RecordId, Record)>, StoreError> {
        let rows = self.table().await?;
        Ok(rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, row)| Record::from_row(row).map(|r| (RecordId(i), r)))
            .collect())
    }

    /// Live records only, in sheet order.
    pub async fn records(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.list().await?.into_iter().map(|(_, r)| r).collect())
    }

    pub async fn get(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        if id.0 == 0 {
            return Ok(None);
        }
        let row = self.gateway.fetch_row(id.sheet_row()).await?;
        Ok(row.as_deref().and_then(Record::from_row))
    }

    pub async fn create(&self, input: &RecordInput) -> Result<RecordId, StoreError> {
        self.ensure_header().await?;
        self.append_record(input).await
    }

    /// Like [`create`](Self::create) without the header check. Bulk writers
    /// call [`ensure_header`](Self::ensure_header) once, then this per record.
    pub async fn append_record(&self, input: &RecordInput) -> Result<RecordId, StoreError> {
        let row = self.gateway.append(input.to_row()).await?;
        let id = RecordId::from_sheet_row(row).ok_or(StoreError::MisplacedAppend(row))?;
        log::info!("created record {} in {}", id, self.gateway.describe());
        Ok(id)
    }

    pub async fn update(&self, id: RecordId, input: &RecordInput) -> Result<(), StoreError> {
        if self.get(id).await?.is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.gateway.update(id.sheet_row(), input.to_row()).await?;
        log::info!("updated record {} in {}", id, self.gateway.describe());
        Ok(())
    }

    pub async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        if self.get(id).await?.is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.gateway.clear(id.sheet_row()).await?;
        log::info!("cleared record {} in {}", id, self.gateway.describe());
        Ok(())
    }

    /// Number of data rows, cleared ones included. Valid ids are
    /// `1..=data_row_count()`.
    pub async fn data_row_count(&self) -> Result<usize, StoreError> {
        Ok(self.gateway.row_count().await?.saturating_sub(1))
    }

    /// Write the header row when the sheet is completely empty.
    pub async fn ensure_header(&self) -> Result<(), StoreError> {
        if self.gateway.row_count().await? == 0 {
            self.gateway.append(header_row()).await?;
        }
        Ok(())
    }
}
