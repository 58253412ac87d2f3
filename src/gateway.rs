use crate::record::Row;
use async_trait::async_trait;
use thiserror::Error;

/// Failures talking to the backing sheet.
///
/// None of these are fatal; callers render them as a failure state
/// instead of treating them as an empty table.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to the sheet service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sheet service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response from the sheet service: {0}")]
    Decode(String),

    #[error("invalid sheet service address: {0}")]
    Url(String),

    #[error("local sheet I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("row {0} is outside the sheet")]
    RowOutOfRange(usize),
}

/// Row-level access to a tabular store.
///
/// Row numbers are 1-based sheet rows; row 1 holds the header.
#[async_trait]
pub trait SheetGateway: Send + Sync {
    /// Every row, header included. Cleared rows come back empty.
    async fn fetch_all(&self) -> Result<Vec<Row>, GatewayError>;

    /// One row, or `None` when the row is past the end or blank.
    async fn fetch_row(&self, row: usize) -> Result<Option<Row>, GatewayError>;

    /// Append after the last row and return the new row's number.
    async fn append(&self, values: Row) -> Result<usize, GatewayError>;

    /// Overwrite a whole row.
    async fn update(&self, row: usize, values: Row) -> Result<(), GatewayError>;

    /// Clear a row's cells, leaving the row itself in place.
    async fn clear(&self, row: usize) -> Result<(), GatewayError>;

    /// Number of rows, header included.
    async fn row_count(&self) -> Result<usize, GatewayError> {
        Ok(self.fetch_all().await?.len())
    }

    /// Short name for logs.
    fn describe(&self) -> String;
}

pub(crate) fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}
