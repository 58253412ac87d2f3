//! Google Sheets v4 `values` API client.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;

use crate::gateway::{GatewayError, SheetGateway, is_blank};
use crate::record::Row;

lazy_static! {
    // "Sheet1!A5:K5" -> 5
    static ref RANGE_ROW_REGEX: Regex = Regex::new(r"![A-Za-z]+(\d+)(?::[A-Za-z]+\d+)?$").unwrap();
}

const LAST_COLUMN: &str = "K";

pub struct SheetsApiGateway {
    client: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    sheet: String,
    token: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

impl SheetsApiGateway {
    pub fn new(
        base_url: &str,
        spreadsheet_id: &str,
        sheet: &str,
        token: String,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url).map_err(|e| GatewayError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Url(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(SheetsApiGateway {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet: sheet.to_string(),
            token,
        })
    }

    fn url(&self, target: &str) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", target]);
        Ok(url)
    }

    fn row_range(&self, row: usize) -> String {
        format!("{}!A{}:{}{}", self.sheet, row, LAST_COLUMN, row)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Row>, GatewayError> {
        let resp = self
            .client
            .get(self.url(range)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: ValueRange = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Row number from an A1 range such as `Sheet1!A12:K12`.
pub fn range_row(range: &str) -> Option<usize> {
    RANGE_ROW_REGEX
        .captures(range)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Read a bearer token from a credential file.
///
/// Accepts either a JSON object with an `access_token` field or a file
/// holding only the token. Service-account key files are rejected: they
/// need a signed token exchange first.
pub fn read_access_token(path: &Path) -> Result<String, GatewayError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::Credentials(format!("cannot read {}: {}", path.display(), e))
    })?;
    let trimmed = contents.trim();

    if trimmed.starts_with('{') {
        let json: Value = serde_json::from_str(trimmed)
            .map_err(|e| GatewayError::Credentials(format!("{}: {}", path.display(), e)))?;
        if let Some(token) = json.get("access_token").and_then(|t| t.as_str()) {
            return Ok(token.to_string());
        }
        if json.get("type").and_then(|t| t.as_str()) == Some("service_account") {
            return Err(GatewayError::Credentials(format!(
                "{} is a service-account key; exchange it for an access token first",
                path.display()
            )));
        }
        return Err(GatewayError::Credentials(format!(
            "{} has no access_token field",
            path.display()
        )));
    }

    if trimmed.is_empty() {
        return Err(GatewayError::Credentials(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl SheetGateway for SheetsApiGateway {
    async fn fetch_all(&self) -> Result<Vec<Row>, GatewayError> {
        self.get_values(&self.sheet).await
    }

    async fn fetch_row(&self, row: usize) -> Result<Option<Row>, GatewayError> {
        if row == 0 {
            return Err(GatewayError::RowOutOfRange(row));
        }
        let rows = self.get_values(&self.row_range(row)).await?;
        Ok(rows.into_iter().next().filter(|r| !is_blank(r)))
    }

    async fn append(&self, values: Row) -> Result<usize, GatewayError> {
        let mut url = self.url(&format!("{}:append", self.sheet))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": [values] }))
            .send()
            .await?;
        let body: AppendResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        range_row(&body.updates.updated_range).ok_or_else(|| {
            GatewayError::Decode(format!(
                "cannot read row from updatedRange {:?}",
                body.updates.updated_range
            ))
        })
    }

    async fn update(&self, row: usize, values: Row) -> Result<(), GatewayError> {
        if row == 0 {
            return Err(GatewayError::RowOutOfRange(row));
        }
        let range = self.row_range(row);
        let mut url = self.url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .json(&json!({ "range": range, "values": [values] }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn clear(&self, row: usize) -> Result<(), GatewayError> {
        if row == 0 {
            return Err(GatewayError::RowOutOfRange(row));
        }
        let url = self.url(&format!("{}:clear", self.row_range(row)))?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sheet {} ({})", self.spreadsheet_id, self.sheet)
    }
}
