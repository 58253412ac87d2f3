use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::{GatewayError, SheetGateway};
use crate::saving::LocalSheet;
use crate::sheets_api::{SheetsApiGateway, read_access_token};

pub const DEFAULT_SHEET_NAME: &str = "sheet1";
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_LOCAL_STORE: &str = "database/records.bin.gz";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("SERVICE_ACCOUNT_FILE must be set when SPREADSHEET_ID is set")]
    MissingCredentials,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub credentials_file: PathBuf,
    pub sheet_name: String,
    pub api_base: String,
    pub timeout: Duration,
}

/// Where the records live.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Sheets(SheetsConfig),
    Local(PathBuf),
}

impl Backend {
    /// Build the gateway for this backend. Reads the credential file for
    /// the remote backend, or opens (and creates) the local file.
    pub fn connect(&self) -> Result<Arc<dyn SheetGateway>, GatewayError> {
        match self {
            Backend::Sheets(sheets) => {
                let token = read_access_token(&sheets.credentials_file)?;
                let gateway = SheetsApiGateway::new(
                    &sheets.api_base,
                    &sheets.spreadsheet_id,
                    &sheets.sheet_name,
                    token,
                    sheets.timeout,
                )?;
                Ok(Arc::new(gateway))
            }
            Backend::Local(path) => Ok(Arc::new(LocalSheet::open(path.clone())?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let backend = match var("SPREADSHEET_ID") {
            Some(spreadsheet_id) => {
                let credentials_file = var("SERVICE_ACCOUNT_FILE")
                    .map(PathBuf::from)
                    .ok_or(ConfigError::MissingCredentials)?;
                let timeout = match var("REQUEST_TIMEOUT_SECS") {
                    Some(raw) => match raw.trim().parse::<u64>() {
                        Ok(secs) if secs > 0 => Duration::from_secs(secs),
                        _ => {
                            return Err(ConfigError::Invalid {
                                name: "REQUEST_TIMEOUT_SECS",
                                value: raw,
                            });
                        }
                    },
                    None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                };
                Backend::Sheets(SheetsConfig {
                    spreadsheet_id,
                    credentials_file,
                    sheet_name: var("SHEET_NAME").unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
                    api_base: var("SHEETS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                    timeout,
                })
            }
            None => Backend::Local(PathBuf::from(
                var("LOCAL_STORE").unwrap_or_else(|| DEFAULT_LOCAL_STORE.to_string()),
            )),
        };

        let raw_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr.trim().parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: raw_addr.clone(),
        })?;

        Ok(Config {
            backend,
            bind_addr,
            static_dir: PathBuf::from(
                var("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
            ),
        })
    }
}
