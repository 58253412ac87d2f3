/*!
# Diabetes Dashboard

A web dashboard over a table of diabetes screening records, built in Rust.

## Overview

Records live in a spreadsheet: either a Google Sheet reached through the
Sheets v4 REST API, or a local gzip file for development. The dashboard reads
the whole table on each view, derives an age band and a BMI class per record,
and aggregates the table into chart series. Records can be added, edited and
cleared through HTML forms.

## Architecture

### Storage Layer
- **gateway**: the `SheetGateway` trait, row-level access to a sheet
- **sheets_api**: Google Sheets implementation over `reqwest`
- **saving**: local implementation, bincode rows in a gzip file
- **store**: typed records with stable ids on top of a gateway

### Domain Layer
- **record**: the record schema, age bands and BMI classes
- **aggregate**: reducers from records to chart series
- **form**: validation of submitted records and row numbers

### Web Layer (feature `web`)
- **app**: axum routes, handlebars pages, error pages
- **session**: flash messages and CSRF tokens in cookies
- **graph**: chart definitions, PNG rendering with plotters

### Tools
- **loader**: CSV import
- **downloader**: CSV and XLSX export
- **config**: environment configuration

## Row identity

A record's id is its position among the data rows, starting at 1. Deleting
a record clears its row instead of removing it, so ids never shift; the ids
shown on the sheet view are the ones the update and delete forms accept.

## HTTP Endpoints

- `/` - Dashboard with every chart and the summary cards
- `/add`, `/update`, `/edit_row/{id}`, `/delete` - Record forms
- `/view` - Raw table with row numbers
- `/d`, `/a`, `/b`, `/s`, `/g`, `/p`, `/pr`, `/st` - Single chart pages
- `/api/stats` - Dashboard statistics as JSON
- `/chart/{name}.png` - Chart rendered server-side
- `/export.csv`, `/export.xlsx` - Table export
*/

pub mod aggregate;
pub mod config;
pub mod downloader;
pub mod form;
pub mod gateway;
pub mod loader;
pub mod record;
pub mod saving;
pub mod sheets_api;
pub mod store;

pub mod app;
pub mod graph;
pub mod session;

pub use aggregate::DashboardStats;
pub use config::Config;
pub use gateway::{GatewayError, SheetGateway};
pub use record::{AgeBand, BmiClass, Outcome, Record, RecordInput, age_band, bmi_class};
pub use store::{RecordId, RecordStore, StoreError};
