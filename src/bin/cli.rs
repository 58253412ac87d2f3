#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use diabetes_dashboard::config::{
    Backend, DEFAULT_API_BASE, DEFAULT_LOCAL_STORE, DEFAULT_SHEET_NAME, SheetsConfig,
};
use diabetes_dashboard::{DashboardStats, RecordId, RecordStore, StoreError, downloader, loader};

/// Inspect and maintain the screening records from the command line.
#[derive(Parser, Debug)]
#[command(name = "dashboard-cli", version, about)]
struct Cli {
    /// Remote spreadsheet id; the local store is used when absent
    #[arg(long, env = "SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// Credential file holding an OAuth access token
    #[arg(long, env = "SERVICE_ACCOUNT_FILE")]
    credentials: Option<PathBuf>,

    #[arg(long, env = "SHEET_NAME", default_value = DEFAULT_SHEET_NAME)]
    sheet_name: String,

    #[arg(long, env = "SHEETS_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// HTTP timeout for the remote sheet, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[arg(long, env = "LOCAL_STORE", default_value = DEFAULT_LOCAL_STORE)]
    local_store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dashboard statistics
    Stats {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// List live records with their row numbers
    List,
    /// Show one record
    Show { row: usize },
    /// Import records from a CSV file
    Import { file: PathBuf },
    /// Export the table; the format follows the extension (.csv or .xlsx)
    Export { file: PathBuf },
    /// Clear one record
    Delete { row: usize },
}

impl Cli {
    fn backend(&self) -> Result<Backend, Box<dyn std::error::Error>> {
        match &self.spreadsheet_id {
            Some(id) => {
                let credentials_file = self
                    .credentials
                    .clone()
                    .ok_or("--credentials is required with --spreadsheet-id")?;
                Ok(Backend::Sheets(SheetsConfig {
                    spreadsheet_id: id.clone(),
                    credentials_file,
                    sheet_name: self.sheet_name.clone(),
                    api_base: self.api_base.clone(),
                    timeout: Duration::from_secs(self.timeout_secs.max(1)),
                }))
            }
            None => Ok(Backend::Local(self.local_store.clone())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let store = RecordStore::new(cli.backend()?.connect()?);

    match cli.command {
        Command::Stats { json } => {
            let stats = DashboardStats::compute(&store.records().await?);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Records:                {}", stats.record_count);
                println!("With pregnancy data:    {}", stats.count);
                println!("Diabetic records:       {}", stats.total_diabetes_count);
                println!("With pregnancies:       {}", stats.total_pregnancies_count);
                println!("Average glucose:        {}", stats.average_glucose);
                println!("Average blood pressure: {}", stats.average_blood_pressure);
                println!("Average BMI:            {}", stats.average_bmi);
                println!();
                println!("{:<8} {:>9} {:>11}", "Age", "Diabetic", "Prevalence");
                for (i, label) in stats.diabetes_counts.labels.iter().enumerate() {
                    println!(
                        "{:<8} {:>9} {:>10}%",
                        label, stats.diabetes_counts.values[i], stats.diabetes_prevalence.values[i]
                    );
                }
            }
        }
        Command::List => {
            for (id, record) in store.list().await? {
                println!(
                    "{:>5}  age {:>3}  bmi {:>5}  glucose {:>5}  outcome {}",
                    id,
                    show(record.age),
                    show(record.bmi),
                    show(record.glucose),
                    show(record.outcome),
                );
            }
        }
        Command::Show { row } => match store.get(RecordId(row)).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => return Err(StoreError::NotFound(RecordId(row)).into()),
        },
        Command::Import { file } => {
            let report = loader::import_csv(&file, &store).await?;
            println!("imported {} records", report.imported);
            for rejected in &report.rejected {
                let fields: Vec<String> = rejected
                    .errors
                    .iter()
                    .map(|(field, message)| format!("{}: {}", field, message))
                    .collect();
                eprintln!("line {} skipped ({})", rejected.line, fields.join("; "));
            }
        }
        Command::Export { file } => {
            let table = store.table().await?;
            let bytes = match file.extension().and_then(|e| e.to_str()) {
                Some("xlsx") => downloader::to_xlsx(&table)?,
                Some("csv") => downloader::to_csv(&table)?,
                _ => return Err("export file must end in .csv or .xlsx".into()),
            };
            std::fs::write(&file, bytes)?;
            println!("wrote {}", file.display());
        }
        Command::Delete { row } => {
            store.delete(RecordId(row)).await?;
            println!("cleared row {}", row);
        }
    }

    Ok(())
}

fn show<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
