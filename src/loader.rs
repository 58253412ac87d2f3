use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::form::{DiabetesForm, FieldErrors};
use crate::record::RecordInput;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV header has no {0} column")]
    MissingColumn(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("import stopped after {imported} records: {source}")]
    Partial {
        imported: usize,
        #[source]
        source: StoreError,
    },
}

/// A data line that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// 1-based line in the source file.
    pub line: u64,
    pub errors: FieldErrors,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: Vec<Rejected>,
}

// (form field, normalized header name)
const COLUMNS: [(&str, &str); 9] = [
    ("pregnancies", "pregnancies"),
    ("glucose", "glucose"),
    ("blood_pressure", "bloodpressure"),
    ("skin_thickness", "skinthickness"),
    ("insulin", "insulin"),
    ("bmi", "bmi"),
    ("diabetes_pedigree_function", "diabetespedigreefunction"),
    ("age", "age"),
    ("outcome", "outcome"),
];

fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse CSV text into validated records.
///
/// The header row is required and matched by name, ignoring case, spaces and
/// underscores, so both `BloodPressure` and `blood_pressure` work. Extra
/// columns (a derived `AgeGroup`, say) are ignored; labels are always
/// recomputed on write. Lines that fail validation are reported, not fatal.
pub fn parse_csv<R: Read>(input: R) -> Result<(Vec<RecordInput>, Vec<Rejected>), ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize).collect();
    let mut positions = [0usize; COLUMNS.len()];
    for (slot, (field, name)) in positions.iter_mut().zip(COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or(ImportError::MissingColumn(field))?;
    }

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let cell = |i: usize| record.get(positions[i]).unwrap_or("").to_string();
        let form = DiabetesForm {
            pregnancies: cell(0),
            glucose: cell(1),
            blood_pressure: cell(2),
            skin_thickness: cell(3),
            insulin: cell(4),
            bmi: cell(5),
            diabetes_pedigree_function: cell(6),
            age: cell(7),
            outcome: cell(8),
            csrf_token: String::new(),
        };
        match form.validate() {
            Ok(input) => accepted.push(input),
            Err(errors) => rejected.push(Rejected {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                errors,
            }),
        }
    }

    Ok((accepted, rejected))
}

/// Import every valid line of a CSV file into the store.
///
/// The file is parsed and validated completely before the first write, so a
/// malformed file adds nothing. The header is checked once; a write failure
/// partway through is reported as [`ImportError::Partial`] with the number
/// of records already in the store.
pub async fn import_csv(
    path: impl AsRef<Path>,
    store: &RecordStore,
) -> Result<ImportReport, ImportError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let (inputs, rejected) = parse_csv(file)?;

    store.ensure_header().await?;
    for (written, input) in inputs.iter().enumerate() {
        if let Err(source) = store.append_record(input).await {
            log::error!(
                "import from {} stopped after {} records: {}",
                path.display(),
                written,
                source
            );
            return Err(ImportError::Partial {
                imported: written,
                source,
            });
        }
    }
    log::info!(
        "imported {} records from {} ({} rejected)",
        inputs.len(),
        path.display(),
        rejected.len()
    );

    Ok(ImportReport {
        imported: inputs.len(),
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, SheetGateway};
    use crate::record::{Outcome, Row};
    use crate::saving::LocalSheet;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DATASET: &str = "\
Pregnancies,Glucose,BloodPressure,SkinThickness,Insulin,BMI,DiabetesPedigreeFunction,Age,Outcome
6,148,72,35,0,33.6,0.627,50,1
1,85,66,29,0,26.6,0.351,31,0
8,183,64,0,0,23.3,0.672,32,1
";

    #[test]
    fn parses_the_standard_dataset_layout() {
        let (inputs, rejected) = parse_csv(DATASET.as_bytes()).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].glucose, 148);
        assert_eq!(inputs[0].bmi, 33.6);
        assert_eq!(inputs[2].outcome, Outcome::Positive);
    }

    #[test]
    fn columns_are_matched_by_name() {
        let text = "age, outcome ,AgeGroup,bmi,insulin,skin_thickness,blood_pressure,glucose,diabetes_pedigree_function,pregnancies\n\
                    45,0,ignored,22.5,0,20,70,100,0.2,0\n";
        let (inputs, _) = parse_csv(text.as_bytes()).unwrap();
        assert_eq!(inputs[0].age, 45);
        assert_eq!(inputs[0].pregnancies, 0);
        assert_eq!(inputs[0].age_band().label(), "40-50");
    }

    #[test]
    fn invalid_lines_are_reported_with_line_numbers() {
        let text = format!("{}{}", DATASET, "1,85,66,29,0,26.6,0.351,15,0\n,,,,,,,,\n");
        let (inputs, rejected) = parse_csv(text.as_bytes()).unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].line, 5);
        assert!(rejected[0].errors.contains_key("age"));
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = parse_csv("Pregnancies,Glucose\n1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("blood_pressure")));
    }

    #[tokio::test]
    async fn import_writes_records() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("diabetes.csv");
        std::fs::write(&csv_path, DATASET).unwrap();
        let sheet = LocalSheet::open(dir.path().join("records.bin.gz")).unwrap();
        let store = RecordStore::new(Arc::new(sheet));

        let report = import_csv(&csv_path, &store).await.unwrap();
        assert_eq!(report.imported, 3);
        assert_eq!(store.records().await.unwrap().len(), 3);

        assert!(matches!(
            import_csv(dir.path().join("missing.csv"), &store).await,
            Err(ImportError::Open { .. })
        ));
    }

    /// Local sheet whose appends start failing after `limit` successes.
    struct FlakySheet {
        inner: LocalSheet,
        limit: usize,
        appends: AtomicUsize,
        row_counts: AtomicUsize,
    }

    #[async_trait]
    impl SheetGateway for FlakySheet {
        async fn fetch_all(&self) -> Result<Vec<Row>, GatewayError> {
            self.inner.fetch_all().await
        }

        async fn fetch_row(&self, row: usize) -> Result<Option<Row>, GatewayError> {
            self.inner.fetch_row(row).await
        }

        async fn append(&self, values: Row) -> Result<usize, GatewayError> {
            if self.appends.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(GatewayError::Status {
                    status: 429,
                    body: "quota exceeded".to_string(),
                });
            }
            self.inner.append(values).await
        }

        async fn update(&self, row: usize, values: Row) -> Result<(), GatewayError> {
            self.inner.update(row, values).await
        }

        async fn clear(&self, row: usize) -> Result<(), GatewayError> {
            self.inner.clear(row).await
        }

        async fn row_count(&self) -> Result<usize, GatewayError> {
            self.row_counts.fetch_add(1, Ordering::SeqCst);
            self.inner.row_count().await
        }

        fn describe(&self) -> String {
            "flaky sheet".to_string()
        }
    }

    #[tokio::test]
    async fn failed_import_reports_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("diabetes.csv");
        std::fs::write(&csv_path, DATASET).unwrap();
        let sheet = Arc::new(FlakySheet {
            inner: LocalSheet::open(dir.path().join("records.bin.gz")).unwrap(),
            limit: 2,
            appends: AtomicUsize::new(0),
            row_counts: AtomicUsize::new(0),
        });
        let store = RecordStore::new(sheet.clone());

        match import_csv(&csv_path, &store).await {
            Err(ImportError::Partial { imported, source }) => {
                assert_eq!(imported, 2);
                assert!(source.to_string().contains("quota exceeded"));
            }
            other => panic!("expected a partial import, got {:?}", other),
        }
        assert_eq!(store.records().await.unwrap().len(), 2);
        assert_eq!(sheet.row_counts.load(Ordering::SeqCst), 1);
    }
}
