use crate::record::Row;
use std::error::Error;

pub const ROW_NUMBER_HEADER: &str = "Row Number";

/// Download name for an export, e.g. `records-20240131-142500.csv`.
pub fn export_filename(extension: &str) -> String {
    format!(
        "records-{}.{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        extension
    )
}

/// Prefix every row with its record id.
///
/// The header row gets [`ROW_NUMBER_HEADER`]; data rows are numbered from 1
/// in sheet order, cleared rows included, so the numbers are the ids the
/// update and delete forms accept. Short rows are padded to the header width.
pub fn numbered_rows(rows: &[Row]) -> Vec<Row> {
    let width = rows.first().map(|header| header.len()).unwrap_or(0);

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut out = Vec::with_capacity(width + 1);
            out.push(if i == 0 {
                ROW_NUMBER_HEADER.to_string()
            } else {
                i.to_string()
            });
            out.extend(row.iter().cloned());
            while out.len() < width + 1 {
                out.push(String::new());
            }
            out
        })
        .collect()
}

/// Convert the table to CSV, row numbers included.
///
/// # Examples
/// ```
/// use diabetes_dashboard::downloader::to_csv;
///
/// let rows = vec![
///     vec!["Age".to_string(), "Outcome".to_string()],
///     vec!["31".to_string(), "0".to_string()],
/// ];
/// let csv = String::from_utf8(to_csv(&rows).unwrap()).unwrap();
/// assert_eq!(csv, "Row Number,Age,Outcome\n1,31,0\n");
/// ```
pub fn to_csv(rows: &[Row]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    for row in numbered_rows(rows) {
        writer.write_record(&row)?;
    }

    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Convert the table to XLSX, row numbers included.
///
/// Cells that parse as numbers are written as numbers so the workbook can
/// be charted directly; everything else is written as text.
pub fn to_xlsx(rows: &[Row]) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("records")?;
    let bold = Format::new().set_bold();

    for (r, row) in numbered_rows(rows).iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let (r, c) = (r as u32, c as u16);
            if r == 0 {
                worksheet.write_string_with_format(r, c, cell, &bold)?;
            } else if let Ok(number) = cell.trim().parse::<f64>() {
                worksheet.write_number(r, c, number)?;
            } else if !cell.is_empty() {
                worksheet.write_string(r, c, cell)?;
            }
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::header_row;

    fn table() -> Vec<Row> {
        vec![
            header_row(),
            vec!["1", "85", "66", "29", "0", "26.6", "0.351", "31", "0", "30-40", "Overweight"]
                .into_iter()
                .map(String::from)
                .collect(),
            Vec::new(),
            vec!["0", "137", "40", "35", "168", "43.1", "2.288", "33", "1"]
                .into_iter()
                .map(String::from)
                .collect(),
        ]
    }

    #[test]
    fn numbers_rows_and_pads_short_ones() {
        let rows = numbered_rows(&table());
        assert_eq!(rows[0][0], ROW_NUMBER_HEADER);
        assert_eq!(rows[0][1], "Pregnancies");
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[2], {
            let mut blank = vec!["2".to_string()];
            blank.resize(12, String::new());
            blank
        });
        assert_eq!(rows[3][0], "3");
        assert!(rows.iter().all(|r| r.len() == 12));
    }

    #[test]
    fn csv_keeps_cleared_rows_as_blank_lines() {
        let csv = String::from_utf8(to_csv(&table()).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Row Number,Pregnancies,Glucose"));
        assert_eq!(lines[1], "1,1,85,66,29,0,26.6,0.351,31,0,30-40,Overweight");
        assert_eq!(lines[2], "2,,,,,,,,,,,");
        assert!(lines[3].starts_with("3,0,137"));
    }

    #[test]
    fn xlsx_is_a_zip_archive() {
        let bytes = to_xlsx(&table()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn export_filenames_are_timestamped() {
        let name = export_filename("csv");
        assert!(name.starts_with("records-"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "records-20240131-142500.csv".len());
    }

    #[test]
    fn empty_table_exports_nothing() {
        assert!(numbered_rows(&[]).is_empty());
        assert!(to_csv(&[]).unwrap().is_empty());
    }
}
