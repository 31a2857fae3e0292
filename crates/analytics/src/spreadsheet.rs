use calamine::{Data, Reader};
use chrono::NaiveDate;
use qhse_common::text::normalize;
use qhse_common::{QhseError, Result};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

use crate::encoding::{excel_serial_date, parse_date};

/// Accepted header names per column, compared after normalization
const DATE_HEADERS: &[&str] = &["date", "observation date"];
const LOCATION_HEADERS: &[&str] = &["location", "area"];
const OBSERVATION_HEADERS: &[&str] = &[
    "safety observation condition activity",
    "safety observation",
    "observation",
    "description",
];
const CATEGORY_HEADERS: &[&str] = &["category"];
const LABEL_HEADERS: &[&str] = &["unsafe act unsafe condition", "unsafe act", "label"];

/// One data row of a safety observation sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow {
    /// 1-based sheet row, the header being row 1
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub observation: String,
    pub category: Option<String>,
    /// Raw "Unsafe Act / Unsafe Condition" cell
    pub label: Option<String>,
}

impl ObservationRow {
    /// Binary training label, when the row carries one
    pub fn label_value(&self) -> Option<f32> {
        self.label.as_deref().map(parse_label)
    }
}

/// `"Unsafe Act"` or `"Yes"` is 1, anything else 0
pub fn parse_label(raw: &str) -> f32 {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("unsafe act") || raw.eq_ignore_ascii_case("yes") {
        1.0
    } else {
        0.0
    }
}

/// Uploaded spreadsheet format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    Excel,
}

impl SpreadsheetFormat {
    /// Detect format from the file extension
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xlsx") | Some("xls") | Some("xlsm") => Ok(Self::Excel),
            _ => Err(QhseError::invalid_input(format!(
                "Unsupported spreadsheet '{}'. Use .csv, .xlsx or .xls",
                filename
            ))),
        }
    }
}

/// Column positions resolved from the header row
#[derive(Debug, Default)]
struct ColumnMap {
    date: Option<usize>,
    location: Option<usize>,
    observation: usize,
    category: Option<usize>,
    label: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
        };

        let observation = find(OBSERVATION_HEADERS).ok_or_else(|| {
            QhseError::invalid_input(format!(
                "Missing observation column. Expected 'Safety Observation / Condition / Activity', found: {}",
                headers.join(", ")
            ))
        })?;

        Ok(Self {
            date: find(DATE_HEADERS),
            location: find(LOCATION_HEADERS),
            observation,
            category: find(CATEGORY_HEADERS),
            label: find(LABEL_HEADERS),
        })
    }
}

/// Read observation rows from an uploaded CSV or Excel file
///
/// Excel workbooks are read from their first sheet. Blank rows are skipped.
pub fn read_observations(data: &[u8], format: SpreadsheetFormat) -> Result<Vec<ObservationRow>> {
    let grid = match format {
        SpreadsheetFormat::Csv => csv_grid(data)?,
        SpreadsheetFormat::Excel => excel_grid(data)?,
    };

    let mut lines = grid.into_iter().skip_while(|(_, cells)| is_blank(cells));
    let (header_row, headers) = lines
        .next()
        .ok_or_else(|| QhseError::invalid_input("Spreadsheet is empty"))?;
    let columns = ColumnMap::from_headers(&headers)?;
    debug!("Spreadsheet header at row {}: {:?}", header_row, columns);

    let rows: Vec<ObservationRow> = lines
        .filter(|(_, cells)| !is_blank(cells))
        .map(|(row, cells)| {
            let cell = |index: Option<usize>| {
                index
                    .and_then(|i| cells.get(i))
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            };

            ObservationRow {
                row,
                date: cell(columns.date).as_deref().and_then(parse_date),
                location: cell(columns.location),
                observation: cell(Some(columns.observation)).unwrap_or_default(),
                category: cell(columns.category),
                label: cell(columns.label),
            }
        })
        .collect();

    info!("Read {} observation rows", rows.len());
    Ok(rows)
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

/// Rows as `(1-based row number, cells)`, header included
fn csv_grid(data: &[u8]) -> Result<Vec<(usize, Vec<String>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut grid = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| QhseError::invalid_input(format!("Invalid CSV at row {}: {}", i + 1, e)))?;
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        // Strip a UTF-8 byte order mark from the first header cell
        if i == 0 {
            if let Some(first) = cells.first_mut() {
                *first = first.trim_start_matches('\u{feff}').to_string();
            }
        }
        grid.push((i + 1, cells));
    }
    Ok(grid)
}

fn excel_grid(data: &[u8]) -> Result<Vec<(usize, Vec<String>)>> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(data))
        .map_err(|e| QhseError::invalid_input(format!("Failed to open workbook: {}", e)))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| QhseError::invalid_input("Workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| QhseError::invalid_input(format!("Failed to read sheet '{}': {}", sheet, e)))?;

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    Ok(range
        .rows()
        .enumerate()
        .map(|(i, row)| (first_row + i + 1, row.iter().map(cell_text).collect()))
        .collect())
}

/// Render a workbook cell the way the CSV path would see it
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\u{feff}Date,Location,Safety Observation / Condition / Activity,Category,Unsafe Act / Unsafe Condition
2024-03-05,Site,Worker without helmet near scaffold,PPE,Unsafe Act
,,,,
06/03/2024,Warehouse,Blocked fire exit,ACCESS,Unsafe Condition
not a date,,Loose cable across walkway,,
";

    #[test]
    fn test_read_csv_rows() {
        let rows = read_observations(SHEET.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].row, 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(rows[0].location.as_deref(), Some("Site"));
        assert_eq!(rows[0].observation, "Worker without helmet near scaffold");
        assert_eq!(rows[0].label_value(), Some(1.0));

        assert_eq!(rows[1].row, 4);
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 3, 6));
        assert_eq!(rows[1].label_value(), Some(0.0));

        assert_eq!(rows[2].date, None);
        assert_eq!(rows[2].category, None);
        assert_eq!(rows[2].label_value(), None);
    }

    #[test]
    fn test_short_header_alias() {
        let data = "observation,category\nSpill in yard,GENERAL\n";
        let rows = read_observations(data.as_bytes(), SpreadsheetFormat::Csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category.as_deref(), Some("GENERAL"));
        assert_eq!(rows[0].location, None);
    }

    #[test]
    fn test_missing_observation_column() {
        let data = "Date,Location\n2024-01-01,Site\n";
        let err = read_observations(data.as_bytes(), SpreadsheetFormat::Csv).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_empty_sheet() {
        assert!(read_observations(b"", SpreadsheetFormat::Csv).is_err());
    }

    #[test]
    fn test_invalid_workbook() {
        assert!(read_observations(b"not a workbook", SpreadsheetFormat::Excel).is_err());
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("Unsafe Act"), 1.0);
        assert_eq!(parse_label(" yes "), 1.0);
        assert_eq!(parse_label("Unsafe Condition"), 0.0);
        assert_eq!(parse_label("No"), 0.0);
        assert_eq!(parse_label(""), 0.0);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SpreadsheetFormat::from_filename("obs.CSV").unwrap(), SpreadsheetFormat::Csv);
        assert_eq!(SpreadsheetFormat::from_filename("obs.xlsx").unwrap(), SpreadsheetFormat::Excel);
        assert_eq!(SpreadsheetFormat::from_filename("obs.xls").unwrap(), SpreadsheetFormat::Excel);
        assert!(SpreadsheetFormat::from_filename("obs.pdf").is_err());
        assert!(SpreadsheetFormat::from_filename("obs").is_err());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(3.0)), "3");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::String("PPE".to_string())), "PPE");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
