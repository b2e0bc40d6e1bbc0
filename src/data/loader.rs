use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray, BooleanArray, StringArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{PipelineError, Result};

/// Parsed tabular content: header names plus raw text cells.
pub type Table = (Vec<String>, Vec<Vec<String>>);

// ---------------------------------------------------------------------------
// Spreadsheet decoding capability
// ---------------------------------------------------------------------------

/// Decodes the first sheet of a binary spreadsheet into rows of text.
///
/// Injected into [`TabularParser`] at construction so the workbook library
/// is resolved once, up front.
pub trait SheetDecoder: Send + Sync {
    fn first_sheet(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>>;
}

/// `calamine`-backed decoder for xlsx / xlsm / xls / ods workbooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineDecoder;

impl SheetDecoder for CalamineDecoder {
    fn first_sheet(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| PipelineError::malformed(format!("opening spreadsheet: {e}")))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PipelineError::malformed("spreadsheet has no sheets"))?
            .map_err(|e| PipelineError::malformed(format!("reading first sheet: {e}")))?;

        Ok(range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

fn cell_text(cell: &Data) -> String {
    let text = match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    };
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// TabularParser
// ---------------------------------------------------------------------------

/// Turns delimited text, spreadsheets and Parquet files into `(headers, rows)`.
#[derive(Clone)]
pub struct TabularParser {
    sheets: Arc<dyn SheetDecoder>,
}

impl Default for TabularParser {
    fn default() -> Self {
        Self::new(Arc::new(CalamineDecoder))
    }
}

impl TabularParser {
    pub fn new(sheets: Arc<dyn SheetDecoder>) -> Self {
        Self { sheets }
    }

    /// Load a table from a file.  Dispatch by extension.
    ///
    /// Supported formats:
    /// * `.csv` / `.txt`               – comma-separated text, first line is the header
    /// * `.xlsx` / `.xlsm` / `.xls` / `.ods` – first sheet, first row is the header
    /// * `.parquet` / `.pq`            – column names are the header
    pub fn load_file(&self, path: &Path) -> Result<Table> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let table = match ext.as_str() {
            "csv" | "txt" => {
                let text = std::fs::read_to_string(path)?;
                self.parse_delimited(&text)?
            }
            "xlsx" | "xlsm" | "xls" | "ods" => {
                let bytes = std::fs::read(path)?;
                self.parse_spreadsheet(&bytes)?
            }
            "parquet" | "pq" => self.parse_parquet(path)?,
            other => {
                return Err(PipelineError::malformed(format!(
                    "unsupported file type: .{other}"
                )))
            }
        };

        log::info!(
            "Parsed {} with {} columns and {} data rows",
            path.display(),
            table.0.len(),
            table.1.len()
        );
        Ok(table)
    }

    /// Comma-separated text. Blank lines are dropped and every remaining
    /// line is split on its own, so an unbalanced quote never reaches past
    /// the line it sits on.
    pub fn parse_delimited(&self, content: &str) -> Result<Table> {
        let lines: Vec<Vec<String>> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(split_line)
            .collect();
        split_header(lines)
    }

    /// First sheet of a binary workbook, decoded by the injected decoder.
    pub fn parse_spreadsheet(&self, bytes: &[u8]) -> Result<Table> {
        let rows: Vec<Vec<String>> = self
            .sheets
            .first_sheet(bytes)?
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.trim().to_string()).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .collect();

        if rows.len() < 2 {
            return Err(PipelineError::malformed(
                "spreadsheet needs a header row and at least one data row",
            ));
        }
        split_header(rows)
    }

    /// Every column of a Parquet file, each cell rendered as text.
    pub fn parse_parquet(&self, path: &Path) -> Result<Table> {
        let file = std::fs::File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| PipelineError::malformed(format!("reading parquet metadata: {e}")))?;
        let headers: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().trim().to_string())
            .collect();
        let reader = builder
            .build()
            .map_err(|e| PipelineError::malformed(format!("building parquet reader: {e}")))?;

        let mut rows = Vec::new();
        for batch_result in reader {
            let batch = batch_result
                .map_err(|e| PipelineError::malformed(format!("reading parquet record batch: {e}")))?;
            for row in 0..batch.num_rows() {
                let cells: Vec<String> = batch
                    .columns()
                    .iter()
                    .map(|col| cell_to_string(col, row))
                    .collect();
                rows.push(cells);
            }
        }

        if rows.is_empty() {
            return Err(PipelineError::malformed("parquet file has no data rows"));
        }
        Ok((headers, rows))
    }
}

/// Split one line on commas. A field whose first non-blank character is `"`
/// is quoted: commas inside it are literal, `""` is an escaped quote and its
/// inner whitespace is kept. Unquoted fields are trimmed. An unterminated
/// quote runs to the end of the line.
fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                c => cell.push(c),
            }
            continue;
        }
        match c {
            ',' => cells.push(finish_cell(&mut cell, &mut quoted)),
            '"' if !quoted && cell.trim().is_empty() => {
                cell.clear();
                quoted = true;
                in_quotes = true;
            }
            // padding after a closing quote
            c if quoted && c.is_whitespace() => {}
            c => cell.push(c),
        }
    }
    cells.push(finish_cell(&mut cell, &mut quoted));
    cells
}

fn finish_cell(cell: &mut String, quoted: &mut bool) -> String {
    let text = std::mem::take(cell);
    if std::mem::replace(quoted, false) {
        text
    } else {
        text.trim().to_string()
    }
}

fn split_header(mut lines: Vec<Vec<String>>) -> Result<Table> {
    if lines.len() < 2 {
        return Err(PipelineError::malformed(
            "need a header line and at least one data line",
        ));
    }
    let rows = lines.split_off(1);
    let headers = lines.remove(0);
    Ok((headers, rows))
}

// -- Arrow helpers --

/// Render one Arrow cell as text. Nulls become empty strings.
fn cell_to_string(col: &Arc<dyn Array>, row: usize) -> String {
    if col.is_null(row) {
        return String::new();
    }
    match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|s| s.value(row).trim().to_string())
            .unwrap_or_default(),
        DataType::LargeUtf8 => col.as_string::<i64>().value(row).trim().to_string(),
        DataType::Int32 => col.as_primitive::<Int32Type>().value(row).to_string(),
        DataType::Int64 => col.as_primitive::<Int64Type>().value(row).to_string(),
        DataType::Float32 => col.as_primitive::<Float32Type>().value(row).to_string(),
        DataType::Float64 => col.as_primitive::<Float64Type>().value(row).to_string(),
        DataType::Boolean => col
            .as_any()
            .downcast_ref::<BooleanArray>()
            .map(|b| if b.value(row) { "1" } else { "0" }.to_string())
            .unwrap_or_default(),
        other => {
            log::debug!("Unsupported parquet column type {other:?}; treating as empty");
            String::new()
        }
    }
}
