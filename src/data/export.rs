use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::loader::Table;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a table to a file.  Dispatch by extension.
///
/// * `.csv`             – header line plus one line per row
/// * `.parquet` / `.pq` – one column per header; columns whose non-empty cells
///   all parse as numbers are stored as Float64, the rest as Utf8
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => write_csv(path, table),
        "parquet" | "pq" => write_parquet(path, table),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

fn write_csv(path: &Path, (headers, rows): &Table) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    writer.write_record(headers).context("writing CSV header")?;
    for (row_no, row) in rows.iter().enumerate() {
        writer
            .write_record(row)
            .with_context(|| format!("writing CSV row {row_no}"))?;
    }
    writer.flush().context("flushing CSV file")?;
    Ok(())
}

fn write_parquet(path: &Path, (headers, rows): &Table) -> Result<()> {
    let mut fields = Vec::with_capacity(headers.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(headers.len());

    for (col, name) in headers.iter().enumerate() {
        let cells: Vec<&str> = rows
            .iter()
            .map(|r| r.get(col).map(String::as_str).unwrap_or(""))
            .collect();
        let numeric = cells.iter().all(|c| c.is_empty() || c.parse::<f64>().is_ok());

        if numeric {
            let values: Float64Array = cells.iter().map(|c| c.parse::<f64>().ok()).collect();
            fields.push(Field::new(name, DataType::Float64, true));
            columns.push(Arc::new(values));
        } else {
            let values = StringArray::from(cells);
            fields.push(Field::new(name, DataType::Utf8, true));
            columns.push(Arc::new(values));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
