use std::collections::HashMap;

use super::model::{
    Disease, EncodedDataset, FeatureVector, FieldKind, Label, Record, DIAGNOSIS_COLUMN,
    FEATURE_COUNT, ID_COLUMN, SCHEMA,
};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Row filter: which parsed rows are worth encoding
// ---------------------------------------------------------------------------

/// A row is kept when it has at least one non-empty cell and at least as many
/// cells as there are headers. Trailing empty cells do not count, so `40,,`
/// under three headers is a short row.
pub fn is_usable_row(row: &[String], header_count: usize) -> bool {
    let filled = row
        .iter()
        .rposition(|c| !c.trim().is_empty())
        .map_or(0, |last| last + 1);
    filled > 0 && filled >= header_count
}

// ---------------------------------------------------------------------------
// Column resolution
// ---------------------------------------------------------------------------

/// Header positions resolved once per table.
struct ColumnMap {
    /// `schema position → column index`, `None` when the header is absent.
    fields: [Option<usize>; FEATURE_COUNT],
    diagnosis: Option<usize>,
    id: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Self {
        let mut by_name: HashMap<String, usize> = HashMap::with_capacity(headers.len());
        for (idx, h) in headers.iter().enumerate() {
            // First occurrence wins on duplicate headers.
            by_name.entry(h.trim().to_lowercase()).or_insert(idx);
        }

        let mut fields = [None; FEATURE_COUNT];
        for (slot, field) in fields.iter_mut().zip(SCHEMA.iter()) {
            *slot = by_name.get(field.name).copied();
        }

        ColumnMap {
            fields,
            diagnosis: by_name.get(DIAGNOSIS_COLUMN).copied(),
            id: by_name.get(ID_COLUMN).copied(),
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureEncoder
// ---------------------------------------------------------------------------

/// Maps named columns onto the fixed 53-slot feature layout.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    /// Lowercased values of `residence` that count as urban.
    urban_aliases: Vec<String>,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self::new(&["urban".to_string()])
    }
}

impl FeatureEncoder {
    pub fn new(urban_aliases: &[String]) -> Self {
        let mut aliases: Vec<String> = urban_aliases.iter().map(|a| a.trim().to_lowercase()).collect();
        if !aliases.iter().any(|a| a == "urban") {
            aliases.push("urban".to_string());
        }
        Self { urban_aliases: aliases }
    }

    /// Encode a parsed table. Fails with [`PipelineError::EmptyDataset`] when
    /// no row survives filtering.
    pub fn encode(&self, headers: &[String], rows: &[Vec<String>]) -> Result<EncodedDataset> {
        let columns = ColumnMap::resolve(headers);
        let has_labels = columns.diagnosis.is_some();

        let mut out = EncodedDataset {
            has_labels,
            ..Default::default()
        };
        let mut skipped = 0usize;

        for (row_no, row) in rows.iter().enumerate() {
            if !is_usable_row(row, headers.len()) {
                skipped += 1;
                continue;
            }

            out.features.push(self.encode_row(&columns, row));

            if let Some(idx) = columns.diagnosis {
                out.labels.push(diagnosis_label(&row[idx]));
            }

            let id = columns
                .id
                .map(|idx| row[idx].trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| (row_no + 1).to_string());
            out.ids.push(id);
        }
        out.row_count = out.features.len();

        if skipped > 0 {
            log::warn!("Skipped {skipped} empty or short rows while encoding");
        }
        if out.row_count == 0 {
            return Err(PipelineError::EmptyDataset);
        }
        log::debug!(
            "Encoded {} rows ({} labelled)",
            out.row_count,
            if has_labels { out.row_count } else { 0 }
        );
        Ok(out)
    }

    /// Encode a single record through the same rules as a table row.
    pub fn encode_record(&self, record: &Record) -> Result<FeatureVector> {
        let (headers, rows) = record.to_table();
        let columns = ColumnMap::resolve(&headers);
        let row = rows.first().ok_or(PipelineError::EmptyDataset)?;
        Ok(self.encode_row(&columns, row))
    }

    fn encode_row(&self, columns: &ColumnMap, row: &[String]) -> FeatureVector {
        let mut features = [0.0; FEATURE_COUNT];
        for (pos, field) in SCHEMA.iter().enumerate() {
            let Some(idx) = columns.fields[pos] else {
                continue;
            };
            let raw = row.get(idx).map(|c| c.trim()).unwrap_or("");
            features[pos] = match field.kind {
                FieldKind::Numeric => parse_number(raw),
                FieldKind::Flag => {
                    if parse_number(raw) != 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                FieldKind::Gender => {
                    if raw.eq_ignore_ascii_case("m") {
                        1.0
                    } else {
                        0.0
                    }
                }
                FieldKind::Residence => {
                    let value = raw.to_lowercase();
                    if self.urban_aliases.iter().any(|a| *a == value) {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
        }
        features
    }
}

/// Non-numeric, empty and non-finite values all become 0.
fn parse_number(raw: &str) -> f64 {
    raw.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Unrecognised diagnosis text falls back to label 0.
fn diagnosis_label(raw: &str) -> Label {
    match Disease::parse(raw) {
        Some(d) => d.label(),
        None => {
            log::debug!("Unrecognised diagnosis '{raw}', defaulting to {}", Disease::Dengue);
            Disease::Dengue.label()
        }
    }
}
