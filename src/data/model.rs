use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Schema – the fixed, ordered list of patient fields
// ---------------------------------------------------------------------------

/// How a schema field's raw text is turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free numeric value (age, lab results, ...).
    Numeric,
    /// One-hot occupation or symptom flag, always coded 0 or 1.
    Flag,
    /// `M` → 1, anything else → 0.
    Gender,
    /// `urban` (or a configured alias) → 1, anything else → 0.
    Residence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Number of features in every encoded record.
pub const FEATURE_COUNT: usize = 53;

/// Field order defines feature-vector position.
pub const SCHEMA: [FieldSpec; FEATURE_COUNT] = {
    use FieldKind::*;
    [
        // Demographics
        field("age", Numeric),
        field("gender", Gender),
        field("residence", Residence),
        field("hospitalization_days", Numeric),
        field("body_temperature", Numeric),
        // Occupation
        field("occupation_farmer", Flag),
        field("occupation_laborer", Flag),
        field("occupation_student", Flag),
        field("occupation_healthcare_worker", Flag),
        field("occupation_office_worker", Flag),
        field("occupation_homemaker", Flag),
        field("occupation_other", Flag),
        // Symptoms
        field("fever", Flag),
        field("chills", Flag),
        field("headache", Flag),
        field("weakness", Flag),
        field("myalgia", Flag),
        field("arthralgia", Flag),
        field("eye_pain", Flag),
        field("rash", Flag),
        field("hemorrhage", Flag),
        field("petechiae", Flag),
        field("vomiting", Flag),
        field("nausea", Flag),
        field("dizziness", Flag),
        field("abdominal_pain", Flag),
        field("diarrhea", Flag),
        field("jaundice", Flag),
        field("cough", Flag),
        // Complete blood count
        field("hematocrit", Numeric),
        field("hemoglobin", Numeric),
        field("wbc_count", Numeric),
        field("rbc_count", Numeric),
        field("platelet_count", Numeric),
        field("mcv", Numeric),
        field("mch", Numeric),
        field("mchc", Numeric),
        field("neutrophils_pct", Numeric),
        field("lymphocytes_pct", Numeric),
        field("monocytes_pct", Numeric),
        field("eosinophils_pct", Numeric),
        field("basophils_pct", Numeric),
        // Liver panel
        field("ast", Numeric),
        field("alt", Numeric),
        field("alkaline_phosphatase", Numeric),
        field("total_bilirubin", Numeric),
        field("direct_bilirubin", Numeric),
        field("indirect_bilirubin", Numeric),
        // Renal / protein panel
        field("urea", Numeric),
        field("creatinine", Numeric),
        field("total_protein", Numeric),
        field("albumin", Numeric),
        field("globulin", Numeric),
    ]
};

/// Column carrying the ground-truth diagnosis, when present.
pub const DIAGNOSIS_COLUMN: &str = "diagnosis";

/// Optional column carrying a caller-supplied record id.
pub const ID_COLUMN: &str = "id";

/// Position of a schema field by exact (lowercase) name.
pub fn field_index(name: &str) -> Option<usize> {
    SCHEMA.iter().position(|f| f.name == name)
}

// ---------------------------------------------------------------------------
// Feature vectors and labels
// ---------------------------------------------------------------------------

/// One encoded record. The length is fixed by the schema.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Class id: 0 = dengue, 1 = malaria, 2 = leptospirosis.
pub type Label = usize;

pub const CLASS_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disease {
    Dengue,
    Malaria,
    Leptospirosis,
}

impl Disease {
    pub const ALL: [Disease; CLASS_COUNT] = [Disease::Dengue, Disease::Malaria, Disease::Leptospirosis];

    pub fn from_label(label: Label) -> Option<Disease> {
        Self::ALL.get(label).copied()
    }

    pub fn label(self) -> Label {
        self as Label
    }

    pub fn name(self) -> &'static str {
        match self {
            Disease::Dengue => "dengue",
            Disease::Malaria => "malaria",
            Disease::Leptospirosis => "leptospirosis",
        }
    }

    /// Case-insensitive lookup of a canonical disease name.
    pub fn parse(text: &str) -> Option<Disease> {
        let needle = text.trim().to_lowercase();
        Self::ALL.iter().copied().find(|d| d.name() == needle)
    }
}

impl fmt::Display for Disease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Display name for a label, falling back to the raw id.
pub fn label_name(label: Label) -> String {
    Disease::from_label(label)
        .map(|d| d.name().to_string())
        .unwrap_or_else(|| format!("class {label}"))
}

// ---------------------------------------------------------------------------
// Record – a single patient input for one-off inference
// ---------------------------------------------------------------------------

/// Raw field values for one patient, keyed by (lowercased) field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub values: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.trim().to_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Parse `name=value` pairs, e.g. from the command line.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut record = Record::new();
        for pair in pairs {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| PipelineError::malformed(format!("expected name=value, got '{pair}'")))?;
            record.set(name, value.trim());
        }
        Ok(record)
    }

    /// Build a record from a flat JSON object. Numbers and booleans are kept
    /// as their textual form; nulls become empty strings.
    pub fn from_json(text: &str) -> Result<Self> {
        let root: JsonValue = serde_json::from_str(text)
            .map_err(|e| PipelineError::malformed(format!("parsing record JSON: {e}")))?;
        let obj = root
            .as_object()
            .ok_or_else(|| PipelineError::malformed("expected a JSON object for the record"))?;

        let mut record = Record::new();
        for (key, val) in obj {
            let text = match val {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
                JsonValue::Null => String::new(),
                other => other.to_string(),
            };
            record.set(key, text);
        }
        Ok(record)
    }

    /// Lay the record out as a one-row table so it shares the batch encoder.
    pub fn to_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let headers: Vec<String> = self.values.keys().cloned().collect();
        let row: Vec<String> = self.values.values().cloned().collect();
        (headers, vec![row])
    }
}

// ---------------------------------------------------------------------------
// EncodedDataset – output of the feature encoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct EncodedDataset {
    pub features: Vec<FeatureVector>,
    /// One label per row when `has_labels`, otherwise empty.
    pub labels: Vec<Label>,
    pub has_labels: bool,
    pub row_count: usize,
    /// One id per row: the `id` column value or the 1-based data-row number.
    pub ids: Vec<String>,
}

impl EncodedDataset {
    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}
