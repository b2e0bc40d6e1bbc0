//! Synthetic training cohort.
//!
//! Every class shares the same demographic and baseline laboratory ranges;
//! the symptom probabilities and a handful of lab ranges carry the class
//! signal. The shapes are modelling choices, not clinical reference values.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::model::{
    field_index, Disease, FeatureVector, FieldKind, Label, CLASS_COUNT, DIAGNOSIS_COLUMN,
    FEATURE_COUNT, SCHEMA,
};
use crate::data::loader::Table;

/// Symptom probabilities used by every class unless overridden.
const BASELINE_SYMPTOM_RATE: f64 = 0.1;

/// `(field, probability)` per occupation flag, independent of class.
const OCCUPATION_RATES: [(&str, f64); 7] = [
    ("occupation_farmer", 0.25),
    ("occupation_laborer", 0.20),
    ("occupation_student", 0.15),
    ("occupation_healthcare_worker", 0.05),
    ("occupation_office_worker", 0.15),
    ("occupation_homemaker", 0.15),
    ("occupation_other", 0.10),
];

const DENGUE_SYMPTOMS: &[(&str, f64)] = &[
    ("fever", 0.95),
    ("headache", 0.85),
    ("weakness", 0.80),
    ("rash", 0.60),
    ("arthralgia", 0.70),
    ("myalgia", 0.75),
    ("eye_pain", 0.60),
    ("hemorrhage", 0.30),
    ("petechiae", 0.40),
    ("chills", 0.30),
    ("vomiting", 0.30),
    ("nausea", 0.35),
    ("abdominal_pain", 0.25),
];

const MALARIA_SYMPTOMS: &[(&str, f64)] = &[
    ("fever", 0.99),
    ("chills", 0.85),
    ("headache", 0.60),
    ("weakness", 0.60),
    ("myalgia", 0.40),
    ("vomiting", 0.55),
    ("nausea", 0.50),
    ("dizziness", 0.50),
    ("abdominal_pain", 0.45),
    ("rash", 0.05),
    ("eye_pain", 0.05),
    ("hemorrhage", 0.05),
    ("petechiae", 0.05),
];

const LEPTOSPIROSIS_SYMPTOMS: &[(&str, f64)] = &[
    ("fever", 0.90),
    ("headache", 0.75),
    ("myalgia", 0.80),
    ("chills", 0.55),
    ("vomiting", 0.50),
    ("nausea", 0.40),
    ("jaundice", 0.45),
    ("weakness", 0.60),
    ("arthralgia", 0.30),
    ("abdominal_pain", 0.35),
    ("diarrhea", 0.25),
    ("petechiae", 0.05),
];

/// Class-independent `(field, low, high)` laboratory ranges.
const BASELINE_LABS: [(&str, f64, f64); 24] = [
    ("hematocrit", 30.0, 50.0),
    ("hemoglobin", 10.0, 17.0),
    ("wbc_count", 3.0, 12.0),
    ("rbc_count", 3.5, 6.0),
    ("platelet_count", 150.0, 400.0),
    ("mcv", 80.0, 100.0),
    ("mch", 27.0, 33.0),
    ("mchc", 32.0, 36.0),
    ("neutrophils_pct", 40.0, 75.0),
    ("lymphocytes_pct", 20.0, 45.0),
    ("monocytes_pct", 2.0, 10.0),
    ("eosinophils_pct", 1.0, 6.0),
    ("basophils_pct", 0.0, 2.0),
    ("ast", 10.0, 40.0),
    ("alt", 7.0, 40.0),
    ("alkaline_phosphatase", 40.0, 130.0),
    ("total_bilirubin", 0.2, 1.2),
    ("direct_bilirubin", 0.05, 0.3),
    ("indirect_bilirubin", 0.0, 0.0),
    ("urea", 10.0, 50.0),
    ("creatinine", 0.5, 1.3),
    ("total_protein", 6.0, 8.3),
    ("albumin", 3.5, 5.0),
    ("globulin", 2.0, 3.5),
];

const DENGUE_LABS: &[(&str, f64, f64)] = &[("platelet_count", 50.0, 200.0)];

const MALARIA_LABS: &[(&str, f64, f64)] = &[
    ("platelet_count", 80.0, 200.0),
    ("total_bilirubin", 0.5, 2.5),
];

const LEPTOSPIROSIS_LABS: &[(&str, f64, f64)] = &[
    ("ast", 30.0, 130.0),
    ("alt", 30.0, 130.0),
    ("total_bilirubin", 1.0, 4.0),
];

fn symptom_profile(disease: Disease) -> &'static [(&'static str, f64)] {
    match disease {
        Disease::Dengue => DENGUE_SYMPTOMS,
        Disease::Malaria => MALARIA_SYMPTOMS,
        Disease::Leptospirosis => LEPTOSPIROSIS_SYMPTOMS,
    }
}

fn lab_profile(disease: Disease) -> &'static [(&'static str, f64, f64)] {
    match disease {
        Disease::Dengue => DENGUE_LABS,
        Disease::Malaria => MALARIA_LABS,
        Disease::Leptospirosis => LEPTOSPIROSIS_LABS,
    }
}

// ---------------------------------------------------------------------------
// CohortGenerator
// ---------------------------------------------------------------------------

/// Seeded generator of labelled synthetic patients.
pub struct CohortGenerator {
    rng: StdRng,
}

impl CohortGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `count` records with a near-equal share of every class.
    pub fn generate(&mut self, count: usize) -> (Vec<FeatureVector>, Vec<Label>) {
        let labels = self.balanced_labels(count);
        let features = labels
            .iter()
            .map(|&label| {
                let disease = Disease::from_label(label).unwrap_or(Disease::Dengue);
                self.patient(disease)
            })
            .collect();
        log::info!("Generated synthetic cohort of {count} patients");
        (features, labels)
    }

    /// `count / 3` labels per class, remainder to the lowest classes, shuffled.
    pub fn balanced_labels(&mut self, count: usize) -> Vec<Label> {
        let per_class = count / CLASS_COUNT;
        let remainder = count % CLASS_COUNT;
        let mut labels: Vec<Label> = (0..CLASS_COUNT)
            .flat_map(|class| {
                let n = per_class + usize::from(class < remainder);
                std::iter::repeat(class).take(n)
            })
            .collect();
        labels.shuffle(&mut self.rng);
        labels
    }

    /// Render a cohort as a text table, the same shape the parser produces.
    pub fn generate_table(&mut self, count: usize) -> Table {
        let (features, labels) = self.generate(count);

        let mut headers: Vec<String> = SCHEMA.iter().map(|f| f.name.to_string()).collect();
        headers.push(DIAGNOSIS_COLUMN.to_string());

        let rows = features
            .iter()
            .zip(&labels)
            .map(|(v, &label)| {
                let mut row: Vec<String> = SCHEMA
                    .iter()
                    .zip(v.iter())
                    .map(|(field, &x)| match field.kind {
                        FieldKind::Gender => (if x == 1.0 { "M" } else { "F" }).to_string(),
                        FieldKind::Residence => (if x == 1.0 { "urban" } else { "rural" }).to_string(),
                        FieldKind::Flag => format!("{x:.0}"),
                        FieldKind::Numeric => format_value(x),
                    })
                    .collect();
                row.push(
                    Disease::from_label(label)
                        .unwrap_or(Disease::Dengue)
                        .name()
                        .to_string(),
                );
                row
            })
            .collect();

        (headers, rows)
    }

    fn patient(&mut self, disease: Disease) -> FeatureVector {
        let rng = &mut self.rng;
        let mut v = [0.0; FEATURE_COUNT];

        set(&mut v, "age", rng.gen_range(20..=70) as f64);
        set(&mut v, "gender", bernoulli(rng, 0.5));
        set(&mut v, "residence", bernoulli(rng, 0.5));
        set(&mut v, "hospitalization_days", rng.gen_range(1..=11) as f64);
        let temperature: f64 = rng.gen_range(36.0..=41.0);
        set(&mut v, "body_temperature", (temperature * 10.0).round() / 10.0);

        for (name, p) in OCCUPATION_RATES {
            set(&mut v, name, bernoulli(rng, p));
        }

        let symptoms = symptom_profile(disease);
        for field in SCHEMA.iter().skip(12).filter(|f| f.kind == FieldKind::Flag) {
            let p = symptoms
                .iter()
                .find(|(name, _)| *name == field.name)
                .map_or(BASELINE_SYMPTOM_RATE, |(_, p)| *p);
            set(&mut v, field.name, bernoulli(rng, p));
        }

        let labs = lab_profile(disease);
        for (name, low, high) in BASELINE_LABS {
            let (low, high) = labs
                .iter()
                .find(|(n, _, _)| *n == name)
                .map_or((low, high), |(_, l, h)| (*l, *h));
            let value = if high > low { rng.gen_range(low..high) } else { low };
            set(&mut v, name, round2(value));
        }

        // Indirect bilirubin is derived, never sampled.
        let total = get(&v, "total_bilirubin");
        let direct = get(&v, "direct_bilirubin").min(total);
        set(&mut v, "direct_bilirubin", direct);
        set(&mut v, "indirect_bilirubin", round2(total - direct));

        v
    }
}

fn set(v: &mut FeatureVector, name: &str, value: f64) {
    if let Some(pos) = field_index(name) {
        v[pos] = value;
    }
}

fn get(v: &FeatureVector, name: &str) -> f64 {
    field_index(name).map_or(0.0, |pos| v[pos])
}

fn bernoulli(rng: &mut StdRng, p: f64) -> f64 {
    if rng.gen_bool(p.clamp(0.0, 1.0)) {
        1.0
    } else {
        0.0
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn format_value(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{x:.0}")
    } else {
        x.to_string()
    }
}
