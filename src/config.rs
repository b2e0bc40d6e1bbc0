use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::inference::calibration::{CalibrationStrategy, Calibrator, DEFAULT_DEMO_CONFIDENCE_FLOOR};
use crate::inference::classifier::SoftmaxConfig;

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Tunables for a session. Every field has a default, so a config file only
/// needs the keys it changes. Unknown keys are rejected; the calibration
/// temperature in particular is not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Size of the synthetic cohort used when no training file is given.
    pub synthetic_samples: usize,
    /// Seed for the synthetic cohort and the demo label assignment.
    pub seed: u64,
    /// Extra `residence` values, besides `urban`, that count as urban.
    pub urban_aliases: Vec<String>,
    pub calibration: CalibrationStrategy,
    pub demo_confidence_floor: f64,
    pub classifier: SoftmaxConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            synthetic_samples: 1500,
            seed: 42,
            urban_aliases: vec!["urban".to_string()],
            calibration: CalibrationStrategy::Temperature,
            demo_confidence_floor: DEFAULT_DEMO_CONFIDENCE_FLOOR,
            classifier: SoftmaxConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| PipelineError::Config(format!("parsing config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.synthetic_samples < 3 {
            return Err(PipelineError::Config(
                "synthetic_samples must be at least 3 so every class is present".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.demo_confidence_floor) {
            return Err(PipelineError::Config(
                "demo_confidence_floor must lie in [0, 1]".to_string(),
            ));
        }
        if self.classifier.epochs == 0 {
            return Err(PipelineError::Config("classifier.epochs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn calibrator(&self) -> Calibrator {
        Calibrator::new(self.calibration, self.demo_confidence_floor, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::calibration::DEFAULT_TEMPERATURE;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"calibration": "demo", "classifier": {"epochs": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.calibration, CalibrationStrategy::Demo);
        assert_eq!(config.classifier.epochs, 10);
        assert_eq!(config.classifier.learning_rate, SoftmaxConfig::default().learning_rate);
        assert_eq!(config.synthetic_samples, 1500);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"synthetic_samples": 2}"#),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(PipelineConfig::from_json("{"), Err(PipelineError::Config(_))));
    }

    #[test]
    fn temperature_key_is_rejected() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"temperature": 0.25}"#),
            Err(PipelineError::Config(msg)) if msg.contains("temperature")
        ));
        assert_eq!(PipelineConfig::default().calibrator().temperature(), DEFAULT_TEMPERATURE);
    }

    #[test]
    fn default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert_eq!(PipelineConfig::default().calibrator().strategy, CalibrationStrategy::Temperature);
    }
}
