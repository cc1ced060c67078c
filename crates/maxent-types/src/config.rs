// ─────────────────────────────────────────────────────────────────────
// SCPN MaxEnt Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::{
    DEFAULT_CHI_TOLERANCE, DEFAULT_FACFAKE, DEFAULT_FACTOR, DEFAULT_MAX_ITERATIONS,
    DEFAULT_POSITIVITY_FRACTION, DEFAULT_TEST_TOLERANCE,
};
use crate::error::{MaxEntError, MaxEntResult};
use serde::{Deserialize, Serialize};

/// Reconstruction controls.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxEntConfig {
    /// Iteration cap. The loop stops with `MaxIterReached` once this many
    /// iterations have run.
    pub max_iterations: usize,
    /// Hold the total flux of the spectrum constant (normalised to 1).
    pub preserve_flux: bool,
    /// Override for the representative default-model level. Defaults to
    /// the mean of the default model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blank: Option<f64>,
    /// Convergence threshold on the gradient-angle diagnostic.
    pub test_tolerance: f64,
    /// Convergence threshold on |chisq/chizer - 1|.
    pub chi_tolerance: f64,
    /// Positivity floor, as a fraction of blank.
    pub positivity_fraction: f64,
    /// Trust-region scale for a fresh run.
    pub initial_factor: f64,
    /// Chi-target approach fraction for a fresh run.
    pub initial_facfake: f64,
    /// Admit zero-valued default-model bins (negatives are still rejected).
    /// The undefined entropy gradient there is reported as a warning.
    pub admit_zero_base: bool,
}

impl Default for MaxEntConfig {
    fn default() -> Self {
        MaxEntConfig {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            preserve_flux: false,
            blank: None,
            test_tolerance: DEFAULT_TEST_TOLERANCE,
            chi_tolerance: DEFAULT_CHI_TOLERANCE,
            positivity_fraction: DEFAULT_POSITIVITY_FRACTION,
            initial_factor: DEFAULT_FACTOR,
            initial_facfake: DEFAULT_FACFAKE,
            admit_zero_base: false,
        }
    }
}

fn positive_finite(name: &str, value: f64) -> MaxEntResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(MaxEntError::Config(format!(
            "{name} must be finite and > 0, got {value}"
        )));
    }
    Ok(())
}

impl MaxEntConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> MaxEntResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> MaxEntResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MaxEntResult<()> {
        if self.max_iterations == 0 {
            return Err(MaxEntError::Config(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if let Some(blank) = self.blank {
            positive_finite("blank", blank)?;
        }
        positive_finite("test_tolerance", self.test_tolerance)?;
        positive_finite("chi_tolerance", self.chi_tolerance)?;
        positive_finite("positivity_fraction", self.positivity_fraction)?;
        if self.positivity_fraction >= 1.0 {
            return Err(MaxEntError::Config(
                "positivity_fraction must be < 1".to_string(),
            ));
        }
        positive_finite("initial_factor", self.initial_factor)?;
        if !self.initial_facfake.is_finite()
            || self.initial_facfake <= 0.0
            || self.initial_facfake > 1.0
        {
            return Err(MaxEntError::Config(
                "initial_facfake must be finite and in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = MaxEntConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_iterations, 100);
        assert!(!cfg.preserve_flux);
        assert!((cfg.initial_factor - 0.1).abs() < 1e-15);
        assert!((cfg.initial_facfake - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = MaxEntConfig::from_json_str(r#"{ "max_iterations": 7, "preserve_flux": true }"#)
            .unwrap();
        assert_eq!(cfg.max_iterations, 7);
        assert!(cfg.preserve_flux);
        assert_eq!(cfg.blank, None);
        assert!((cfg.test_tolerance - 0.02).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = MaxEntConfig::from_json_str(r#"{ "max_iterations": 0 }"#).unwrap_err();
        assert!(matches!(err, MaxEntError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_blank_and_facfake() {
        let cfg = MaxEntConfig {
            blank: Some(-1.0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = MaxEntConfig {
            initial_facfake: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = MaxEntConfig {
            positivity_fraction: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = MaxEntConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, MaxEntError::Json(_)));
        assert!(!err.is_invalid_input());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MaxEntConfig::from_file("/nonexistent/maxent.json").unwrap_err();
        assert!(matches!(err, MaxEntError::Io(_)));
    }

    #[test]
    fn test_roundtrip_serialization() {
        let cfg = MaxEntConfig {
            max_iterations: 25,
            blank: Some(0.3),
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2 = MaxEntConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, cfg2);
    }
}
