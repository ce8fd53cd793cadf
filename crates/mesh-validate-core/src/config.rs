//! Static validator configuration.
//!
//! Loaded once at startup from the `[validate_bed_mesh]` section of the
//! printer configuration. Per-command overrides are resolved separately by
//! [`crate::params`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidateError};

/// Configuration for the bed mesh validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Horizontal travel speed (mm/s). Must be positive.
    pub speed: f64,

    /// Z height considered safe for horizontal travel (mm).
    pub horizontal_move_z: f64,

    /// Default maximum allowed absolute deviation (mm). Must be positive.
    pub deviation: f64,

    /// Whether a breach triggers a remesh by default.
    pub remesh: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            speed: 50.0,
            horizontal_move_z: 3.0,
            deviation: 0.05,
            remesh: true,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    validate_bed_mesh: ValidatorConfig,
}

impl ValidatorConfig {
    /// Check value bounds.
    pub fn validate(&self) -> Result<()> {
        if self.speed.is_nan() || self.speed <= 0.0 {
            return Err(ValidateError::InvalidConfig(format!(
                "speed must be above 0, got {}",
                self.speed
            )));
        }
        if self.deviation.is_nan() || self.deviation <= 0.0 {
            return Err(ValidateError::InvalidConfig(format!(
                "deviation must be above 0, got {}",
                self.deviation
            )));
        }
        if !self.horizontal_move_z.is_finite() {
            return Err(ValidateError::InvalidConfig(
                "horizontal_move_z must be a finite number".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse the `[validate_bed_mesh]` table out of a TOML document.
    ///
    /// A document without the table yields the defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(input).map_err(|e| ValidateError::InvalidConfig(e.to_string()))?;
        file.validate_bed_mesh.validate()?;
        Ok(file.validate_bed_mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.speed, 50.0);
        assert_eq!(config.horizontal_move_z, 3.0);
        assert_eq!(config.deviation, 0.05);
        assert!(config.remesh);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_section() {
        let config = ValidatorConfig::from_toml_str(
            r#"
            [validate_bed_mesh]
            speed = 120.0
            remesh = false
            "#,
        )
        .expect("parse");
        assert_eq!(config.speed, 120.0);
        assert!(!config.remesh);
        assert_eq!(config.horizontal_move_z, 3.0);
        assert_eq!(config.deviation, 0.05);
    }

    #[test]
    fn test_from_toml_missing_section_uses_defaults() {
        let config = ValidatorConfig::from_toml_str("[other]\nkey = 1\n").expect("parse");
        assert_eq!(config, ValidatorConfig::default());
    }

    #[test]
    fn test_non_positive_speed_rejected() {
        let err = ValidatorConfig::from_toml_str("[validate_bed_mesh]\nspeed = 0.0\n")
            .expect_err("zero speed");
        assert!(matches!(err, ValidateError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ValidatorConfig::from_toml_str("[validate_bed_mesh]\nsped = 10.0\n")
            .expect_err("typo");
        assert!(err.to_string().contains("sped"));
    }
}
