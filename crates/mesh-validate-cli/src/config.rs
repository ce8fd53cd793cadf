//! Configuration file for the command-line runner.
//!
//! ```toml
//! [validate_bed_mesh]
//! speed = 80.0
//! horizontal_move_z = 5.0
//!
//! [simulation]
//! mesh_min = { x = 10.0, y = 10.0 }
//! mesh_max = { x = 190.0, y = 190.0 }
//! actual_bed = { offset = 0.02, slope_x = 0.0001 }
//! ```
//!
//! Both sections are optional; missing keys take their defaults.

use std::path::Path;

use anyhow::{Context, Result};
use mesh_validate_core::sim::SimulationConfig;
use mesh_validate_core::ValidatorConfig;
use serde::Deserialize;

/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV: &str = "MESH_VALIDATE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub validate_bed_mesh: ValidatorConfig,
    pub simulation: SimulationConfig,
}

impl CliConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(input).context("Malformed configuration file")?;
        config
            .validate_bed_mesh
            .validate()
            .context("Invalid [validate_bed_mesh] section")?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("Failed to load config {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_validate_core::sim::SurfacePlane;
    use mesh_validate_core::Point2;
    use std::io::Write;

    #[test]
    fn test_missing_path_gives_defaults() {
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
    }

    #[test]
    fn test_load_both_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[validate_bed_mesh]
speed = 80.0
remesh = false

[simulation]
mesh_max = {{ x = 180.0, y = 220.0 }}
actual_bed = {{ offset = 0.02 }}
probe_name = "probe_air"
"#
        )
        .unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.validate_bed_mesh.speed, 80.0);
        assert!(!config.validate_bed_mesh.remesh);
        assert_eq!(config.validate_bed_mesh.deviation, 0.05);
        assert_eq!(config.simulation.mesh_max, Point2::new(180.0, 220.0));
        assert_eq!(config.simulation.actual_bed, SurfacePlane::flat(0.02));
        assert_eq!(config.simulation.probe_name, "probe_air");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = CliConfig::from_toml_str("[simulation]\nbed_size = 3\n").unwrap_err();
        assert!(format!("{err:#}").contains("bed_size"));
    }

    #[test]
    fn test_invalid_validator_section_is_rejected() {
        let err = CliConfig::from_toml_str("[validate_bed_mesh]\ndeviation = -1.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("validate_bed_mesh"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = CliConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }
}
