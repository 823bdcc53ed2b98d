//! Localizer parameters
//!
//! Parameters come from a TOML file (see `config/mcl_params.toml`) and may be
//! overridden afterwards from a flat name/value map.

use crate::error::{LocalizationError, Result};
use crate::perception::localization::{
    FilterConfig, MotionModelConfig, ResamplerConfig, SensorModelConfig,
};
use crate::perception::sensors::LidarMount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Frames the estimate and correction are expressed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub map_frame: String,
    pub odom_frame: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            map_frame: "map".to_string(),
            odom_frame: "odom".to_string(),
        }
    }
}

/// Task cadences, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of the filter worker
    pub worker_period: f64,
    /// Period of the map->odom correction publisher
    pub correction_period: f64,
    /// How far past the last scan the correction is stamped
    pub correction_lead: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            worker_period: 0.1,
            correction_period: 0.05,
            correction_lead: 0.1,
        }
    }
}

impl TimingConfig {
    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs_f64(self.worker_period)
    }

    pub fn correction_interval(&self) -> Duration {
        Duration::from_secs_f64(self.correction_period)
    }
}

/// Every parameter of the localizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    pub frames: FrameConfig,
    pub filter: FilterConfig,
    pub motion: MotionModelConfig,
    pub sensor: SensorModelConfig,
    pub resampler: ResamplerConfig,
    pub timing: TimingConfig,
    pub lidar: LidarMount,
}

impl LocalizationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: LocalizationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LocalizationError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded localization parameters from {}", path.display());
        Ok(config)
    }

    /// Apply flat parameter overrides
    ///
    /// Nothing is changed unless every name is known and the result validates.
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        let mut next = self.clone();
        for (name, &value) in params {
            next.set(name, value)?;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn set(&mut self, name: &str, value: f64) -> Result<()> {
        match name {
            "num_particles" => self.filter.num_particles = count(name, value)?,
            "linear_threshold" => self.filter.linear_threshold = value,
            "angular_threshold" => self.filter.angular_threshold = value,
            "initial_spread_xy" => self.filter.initial_spread_xy = value,
            "initial_spread_theta" => self.filter.initial_spread_theta = value,
            "seed" => self.filter.seed = count(name, value)? as u64,
            "position_noise" => self.motion.position_noise = value,
            "heading_noise" => self.motion.heading_noise = value,
            "sensor_sigma" => self.sensor.sigma = value,
            "max_range" => self.sensor.max_range = value,
            "concentration_threshold" => self.resampler.concentration_threshold = value,
            "min_particles" => self.resampler.min_particles = count(name, value)?,
            "worker_period" => self.timing.worker_period = value,
            "correction_period" => self.timing.correction_period = value,
            "correction_lead" => self.timing.correction_lead = value,
            _ => return Err(LocalizationError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        if self.filter.num_particles == 0 {
            return Err(LocalizationError::invalid("num_particles", "must be positive"));
        }
        positive("linear_threshold", self.filter.linear_threshold)?;
        positive("angular_threshold", self.filter.angular_threshold)?;
        non_negative("initial_spread_xy", self.filter.initial_spread_xy)?;
        non_negative("initial_spread_theta", self.filter.initial_spread_theta)?;
        non_negative("position_noise", self.motion.position_noise)?;
        non_negative("heading_noise", self.motion.heading_noise)?;
        positive("sensor_sigma", self.sensor.sigma)?;
        positive("max_range", self.sensor.max_range)?;

        let threshold = self.resampler.concentration_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(LocalizationError::invalid(
                "concentration_threshold",
                format!("{} is outside (0, 1]", threshold),
            ));
        }
        if self.resampler.min_particles == 0 {
            return Err(LocalizationError::invalid("min_particles", "must be positive"));
        }

        positive("worker_period", self.timing.worker_period)?;
        positive("correction_period", self.timing.correction_period)?;
        non_negative("correction_lead", self.timing.correction_lead)?;

        for (name, frame) in [
            ("map_frame", &self.frames.map_frame),
            ("odom_frame", &self.frames.odom_frame),
        ] {
            if frame.is_empty() {
                return Err(LocalizationError::invalid(name, "must not be empty"));
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(LocalizationError::invalid(name, format!("{} must be positive", value)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(LocalizationError::invalid(name, format!("{} must not be negative", value)))
    }
}

fn count(name: &str, value: f64) -> Result<usize> {
    if value >= 0.0 && value.fract() == 0.0 && value.is_finite() {
        Ok(value as usize)
    } else {
        Err(LocalizationError::invalid(
            name,
            format!("{} is not a whole number", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn defaults_are_valid() {
        let config = LocalizationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.filter.num_particles, 100);
        assert_relative_eq!(config.filter.angular_threshold, PI / 6.0);
        assert_relative_eq!(config.timing.correction_lead, 0.1);
        assert_eq!(config.frames.map_frame, "map");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = LocalizationConfig::from_toml_str(
            r#"
            [filter]
            num_particles = 250

            [sensor]
            sigma = 0.2

            [lidar.offset]
            x = 0.1
            y = 0.0
            theta = 3.141592653589793
            "#,
        )
        .unwrap();
        assert_eq!(config.filter.num_particles, 250);
        assert_relative_eq!(config.filter.linear_threshold, 0.2);
        assert_relative_eq!(config.sensor.sigma, 0.2);
        assert_relative_eq!(config.sensor.max_range, 10.0);
        assert_relative_eq!(config.lidar.offset.x, 0.1);
    }

    #[test]
    fn transport_keys_in_frames_are_ignored() {
        let config = LocalizationConfig::from_toml_str(
            r#"
            [frames]
            base_frame = "base_link"
            map_frame = "world"
            scan_topic = "front_scan"
            "#,
        )
        .unwrap();
        assert_eq!(config.frames.map_frame, "world");
        assert_eq!(config.frames.odom_frame, "odom");
        config.validate().unwrap();
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = LocalizationConfig::from_toml_str("[filter]\nnum_particles = \"many\"").unwrap_err();
        assert!(matches!(err, LocalizationError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LocalizationConfig::load("/nonexistent/mcl_params.toml").unwrap_err();
        assert!(matches!(err, LocalizationError::ConfigIo { .. }));
    }

    #[test]
    fn configure_applies_flat_overrides() {
        let mut config = LocalizationConfig::default();
        let params = HashMap::from([
            ("num_particles".to_string(), 500.0),
            ("sensor_sigma".to_string(), 0.05),
            ("worker_period".to_string(), 0.2),
        ]);
        config.configure(&params).unwrap();
        assert_eq!(config.filter.num_particles, 500);
        assert_relative_eq!(config.sensor.sigma, 0.05);
        assert_eq!(config.timing.worker_interval(), Duration::from_millis(200));
    }

    #[test]
    fn configure_rejects_unknown_and_invalid_without_changes() {
        let mut config = LocalizationConfig::default();
        let unknown = HashMap::from([
            ("num_particles".to_string(), 10.0),
            ("particle_count".to_string(), 10.0),
        ]);
        assert!(matches!(
            config.configure(&unknown),
            Err(LocalizationError::UnknownParameter(name)) if name == "particle_count"
        ));
        assert_eq!(config.filter.num_particles, 100);

        let invalid = HashMap::from([("concentration_threshold".to_string(), 1.5)]);
        assert!(matches!(
            config.configure(&invalid),
            Err(LocalizationError::InvalidParameter { .. })
        ));
        let fractional = HashMap::from([("num_particles".to_string(), 10.5)]);
        assert!(config.configure(&fractional).is_err());
        assert_eq!(config, LocalizationConfig::default());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = LocalizationConfig::default();
        config.sensor.sigma = 0.0;
        assert!(config.validate().is_err());

        let mut config = LocalizationConfig::default();
        config.motion.heading_noise = -0.1;
        assert!(config.validate().is_err());

        let mut config = LocalizationConfig::default();
        config.frames.odom_frame.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_parameter_file_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/mcl_params.toml");
        let config = LocalizationConfig::load(path).unwrap();
        let defaults = LocalizationConfig::default();
        assert_eq!(config.frames, defaults.frames);
        assert_eq!(config.resampler, defaults.resampler);
        assert_eq!(config.timing, defaults.timing);
        assert_eq!(config.filter.num_particles, defaults.filter.num_particles);
        assert_relative_eq!(
            config.filter.angular_threshold,
            defaults.filter.angular_threshold,
            epsilon = 1e-12
        );
    }
}
