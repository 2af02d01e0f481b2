use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::CategoryRule;

const DEFAULT_TARGET: &str = "default";

const DEFAULT_MAX_PENDING_REQUESTS: u32 = 1;
const DEFAULT_FRAME_SKIP_INTERVAL: u64 = 3;
const DEFAULT_MAX_DETECTIONS_PER_SECOND: f32 = 5.0;

const DEFAULT_WINDOW: Duration = Duration::from_secs(3);
const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1500);
const DEFAULT_MINIMUM_DETECTION_SIZE: f32 = 0.015;
const DEFAULT_REQUIRED_CONSISTENT_FRAMES: usize = 3;
const DEFAULT_QUALIFYING_CONFIDENCE: f32 = 0.80;
const DEFAULT_FAST_PATH_CONFIDENCE: f32 = 0.85;
const DEFAULT_FAST_PATH_WINDOW: Duration = Duration::from_secs(1);
const DEFAULT_FAST_PATH_MIN_FRAMES: usize = 2;
const DEFAULT_CONSISTENCY_WINDOW: Duration = Duration::from_millis(1500);
const DEFAULT_STABILITY_MEAN_CONFIDENCE: f32 = 0.82;
const DEFAULT_STABILITY_MIN_SCORE: f32 = 0.7;
const DEFAULT_STABILITY_CURRENT_CONFIDENCE: f32 = 0.83;
const DEFAULT_STABILITY_DISTANCE_SCALE: f32 = 10.0;

const DEFAULT_FILTER_FLOOR: f32 = 0.80;
const DEFAULT_GATE_MIN_CONFIDENCE: f32 = 0.80;
const DEFAULT_GATE_FALLBACK_CONFIDENCE: f32 = 0.85;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    target: Option<String>,
    admission: Option<AdmissionConfigFile>,
    temporal: Option<TemporalConfigFile>,
    filter: Option<FilterConfigFile>,
    gate: Option<GateConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct AdmissionConfigFile {
    max_pending_requests: Option<u32>,
    frame_skip_interval: Option<u64>,
    max_detections_per_second: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TemporalConfigFile {
    window_secs: Option<f32>,
    cooldown_secs: Option<f32>,
    minimum_detection_size: Option<f32>,
    required_consistent_frames: Option<usize>,
    qualifying_confidence: Option<f32>,
    fast_path_confidence: Option<f32>,
    fast_path_window_secs: Option<f32>,
    fast_path_min_frames: Option<usize>,
    consistency_window_secs: Option<f32>,
    stability_mean_confidence: Option<f32>,
    stability_min_score: Option<f32>,
    stability_current_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    default_min_confidence: Option<f32>,
    categories: Option<Vec<CategoryRule>>,
}

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    min_confidence: Option<f32>,
    fallback_min_confidence: Option<f32>,
}

/// Full pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Category the session starts with.
    pub target: String,
    pub admission: AdmissionSettings,
    pub temporal: TemporalSettings,
    pub filter: FilterSettings,
    pub gate: GateSettings,
}

/// Scheduling limits for frame admission.
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    pub max_pending_requests: u32,
    /// Only every Nth arriving frame is eligible.
    pub frame_skip_interval: u64,
    pub max_detections_per_second: f32,
}

impl AdmissionSettings {
    /// Minimum spacing between admitted frames.
    ///
    /// Saturates at `Duration::MAX` for rates `validate` would reject.
    pub fn min_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / f64::from(self.max_detections_per_second))
            .unwrap_or(Duration::MAX)
    }
}

/// Thresholds for the multi-frame temporal validator.
#[derive(Debug, Clone)]
pub struct TemporalSettings {
    /// History entries older than this (relative to the newest observation) are pruned.
    pub window: Duration,
    pub cooldown: Duration,
    /// Minimum bounding-box area as a fraction of the frame.
    pub minimum_detection_size: f32,
    pub required_consistent_frames: usize,
    /// Confidence an entry needs to count as a qualifying frame.
    pub qualifying_confidence: f32,
    pub fast_path_confidence: f32,
    pub fast_path_window: Duration,
    pub fast_path_min_frames: usize,
    pub consistency_window: Duration,
    pub stability_mean_confidence: f32,
    pub stability_min_score: f32,
    pub stability_current_confidence: f32,
    /// Multiplier applied to center distances in the stability score.
    pub stability_distance_scale: f32,
}

/// Semantic filter settings.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Floor applied to any label when the target is not a known category.
    pub default_min_confidence: f32,
    /// Categories declared in configuration, added to (or replacing) the built-ins.
    pub categories: Vec<CategoryRule>,
}

/// Final confirmation gate thresholds.
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// Floor for detections matching the category allow-list.
    pub min_confidence: f32,
    /// Floor when the target is not a known category.
    pub fallback_min_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            admission: AdmissionSettings {
                max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
                frame_skip_interval: DEFAULT_FRAME_SKIP_INTERVAL,
                max_detections_per_second: DEFAULT_MAX_DETECTIONS_PER_SECOND,
            },
            temporal: TemporalSettings {
                window: DEFAULT_WINDOW,
                cooldown: DEFAULT_COOLDOWN,
                minimum_detection_size: DEFAULT_MINIMUM_DETECTION_SIZE,
                required_consistent_frames: DEFAULT_REQUIRED_CONSISTENT_FRAMES,
                qualifying_confidence: DEFAULT_QUALIFYING_CONFIDENCE,
                fast_path_confidence: DEFAULT_FAST_PATH_CONFIDENCE,
                fast_path_window: DEFAULT_FAST_PATH_WINDOW,
                fast_path_min_frames: DEFAULT_FAST_PATH_MIN_FRAMES,
                consistency_window: DEFAULT_CONSISTENCY_WINDOW,
                stability_mean_confidence: DEFAULT_STABILITY_MEAN_CONFIDENCE,
                stability_min_score: DEFAULT_STABILITY_MIN_SCORE,
                stability_current_confidence: DEFAULT_STABILITY_CURRENT_CONFIDENCE,
                stability_distance_scale: DEFAULT_STABILITY_DISTANCE_SCALE,
            },
            filter: FilterSettings {
                default_min_confidence: DEFAULT_FILTER_FLOOR,
                categories: Vec::new(),
            },
            gate: GateSettings {
                min_confidence: DEFAULT_GATE_MIN_CONFIDENCE,
                fallback_min_confidence: DEFAULT_GATE_FALLBACK_CONFIDENCE,
            },
        }
    }
}

impl PipelineConfig {
    /// Load configuration: optional file named by `CONFIRM_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CONFIRM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from an explicit file path, without env overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let target = file.target.unwrap_or_else(|| DEFAULT_TARGET.to_string());

        let admission_file = file.admission.unwrap_or_default();
        let admission = AdmissionSettings {
            max_pending_requests: admission_file
                .max_pending_requests
                .unwrap_or(DEFAULT_MAX_PENDING_REQUESTS),
            frame_skip_interval: admission_file
                .frame_skip_interval
                .unwrap_or(DEFAULT_FRAME_SKIP_INTERVAL),
            max_detections_per_second: admission_file
                .max_detections_per_second
                .unwrap_or(DEFAULT_MAX_DETECTIONS_PER_SECOND),
        };

        let t = file.temporal.unwrap_or_default();
        let temporal = TemporalSettings {
            window: secs_or(t.window_secs, "temporal.window_secs", DEFAULT_WINDOW)?,
            cooldown: secs_or(t.cooldown_secs, "temporal.cooldown_secs", DEFAULT_COOLDOWN)?,
            minimum_detection_size: t
                .minimum_detection_size
                .unwrap_or(DEFAULT_MINIMUM_DETECTION_SIZE),
            required_consistent_frames: t
                .required_consistent_frames
                .unwrap_or(DEFAULT_REQUIRED_CONSISTENT_FRAMES),
            qualifying_confidence: t
                .qualifying_confidence
                .unwrap_or(DEFAULT_QUALIFYING_CONFIDENCE),
            fast_path_confidence: t
                .fast_path_confidence
                .unwrap_or(DEFAULT_FAST_PATH_CONFIDENCE),
            fast_path_window: secs_or(
                t.fast_path_window_secs,
                "temporal.fast_path_window_secs",
                DEFAULT_FAST_PATH_WINDOW,
            )?,
            fast_path_min_frames: t
                .fast_path_min_frames
                .unwrap_or(DEFAULT_FAST_PATH_MIN_FRAMES),
            consistency_window: secs_or(
                t.consistency_window_secs,
                "temporal.consistency_window_secs",
                DEFAULT_CONSISTENCY_WINDOW,
            )?,
            stability_mean_confidence: t
                .stability_mean_confidence
                .unwrap_or(DEFAULT_STABILITY_MEAN_CONFIDENCE),
            stability_min_score: t
                .stability_min_score
                .unwrap_or(DEFAULT_STABILITY_MIN_SCORE),
            stability_current_confidence: t
                .stability_current_confidence
                .unwrap_or(DEFAULT_STABILITY_CURRENT_CONFIDENCE),
            stability_distance_scale: DEFAULT_STABILITY_DISTANCE_SCALE,
        };

        let filter_file = file.filter.unwrap_or_default();
        let filter = FilterSettings {
            default_min_confidence: filter_file
                .default_min_confidence
                .unwrap_or(DEFAULT_FILTER_FLOOR),
            categories: filter_file.categories.unwrap_or_default(),
        };

        let gate_file = file.gate.unwrap_or_default();
        let gate = GateSettings {
            min_confidence: gate_file
                .min_confidence
                .unwrap_or(DEFAULT_GATE_MIN_CONFIDENCE),
            fallback_min_confidence: gate_file
                .fallback_min_confidence
                .unwrap_or(DEFAULT_GATE_FALLBACK_CONFIDENCE),
        };

        Ok(Self {
            target,
            admission,
            temporal,
            filter,
            gate,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(target) = std::env::var("CONFIRM_TARGET") {
            if !target.trim().is_empty() {
                self.target = target.trim().to_string();
            }
        }
        if let Ok(interval) = std::env::var("CONFIRM_FRAME_SKIP") {
            self.admission.frame_skip_interval = interval
                .parse()
                .map_err(|_| anyhow!("CONFIRM_FRAME_SKIP must be a positive integer"))?;
        }
        if let Ok(rate) = std::env::var("CONFIRM_MAX_DPS") {
            self.admission.max_detections_per_second = rate
                .parse()
                .map_err(|_| anyhow!("CONFIRM_MAX_DPS must be a number of detections per second"))?;
        }
        if let Ok(size) = std::env::var("CONFIRM_MIN_SIZE") {
            self.temporal.minimum_detection_size = size
                .parse()
                .map_err(|_| anyhow!("CONFIRM_MIN_SIZE must be a fraction of the frame area"))?;
        }
        if let Ok(window) = std::env::var("CONFIRM_WINDOW_SECS") {
            let seconds: f32 = window
                .parse()
                .map_err(|_| anyhow!("CONFIRM_WINDOW_SECS must be a number of seconds"))?;
            self.temporal.window = secs(seconds, "CONFIRM_WINDOW_SECS")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.admission.max_pending_requests == 0 {
            return Err(anyhow!("max_pending_requests must be at least 1"));
        }
        if self.admission.frame_skip_interval == 0 {
            return Err(anyhow!("frame_skip_interval must be at least 1"));
        }
        let rate = self.admission.max_detections_per_second;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(anyhow!("max_detections_per_second must be > 0"));
        }
        if Duration::try_from_secs_f64(1.0 / f64::from(rate)).is_err() {
            return Err(anyhow!(
                "max_detections_per_second {} is too small to schedule",
                rate
            ));
        }
        if self.temporal.window.is_zero() {
            return Err(anyhow!("temporal window must be greater than zero"));
        }
        if self.temporal.required_consistent_frames == 0 {
            return Err(anyhow!("required_consistent_frames must be at least 1"));
        }
        if self.temporal.consistency_window > self.temporal.window
            || self.temporal.fast_path_window > self.temporal.window
        {
            return Err(anyhow!(
                "fast path and consistency windows must fit inside the history window"
            ));
        }
        for (name, value) in [
            ("minimum_detection_size", self.temporal.minimum_detection_size),
            ("qualifying_confidence", self.temporal.qualifying_confidence),
            ("fast_path_confidence", self.temporal.fast_path_confidence),
            ("stability_mean_confidence", self.temporal.stability_mean_confidence),
            ("stability_min_score", self.temporal.stability_min_score),
            (
                "stability_current_confidence",
                self.temporal.stability_current_confidence,
            ),
            ("filter.default_min_confidence", self.filter.default_min_confidence),
            ("gate.min_confidence", self.gate.min_confidence),
            ("gate.fallback_min_confidence", self.gate.fallback_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0..=1 (got {})", name, value));
            }
        }
        for rule in &self.filter.categories {
            rule.validate()?;
        }
        Ok(())
    }
}

fn secs(value: f32, name: &str) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!(
            "{} must be a non-negative number of seconds (got {})",
            name,
            value
        ));
    }
    Duration::try_from_secs_f64(f64::from(value))
        .map_err(|e| anyhow!("{} is out of range ({}): {}", name, value, e))
}

fn secs_or(value: Option<f32>, name: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(value) => secs(value, name),
        None => Ok(default),
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.target, "default");
        assert_eq!(cfg.admission.max_pending_requests, 1);
        assert_eq!(cfg.admission.frame_skip_interval, 3);
        assert_eq!(cfg.admission.min_interval(), Duration::from_millis(200));
        assert_eq!(cfg.temporal.window, Duration::from_secs(3));
        assert_eq!(cfg.temporal.cooldown, Duration::from_millis(1500));
        assert_eq!(cfg.temporal.required_consistent_frames, 3);
        assert_eq!(cfg.gate.min_confidence, 0.80);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_file_matches_defaults() {
        let from_file = PipelineConfig::from_file(PipelineConfigFile::default()).unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(from_file.temporal.window, defaults.temporal.window);
        assert_eq!(from_file.temporal.cooldown, defaults.temporal.cooldown);
        assert_eq!(from_file.temporal.fast_path_window, defaults.temporal.fast_path_window);
        assert_eq!(
            from_file.temporal.consistency_window,
            defaults.temporal.consistency_window
        );
        assert_eq!(from_file.target, defaults.target);
    }

    #[test]
    fn min_interval_saturates_for_unschedulable_rate() {
        let mut cfg = PipelineConfig::default();
        cfg.admission.max_detections_per_second = 1e-30;
        assert_eq!(cfg.admission.min_interval(), Duration::MAX);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_skip_interval() {
        let mut cfg = PipelineConfig::default();
        cfg.admission.frame_skip_interval = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = PipelineConfig::default();
        cfg.gate.min_confidence = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("gate.min_confidence"));
    }
}
