use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::ingest::CameraConfig;
use crate::transport::{TtcEncoding, DEFAULT_FRAME_ADDR, DEFAULT_JPEG_QUALITY, DEFAULT_TTC_ADDR};
use crate::ttc::EstimatorConfig;
use crate::vision::{FeatureParams, FlowParams};

const DEFAULT_TRAIL_SIZE: usize = 15;
const DEFAULT_MIN_PERIOD_MS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AvoiderConfigFile {
    camera: Option<CameraConfigFile>,
    features: Option<FeaturesConfigFile>,
    tracking: Option<TrackingConfigFile>,
    estimator: Option<EstimatorConfigFile>,
    render: Option<RenderConfigFile>,
    cycle: Option<CycleConfigFile>,
    servers: Option<ServersConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    synthetic_scale: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct FeaturesConfigFile {
    max_corners: Option<usize>,
    quality_level: Option<f64>,
    min_distance: Option<f64>,
    block_size: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    window_size: Option<i32>,
    max_level: Option<i32>,
    max_iterations: Option<i32>,
    epsilon: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct EstimatorConfigFile {
    window_size: Option<usize>,
    threshold_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    trail_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CycleConfigFile {
    min_period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ServersConfigFile {
    frame_addr: Option<String>,
    ttc_addr: Option<String>,
    ttc_encoding: Option<TtcEncoding>,
    jpeg_quality: Option<u8>,
}

/// Runtime configuration for the avoider and its distribution servers.
#[derive(Debug, Clone, PartialEq)]
pub struct AvoiderConfig {
    pub camera: CameraConfig,
    pub features: FeatureParams,
    pub tracking: FlowParams,
    pub estimator: EstimatorConfig,
    pub trail_size: usize,
    /// Minimum wall-clock time per cycle; the loop idles the remainder.
    pub min_period: Duration,
    pub servers: ServerSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub frame_addr: String,
    pub ttc_addr: String,
    pub ttc_encoding: TtcEncoding,
    pub jpeg_quality: u8,
}

impl Default for AvoiderConfig {
    fn default() -> Self {
        Self::from_file(AvoiderConfigFile::default())
    }
}

impl AvoiderConfig {
    /// Defaults, then the JSON file named by `TTC_CONFIG`, then `TTC_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TTC_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AvoiderConfigFile) -> Self {
        let camera_defaults = CameraConfig::default();
        let camera = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera.url.unwrap_or(camera_defaults.url),
            width: camera.width.unwrap_or(camera_defaults.width),
            height: camera.height.unwrap_or(camera_defaults.height),
            fps: camera.fps.unwrap_or(camera_defaults.fps),
            synthetic_scale: camera
                .synthetic_scale
                .unwrap_or(camera_defaults.synthetic_scale),
        };

        let feature_defaults = FeatureParams::default();
        let features = file.features.unwrap_or_default();
        let features = FeatureParams {
            max_corners: features.max_corners.unwrap_or(feature_defaults.max_corners),
            quality_level: features
                .quality_level
                .unwrap_or(feature_defaults.quality_level),
            min_distance: features.min_distance.unwrap_or(feature_defaults.min_distance),
            block_size: features.block_size.unwrap_or(feature_defaults.block_size),
        };

        let flow_defaults = FlowParams::default();
        let tracking = file.tracking.unwrap_or_default();
        let tracking = FlowParams {
            window_size: tracking.window_size.unwrap_or(flow_defaults.window_size),
            max_level: tracking.max_level.unwrap_or(flow_defaults.max_level),
            max_iterations: tracking
                .max_iterations
                .unwrap_or(flow_defaults.max_iterations),
            epsilon: tracking.epsilon.unwrap_or(flow_defaults.epsilon),
        };

        let estimator_defaults = EstimatorConfig::default();
        let estimator = file.estimator.unwrap_or_default();
        let estimator = EstimatorConfig {
            window_size: estimator
                .window_size
                .unwrap_or(estimator_defaults.window_size),
            threshold_ratio: estimator
                .threshold_ratio
                .unwrap_or(estimator_defaults.threshold_ratio),
        };

        let trail_size = file
            .render
            .and_then(|render| render.trail_size)
            .unwrap_or(DEFAULT_TRAIL_SIZE);
        let min_period = Duration::from_millis(
            file.cycle
                .and_then(|cycle| cycle.min_period_ms)
                .unwrap_or(DEFAULT_MIN_PERIOD_MS),
        );

        let servers = file.servers.unwrap_or_default();
        let servers = ServerSettings {
            frame_addr: servers
                .frame_addr
                .unwrap_or_else(|| DEFAULT_FRAME_ADDR.to_string()),
            ttc_addr: servers
                .ttc_addr
                .unwrap_or_else(|| DEFAULT_TTC_ADDR.to_string()),
            ttc_encoding: servers.ttc_encoding.unwrap_or_default(),
            jpeg_quality: servers.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        };

        Self {
            camera,
            features,
            tracking,
            estimator,
            trail_size,
            min_period,
            servers,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("TTC_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(addr) = std::env::var("TTC_FRAME_ADDR") {
            if !addr.trim().is_empty() {
                self.servers.frame_addr = addr;
            }
        }
        if let Ok(addr) = std::env::var("TTC_TTC_ADDR") {
            if !addr.trim().is_empty() {
                self.servers.ttc_addr = addr;
            }
        }
        if let Ok(encoding) = std::env::var("TTC_ENCODING") {
            if !encoding.trim().is_empty() {
                self.servers.ttc_encoding = encoding.parse()?;
            }
        }
        if let Ok(trail) = std::env::var("TTC_TRAIL_SIZE") {
            self.trail_size = trail
                .trim()
                .parse()
                .map_err(|_| anyhow!("TTC_TRAIL_SIZE must be a positive integer"))?;
        }
        if let Ok(period) = std::env::var("TTC_MIN_PERIOD_MS") {
            let millis: u64 = period
                .trim()
                .parse()
                .map_err(|_| anyhow!("TTC_MIN_PERIOD_MS must be an integer number of milliseconds"))?;
            self.min_period = Duration::from_millis(millis);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if !(self.camera.synthetic_scale > 0.0) {
            return Err(anyhow!("synthetic_scale must be greater than zero"));
        }
        if self.features.max_corners == 0 {
            return Err(anyhow!("max_corners must be at least 1"));
        }
        if self.estimator.window_size == 0 {
            return Err(anyhow!("estimator window_size must be at least 1"));
        }
        let ratio = self.estimator.threshold_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(anyhow!("threshold_ratio must be in (0, 1], got {}", ratio));
        }
        if self.trail_size == 0 {
            return Err(anyhow!("trail_size must be at least 1"));
        }
        if !(1..=100).contains(&self.servers.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        for (label, addr) in [
            ("frame_addr", &self.servers.frame_addr),
            ("ttc_addr", &self.servers.ttc_addr),
        ] {
            addr.parse::<SocketAddr>()
                .map_err(|e| anyhow!("{} '{}' is not a socket address: {}", label, addr, e))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AvoiderConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AvoiderConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.camera.url, "stub://scaled");
        assert_eq!(cfg.features.max_corners, 100);
        assert_eq!(cfg.estimator.window_size, 5);
        assert_eq!(cfg.trail_size, 15);
        assert_eq!(cfg.min_period, Duration::from_millis(30));
        assert_eq!(cfg.servers.frame_addr, "0.0.0.0:11111");
        assert_eq!(cfg.servers.ttc_addr, "0.0.0.0:22222");
        assert_eq!(cfg.servers.ttc_encoding, TtcEncoding::Binary);
        assert_eq!(cfg.servers.jpeg_quality, 80);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let file: AvoiderConfigFile =
            serde_json::from_str(r#"{"estimator": {"threshold_ratio": 0.25}}"#).unwrap();
        let cfg = AvoiderConfig::from_file(file);
        assert_eq!(cfg.estimator.threshold_ratio, 0.25);
        assert_eq!(cfg.estimator.window_size, 5);
        assert_eq!(cfg.tracking, FlowParams::default());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut cfg = AvoiderConfig::default();
        cfg.estimator.threshold_ratio = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AvoiderConfig::default();
        cfg.trail_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AvoiderConfig::default();
        cfg.servers.ttc_addr = "not-an-addr".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(serde_json::from_str::<AvoiderConfigFile>(r#"{"motors": {}}"#).is_err());
    }
}
