//! Server configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use aural_rtc::RtcConfig;
use aural_vision::pipeline::{PipelineConfig, DEFAULT_MIN_CONFIDENCE, FPS_WINDOW_CAPACITY};

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// YOLOv8 ONNX model
    pub model_path: PathBuf,
    /// YOLOv8-pose ONNX model; shoulder-based person distance is off without it
    pub pose_model_path: Option<PathBuf>,
    /// Detections below this confidence are dropped
    pub min_confidence: f32,
    /// Minimum time between inference runs per session
    pub detection_interval: Duration,
    /// Period of the cleanup sweep
    pub cleanup_interval: Duration,
    /// Optional bound on a single inference run
    pub inference_timeout: Option<Duration>,
    /// ICE servers handed to peer connections
    pub stun_urls: Vec<String>,
    /// Concurrent signaling sessions accepted; 0 disables the limit
    pub max_sessions: usize,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            model_path: PathBuf::from("models/yolov8n.onnx"),
            pose_model_path: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            detection_interval: Duration::from_millis(200),
            cleanup_interval: Duration::from_secs(30),
            inference_timeout: None,
            stun_urls: RtcConfig::default().stun_urls,
            max_sessions: 100,
            metrics_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.cors_origins),
            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            pose_model_path: lookup("POSE_MODEL_PATH")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            min_confidence: parse_var(&lookup, "MIN_CONFIDENCE")
                .filter(|c: &f32| (0.0..=1.0).contains(c))
                .unwrap_or(defaults.min_confidence),
            detection_interval: parse_var(&lookup, "DETECTION_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.detection_interval),
            cleanup_interval: parse_var(&lookup, "CLEANUP_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            inference_timeout: parse_var(&lookup, "INFERENCE_TIMEOUT_MS")
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis),
            stun_urls: lookup("STUN_URLS")
                .map(|s| split_list(&s))
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.stun_urls),
            max_sessions: parse_var(&lookup, "MAX_SESSIONS").unwrap_or(defaults.max_sessions),
            metrics_enabled: lookup("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            detection_interval: self.detection_interval,
            min_confidence: self.min_confidence,
            fps_window: FPS_WINDOW_CAPACITY,
            inference_timeout: self.inference_timeout,
        }
    }

    pub fn rtc_config(&self) -> RtcConfig {
        RtcConfig {
            stun_urls: self.stun_urls.clone(),
            ..RtcConfig::default()
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.min_confidence, 0.4);
        assert_eq!(config.detection_interval, Duration::from_millis(200));
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
        assert!(config.inference_timeout.is_none());
        assert!(config.pose_model_path.is_none());
    }

    #[test]
    fn test_pose_model_path() {
        let config = config_from(&[("POSE_MODEL_PATH", "models/yolov8n-pose.onnx")]);
        assert_eq!(
            config.pose_model_path,
            Some(PathBuf::from("models/yolov8n-pose.onnx"))
        );
        assert!(config_from(&[("POSE_MODEL_PATH", "  ")]).pose_model_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("MIN_CONFIDENCE", "0.6"),
            ("DETECTION_INTERVAL_MS", "500"),
            ("INFERENCE_TIMEOUT_MS", "1500"),
            ("STUN_URLS", "stun:a:3478,stun:b:3478"),
            ("CORS_ORIGINS", "http://localhost:8081, https://app.example"),
            ("METRICS_ENABLED", "false"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.min_confidence, 0.6);
        assert_eq!(config.detection_interval, Duration::from_millis(500));
        assert_eq!(config.inference_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.stun_urls.len(), 2);
        assert_eq!(config.cors_origins[1], "https://app.example");
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("MIN_CONFIDENCE", "1.7"),
            ("CLEANUP_INTERVAL_SECS", "0"),
            ("STUN_URLS", " , "),
        ]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.min_confidence, 0.4);
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
        assert!(!config.stun_urls.is_empty());
    }

    #[test]
    fn test_pipeline_config() {
        let config = config_from(&[("DETECTION_INTERVAL_MS", "100")]);
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.detection_interval, Duration::from_millis(100));
        assert_eq!(pipeline.fps_window, 30);
    }
}
