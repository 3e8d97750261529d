use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::Context as _;

use crate::{
    flow::FlowParams,
    foundation::{
        core::{Fps, FrameSize},
        error::{FlowError, FlowResult},
    },
    warp::BoundsPolicy,
};

/// Everything fixed for the lifetime of one effect run.
///
/// Every field has a default, so a JSON file only needs the keys it overrides:
///
/// ```json
/// { "size": { "width": 320, "height": 240 }, "bounds": "wrap" }
/// ```
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub size: FrameSize,
    pub flow: FlowParams,
    pub bounds: BoundsPolicy,
    /// Target refresh rate for paced runs.
    pub fps: Fps,
    /// Delay between readiness checks while waiting for the first frame.
    pub poll_interval_ms: u64,
    /// Give up waiting for the first frame after this long. `None` waits forever.
    pub max_wait_ms: Option<u64>,
    /// How long a streaming source may go without producing a frame.
    pub stall_timeout_ms: u64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            size: FrameSize::default(),
            flow: FlowParams::default(),
            bounds: BoundsPolicy::default(),
            fps: Fps::default(),
            poll_interval_ms: 10,
            max_wait_ms: None,
            stall_timeout_ms: 5_000,
        }
    }
}

impl EffectConfig {
    pub fn validate(&self) -> FlowResult<()> {
        self.size.validate()?;
        self.flow.validate()?;
        Fps::new(self.fps.num, self.fps.den)?;
        if self.poll_interval_ms == 0 {
            return Err(FlowError::validation("poll_interval_ms must be > 0"));
        }
        if self.stall_timeout_ms == 0 {
            return Err(FlowError::validation("stall_timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn from_json_path(path: &Path) -> FlowResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config JSON '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = EffectConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.size, FrameSize::square(256));
        assert_eq!(cfg.bounds, BoundsPolicy::Drop);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(10));
        assert_eq!(cfg.fps.rounded(), 60);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EffectConfig = serde_json::from_str(
            r#"{ "size": { "width": 320, "height": 240 }, "bounds": "wrap", "flow": { "levels": 2 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.size, FrameSize::new(320, 240));
        assert_eq!(cfg.bounds, BoundsPolicy::Wrap);
        assert_eq!(cfg.flow.levels, 2);
        assert_eq!(cfg.flow.window_size, 15);
        assert_eq!(cfg.max_wait(), None);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = EffectConfig::default();
        cfg.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EffectConfig::default();
        cfg.flow.flags = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = EffectConfig::default();
        cfg.fps.den = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "fps": { "num": 30, "den": 1 }, "max_wait_ms": 250 }"#).unwrap();
        let cfg = EffectConfig::from_json_path(&path).unwrap();
        assert_eq!(cfg.fps, Fps::new(30, 1).unwrap());
        assert_eq!(cfg.max_wait(), Some(Duration::from_millis(250)));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(EffectConfig::from_json_path(&path).is_err());
    }
}
