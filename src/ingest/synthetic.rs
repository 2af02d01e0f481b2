//! Synthetic frame source.
//!
//! Produces frames on a virtual clock: frame `n` is stamped `origin + n / fps`,
//! so a run is reproducible regardless of how fast the caller pulls frames.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Display name (e.g. "stub://front_camera").
    pub name: String,
    /// Capture rate in frames per second.
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://camera".to_string(),
            fps: 30,
            width: 64,
            height: 48,
        }
    }
}

/// Synthetic frame source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    clock: Instant,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        Self::with_origin(config, Instant::now())
    }

    /// Source whose first frame is stamped one frame period after `origin`.
    pub fn with_origin(config: SyntheticConfig, origin: Instant) -> Result<Self> {
        if config.fps == 0 {
            return Err(anyhow!("synthetic source fps must be >= 1"));
        }
        log::info!(
            "SyntheticSource: {} at {} fps ({}x{})",
            config.name,
            config.fps,
            config.width,
            config.height
        );
        Ok(Self {
            config,
            clock: origin,
            frame_count: 0,
        })
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.config.fps
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Frame {
        self.frame_count += 1;
        self.clock += self.frame_period();
        let captured_at = self.clock;
        let pixels = self.generate_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
            captured_at,
        )
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        (0..pixel_count)
            .map(|i| ((i as u64 + self.frame_count) % 256) as u8)
            .collect()
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_captured: self.frame_count,
            name: self.config.name.clone(),
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticStats {
    pub frames_captured: u64,
    pub name: String,
}
