//! Configuration management for the analysis engine
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Framing, filterbank,
//! and score-weighting parameters can be adjusted via the config file
//! for rapid experimentation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ScoringError;

/// Tolerance for the score weight sum check
pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub features: FeatureConfig,
    pub scoring: ScoringConfig,
}

/// Audio stream parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Default sample rate in Hz for new sessions
    pub sample_rate: u32,
    /// Directory searched by name-based master call loading
    pub master_calls_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            master_calls_dir: PathBuf::from("master_calls"),
        }
    }
}

/// Feature extraction parameters
///
/// Fixed per session after first use; changing the framing mid-stream would
/// silently shift every subsequent frame, so reconfiguration requires a
/// session reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Analysis window size in samples
    pub window_size: usize,
    /// Hop size between successive windows
    pub hop_size: usize,
    /// Number of triangular mel filters
    pub mel_bands: usize,
    /// Number of cepstral coefficients kept per frame
    pub num_coefficients: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_size: 512,
            hop_size: 256,
            mel_bands: 26,
            num_coefficients: 13,
        }
    }
}

/// Real-time scoring parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the alignment (MFCC similarity) component
    pub mfcc_weight: f32,
    /// Weight of the volume match component
    pub volume_weight: f32,
    /// Weight of the timing match component
    pub timing_weight: f32,
    /// Weight of the pitch match component (0.0 disables pitch scoring)
    pub pitch_weight: f32,
    /// Minimum interval between score updates, in milliseconds
    pub update_rate_ms: f32,
    /// Capacity of the bounded score history ring
    pub history_capacity: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mfcc_weight: 0.5,
            volume_weight: 0.3,
            timing_weight: 0.2,
            pitch_weight: 0.0,
            update_rate_ms: 100.0,
            history_capacity: 256,
        }
    }
}

impl ScoringConfig {
    /// Validate score weighting and history parameters
    ///
    /// Weights must be non-negative and sum to 1.0 within
    /// [`WEIGHT_SUM_TOLERANCE`]. An invalid configuration is rejected whole;
    /// callers keep their previous configuration.
    pub fn validate(&self) -> Result<(), ScoringError> {
        let weights = [
            self.mfcc_weight,
            self.volume_weight,
            self.timing_weight,
            self.pitch_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ScoringError::InvalidConfig {
                reason: "score weights must be finite and non-negative".to_string(),
            });
        }
        let sum: f32 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoringError::InvalidConfig {
                reason: format!("score weights must sum to 1.0 (got {:.4})", sum),
            });
        }
        if !self.update_rate_ms.is_finite() || self.update_rate_ms < 0.0 {
            return Err(ScoringError::InvalidConfig {
                reason: "update_rate_ms must be non-negative".to_string(),
            });
        }
        if self.history_capacity == 0 {
            return Err(ScoringError::InvalidConfig {
                reason: "history_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

impl FeatureConfig {
    /// Validate framing and filterbank parameters
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.window_size < 64 {
            return Err(ScoringError::InvalidConfig {
                reason: format!("window_size must be at least 64 (got {})", self.window_size),
            });
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(ScoringError::InvalidConfig {
                reason: format!(
                    "hop_size must be in [1, window_size] (got {})",
                    self.hop_size
                ),
            });
        }
        if self.mel_bands < 2 {
            return Err(ScoringError::InvalidConfig {
                reason: format!("mel_bands must be at least 2 (got {})", self.mel_bands),
            });
        }
        if self.num_coefficients == 0 || self.num_coefficients > self.mel_bands {
            return Err(ScoringError::InvalidConfig {
                reason: format!(
                    "num_coefficients must be in [1, mel_bands] (got {})",
                    self.num_coefficients
                ),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            features: FeatureConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the full configuration
    ///
    /// Invalid configurations are never partially applied: callers must
    /// validate before installing and keep the prior configuration on error.
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.audio.sample_rate == 0 {
            return Err(ScoringError::InvalidConfig {
                reason: "sample_rate must be greater than 0".to_string(),
            });
        }
        self.features.validate()?;
        self.scoring.validate()?;
        Ok(())
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file is missing,
    /// unparseable, or fails validation.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<EngineConfig>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                        config
                    }
                    Err(err) => {
                        log::warn!(
                            "[Config] Configuration in {:?} failed validation: {}. Using defaults.",
                            path.as_ref(),
                            err
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
