// FeatureExtractor - streaming MFCC extraction for call comparison
//
// This module converts a stream of interleaved float samples into a
// sequence of fixed-width cepstral coefficient frames. Frames feed the
// sequence aligner and the real-time scorer.
//
// Module organization:
// - types: Data structures (FeatureFrame)
// - fft: Windowed magnitude spectrum computation
// - mel: Mel filterbank and DCT decorrelation
// - mod.rs: Coordinator (FeatureExtractor) with downmix and framing
//
// Pipeline per window:
// 1. Downmix interleaved channels to mono (arithmetic mean)
// 2. Hann window + FFT magnitude spectrum
// 3. Triangular mel filterbank, log compression
// 4. DCT-II, truncated to the configured coefficient count
// 5. Coefficient 0 replaced with the window's log-energy
//
// Chunk boundaries are invisible: samples that do not fill a whole window
// are carried over, so any chunking of the same stream yields the same
// frame sequence.

mod fft;
mod mel;
mod types;

pub use fft::{dominant_frequency, FftProcessor};
pub use mel::{hz_to_mel, mel_to_hz, DctTransform, MelFilterbank};
pub use types::FeatureFrame;

use crate::config::FeatureConfig;
use crate::error::ScoringError;

/// Maximum supported channel count for interleaved input
pub const MAX_CHANNELS: u16 = 8;

/// Streaming MFCC extractor
///
/// Stateless across sessions; the only cross-call state is the carry-over
/// buffer holding samples that have not yet filled an analysis window, plus
/// the running frame index. Framing is fixed at construction; changing it
/// requires a new extractor.
pub struct FeatureExtractor {
    fft: FftProcessor,
    filterbank: MelFilterbank,
    dct: DctTransform,
    window_size: usize,
    hop_size: usize,
    sample_rate: u32,
    /// Mono samples awaiting a full analysis window
    carry: Vec<f32>,
    next_index: u64,
    peak_hz_sum: f64,
}

impl FeatureExtractor {
    /// Create a new extractor for the given sample rate and framing
    pub fn new(sample_rate: u32, config: &FeatureConfig) -> Self {
        Self {
            fft: FftProcessor::new(config.window_size),
            filterbank: MelFilterbank::new(sample_rate, config.window_size, config.mel_bands),
            dct: DctTransform::new(config.mel_bands, config.num_coefficients),
            window_size: config.window_size,
            hop_size: config.hop_size,
            sample_rate,
            carry: Vec::with_capacity(config.window_size * 2),
            next_index: 0,
            peak_hz_sum: 0.0,
        }
    }

    /// Process one chunk of interleaved samples into zero or more frames
    ///
    /// # Arguments
    /// * `samples` - interleaved samples in [-1.0, 1.0]
    /// * `channels` - channel count; multi-channel input is downmixed to mono
    ///
    /// # Errors
    /// `ScoringError::InvalidAudioData` when `samples` is empty or `channels`
    /// is outside [1, [`MAX_CHANNELS`]]. No partial state is committed on
    /// error.
    pub fn process(
        &mut self,
        samples: &[f32],
        channels: u16,
    ) -> Result<Vec<FeatureFrame>, ScoringError> {
        if samples.is_empty() {
            return Err(ScoringError::InvalidAudioData {
                reason: "empty sample buffer".to_string(),
            });
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(ScoringError::InvalidAudioData {
                reason: format!("channel count {} outside [1, {}]", channels, MAX_CHANNELS),
            });
        }

        if channels == 1 {
            self.carry.extend_from_slice(samples);
        } else {
            let ch = channels as usize;
            let frame_count = samples.len() / ch;
            self.carry.reserve(frame_count);
            for frame in 0..frame_count {
                let sum: f32 = samples[frame * ch..(frame + 1) * ch].iter().sum();
                self.carry.push(sum / ch as f32);
            }
        }

        let mut frames = Vec::new();
        let mut pos = 0;
        while pos + self.window_size <= self.carry.len() {
            let window = &self.carry[pos..pos + self.window_size];
            let energy: f32 =
                window.iter().map(|&s| s * s).sum::<f32>() / self.window_size as f32;

            let spectrum = self.fft.compute_magnitude_spectrum(window);
            self.peak_hz_sum +=
                dominant_frequency(&spectrum, self.sample_rate, self.window_size) as f64;

            let log_energies = self.filterbank.apply_log(&spectrum);
            let mut coeffs = self.dct.apply(&log_energies);
            coeffs[0] = (energy + 1e-10).ln();

            frames.push(FeatureFrame {
                index: self.next_index,
                coeffs,
            });
            self.next_index += 1;
            pos += self.hop_size;
        }
        self.carry.drain(..pos);

        Ok(frames)
    }

    /// Clear the carry-over buffer and frame counter
    ///
    /// Framing and filterbank tables are untouched, so a reset extractor is
    /// equivalent to a freshly constructed one.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.next_index = 0;
        self.peak_hz_sum = 0.0;
    }

    /// Total frames emitted since construction or the last reset
    pub fn frames_emitted(&self) -> u64 {
        self.next_index
    }

    /// Mean dominant frequency over all analyzed windows, in Hz
    ///
    /// Derived deterministically from the same windows as the frames; used
    /// as a crude pitch reference, not as a coefficient.
    pub fn mean_peak_hz(&self) -> Option<f32> {
        if self.next_index == 0 {
            None
        } else {
            Some((self.peak_hz_sum / self.next_index as f64) as f32)
        }
    }

    pub fn num_coefficients(&self) -> usize {
        self.dct.num_coeffs()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }
}
