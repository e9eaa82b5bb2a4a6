// WaveformGenerator - display-side downsampling and envelope tracking
//
// Consumes the same raw sample stream as the scoring pipeline, entirely
// independently of it: neither component depends on the other. Produces a
// bounded downsampled envelope with optional peak-hold and RMS overlays
// for UI waveform rendering.
//
// The running maximum amplitude is shared with monitoring threads through
// an atomic with a bounded compare-exchange loop: writers retry a capped
// number of times and otherwise keep the last-known value rather than
// blocking the processing thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::analysis::features::MAX_CHANNELS;
use crate::error::EngineError;

/// Retry cap for the lock-free max update
const MAX_CAS_RETRIES: usize = 100;

/// Update an f32-bits atomic to the max of itself and `value`
///
/// Bounded retries: under heavy contention the update is abandoned, which
/// only ever under-reports the maximum until the next sample lands.
pub(crate) fn atomic_f32_max(cell: &AtomicU32, value: f32) {
    let mut current = f32::from_bits(cell.load(Ordering::Relaxed));
    let mut retries = 0;
    while value > current && retries < MAX_CAS_RETRIES {
        match cell.compare_exchange_weak(
            current.to_bits(),
            value.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(observed) => {
                current = f32::from_bits(observed);
                retries += 1;
            }
        }
    }
}

/// Waveform display parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformConfig {
    /// Sample rate of the incoming stream in Hz
    pub sample_rate: u32,
    /// Input samples folded into one display sample
    pub downsample_ratio: usize,
    /// Bound on retained input samples (display buffer holds this / ratio)
    pub max_samples: usize,
    /// RMS window length in milliseconds
    pub rms_window_ms: f32,
    pub enable_peak_hold: bool,
    pub enable_rms_overlay: bool,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            downsample_ratio: 64,
            max_samples: 44100 * 10,
            rms_window_ms: 20.0,
            enable_peak_hold: true,
            enable_rms_overlay: true,
        }
    }
}

/// One snapshot of the display buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformSnapshot {
    /// Downsampled mean-absolute envelope
    pub samples: Vec<f32>,
    /// Per-bucket peak values (empty unless peak hold is enabled)
    pub peaks: Vec<f32>,
    /// Windowed RMS overlay (empty unless enabled)
    pub rms_envelope: Vec<f32>,
    pub max_amplitude: f32,
    pub rms_amplitude: f32,
    /// Mono samples consumed since construction
    pub original_sample_count: u64,
}

struct WaveformState {
    sample_buffer: VecDeque<f32>,
    peak_buffer: VecDeque<f32>,
    rms_buffer: VecDeque<f32>,
    /// Absolute samples accumulated toward the next display bucket
    accumulator: Vec<f32>,
    rms_window: Vec<f32>,
    rms_sum: f32,
    rms_index: usize,
}

/// Downsampling waveform summarizer
///
/// Mutable buffers live behind an internal mutex; the running peak, RMS,
/// and sample count are atomics readable from a monitoring thread without
/// taking that lock.
pub struct WaveformGenerator {
    config: WaveformConfig,
    state: Mutex<WaveformState>,
    max_amplitude: AtomicU32,
    current_rms: AtomicU32,
    total_samples: AtomicU64,
}

impl WaveformGenerator {
    pub fn new(config: WaveformConfig) -> Self {
        let rms_window_samples =
            ((config.sample_rate as f32 * config.rms_window_ms / 1000.0) as usize).max(1);
        Self {
            state: Mutex::new(WaveformState {
                sample_buffer: VecDeque::new(),
                peak_buffer: VecDeque::new(),
                rms_buffer: VecDeque::new(),
                accumulator: Vec::with_capacity(config.downsample_ratio.max(1)),
                rms_window: vec![0.0; rms_window_samples],
                rms_sum: 0.0,
                rms_index: 0,
            }),
            config,
            max_amplitude: AtomicU32::new(0.0f32.to_bits()),
            current_rms: AtomicU32::new(0.0f32.to_bits()),
            total_samples: AtomicU64::new(0),
        }
    }

    /// Fold one chunk of interleaved samples into the display buffers
    pub fn process_audio(
        &self,
        samples: &[f32],
        channels: u16,
    ) -> Result<WaveformSnapshot, EngineError> {
        if samples.is_empty() || channels == 0 || channels > MAX_CHANNELS {
            return Err(EngineError::InvalidAudioData {
                reason: format!(
                    "samples len {}, channels {} (must be non-empty, channels in [1, {}])",
                    samples.len(),
                    channels,
                    MAX_CHANNELS
                ),
            });
        }

        let mut state = self.state.lock().map_err(|_| EngineError::LockPoisoned {
            component: "waveform_generator".to_string(),
        })?;

        let ch = channels as usize;
        let frame_count = samples.len() / ch;
        for frame in samples.chunks_exact(ch) {
            let mono = frame.iter().sum::<f32>() / ch as f32;
            self.fold_sample(&mut state, mono);
        }
        self.total_samples.fetch_add(frame_count as u64, Ordering::Relaxed);

        Ok(self.snapshot_locked(&state))
    }

    fn fold_sample(&self, state: &mut WaveformState, sample: f32) {
        let abs_sample = sample.abs();
        atomic_f32_max(&self.max_amplitude, abs_sample);

        if self.config.enable_rms_overlay {
            let old = state.rms_window[state.rms_index];
            state.rms_window[state.rms_index] = abs_sample;
            state.rms_sum = state.rms_sum - old * old + abs_sample * abs_sample;
            state.rms_index = (state.rms_index + 1) % state.rms_window.len();

            let rms = (state.rms_sum / state.rms_window.len() as f32).max(0.0).sqrt();
            self.current_rms.store(rms.to_bits(), Ordering::Relaxed);
        }

        state.accumulator.push(abs_sample);
        if state.accumulator.len() >= self.config.downsample_ratio.max(1) {
            let bucket_peak = state.accumulator.iter().cloned().fold(0.0f32, f32::max);
            let bucket_mean =
                state.accumulator.iter().sum::<f32>() / state.accumulator.len() as f32;

            state.sample_buffer.push_back(bucket_mean);
            if self.config.enable_peak_hold {
                state.peak_buffer.push_back(bucket_peak);
            }
            if self.config.enable_rms_overlay {
                let rms = (state.rms_sum / state.rms_window.len() as f32).max(0.0).sqrt();
                state.rms_buffer.push_back(rms);
            }

            let max_buckets =
                (self.config.max_samples / self.config.downsample_ratio.max(1)).max(1);
            while state.sample_buffer.len() > max_buckets {
                state.sample_buffer.pop_front();
            }
            while state.peak_buffer.len() > max_buckets {
                state.peak_buffer.pop_front();
            }
            while state.rms_buffer.len() > max_buckets {
                state.rms_buffer.pop_front();
            }

            state.accumulator.clear();
        }
    }

    /// Current display buffers without feeding new audio
    pub fn snapshot(&self) -> Result<WaveformSnapshot, EngineError> {
        let state = self.state.lock().map_err(|_| EngineError::LockPoisoned {
            component: "waveform_generator".to_string(),
        })?;
        Ok(self.snapshot_locked(&state))
    }

    fn snapshot_locked(&self, state: &WaveformState) -> WaveformSnapshot {
        WaveformSnapshot {
            samples: state.sample_buffer.iter().cloned().collect(),
            peaks: state.peak_buffer.iter().cloned().collect(),
            rms_envelope: state.rms_buffer.iter().cloned().collect(),
            max_amplitude: self.current_peak(),
            rms_amplitude: self.current_rms(),
            original_sample_count: self.total_samples.load(Ordering::Relaxed),
        }
    }

    /// Running maximum amplitude; lock-free read
    pub fn current_peak(&self) -> f32 {
        f32::from_bits(self.max_amplitude.load(Ordering::Relaxed))
    }

    /// Most recent windowed RMS; lock-free read
    pub fn current_rms(&self) -> f32 {
        f32::from_bits(self.current_rms.load(Ordering::Relaxed))
    }

    /// Mono samples consumed; lock-free read
    pub fn samples_processed(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }
}
