// FFT module - windowed magnitude spectrum computation
//
// This module handles FFT computation with Hann windowing to reduce
// spectral leakage. The magnitude spectrum feeds the mel filterbank and
// the dominant-frequency estimate used for pitch comparison.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT processor that computes magnitude spectra from audio windows
///
/// The transform is planned once at construction; `compute_magnitude_spectrum`
/// is purely a function of the input window and the precomputed Hann table.
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f32>,
    /// Reusable FFT buffer
    buffer: Vec<Complex<f32>>,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `fft_size` - analysis window size in samples
    pub fn new(fft_size: usize) -> Self {
        // Pre-compute Hann window to reduce spectral leakage
        let window = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Compute the magnitude spectrum of one window
    ///
    /// Applies Hann windowing, performs the FFT, and returns magnitudes for
    /// positive frequencies only (exploiting real-input symmetry). Input
    /// shorter than the FFT size is zero-padded.
    ///
    /// # Returns
    /// Magnitude spectrum of size `fft_size / 2 + 1`
    pub fn compute_magnitude_spectrum(&mut self, audio: &[f32]) -> Vec<f32> {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = audio.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        self.buffer[..self.fft_size / 2 + 1]
            .iter()
            .map(|c| c.norm())
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

/// Frequency of the strongest bin in a magnitude spectrum, in Hz
///
/// Returns 0.0 for an all-zero spectrum (silence has no dominant frequency).
pub fn dominant_frequency(spectrum: &[f32], sample_rate: u32, fft_size: usize) -> f32 {
    let bin_width = sample_rate as f32 / fft_size as f32;
    let mut peak_bin = 0usize;
    let mut peak_mag = 0.0f32;
    for (i, &mag) in spectrum.iter().enumerate() {
        if mag > peak_mag {
            peak_mag = mag;
            peak_bin = i;
        }
    }
    if peak_mag > 1e-10 {
        peak_bin as f32 * bin_width
    } else {
        0.0
    }
}
