// Mel filterbank and DCT - spectrum decorrelation for cepstral features
//
// The magnitude spectrum is warped onto the mel scale by a bank of
// triangular filters, log-compressed, and decorrelated with a DCT-II.
// Both tables are computed once at construction so the transform is a
// pure function of the input window.

/// Floor applied before log compression to keep all-zero windows finite
const LOG_FLOOR: f32 = 1e-10;

/// Convert frequency in Hz to mels
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mels to frequency in Hz
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over a magnitude spectrum
pub struct MelFilterbank {
    /// One weight row per band, dense over the spectrum bins
    filters: Vec<Vec<f32>>,
    spectrum_len: usize,
}

impl MelFilterbank {
    /// Build a filterbank spanning 0 Hz to Nyquist
    ///
    /// # Arguments
    /// * `sample_rate` - audio sample rate in Hz
    /// * `fft_size` - FFT window size the spectra are produced with
    /// * `num_bands` - number of triangular filters
    pub fn new(sample_rate: u32, fft_size: usize, num_bands: usize) -> Self {
        let spectrum_len = fft_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let max_mel = hz_to_mel(nyquist);

        // Band edges evenly spaced on the mel scale: num_bands + 2 points
        let edges: Vec<f32> = (0..num_bands + 2)
            .map(|i| mel_to_hz(max_mel * i as f32 / (num_bands + 1) as f32))
            .collect();

        let bin_width = sample_rate as f32 / fft_size as f32;
        let mut filters = Vec::with_capacity(num_bands);
        for band in 0..num_bands {
            let (lo, center, hi) = (edges[band], edges[band + 1], edges[band + 2]);
            let mut row = vec![0.0f32; spectrum_len];
            for (bin, weight) in row.iter_mut().enumerate() {
                let freq = bin as f32 * bin_width;
                if freq > lo && freq < center {
                    *weight = (freq - lo) / (center - lo);
                } else if freq >= center && freq < hi {
                    *weight = (hi - freq) / (hi - center);
                }
            }
            filters.push(row);
        }

        Self {
            filters,
            spectrum_len,
        }
    }

    /// Apply the filterbank and log-compress the band energies
    ///
    /// # Returns
    /// One log-energy per band, always finite (floored at [`LOG_FLOOR`])
    pub fn apply_log(&self, spectrum: &[f32]) -> Vec<f32> {
        debug_assert_eq!(spectrum.len(), self.spectrum_len);
        self.filters
            .iter()
            .map(|row| {
                let energy: f32 = row
                    .iter()
                    .zip(spectrum.iter())
                    .map(|(&w, &mag)| w * mag * mag)
                    .sum();
                energy.max(LOG_FLOOR).ln()
            })
            .collect()
    }

    pub fn num_bands(&self) -> usize {
        self.filters.len()
    }
}

/// DCT-II transform truncated to the leading cepstral coefficients
pub struct DctTransform {
    /// Flattened basis, `num_coeffs` rows of `num_bands` entries
    basis: Vec<f32>,
    num_coeffs: usize,
    num_bands: usize,
}

impl DctTransform {
    pub fn new(num_bands: usize, num_coeffs: usize) -> Self {
        let scale = (2.0 / num_bands as f32).sqrt();
        let mut basis = Vec::with_capacity(num_coeffs * num_bands);
        for k in 0..num_coeffs {
            let row_scale = if k == 0 {
                scale / std::f32::consts::SQRT_2
            } else {
                scale
            };
            for n in 0..num_bands {
                let angle =
                    std::f32::consts::PI * k as f32 * (n as f32 + 0.5) / num_bands as f32;
                basis.push(row_scale * angle.cos());
            }
        }
        Self {
            basis,
            num_coeffs,
            num_bands,
        }
    }

    /// Project log band energies onto the truncated DCT basis
    pub fn apply(&self, log_energies: &[f32]) -> Vec<f32> {
        debug_assert_eq!(log_energies.len(), self.num_bands);
        (0..self.num_coeffs)
            .map(|k| {
                let row = &self.basis[k * self.num_bands..(k + 1) * self.num_bands];
                row.iter()
                    .zip(log_energies.iter())
                    .map(|(&b, &x)| b * x)
                    .sum()
            })
            .collect()
    }

    pub fn num_coeffs(&self) -> usize {
        self.num_coeffs
    }
}
