// Feature frame data types

use serde::{Deserialize, Serialize};

/// One fixed-width coefficient frame for a short analysis window
///
/// Coefficient 0 carries the window's log-energy; the remaining slots hold
/// mel-cepstral coefficients. Frames are append-only: once produced they are
/// never mutated, and every frame in a session has the same width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// Temporal position of this frame within the stream
    pub index: u64,
    /// Coefficient vector, width fixed at extractor configuration time
    pub coeffs: Vec<f32>,
}

impl FeatureFrame {
    /// Number of coefficients in this frame
    pub fn width(&self) -> usize {
        self.coeffs.len()
    }

    /// Log-energy of the source window (coefficient 0)
    pub fn log_energy(&self) -> f32 {
        self.coeffs.first().copied().unwrap_or(f32::NEG_INFINITY)
    }

    /// Linear energy of the source window, recovered from coefficient 0
    pub fn energy(&self) -> f32 {
        self.log_energy().exp()
    }
}
