// Scoring error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Scoring error code constants
///
/// Component-level errors produced by the feature extractor, aligner, and
/// real-time scorer. The engine translates these into the engine vocabulary
/// at its boundary.
///
/// Error code range: 2001-2004
pub struct ScoringErrorCodes {}

impl ScoringErrorCodes {
    /// Operation requires a loaded master call
    pub const NO_MASTER_CALL: i32 = 2001;

    /// Audio buffer was empty or channel count out of range
    pub const INVALID_AUDIO_DATA: i32 = 2002;

    /// Not enough frames accumulated to produce a result
    pub const INSUFFICIENT_DATA: i32 = 2003;

    /// Configuration rejected by validation
    pub const INVALID_CONFIG: i32 = 2004;
}

/// Log a scoring error with structured context
pub fn log_scoring_error(err: &ScoringError, context: &str) {
    error!(
        "Scoring error in {}: code={}, component=RealtimeScorer, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Scoring-related errors
///
/// These cover the streaming analysis components. `InsufficientData` is an
/// expected, recoverable condition during startup before enough audio has
/// arrived; it is not a fault.
///
/// Error code range: 2001-2004
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Operation requires a loaded master call
    NoMasterCall,

    /// Audio buffer was empty or channel count out of range
    InvalidAudioData { reason: String },

    /// Not enough frames accumulated to produce a result
    InsufficientData,

    /// Configuration rejected by validation
    InvalidConfig { reason: String },
}

impl ErrorCode for ScoringError {
    fn code(&self) -> i32 {
        match self {
            ScoringError::NoMasterCall => ScoringErrorCodes::NO_MASTER_CALL,
            ScoringError::InvalidAudioData { .. } => ScoringErrorCodes::INVALID_AUDIO_DATA,
            ScoringError::InsufficientData => ScoringErrorCodes::INSUFFICIENT_DATA,
            ScoringError::InvalidConfig { .. } => ScoringErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            ScoringError::NoMasterCall => {
                "No master call loaded. Call set_master() first.".to_string()
            }
            ScoringError::InvalidAudioData { reason } => {
                format!("Invalid audio data: {}", reason)
            }
            ScoringError::InsufficientData => {
                "Insufficient data: not enough frames accumulated".to_string()
            }
            ScoringError::InvalidConfig { reason } => {
                format!("Invalid configuration: {}", reason)
            }
        }
    }
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScoringError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ScoringError {}
