// Engine error types and constants

use crate::error::{ErrorCode, ScoringError};
use log::error;
use std::fmt;

/// Engine error code constants
///
/// These constants provide a single source of truth for the engine-level
/// status vocabulary. Every public engine operation resolves to `Ok` or to
/// exactly one of these codes.
///
/// Error code range: 1001-1008
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    /// Session id does not exist or was destroyed
    pub const SESSION_NOT_FOUND: i32 = 1001;

    /// Master call file could not be found
    pub const FILE_NOT_FOUND: i32 = 1002;

    /// Audio buffer was empty or channel count out of range
    pub const INVALID_AUDIO_DATA: i32 = 1003;

    /// Engine or session could not be constructed from the given configuration
    pub const INITIALIZATION_FAILED: i32 = 1004;

    /// Unexpected internal failure (decode error, numerical instability)
    pub const INTERNAL_ERROR: i32 = 1005;

    /// Not enough audio has been processed to answer the query yet
    pub const INSUFFICIENT_DATA: i32 = 1006;

    /// Operation requires a loaded master call
    pub const NO_MASTER_CALL: i32 = 1007;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1008;
}

/// Log an engine error with structured context
///
/// Logs include the numeric code, the component, and the failure site so a
/// monitoring pipeline can aggregate on code without parsing messages.
pub fn log_engine_error(err: &EngineError, context: &str) {
    error!(
        "Engine error in {}: code={}, component=AnalysisEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Engine-level errors
///
/// These errors cover session lifecycle, master call loading, and chunk
/// routing. Component-level scoring errors are translated into this
/// vocabulary at the engine boundary, never suppressed.
///
/// Error code range: 1001-1008
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Session id does not exist or was destroyed
    SessionNotFound { session_id: u32 },

    /// Master call file could not be found
    FileNotFound { path: String },

    /// Audio buffer was empty or channel count out of range
    InvalidAudioData { reason: String },

    /// Engine or session could not be constructed from the given configuration
    InitializationFailed { reason: String },

    /// Unexpected internal failure (decode error, numerical instability)
    Internal { reason: String },

    /// Not enough audio has been processed to answer the query yet
    InsufficientData,

    /// Operation requires a loaded master call
    NoMasterCall,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::SessionNotFound { .. } => EngineErrorCodes::SESSION_NOT_FOUND,
            EngineError::FileNotFound { .. } => EngineErrorCodes::FILE_NOT_FOUND,
            EngineError::InvalidAudioData { .. } => EngineErrorCodes::INVALID_AUDIO_DATA,
            EngineError::InitializationFailed { .. } => EngineErrorCodes::INITIALIZATION_FAILED,
            EngineError::Internal { .. } => EngineErrorCodes::INTERNAL_ERROR,
            EngineError::InsufficientData => EngineErrorCodes::INSUFFICIENT_DATA,
            EngineError::NoMasterCall => EngineErrorCodes::NO_MASTER_CALL,
            EngineError::LockPoisoned { .. } => EngineErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::SessionNotFound { session_id } => {
                format!("Session {} not found or already destroyed", session_id)
            }
            EngineError::FileNotFound { path } => {
                format!("Master call file not found: {}", path)
            }
            EngineError::InvalidAudioData { reason } => {
                format!("Invalid audio data: {}", reason)
            }
            EngineError::InitializationFailed { reason } => {
                format!("Initialization failed: {}", reason)
            }
            EngineError::Internal { reason } => {
                format!("Internal error: {}", reason)
            }
            EngineError::InsufficientData => {
                "Insufficient data: no analysis result available yet".to_string()
            }
            EngineError::NoMasterCall => {
                "No master call loaded. Call load_master_call() first.".to_string()
            }
            EngineError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::FileNotFound {
                path: err.to_string(),
            }
        } else {
            EngineError::Internal {
                reason: err.to_string(),
            }
        }
    }
}

impl From<ScoringError> for EngineError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::NoMasterCall => EngineError::NoMasterCall,
            ScoringError::InvalidAudioData { reason } => EngineError::InvalidAudioData { reason },
            ScoringError::InsufficientData => EngineError::InsufficientData,
            ScoringError::InvalidConfig { reason } => EngineError::InitializationFailed { reason },
        }
    }
}
