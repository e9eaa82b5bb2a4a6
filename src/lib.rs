// Wildcall Core - wildlife call analysis engine
// Session-scoped streaming similarity scoring against master calls

// Module declarations
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod master;

// Re-exports for convenience
pub use analysis::{RealtimeFeedback, RealtimeScorer, SimilarityScore};
pub use config::EngineConfig;
pub use engine::{AnalysisEngine, SessionId};
pub use error::{EngineError, ErrorCode, ScoringError};
