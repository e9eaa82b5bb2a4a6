// Analysis module - streaming DSP pipeline for call similarity scoring
//
// This module holds the per-session analysis components, leaves first:
//
// - features: FeatureExtractor (samples -> MFCC frames)
// - alignment: SequenceAligner (incremental DTW over frame sequences)
// - scorer: RealtimeScorer (weighted multi-component score with history)
// - waveform: WaveformGenerator (display-side summarizer, independent of
//   the scoring pipeline)
//
// Pipeline: raw chunk -> FeatureExtractor -> SequenceAligner ->
// RealtimeScorer -> caller queries score/feedback.

pub mod alignment;
pub mod features;
pub mod scorer;
pub mod waveform;

pub use alignment::{score_sequences, SequenceAligner};
pub use features::{FeatureExtractor, FeatureFrame, MAX_CHANNELS};
pub use scorer::{RealtimeFeedback, RealtimeScorer, SimilarityScore};
pub use waveform::{WaveformConfig, WaveformGenerator, WaveformSnapshot};
