// RealtimeScorer - multi-component similarity scoring with history
//
// Combines the alignment similarity with independent volume and timing
// sub-scores (optionally pitch) into one weighted overall score per audio
// chunk. Every score is appended to a bounded history ring, from which
// trend/peak queries and qualitative feedback are derived.
//
// Sub-scores:
// - mfcc: incremental DTW similarity over all query frames so far
// - volume: min/max ratio of the chunk RMS against the reference envelope
// - timing: min(p, 1/p) with p the frame-count progression ratio; peaks at
//   1.0 exactly when the query has covered the reference duration
// - pitch: dominant-frequency ratio when a WAV-derived reference exists,
//   neutral 0.5 otherwise; weighted 0.0 by default
//
// Confidence is derived from signal quality (silence ratio and chunk RMS),
// not from the match itself, so feedback can flag unreliable scores.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analysis::alignment::SequenceAligner;
use crate::analysis::features::{FeatureExtractor, MAX_CHANNELS};
use crate::config::{FeatureConfig, ScoringConfig};
use crate::error::ScoringError;
use crate::master::MasterCall;

/// Number of recent scores averaged for the trending value
const TREND_WINDOW: usize = 5;

/// Confidence below which feedback reports the signal instead of the score
const LOW_CONFIDENCE: f32 = 0.3;

/// Amplitude below which a sample counts toward the silence ratio
const SILENCE_AMPLITUDE: f32 = 1e-3;

/// One composite score update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Weighted combination of the sub-scores, in [0, 1]
    pub overall: f32,
    /// Alignment (MFCC) similarity sub-score
    pub mfcc: f32,
    /// Volume match sub-score
    pub volume: f32,
    /// Timing match sub-score
    pub timing: f32,
    /// Pitch match sub-score (neutral 0.5 when no pitch reference exists)
    pub pitch: f32,
    /// Signal-quality confidence, in [0, 1]
    pub confidence: f32,
    /// Total samples analyzed so far, counting every channel
    pub samples_analyzed: u64,
    /// Milliseconds since the scorer was created
    pub timestamp_ms: u64,
}

/// Snapshot of recent scoring state for UI feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeFeedback {
    pub current: SimilarityScore,
    /// Mean overall score over the most recent trend window
    pub trending_score: f32,
    /// Best overall score seen this session
    pub peak_score: f32,
    /// Estimated fraction of the reference duration covered, in [0, 1]
    pub progress_ratio: f32,
    pub quality_assessment: String,
    pub recommendation: String,
}

/// Real-time multi-component scorer
///
/// Owns one feature extractor and one aligner; a master call must be loaded
/// before audio can be scored. Reloading the master keeps history and
/// counters, failed loads keep the prior master.
pub struct RealtimeScorer {
    config: ScoringConfig,
    extractor: FeatureExtractor,
    aligner: SequenceAligner,
    master: Option<MasterCall>,
    history: VecDeque<SimilarityScore>,
    peak_overall: f32,
    /// Carried forward while the aligner has no frames yet
    last_mfcc: f32,
    /// Total samples seen, counting every channel
    samples_analyzed: u64,
    /// Mono sample count, for progress against the reference duration
    mono_samples: u64,
    started: Instant,
}

impl RealtimeScorer {
    /// Create a scorer; the configuration is validated up front
    pub fn new(
        sample_rate: u32,
        features: &FeatureConfig,
        scoring: ScoringConfig,
    ) -> Result<Self, ScoringError> {
        if sample_rate == 0 {
            return Err(ScoringError::InvalidConfig {
                reason: "sample_rate must be greater than 0".to_string(),
            });
        }
        features.validate()?;
        scoring.validate()?;

        Ok(Self {
            config: scoring,
            extractor: FeatureExtractor::new(sample_rate, features),
            aligner: SequenceAligner::new(),
            master: None,
            history: VecDeque::new(),
            peak_overall: 0.0,
            last_mfcc: 0.0,
            samples_analyzed: 0,
            mono_samples: 0,
            started: Instant::now(),
        })
    }

    /// Install or replace the master call
    ///
    /// The incoming sequence must be non-empty and match the extractor's
    /// coefficient width; on rejection the prior master (if any) stays
    /// loaded. Replacing the master restarts alignment, keeping history.
    pub fn set_master(&mut self, master: MasterCall) -> Result<(), ScoringError> {
        if master.frames.is_empty() {
            return Err(ScoringError::InsufficientData);
        }
        let width = master.coeff_width();
        if width != self.extractor.num_coefficients() {
            return Err(ScoringError::InvalidConfig {
                reason: format!(
                    "master call has {} coefficients per frame, extractor produces {}",
                    width,
                    self.extractor.num_coefficients()
                ),
            });
        }
        if master.frames.iter().any(|f| f.width() != width) {
            return Err(ScoringError::InvalidConfig {
                reason: "master call frames have inconsistent widths".to_string(),
            });
        }

        tracing::info!(
            "[RealtimeScorer] Master call '{}' loaded: {} frames x {} coefficients",
            master.name,
            master.frame_count(),
            width
        );
        self.aligner.set_reference(master.frames.clone());
        self.last_mfcc = 0.0;
        self.master = Some(master);
        Ok(())
    }

    pub fn has_master(&self) -> bool {
        self.master.is_some()
    }

    /// Score one chunk of interleaved audio
    ///
    /// Runs feature extraction, advances the aligner, computes the
    /// independent sub-scores, and appends the combined score to history.
    /// Fails atomically: on error no feature or score state is committed.
    pub fn process_audio(
        &mut self,
        samples: &[f32],
        channels: u16,
    ) -> Result<SimilarityScore, ScoringError> {
        let master = self.master.as_ref().ok_or(ScoringError::NoMasterCall)?;
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

        let reference_rms = master.reference_rms;
        let reference_len = master.frames.len();
        let reference_peak_hz = master.mean_peak_hz;

        let frames = self.extractor.process(samples, channels)?;
        self.aligner.extend(&frames);

        let mfcc = match self.aligner.similarity() {
            Ok(similarity) => {
                self.last_mfcc = similarity;
                similarity
            }
            // No frames yet this session: carry the previous value
            Err(ScoringError::InsufficientData) => self.last_mfcc,
            Err(other) => return Err(other),
        };

        let mono_len = samples.len() / channels as usize;
        let chunk_rms = chunk_rms(samples, channels);
        let volume = ratio_score(chunk_rms, reference_rms);

        let progression = self.aligner.query_len() as f32 / reference_len as f32;
        let timing = if progression > 0.0 {
            progression.min(1.0 / progression)
        } else {
            0.0
        };

        let pitch = match (reference_peak_hz, self.extractor.mean_peak_hz()) {
            (Some(reference), Some(query)) if reference > 0.0 && query > 0.0 => {
                ratio_score(query, reference)
            }
            // No pitch reference available: neutral contribution
            _ => 0.5,
        };

        let confidence = signal_confidence(samples, channels, chunk_rms);

        let overall = (self.config.mfcc_weight * mfcc
            + self.config.volume_weight * volume
            + self.config.timing_weight * timing
            + self.config.pitch_weight * pitch)
            .clamp(0.0, 1.0);

        self.samples_analyzed += samples.len() as u64;
        self.mono_samples += mono_len as u64;
        if overall > self.peak_overall {
            self.peak_overall = overall;
        }

        let score = SimilarityScore {
            overall,
            mfcc,
            volume,
            timing,
            pitch,
            confidence,
            samples_analyzed: self.samples_analyzed,
            timestamp_ms: self.started.elapsed().as_millis() as u64,
        };

        self.history.push_back(score.clone());
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }

        tracing::debug!(
            "[RealtimeScorer] overall {:.3} (mfcc {:.3}, volume {:.3}, timing {:.3}), confidence {:.2}",
            score.overall,
            score.mfcc,
            score.volume,
            score.timing,
            score.confidence
        );

        Ok(score)
    }

    /// Replace the scoring configuration
    ///
    /// The new configuration is validated whole; on rejection the prior
    /// configuration remains active.
    pub fn update_config(&mut self, new_config: ScoringConfig) -> Result<(), ScoringError> {
        new_config.validate()?;
        self.config = new_config;
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
        Ok(())
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Up to `n` most recent scores, newest first
    pub fn scoring_history(&self, n: usize) -> Vec<SimilarityScore> {
        self.history.iter().rev().take(n).cloned().collect()
    }

    /// Similarity over all query frames seen so far
    pub fn similarity(&self) -> Result<f32, ScoringError> {
        if self.master.is_none() {
            return Err(ScoringError::NoMasterCall);
        }
        self.aligner.similarity()
    }

    /// Number of query frames accumulated this session
    pub fn feature_count(&self) -> usize {
        self.aligner.query_len()
    }

    /// Derive trend/peak/progress feedback from recent history
    ///
    /// # Errors
    /// `InsufficientData` before the first score exists.
    pub fn realtime_feedback(&self) -> Result<RealtimeFeedback, ScoringError> {
        let current = self
            .history
            .back()
            .cloned()
            .ok_or(ScoringError::InsufficientData)?;

        let window = self.history.len().min(TREND_WINDOW);
        let trending_score = self
            .history
            .iter()
            .rev()
            .take(window)
            .map(|s| s.overall)
            .sum::<f32>()
            / window as f32;

        let (quality_assessment, recommendation) = describe_quality(&current);

        Ok(RealtimeFeedback {
            progress_ratio: self.analysis_progress(),
            trending_score,
            peak_score: self.peak_overall,
            current,
            quality_assessment: quality_assessment.to_string(),
            recommendation: recommendation.to_string(),
        })
    }

    /// Fraction of the expected reference duration covered, in [0, 1]
    ///
    /// 0.0 before any audio has been processed or while no master is loaded.
    pub fn analysis_progress(&self) -> f32 {
        let Some(master) = self.master.as_ref() else {
            return 0.0;
        };
        let expected = (master.frame_count() * self.extractor.hop_size()) as f32;
        if expected <= 0.0 {
            return 0.0;
        }
        (self.mono_samples as f32 / expected).clamp(0.0, 1.0)
    }

    /// Clear accumulated frames, history, and counters
    ///
    /// The master call and configuration are preserved; the scorer is ready
    /// for a fresh attempt against the same reference.
    pub fn reset(&mut self) {
        self.extractor.reset();
        self.aligner.reset_query();
        self.history.clear();
        self.peak_overall = 0.0;
        self.last_mfcc = 0.0;
        self.samples_analyzed = 0;
        self.mono_samples = 0;
    }
}

/// RMS over the mono downmix of an interleaved chunk
fn chunk_rms(samples: &[f32], channels: u16) -> f32 {
    let ch = channels as usize;
    let frame_count = samples.len() / ch;
    if frame_count == 0 {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .chunks_exact(ch)
        .map(|frame| {
            let mono = frame.iter().sum::<f32>() / ch as f32;
            (mono as f64) * (mono as f64)
        })
        .sum();
    (sum_squares / frame_count as f64).sqrt() as f32
}

/// Symmetric min/max ratio of two non-negative levels, in [0, 1]
///
/// Equal levels score 1.0; two silent levels compare as matching.
fn ratio_score(a: f32, b: f32) -> f32 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if hi < 1e-6 {
        return 1.0;
    }
    (lo / hi).clamp(0.0, 1.0)
}

/// Confidence from signal quality: penalizes silence-dominated and
/// very low-amplitude chunks
fn signal_confidence(samples: &[f32], channels: u16, chunk_rms: f32) -> f32 {
    let ch = channels as usize;
    let frame_count = samples.len() / ch;
    if frame_count == 0 {
        return 0.0;
    }
    let silent = samples
        .chunks_exact(ch)
        .filter(|frame| {
            let mono = frame.iter().sum::<f32>() / ch as f32;
            mono.abs() < SILENCE_AMPLITUDE
        })
        .count();
    let active_ratio = 1.0 - silent as f32 / frame_count as f32;
    let level = (chunk_rms / 0.1).min(1.0);
    (active_ratio * level).clamp(0.0, 1.0)
}

/// Map a score to its quality tier and recommendation strings
fn describe_quality(score: &SimilarityScore) -> (&'static str, &'static str) {
    if score.confidence < LOW_CONFIDENCE {
        return (
            "insufficient signal",
            "Move closer to the microphone or reduce background noise",
        );
    }
    if score.overall >= 0.8 {
        ("excellent", "Great match - keep this cadence and tone")
    } else if score.overall >= 0.6 {
        ("good", "Close match - hold the call slightly longer")
    } else if score.overall >= 0.4 {
        ("fair", "Partial match - listen to the master call again and match its rhythm")
    } else {
        ("poor", "Weak match - slow down and match the master call's pacing")
    }
}
