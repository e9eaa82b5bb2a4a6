// Per-session analysis state bundle
//
// Each session owns its own scorer (which in turn owns one extractor and
// one aligner), its own exclusive lock, and its own atomic counters.
// Sessions never share state; the per-session lock is what preserves
// cross-session parallelism.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::analysis::scorer::{RealtimeScorer, SimilarityScore};
use crate::analysis::waveform::atomic_f32_max;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Broadcast buffer for score updates; laggy subscribers drop oldest
const SCORE_CHANNEL_CAPACITY: usize = 100;

/// Serialized state owned by one session
pub(crate) struct SessionState {
    pub scorer: RealtimeScorer,
    pub master_name: Option<String>,
}

/// One isolated, independently-lockable analysis session
///
/// The atomic counters are updated by the processing thread and may be read
/// by a monitoring thread without taking the session lock; reads never
/// observe torn values.
pub(crate) struct SessionHandle {
    pub id: u32,
    pub sample_rate: u32,
    pub state: Mutex<SessionState>,
    /// Total samples routed into this session, counting every channel
    pub samples_processed: AtomicU64,
    /// Running peak amplitude as f32 bits
    pub peak_amplitude: AtomicU32,
    /// Timestamp of the last published score; u64::MAX means never
    last_publish_ms: AtomicU64,
    pub score_tx: broadcast::Sender<SimilarityScore>,
}

impl SessionHandle {
    pub fn new(id: u32, sample_rate: u32, config: &EngineConfig) -> Result<Self, EngineError> {
        let scorer = RealtimeScorer::new(sample_rate, &config.features, config.scoring.clone())
            .map_err(|err| EngineError::InitializationFailed {
                reason: err.to_string(),
            })?;
        let (score_tx, _) = broadcast::channel(SCORE_CHANNEL_CAPACITY);

        Ok(Self {
            id,
            sample_rate,
            state: Mutex::new(SessionState {
                scorer,
                master_name: None,
            }),
            samples_processed: AtomicU64::new(0),
            peak_amplitude: AtomicU32::new(0.0f32.to_bits()),
            last_publish_ms: AtomicU64::new(u64::MAX),
            score_tx,
        })
    }

    /// Publish a score to subscribers, rate-limited by `update_rate_ms`
    ///
    /// The first score after construction or a reset always publishes.
    pub fn publish_score(&self, score: SimilarityScore, update_rate_ms: f32) {
        let last = self.last_publish_ms.load(Ordering::Relaxed);
        let due = last == u64::MAX
            || score.timestamp_ms.saturating_sub(last) >= update_rate_ms as u64;
        if due {
            self.last_publish_ms
                .store(score.timestamp_ms, Ordering::Relaxed);
            // Nobody listening is fine
            let _ = self.score_tx.send(score);
        }
    }

    /// Record chunk-level counters; called after a successful process call
    pub fn record_chunk(&self, sample_count: usize, chunk_peak: f32) {
        self.samples_processed
            .fetch_add(sample_count as u64, Ordering::Relaxed);
        atomic_f32_max(&self.peak_amplitude, chunk_peak);
    }

    /// Reset atomic counters alongside a scorer reset
    pub fn reset_counters(&self) {
        self.samples_processed.store(0, Ordering::Relaxed);
        self.peak_amplitude.store(0.0f32.to_bits(), Ordering::Relaxed);
        self.last_publish_ms.store(u64::MAX, Ordering::Relaxed);
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed.load(Ordering::Relaxed)
    }

    pub fn peak_amplitude(&self) -> f32 {
        f32::from_bits(self.peak_amplitude.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let handle = SessionHandle::new(1, 44100, &EngineConfig::default()).unwrap();
        assert_eq!(handle.samples_processed(), 0);
        assert_eq!(handle.peak_amplitude(), 0.0);

        handle.record_chunk(512, 0.7);
        handle.record_chunk(512, 0.3);
        assert_eq!(handle.samples_processed(), 1024);
        assert!((handle.peak_amplitude() - 0.7).abs() < 1e-6);

        handle.reset_counters();
        assert_eq!(handle.samples_processed(), 0);
        assert_eq!(handle.peak_amplitude(), 0.0);
    }

    #[test]
    fn test_publish_rate_limiting() {
        let handle = SessionHandle::new(1, 44100, &EngineConfig::default()).unwrap();
        let mut rx = handle.score_tx.subscribe();
        let score = |timestamp_ms| SimilarityScore {
            overall: 0.5,
            mfcc: 0.5,
            volume: 0.5,
            timing: 0.5,
            pitch: 0.5,
            confidence: 1.0,
            samples_analyzed: 0,
            timestamp_ms,
        };

        handle.publish_score(score(0), 100.0); // first always publishes
        handle.publish_score(score(50), 100.0); // inside the rate window
        handle.publish_score(score(150), 100.0); // due again

        assert_eq!(rx.try_recv().unwrap().timestamp_ms, 0);
        assert_eq!(rx.try_recv().unwrap().timestamp_ms, 150);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_sample_rate_fails_construction() {
        let result = SessionHandle::new(1, 0, &EngineConfig::default());
        assert!(matches!(
            result,
            Err(EngineError::InitializationFailed { .. })
        ));
    }
}
