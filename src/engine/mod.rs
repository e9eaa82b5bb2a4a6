// AnalysisEngine - session-scoped streaming analysis orchestration
//
// The engine owns a set of isolated analysis sessions, each bound to one
// audio stream. Chunked audio is routed into the owning session's pipeline
// (feature extraction, alignment, scoring) under that session's exclusive
// lock; sessions processed by separate threads never block on each other.
//
// The engine is an explicit value with an explicit lifetime: multiple
// engines (e.g. in tests) coexist without interference. Session ids are
// unique for the lifetime of an engine instance and never reused.

mod session;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::analysis::scorer::{RealtimeFeedback, SimilarityScore};
use crate::config::EngineConfig;
use crate::error::{log_engine_error, EngineError};
use crate::master;
use session::SessionHandle;

/// Opaque session identifier
pub type SessionId = u32;

/// Multi-session wildlife call analysis engine
pub struct AnalysisEngine {
    config: EngineConfig,
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    next_session_id: AtomicU32,
}

impl AnalysisEngine {
    /// Create an engine with default configuration
    pub fn new() -> Self {
        // The default configuration always validates
        Self::with_config(EngineConfig::default()).expect("default configuration is valid")
    }

    /// Create an engine from an explicit configuration
    ///
    /// # Errors
    /// `InitializationFailed` when the configuration does not validate;
    /// nothing is constructed in that case.
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        config
            .validate()
            .map_err(|err| EngineError::InitializationFailed {
                reason: err.to_string(),
            })?;
        Ok(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU32::new(1),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an isolated analysis session at the given sample rate
    pub fn create_session(&self, sample_rate: u32) -> Result<SessionId, EngineError> {
        if sample_rate == 0 {
            let err = EngineError::InitializationFailed {
                reason: "sample_rate must be greater than 0".to_string(),
            };
            log_engine_error(&err, "create_session");
            return Err(err);
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(SessionHandle::new(id, sample_rate, &self.config)?);

        let mut sessions = self.write_sessions()?;
        sessions.insert(id, handle);
        tracing::info!("[AnalysisEngine] Created session {} at {} Hz", id, sample_rate);
        Ok(id)
    }

    /// Destroy a session, releasing its state
    ///
    /// The id is never reused; later calls with it fail with
    /// `SessionNotFound`.
    pub fn destroy_session(&self, id: SessionId) -> Result<(), EngineError> {
        let mut sessions = self.write_sessions()?;
        match sessions.remove(&id) {
            Some(_) => {
                tracing::info!("[AnalysisEngine] Destroyed session {}", id);
                Ok(())
            }
            None => {
                let err = EngineError::SessionNotFound { session_id: id };
                log_engine_error(&err, "destroy_session");
                Err(err)
            }
        }
    }

    /// Load a master call into a session by name
    ///
    /// Resolution and failure semantics follow [`master::resolve_and_load`];
    /// on any failure the session keeps its previous master call.
    pub fn load_master_call(&self, id: SessionId, name: &str) -> Result<(), EngineError> {
        let handle = self.session(id)?;
        let master = master::resolve_and_load(
            &self.config.audio.master_calls_dir,
            name,
            handle.sample_rate,
            &self.config.features,
        )
        .map_err(|err| {
            log_engine_error(&err, "load_master_call");
            err
        })?;

        let mut state = lock_session(&handle)?;
        state.scorer.set_master(master)?;
        state.master_name = Some(name.to_string());
        Ok(())
    }

    /// Route one chunk of interleaved audio into a session's pipeline
    ///
    /// The chunk is processed to completion or fails atomically; every
    /// successful call appends a score to the session history and publishes
    /// it to subscribers.
    pub fn process_audio_chunk(
        &self,
        id: SessionId,
        samples: &[f32],
        channels: u16,
    ) -> Result<(), EngineError> {
        let handle = self.session(id)?;

        let score = {
            let mut state = lock_session(&handle)?;
            state.scorer.process_audio(samples, channels).map_err(|err| {
                let err = EngineError::from(err);
                log_engine_error(&err, "process_audio_chunk");
                err
            })?
        };

        let chunk_peak = samples.iter().fold(0.0f32, |max, &s| max.max(s.abs()));
        handle.record_chunk(samples.len(), chunk_peak);
        handle.publish_score(score, self.config.scoring.update_rate_ms);
        Ok(())
    }

    /// Alignment similarity over all audio seen so far, in [0, 1]
    pub fn get_similarity_score(&self, id: SessionId) -> Result<f32, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        state.scorer.similarity().map_err(EngineError::from)
    }

    /// Number of query feature frames accumulated in a session
    pub fn get_feature_count(&self, id: SessionId) -> Result<usize, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        Ok(state.scorer.feature_count())
    }

    /// Most recent composite score, if one exists
    pub fn get_latest_score(&self, id: SessionId) -> Result<SimilarityScore, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        state
            .scorer
            .scoring_history(1)
            .into_iter()
            .next()
            .ok_or(EngineError::InsufficientData)
    }

    /// Up to `n` most recent scores for a session, newest first
    pub fn get_scoring_history(
        &self,
        id: SessionId,
        n: usize,
    ) -> Result<Vec<SimilarityScore>, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        Ok(state.scorer.scoring_history(n))
    }

    /// Trend/peak/progress feedback for a session
    pub fn get_realtime_feedback(&self, id: SessionId) -> Result<RealtimeFeedback, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        state.scorer.realtime_feedback().map_err(EngineError::from)
    }

    /// Fraction of the master call duration covered, in [0, 1]
    pub fn get_analysis_progress(&self, id: SessionId) -> Result<f32, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        Ok(state.scorer.analysis_progress())
    }

    /// Clear a session's accumulated analysis state
    ///
    /// The loaded master call and configuration are preserved.
    pub fn reset_session(&self, id: SessionId) -> Result<(), EngineError> {
        let handle = self.session(id)?;
        let mut state = lock_session(&handle)?;
        state.scorer.reset();
        handle.reset_counters();
        tracing::info!("[AnalysisEngine] Reset session {}", id);
        Ok(())
    }

    /// Ids of all live sessions, ascending
    pub fn active_sessions(&self) -> Vec<SessionId> {
        match self.sessions.read() {
            Ok(sessions) => {
                let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
            Err(_) => Vec::new(),
        }
    }

    /// Subscribe to a session's score updates
    ///
    /// Every successful `process_audio_chunk` publishes its score; each
    /// subscriber receives an independent copy.
    pub fn subscribe_scores(
        &self,
        id: SessionId,
    ) -> Result<broadcast::Receiver<SimilarityScore>, EngineError> {
        let handle = self.session(id)?;
        Ok(handle.score_tx.subscribe())
    }

    /// Name of the master call loaded into a session, if any
    pub fn session_master_name(&self, id: SessionId) -> Result<Option<String>, EngineError> {
        let handle = self.session(id)?;
        let state = lock_session(&handle)?;
        Ok(state.master_name.clone())
    }

    /// Total samples routed into a session; lock-free read
    pub fn session_samples_processed(&self, id: SessionId) -> Result<u64, EngineError> {
        Ok(self.session(id)?.samples_processed())
    }

    /// Running peak amplitude of a session's input; lock-free read
    pub fn session_peak_amplitude(&self, id: SessionId) -> Result<f32, EngineError> {
        Ok(self.session(id)?.peak_amplitude())
    }

    /// Look up a live session, cloning its handle out of the map lock
    fn session(&self, id: SessionId) -> Result<Arc<SessionHandle>, EngineError> {
        let sessions = self.sessions.read().map_err(|_| EngineError::LockPoisoned {
            component: "session_map".to_string(),
        })?;
        sessions.get(&id).cloned().ok_or_else(|| {
            let err = EngineError::SessionNotFound { session_id: id };
            log_engine_error(&err, "session_lookup");
            err
        })
    }

    fn write_sessions(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Arc<SessionHandle>>>, EngineError>
    {
        self.sessions.write().map_err(|_| EngineError::LockPoisoned {
            component: "session_map".to_string(),
        })
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_session(
    handle: &SessionHandle,
) -> Result<std::sync::MutexGuard<'_, session::SessionState>, EngineError> {
    handle.state.lock().map_err(|_| {
        let err = EngineError::LockPoisoned {
            component: format!("session_{}", handle.id),
        };
        log_engine_error(&err, "lock_session");
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let engine = AnalysisEngine::new();
        assert!(engine.active_sessions().is_empty());

        let a = engine.create_session(44100).unwrap();
        let b = engine.create_session(48000).unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.active_sessions(), vec![a, b]);

        engine.destroy_session(a).unwrap();
        assert_eq!(engine.active_sessions(), vec![b]);

        // Destroyed ids are never silently accepted again
        assert!(matches!(
            engine.destroy_session(a),
            Err(EngineError::SessionNotFound { .. })
        ));
        assert!(matches!(
            engine.get_feature_count(a),
            Err(EngineError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_session_ids_not_reused() {
        let engine = AnalysisEngine::new();
        let a = engine.create_session(44100).unwrap();
        engine.destroy_session(a).unwrap();
        let b = engine.create_session(44100).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_engines_are_independent() {
        let first = AnalysisEngine::new();
        let second = AnalysisEngine::new();
        let id = first.create_session(44100).unwrap();
        assert!(second.active_sessions().is_empty());
        assert!(matches!(
            second.get_feature_count(id),
            Err(EngineError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let engine = AnalysisEngine::new();
        assert!(matches!(
            engine.create_session(0),
            Err(EngineError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = EngineConfig::default();
        config.scoring.mfcc_weight = 0.9; // sum now 1.4
        assert!(matches!(
            AnalysisEngine::with_config(config),
            Err(EngineError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_process_before_master_is_no_master_call() {
        let engine = AnalysisEngine::new();
        let id = engine.create_session(44100).unwrap();
        let audio = vec![0.5f32; 1024];
        assert_eq!(
            engine.process_audio_chunk(id, &audio, 1).unwrap_err(),
            EngineError::NoMasterCall
        );
    }

    #[test]
    fn test_load_master_call_unknown_name() {
        let engine = AnalysisEngine::new();
        let id = engine.create_session(44100).unwrap();
        assert!(matches!(
            engine.load_master_call(id, "no_such_call"),
            Err(EngineError::FileNotFound { .. })
        ));
    }
}
