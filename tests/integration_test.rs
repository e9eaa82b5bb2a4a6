//! Integration tests for the session-based analysis engine
//!
//! These tests validate the full scoring lifecycle across the engine layer,
//! including:
//! - Session create/destroy/reset lifecycle
//! - Master call loading from .mfc feature files and WAV recordings
//! - Chunked audio routing and score/feedback queries
//! - Error propagation through the engine status vocabulary
//! - Cross-session isolation under concurrent processing

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use wildcall::analysis::FeatureFrame;
use wildcall::config::EngineConfig;
use wildcall::engine::AnalysisEngine;
use wildcall::error::EngineError;
use wildcall::master;

/// Create a per-test master call directory under the system temp dir
fn master_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "wildcall-it-{}-{}",
        test,
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a 50x13 master call with a sine pattern per coefficient
fn write_test_master(dir: &PathBuf, name: &str) {
    let frames: Vec<FeatureFrame> = (0..50)
        .map(|i| {
            let t = i as f32 / 50.0;
            let mut coeffs: Vec<f32> = (0..13)
                .map(|k| 0.1 * (2.0 * std::f32::consts::PI * t * (k + 1) as f32).sin())
                .collect();
            coeffs[0] = 0.5 + 0.3 * (2.0 * std::f32::consts::PI * t * 3.0).sin();
            FeatureFrame {
                index: i as u64,
                coeffs,
            }
        })
        .collect();
    master::write_feature_file(&dir.join(format!("{}.mfc", name)), &frames).unwrap();
}

fn engine_with_masters(dir: &PathBuf) -> AnalysisEngine {
    let mut config = EngineConfig::default();
    config.audio.master_calls_dir = dir.clone();
    AnalysisEngine::with_config(config).unwrap()
}

fn sine(sample_rate: u32, frequency: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Scenario from the acceptance checklist: 44.1 kHz session, 50x13 master,
/// one 2048-sample constant chunk at amplitude 0.5.
#[test]
fn test_basic_scoring_scenario() {
    let dir = master_dir("basic");
    write_test_master(&dir, "buck_grunt");
    let engine = engine_with_masters(&dir);

    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "buck_grunt").unwrap();
    assert_eq!(
        engine.session_master_name(session).unwrap().as_deref(),
        Some("buck_grunt")
    );

    let audio = vec![0.5f32; 2048];
    engine.process_audio_chunk(session, &audio, 1).unwrap();

    assert_eq!(engine.session_samples_processed(session).unwrap(), 2048);

    let score = engine.get_latest_score(session).unwrap();
    assert_eq!(score.samples_analyzed, 2048);
    assert!((0.0..=1.0).contains(&score.overall));
    assert!((0.0..=1.0).contains(&score.mfcc));
    assert!((0.0..=1.0).contains(&score.volume));
    assert!((0.0..=1.0).contains(&score.timing));
    assert!((0.0..=1.0).contains(&score.confidence));

    engine.destroy_session(session).unwrap();
}

#[test]
fn test_process_before_load_is_no_master_call() {
    let dir = master_dir("no-master");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();

    let audio = vec![0.5f32; 1024];
    assert_eq!(
        engine.process_audio_chunk(session, &audio, 1).unwrap_err(),
        EngineError::NoMasterCall
    );
}

#[test]
fn test_empty_buffer_is_invalid_audio_data() {
    let dir = master_dir("empty-buffer");
    write_test_master(&dir, "call");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "call").unwrap();

    assert!(matches!(
        engine.process_audio_chunk(session, &[], 1),
        Err(EngineError::InvalidAudioData { .. })
    ));
}

#[test]
fn test_unknown_session_is_session_not_found() {
    let engine = AnalysisEngine::new();
    let audio = vec![0.5f32; 512];
    for result in [
        engine.process_audio_chunk(999, &audio, 1).err(),
        engine.get_similarity_score(999).err(),
        engine.get_feature_count(999).err(),
        engine.reset_session(999).err(),
        engine.load_master_call(999, "anything").err(),
        engine.destroy_session(999).err(),
    ] {
        assert!(matches!(
            result,
            Some(EngineError::SessionNotFound { session_id: 999 })
        ));
    }
}

/// Streaming an exact copy of the master's source audio must score high.
#[test]
fn test_self_similarity_through_engine() {
    let dir = master_dir("self-sim");
    let engine = engine_with_masters(&dir);

    // Build the master from a WAV, then stream the identical recording
    let signal = sine(44100, 660.0, 44100);
    let wav_path = dir.join("warble.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
    for &sample in &signal {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "warble").unwrap();

    for chunk in signal.chunks(512) {
        engine.process_audio_chunk(session, chunk, 1).unwrap();
    }

    let score = engine.get_similarity_score(session).unwrap();
    assert!(
        score > 0.5,
        "self-similarity through the engine should exceed 0.5, got {}",
        score
    );

    // Silence against the same master must score lower
    let silent_session = engine.create_session(44100).unwrap();
    engine.load_master_call(silent_session, "warble").unwrap();
    engine
        .process_audio_chunk(silent_session, &vec![0.0f32; 44100], 1)
        .unwrap();
    let silent_score = engine.get_similarity_score(silent_session).unwrap();
    assert!(
        silent_score < score,
        "silence ({}) should score below self-similarity ({})",
        silent_score,
        score
    );
}

#[test]
fn test_feature_count_grows_with_audio() {
    let dir = master_dir("feature-count");
    write_test_master(&dir, "call");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "call").unwrap();

    assert_eq!(engine.get_feature_count(session).unwrap(), 0);
    engine
        .process_audio_chunk(session, &vec![0.3f32; 2048], 1)
        .unwrap();
    let count = engine.get_feature_count(session).unwrap();
    assert!(count > 0);

    engine
        .process_audio_chunk(session, &vec![0.3f32; 2048], 1)
        .unwrap();
    assert!(engine.get_feature_count(session).unwrap() > count);
}

#[test]
fn test_reset_preserves_master() {
    let dir = master_dir("reset");
    write_test_master(&dir, "call");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "call").unwrap();

    engine
        .process_audio_chunk(session, &vec![0.4f32; 4096], 1)
        .unwrap();
    assert!(engine.get_feature_count(session).unwrap() > 0);

    engine.reset_session(session).unwrap();
    assert_eq!(engine.get_feature_count(session).unwrap(), 0);
    assert_eq!(engine.session_samples_processed(session).unwrap(), 0);
    assert_eq!(engine.get_analysis_progress(session).unwrap(), 0.0);

    // Master survived the reset: processing works without reloading
    engine
        .process_audio_chunk(session, &vec![0.4f32; 1024], 1)
        .unwrap();
}

#[test]
fn test_failed_master_load_preserves_previous() {
    let dir = master_dir("bad-load");
    write_test_master(&dir, "good");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "good").unwrap();

    // Unknown name fails distinctly and leaves the prior master installed
    assert!(matches!(
        engine.load_master_call(session, "missing"),
        Err(EngineError::FileNotFound { .. })
    ));

    // Truncated file fails as a decode error
    let bad_path = dir.join("corrupt.mfc");
    fs::write(&bad_path, [1, 0, 0, 0, 13, 0, 0, 0, 9, 9]).unwrap();
    assert!(matches!(
        engine.load_master_call(session, "corrupt"),
        Err(EngineError::Internal { .. })
    ));

    engine
        .process_audio_chunk(session, &vec![0.5f32; 1024], 1)
        .unwrap();
}

#[test]
fn test_history_and_feedback_queries() {
    let dir = master_dir("history");
    write_test_master(&dir, "call");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "call").unwrap();

    for chunk in 0..5 {
        let amplitude = 0.1 + chunk as f32 * 0.1;
        engine
            .process_audio_chunk(session, &vec![amplitude; 1024], 1)
            .unwrap();
    }

    let history = engine.get_scoring_history(session, 5).unwrap();
    assert_eq!(history.len(), 5);
    for pair in history.windows(2) {
        assert!(pair[0].timestamp_ms >= pair[1].timestamp_ms);
    }
    assert_eq!(engine.get_scoring_history(session, 3).unwrap().len(), 3);

    let feedback = engine.get_realtime_feedback(session).unwrap();
    assert!((0.0..=1.0).contains(&feedback.progress_ratio));
    assert!(!feedback.quality_assessment.is_empty());
    assert!(!feedback.recommendation.is_empty());
}

#[test]
fn test_score_subscription_receives_updates() {
    let dir = master_dir("subscribe");
    write_test_master(&dir, "call");
    let engine = engine_with_masters(&dir);
    let session = engine.create_session(44100).unwrap();
    engine.load_master_call(session, "call").unwrap();

    let mut rx = engine.subscribe_scores(session).unwrap();
    engine
        .process_audio_chunk(session, &vec![0.5f32; 2048], 1)
        .unwrap();

    let score = rx.try_recv().unwrap();
    assert_eq!(score.samples_analyzed, 2048);
}

/// Two sessions fed different audio from different threads must never see
/// each other's input.
#[test]
fn test_session_isolation_under_concurrency() {
    let dir = master_dir("isolation");
    let engine = Arc::new(engine_with_masters(&dir));

    // Master built from a 660 Hz warble
    let signal = sine(44100, 660.0, 44100);
    let wav_path = dir.join("warble.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
    for &sample in &signal {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let matching = engine.create_session(44100).unwrap();
    let silent = engine.create_session(44100).unwrap();
    engine.load_master_call(matching, "warble").unwrap();
    engine.load_master_call(silent, "warble").unwrap();

    let match_thread = {
        let engine = Arc::clone(&engine);
        let signal = signal.clone();
        std::thread::spawn(move || {
            for chunk in signal.chunks(512) {
                engine.process_audio_chunk(matching, chunk, 1).unwrap();
            }
        })
    };
    let silence_thread = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for _ in 0..86 {
                engine
                    .process_audio_chunk(silent, &vec![0.0f32; 512], 1)
                    .unwrap();
            }
        })
    };
    match_thread.join().unwrap();
    silence_thread.join().unwrap();

    let matching_score = engine.get_similarity_score(matching).unwrap();
    let silent_score = engine.get_similarity_score(silent).unwrap();
    assert!(
        matching_score > silent_score,
        "matching session ({}) must outscore silent session ({})",
        matching_score,
        silent_score
    );

    // Peak amplitude tracking stayed per-session
    assert!(engine.session_peak_amplitude(matching).unwrap() > 0.4);
    assert_eq!(engine.session_peak_amplitude(silent).unwrap(), 0.0);
}

/// White noise must score well below a faithful rendition of the master.
#[test]
fn test_noise_scores_below_matching_attempt() {
    use rand::Rng;

    let dir = master_dir("noise");
    let engine = engine_with_masters(&dir);

    let signal = sine(44100, 660.0, 44100);
    let wav_path = dir.join("warble.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
    for &sample in &signal {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();

    let matching = engine.create_session(44100).unwrap();
    engine.load_master_call(matching, "warble").unwrap();
    engine.process_audio_chunk(matching, &signal, 1).unwrap();

    let mut rng = rand::thread_rng();
    let noise: Vec<f32> = (0..44100).map(|_| rng.gen_range(-0.5..0.5)).collect();
    let noisy = engine.create_session(44100).unwrap();
    engine.load_master_call(noisy, "warble").unwrap();
    engine.process_audio_chunk(noisy, &noise, 1).unwrap();

    let matching_score = engine.get_similarity_score(matching).unwrap();
    let noise_score = engine.get_similarity_score(noisy).unwrap();
    assert!(
        noise_score < matching_score,
        "noise ({}) should score below the matching attempt ({})",
        noise_score,
        matching_score
    );
}

/// Chunking must not change the result: one shot vs. small chunks.
#[test]
fn test_chunking_invariance_through_engine() {
    let dir = master_dir("chunking");
    write_test_master(&dir, "call");
    let engine = engine_with_masters(&dir);
    let signal = sine(44100, 440.0, 8192);

    let whole = engine.create_session(44100).unwrap();
    engine.load_master_call(whole, "call").unwrap();
    engine.process_audio_chunk(whole, &signal, 1).unwrap();

    let split = engine.create_session(44100).unwrap();
    engine.load_master_call(split, "call").unwrap();
    for chunk in signal.chunks(300) {
        engine.process_audio_chunk(split, chunk, 1).unwrap();
    }

    assert_eq!(
        engine.get_feature_count(whole).unwrap(),
        engine.get_feature_count(split).unwrap()
    );
    let a = engine.get_similarity_score(whole).unwrap();
    let b = engine.get_similarity_score(split).unwrap();
    assert!(
        (a - b).abs() < 1e-4,
        "chunked score {} differs from whole-buffer score {}",
        b,
        a
    );
}
