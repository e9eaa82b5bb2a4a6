// Master call store - reference feature sequences for comparison
//
// A master call is the precomputed feature sequence of the call being
// matched against. Two on-disk forms are supported:
//
// - `.mfc` feature files: `{frame_count: u32, coeff_count: u32}` little-
//   endian header followed by frame_count records of coeff_count LE f32
//   values, row-major by frame. The byte count is validated exactly.
// - `.wav` recordings: decoded with hound, downmixed to mono, and run
//   through the feature extractor at load time. WAV ingestion also records
//   an amplitude and pitch reference unavailable in the binary form.
//
// Name-based lookup resolves `<dir>/<name>.mfc` first, then
// `<dir>/<name>.wav`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::features::{FeatureExtractor, FeatureFrame};
use crate::config::FeatureConfig;
use crate::error::EngineError;

/// Header plus payload sanity bound for `.mfc` files
const MAX_COEFF_COUNT: u32 = 64;

/// A loaded reference feature sequence
#[derive(Debug, Clone)]
pub struct MasterCall {
    pub name: String,
    pub frames: Vec<FeatureFrame>,
    /// Mean RMS amplitude of the reference, recovered from frame energies
    pub reference_rms: f32,
    /// Mean dominant frequency in Hz; only available for WAV-ingested masters
    pub mean_peak_hz: Option<f32>,
}

impl MasterCall {
    /// Build a master call from an already-extracted frame sequence
    pub fn from_frames(name: impl Into<String>, frames: Vec<FeatureFrame>) -> Self {
        let reference_rms = mean_rms_from_frames(&frames);
        Self {
            name: name.into(),
            frames,
            reference_rms,
            mean_peak_hz: None,
        }
    }

    /// Coefficient width shared by every frame
    pub fn coeff_width(&self) -> usize {
        self.frames.first().map(|f| f.width()).unwrap_or(0)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Mean per-frame RMS, recovered from the log-energy coefficient
fn mean_rms_from_frames(frames: &[FeatureFrame]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let sum: f32 = frames.iter().map(|f| f.energy().sqrt()).sum();
    sum / frames.len() as f32
}

/// Load a binary `.mfc` feature file
///
/// # Errors
/// `FileNotFound` when the path does not exist; `Internal` with the parse
/// reason when the header is inconsistent with the file size or the
/// dimensions are implausible.
pub fn load_feature_file(path: &Path) -> Result<Vec<FeatureFrame>, EngineError> {
    let bytes = fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            EngineError::Internal {
                reason: format!("reading {}: {}", path.display(), err),
            }
        }
    })?;

    if bytes.len() < 8 {
        return Err(EngineError::Internal {
            reason: format!(
                "malformed master call {}: {} bytes is too short for a header",
                path.display(),
                bytes.len()
            ),
        });
    }

    let frame_count = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let coeff_count = u32::from_le_bytes(bytes[4..8].try_into().unwrap());

    if frame_count == 0 || coeff_count == 0 || coeff_count > MAX_COEFF_COUNT {
        return Err(EngineError::Internal {
            reason: format!(
                "malformed master call {}: implausible dimensions {}x{}",
                path.display(),
                frame_count,
                coeff_count
            ),
        });
    }

    let expected = 8 + frame_count as usize * coeff_count as usize * 4;
    if bytes.len() != expected {
        return Err(EngineError::Internal {
            reason: format!(
                "malformed master call {}: expected {} bytes for {}x{} frames, found {}",
                path.display(),
                expected,
                frame_count,
                coeff_count,
                bytes.len()
            ),
        });
    }

    let mut frames = Vec::with_capacity(frame_count as usize);
    let mut offset = 8;
    for index in 0..frame_count {
        let mut coeffs = Vec::with_capacity(coeff_count as usize);
        for _ in 0..coeff_count {
            let value = f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            if !value.is_finite() {
                return Err(EngineError::Internal {
                    reason: format!(
                        "malformed master call {}: non-finite coefficient in frame {}",
                        path.display(),
                        index
                    ),
                });
            }
            coeffs.push(value);
            offset += 4;
        }
        frames.push(FeatureFrame {
            index: index as u64,
            coeffs,
        });
    }

    Ok(frames)
}

/// Write a frame sequence as a binary `.mfc` feature file
pub fn write_feature_file(path: &Path, frames: &[FeatureFrame]) -> Result<(), EngineError> {
    if frames.is_empty() {
        return Err(EngineError::InsufficientData);
    }
    let coeff_count = frames[0].width();
    if frames.iter().any(|f| f.width() != coeff_count) {
        return Err(EngineError::Internal {
            reason: "inconsistent coefficient widths across frames".to_string(),
        });
    }

    let mut bytes = Vec::with_capacity(8 + frames.len() * coeff_count * 4);
    bytes.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(coeff_count as u32).to_le_bytes());
    for frame in frames {
        for &coeff in &frame.coeffs {
            bytes.extend_from_slice(&coeff.to_le_bytes());
        }
    }

    fs::write(path, bytes).map_err(|err| EngineError::Internal {
        reason: format!("writing {}: {}", path.display(), err),
    })
}

/// Decode a WAV file into mono f32 samples in [-1.0, 1.0]
///
/// Multi-channel files are downmixed by arithmetic mean. Returns the samples
/// and the file's sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), EngineError> {
    let reader = hound::WavReader::open(path).map_err(|err| match err {
        hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            EngineError::FileNotFound {
                path: path.display().to_string(),
            }
        }
        other => EngineError::Internal {
            reason: format!("decoding {}: {}", path.display(), other),
        },
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(EngineError::Internal {
            reason: format!("decoding {}: zero channels", path.display()),
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|err| EngineError::Internal {
                reason: format!("decoding {}: {}", path.display(), err),
            })?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|err| EngineError::Internal {
                    reason: format!("decoding {}: {}", path.display(), err),
                })?
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    let mono: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Ingest a WAV recording as a master call
///
/// Features are extracted at the file's own sample rate; a mismatch with the
/// session rate is logged but not fatal, since the cepstral comparison is
/// rate-relative.
pub fn load_wav(
    path: &Path,
    name: &str,
    session_sample_rate: u32,
    config: &FeatureConfig,
) -> Result<MasterCall, EngineError> {
    let (samples, sample_rate) = read_wav_mono(path)?;
    if sample_rate != session_sample_rate {
        tracing::warn!(
            "[MasterCall] {} is {} Hz but the session runs at {} Hz",
            path.display(),
            sample_rate,
            session_sample_rate
        );
    }

    let mut extractor = FeatureExtractor::new(sample_rate, config);
    let frames = extractor
        .process(&samples, 1)
        .map_err(|err| EngineError::Internal {
            reason: format!("extracting features from {}: {}", path.display(), err),
        })?;
    if frames.is_empty() {
        return Err(EngineError::Internal {
            reason: format!(
                "{} is shorter than one analysis window ({} samples)",
                path.display(),
                config.window_size
            ),
        });
    }

    let mean_peak_hz = extractor.mean_peak_hz();
    let mut master = MasterCall::from_frames(name, frames);
    master.mean_peak_hz = mean_peak_hz;
    Ok(master)
}

/// Resolve a master call by name against a directory
///
/// Accepts an explicit relative/absolute path with extension, otherwise
/// tries `<dir>/<name>.mfc` then `<dir>/<name>.wav`.
pub fn resolve_and_load(
    dir: &Path,
    name: &str,
    session_sample_rate: u32,
    config: &FeatureConfig,
) -> Result<MasterCall, EngineError> {
    let direct = PathBuf::from(name);
    let candidate = if direct.extension().is_some() {
        if direct.is_absolute() {
            direct
        } else {
            dir.join(direct)
        }
    } else {
        let mfc = dir.join(format!("{}.mfc", name));
        if mfc.exists() {
            mfc
        } else {
            dir.join(format!("{}.wav", name))
        }
    };

    if !candidate.exists() {
        return Err(EngineError::FileNotFound {
            path: candidate.display().to_string(),
        });
    }

    tracing::info!("[MasterCall] Loading {} from {}", name, candidate.display());
    match candidate.extension().and_then(|e| e.to_str()) {
        Some("wav") => load_wav(&candidate, name, session_sample_rate, config),
        _ => Ok(MasterCall::from_frames(
            name,
            load_feature_file(&candidate)?,
        )),
    }
}
