// SequenceAligner - incremental dynamic time warping over feature frames
//
// Scores a growing query frame sequence against a fixed reference sequence
// using the classic DTW recurrence:
//
//   D(i,j) = cost(i,j) + min(D(i-1,j), D(i,j-1), D(i-1,j-1))
//
// with cost(i,j) the Euclidean distance between reference frame i and query
// frame j, and the first row/column accumulated along the boundary. The
// query advances one DP column per appended frame, so extending the query
// is O(reference_len) and the accumulated result is exactly equal to a
// from-scratch computation over the same frames.
//
// The final cost is normalized by path length (reference_len + query_len)
// and mapped to [0, 1] via 1 / (1 + normalized_cost): zero cost maps to
// 1.0, and similarity decreases monotonically with cost.

use crate::analysis::features::FeatureFrame;
use crate::error::ScoringError;

/// Incremental DTW aligner
///
/// Holds the reference sequence and the most recent DP column; query frames
/// are appended as they are extracted and a similarity can be read at any
/// point.
pub struct SequenceAligner {
    reference: Vec<FeatureFrame>,
    /// Accumulated cost column D(*, j) for the latest query frame j
    column: Vec<f32>,
    query_len: usize,
}

impl SequenceAligner {
    /// Create an aligner with no reference loaded
    pub fn new() -> Self {
        Self {
            reference: Vec::new(),
            column: Vec::new(),
            query_len: 0,
        }
    }

    /// Create an aligner with a reference installed
    pub fn with_reference(reference: Vec<FeatureFrame>) -> Self {
        let mut aligner = Self::new();
        aligner.set_reference(reference);
        aligner
    }

    /// Install or replace the reference sequence
    ///
    /// Replacing the reference restarts the accumulated query state; frames
    /// extracted afterwards score against the new reference only.
    pub fn set_reference(&mut self, reference: Vec<FeatureFrame>) {
        self.reference = reference;
        self.reset_query();
    }

    /// Discard accumulated query state, keeping the reference
    pub fn reset_query(&mut self) {
        self.column.clear();
        self.query_len = 0;
    }

    /// Append query frames, advancing one DP column per frame
    pub fn extend(&mut self, frames: &[FeatureFrame]) {
        if self.reference.is_empty() {
            return;
        }
        for frame in frames {
            self.advance(frame);
        }
    }

    fn advance(&mut self, frame: &FeatureFrame) {
        let n = self.reference.len();
        if self.query_len == 0 {
            // First column: only vertical steps are reachable
            self.column.clear();
            self.column.reserve(n);
            let mut acc = 0.0f32;
            for (i, reference) in self.reference.iter().enumerate() {
                let cost = frame_distance(reference, frame);
                acc = if i == 0 { cost } else { acc + cost };
                self.column.push(acc);
            }
        } else {
            // In-place column update; `diag` carries D(i-1, j-1)
            let mut diag = self.column[0];
            self.column[0] += frame_distance(&self.reference[0], frame);
            for i in 1..n {
                let up = self.column[i];
                let left = self.column[i - 1];
                let cost = frame_distance(&self.reference[i], frame);
                self.column[i] = cost + up.min(left).min(diag);
                diag = up;
            }
        }
        self.query_len += 1;
    }

    /// Normalized similarity over all query frames seen so far
    ///
    /// # Errors
    /// `ScoringError::InsufficientData` when the reference or the query is
    /// still empty. This is the expected state during startup, not a fault.
    pub fn similarity(&self) -> Result<f32, ScoringError> {
        if self.reference.is_empty() || self.query_len == 0 {
            return Err(ScoringError::InsufficientData);
        }
        let total = *self
            .column
            .last()
            .ok_or(ScoringError::InsufficientData)?;
        let normalized = total / (self.reference.len() + self.query_len) as f32;
        Ok(1.0 / (1.0 + normalized))
    }

    pub fn has_reference(&self) -> bool {
        !self.reference.is_empty()
    }

    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    pub fn query_len(&self) -> usize {
        self.query_len
    }
}

impl Default for SequenceAligner {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch similarity between two complete sequences
///
/// Equivalent to streaming the query through an aligner frame by frame;
/// used by tests and offline tooling.
pub fn score_sequences(
    reference: &[FeatureFrame],
    query: &[FeatureFrame],
) -> Result<f32, ScoringError> {
    if reference.is_empty() || query.is_empty() {
        return Err(ScoringError::InsufficientData);
    }
    let mut aligner = SequenceAligner::with_reference(reference.to_vec());
    aligner.extend(query);
    aligner.similarity()
}

/// Euclidean distance between two coefficient vectors
fn frame_distance(a: &FeatureFrame, b: &FeatureFrame) -> f32 {
    a.coeffs
        .iter()
        .zip(b.coeffs.iter())
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64, coeffs: &[f32]) -> FeatureFrame {
        FeatureFrame {
            index,
            coeffs: coeffs.to_vec(),
        }
    }

    /// Deterministic synthetic sequence with a sine pattern per coefficient
    fn synthetic_sequence(frames: usize, coeffs: usize) -> Vec<FeatureFrame> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / frames as f32;
                let mut c: Vec<f32> = (0..coeffs)
                    .map(|k| 0.1 * (2.0 * std::f32::consts::PI * t * (k + 1) as f32).sin())
                    .collect();
                c[0] = 0.5 + 0.3 * (2.0 * std::f32::consts::PI * t * 3.0).sin();
                frame(i as u64, &c)
            })
            .collect()
    }

    #[test]
    fn test_self_similarity_is_maximal() {
        let seq = synthetic_sequence(50, 13);
        let score = score_sequences(&seq, &seq).unwrap();
        assert!(
            score >= 0.99,
            "self-similarity should be ~1.0, got {}",
            score
        );
    }

    #[test]
    fn test_empty_sequences_are_insufficient_data() {
        let seq = synthetic_sequence(10, 13);
        assert_eq!(
            score_sequences(&[], &seq),
            Err(ScoringError::InsufficientData)
        );
        assert_eq!(
            score_sequences(&seq, &[]),
            Err(ScoringError::InsufficientData)
        );

        let aligner = SequenceAligner::with_reference(seq);
        assert_eq!(aligner.similarity(), Err(ScoringError::InsufficientData));
    }

    #[test]
    fn test_incremental_equals_batch() {
        let reference = synthetic_sequence(40, 13);
        let query = synthetic_sequence(25, 13);

        let batch = score_sequences(&reference, &query).unwrap();

        let mut streaming = SequenceAligner::with_reference(reference);
        for chunk in query.chunks(3) {
            streaming.extend(chunk);
        }
        let incremental = streaming.similarity().unwrap();

        assert!(
            (batch - incremental).abs() < 1e-6,
            "incremental {} != batch {}",
            incremental,
            batch
        );
    }

    #[test]
    fn test_dissimilar_scores_below_identical() {
        let reference = synthetic_sequence(30, 13);
        let silence: Vec<FeatureFrame> = (0..30)
            .map(|i| frame(i as u64, &vec![-20.0; 13]))
            .collect();

        let self_score = score_sequences(&reference, &reference).unwrap();
        let silence_score = score_sequences(&reference, &silence).unwrap();
        assert!(
            silence_score < self_score,
            "silence {} should score below self {}",
            silence_score,
            self_score
        );
        assert!(silence_score < 0.5);
    }

    #[test]
    fn test_similarity_bounds() {
        let reference = synthetic_sequence(20, 13);
        let query = synthetic_sequence(35, 13);
        let score = score_sequences(&reference, &query).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_set_reference_restarts_query() {
        let reference = synthetic_sequence(20, 13);
        let query = synthetic_sequence(5, 13);

        let mut aligner = SequenceAligner::with_reference(reference.clone());
        aligner.extend(&query);
        assert_eq!(aligner.query_len(), 5);

        aligner.set_reference(reference);
        assert_eq!(aligner.query_len(), 0);
        assert_eq!(aligner.similarity(), Err(ScoringError::InsufficientData));
    }

    #[test]
    fn test_extend_without_reference_is_ignored() {
        let mut aligner = SequenceAligner::new();
        aligner.extend(&synthetic_sequence(5, 13));
        assert_eq!(aligner.query_len(), 0);
        assert!(!aligner.has_reference());
    }
}
