use std::error::Error;
use std::fmt;
use wide::f32x8;

/// Fixed-length face encoding produced by the external extractor.
pub type FeatureVector = Vec<f32>;

/// Dimensionality of the encodings produced by the reference extractor.
pub const DEFAULT_DIMENSION: usize = 128;

/// Error type for feature vector validation and distance computation.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorError {
    /// Returned when a vector does not have the expected dimensionality.
    DimensionMismatch { expected: usize, got: usize },
    /// Returned when a vector has no components.
    EmptyVector,
    /// Returned when a component is NaN or +/-Inf.
    NonFinite { index: usize, value: f32 },
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected={expected}, got={got}")
            }
            Self::EmptyVector => write!(f, "vector is empty"),
            Self::NonFinite { index, value } => {
                write!(f, "non-finite value at index {index}: {value}")
            }
        }
    }
}

impl Error for VectorError {}

/// Checks that `values` is a usable feature vector of `dimension` components.
pub fn validate_feature_vector(values: &[f32], dimension: usize) -> Result<(), VectorError> {
    if values.is_empty() {
        return Err(VectorError::EmptyVector);
    }
    if values.len() != dimension {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            got: values.len(),
        });
    }
    if let Some((index, value)) = values
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(VectorError::NonFinite { index, value });
    }
    Ok(())
}

/// Computes the Euclidean distance between two validated vectors.
pub fn euclidean_distance(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    validate_feature_vector(left, left.len())?;
    validate_feature_vector(right, left.len())?;
    Ok(simd_l2_squared(left, right).sqrt())
}

const SIMD_WIDTH: usize = 8;

/// Observed vector packed once and compared against every registry record.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    len: usize,
    simd_query: Vec<f32x8>,
    tail: [f32; SIMD_WIDTH],
    tail_len: usize,
}

impl PreparedQuery {
    pub fn new(query: &[f32]) -> Self {
        let mut chunks = query.chunks_exact(SIMD_WIDTH);
        let simd_query = chunks.by_ref().map(load_f32x8).collect();
        let remainder = chunks.remainder();

        let mut tail = [0.0f32; SIMD_WIDTH];
        tail[..remainder.len()].copy_from_slice(remainder);

        Self {
            len: query.len(),
            simd_query,
            tail,
            tail_len: remainder.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Euclidean distance against a same-length candidate.
    pub fn distance(&self, candidate: &[f32]) -> f32 {
        self.l2_squared(candidate).sqrt()
    }

    fn l2_squared(&self, candidate: &[f32]) -> f32 {
        debug_assert_eq!(candidate.len(), self.len);
        let simd_chunks = self.simd_query.len();
        let simd_prefix_len = simd_chunks * SIMD_WIDTH;

        // Two accumulators keep the dependency chain short on 128-d encodings.
        let mut simd_sum0 = f32x8::ZERO;
        let mut simd_sum1 = f32x8::ZERO;
        for (chunk_idx, chunk) in candidate[..simd_prefix_len]
            .chunks_exact(SIMD_WIDTH)
            .enumerate()
        {
            let delta = self.simd_query[chunk_idx] - load_f32x8(chunk);
            if chunk_idx % 2 == 0 {
                simd_sum0 += delta * delta;
            } else {
                simd_sum1 += delta * delta;
            }
        }

        let mut scalar_sum = 0.0f32;
        for (index, value) in candidate[simd_prefix_len..]
            .iter()
            .enumerate()
            .take(self.tail_len)
        {
            let delta = self.tail[index] - *value;
            scalar_sum += delta * delta;
        }

        (simd_sum0 + simd_sum1).reduce_add() + scalar_sum
    }
}

fn load_f32x8(values: &[f32]) -> f32x8 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x8::from([
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
    ])
}

fn simd_l2_squared(left: &[f32], right: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0f32;

    let mut left_chunks = left.chunks_exact(SIMD_WIDTH);
    let mut right_chunks = right.chunks_exact(SIMD_WIDTH);
    for (left_chunk, right_chunk) in left_chunks.by_ref().zip(right_chunks.by_ref()) {
        let delta = load_f32x8(left_chunk) - load_f32x8(right_chunk);
        simd_sum += delta * delta;
    }
    for (&left_value, &right_value) in left_chunks.remainder().iter().zip(right_chunks.remainder())
    {
        let delta = left_value - right_value;
        scalar_sum += delta * delta;
    }

    simd_sum.reduce_add() + scalar_sum
}
