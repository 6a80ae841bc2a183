use thiserror::Error;
use wide::f32x8;

/// Error type for distance computations and vector validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    /// Returned when vectors do not share the same dimension.
    #[error("vector dimensions don't match: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    /// Returned when a vector has no components.
    #[error("vector is empty")]
    EmptyVector,
    /// Returned when a vector carries NaN or +/-Inf.
    #[error("non-finite value at index {index}: {value}")]
    NonFinite { index: usize, value: f32 },
}

/// Rejects empty vectors and vectors holding NaN or +/-Inf.
pub fn validate_vector(values: &[f32]) -> Result<(), VectorError> {
    if values.is_empty() {
        return Err(VectorError::EmptyVector);
    }
    validate_finite(values)
}

/// Rejects vectors holding NaN or +/-Inf. Empty vectors pass.
pub fn validate_finite(values: &[f32]) -> Result<(), VectorError> {
    match values
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        Some((index, value)) => Err(VectorError::NonFinite { index, value }),
        None => Ok(()),
    }
}

fn ensure_same_dimension(left: &[f32], right: &[f32]) -> Result<(), VectorError> {
    if left.len() != right.len() {
        return Err(VectorError::DimensionMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(())
}

/// Computes the dot product between two equal-length vectors.
pub fn dot_product(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    ensure_same_dimension(left, right)?;
    Ok(simd_dot(left, right))
}

/// Computes the Euclidean (L2) distance between two equal-length vectors.
pub fn euclidean_distance(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    ensure_same_dimension(left, right)?;
    Ok(simd_l2_squared(left, right).sqrt())
}

/// Computes cosine similarity between two equal-length vectors.
///
/// A zero-norm operand yields a similarity of `0.0` instead of an error.
/// The implementation uses a single pass to accumulate dot and squared norms,
/// redone in `f64` when the `f32` sums overflow or underflow.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    ensure_same_dimension(left, right)?;
    let (dot, left_sq_sum, right_sq_sum) = simd_dot_and_norms(left, right);
    if needs_wide_accumulation(dot, left_sq_sum, right_sq_sum) {
        return Ok(scalar_similarity_f64(left, right));
    }
    Ok(similarity_from_parts(dot, left_sq_sum, right_sq_sum))
}

/// Computes `1 - cosine_similarity`, unclamped (anti-parallel vectors give 2).
pub fn cosine_distance(left: &[f32], right: &[f32]) -> Result<f32, VectorError> {
    cosine_similarity(left, right).map(|similarity| 1.0 - similarity)
}

fn similarity_from_parts(dot: f32, left_sq_sum: f32, right_sq_sum: f32) -> f32 {
    if left_sq_sum == 0.0 || right_sq_sum == 0.0 {
        return 0.0;
    }
    dot / (left_sq_sum.sqrt() * right_sq_sum.sqrt())
}

/// Finite inputs whose `f32` sums came out non-finite or zero lost range.
fn needs_wide_accumulation(dot: f32, left_sq_sum: f32, right_sq_sum: f32) -> bool {
    !(dot.is_finite() && left_sq_sum.is_finite() && right_sq_sum.is_finite())
        || left_sq_sum == 0.0
        || right_sq_sum == 0.0
}

fn scalar_similarity_f64(left: &[f32], right: &[f32]) -> f32 {
    let (dot, left_sq_sum, right_sq_sum) = left.iter().zip(right).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, left_sq, right_sq), (&left_value, &right_value)| {
            let (left_value, right_value) = (f64::from(left_value), f64::from(right_value));
            (
                dot + left_value * right_value,
                left_sq + left_value * left_value,
                right_sq + right_value * right_value,
            )
        },
    );
    if left_sq_sum == 0.0 || right_sq_sum == 0.0 {
        return 0.0;
    }
    (dot / (left_sq_sum.sqrt() * right_sq_sum.sqrt())) as f32
}

const SIMD_WIDTH: usize = 8;

/// Pre-packed query representation for repeated cosine computations.
///
/// The query norm is computed once so each candidate only pays for its own
/// dot product and squared norm.
#[derive(Debug, Clone)]
pub struct PreparedCosineQuery {
    len: usize,
    values: Vec<f32>,
    simd_query: Vec<f32x8>,
    tail: [f32; SIMD_WIDTH],
    tail_len: usize,
    query_sq_sum: f32,
}

impl PreparedCosineQuery {
    /// Builds a reusable SIMD-packed query.
    pub fn new(query: &[f32]) -> Self {
        let (simd_query, tail, tail_len) = prepare_simd_query(query);
        Self {
            len: query.len(),
            values: query.to_vec(),
            simd_query,
            tail,
            tail_len,
            query_sq_sum: simd_dot(query, query),
        }
    }

    pub fn dimension(&self) -> usize {
        self.len
    }

    /// Computes cosine similarity against a candidate vector.
    pub fn similarity(&self, right: &[f32]) -> Result<f32, VectorError> {
        if right.len() != self.len {
            return Err(VectorError::DimensionMismatch {
                left: self.len,
                right: right.len(),
            });
        }
        let (dot, right_sq_sum) = self.dot_and_right_sq_sum(right);
        if needs_wide_accumulation(dot, self.query_sq_sum, right_sq_sum) {
            return Ok(scalar_similarity_f64(&self.values, right));
        }
        Ok(similarity_from_parts(dot, self.query_sq_sum, right_sq_sum))
    }

    /// Computes `1 - cosine_similarity` against a candidate vector.
    pub fn distance(&self, right: &[f32]) -> Result<f32, VectorError> {
        self.similarity(right).map(|similarity| 1.0 - similarity)
    }

    fn dot_and_right_sq_sum(&self, right: &[f32]) -> (f32, f32) {
        debug_assert_eq!(right.len(), self.len);
        let simd_chunks = self.simd_query.len();
        let simd_prefix_len = simd_chunks * SIMD_WIDTH;
        let right_prefix = &right[..simd_prefix_len];

        let mut dot_sum0 = f32x8::ZERO;
        let mut dot_sum1 = f32x8::ZERO;
        let mut right_sq_sum0 = f32x8::ZERO;
        let mut right_sq_sum1 = f32x8::ZERO;
        let mut chunk_idx = 0usize;
        let mut offset = 0usize;

        while chunk_idx + 1 < simd_chunks {
            let right_v0 = load_f32x8(&right_prefix[offset..offset + SIMD_WIDTH]);
            dot_sum0 += self.simd_query[chunk_idx] * right_v0;
            right_sq_sum0 += right_v0 * right_v0;
            offset += SIMD_WIDTH;

            let right_v1 = load_f32x8(&right_prefix[offset..offset + SIMD_WIDTH]);
            dot_sum1 += self.simd_query[chunk_idx + 1] * right_v1;
            right_sq_sum1 += right_v1 * right_v1;
            offset += SIMD_WIDTH;

            chunk_idx += 2;
        }
        if chunk_idx < simd_chunks {
            let right_v = load_f32x8(&right_prefix[offset..offset + SIMD_WIDTH]);
            dot_sum0 += self.simd_query[chunk_idx] * right_v;
            right_sq_sum0 += right_v * right_v;
        }

        let mut dot_scalar = 0.0f32;
        let mut right_sq_scalar = 0.0f32;
        let right_tail = &right[simd_prefix_len..];
        for (index, right_value) in right_tail.iter().enumerate().take(self.tail_len) {
            dot_scalar += self.tail[index] * *right_value;
            right_sq_scalar += right_value * right_value;
        }

        (
            (dot_sum0 + dot_sum1).reduce_add() + dot_scalar,
            (right_sq_sum0 + right_sq_sum1).reduce_add() + right_sq_scalar,
        )
    }
}

fn prepare_simd_query(query: &[f32]) -> (Vec<f32x8>, [f32; SIMD_WIDTH], usize) {
    let mut chunks = query.chunks_exact(SIMD_WIDTH);
    let simd_query = chunks.by_ref().map(load_f32x8).collect();
    let remainder = chunks.remainder();

    let mut tail = [0.0f32; SIMD_WIDTH];
    tail[..remainder.len()].copy_from_slice(remainder);
    (simd_query, tail, remainder.len())
}

fn load_f32x8(values: &[f32]) -> f32x8 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x8::from([
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
    ])
}

fn simd_scan(
    left: &[f32],
    right: &[f32],
    mut simd_step: impl FnMut(f32x8, f32x8),
    mut scalar_step: impl FnMut(f32, f32),
) {
    let mut left_chunks = left.chunks_exact(SIMD_WIDTH);
    let mut right_chunks = right.chunks_exact(SIMD_WIDTH);

    for (left_chunk, right_chunk) in left_chunks.by_ref().zip(right_chunks.by_ref()) {
        simd_step(load_f32x8(left_chunk), load_f32x8(right_chunk));
    }

    for (&left_value, &right_value) in left_chunks.remainder().iter().zip(right_chunks.remainder())
    {
        scalar_step(left_value, right_value);
    }
}

fn simd_dot(left: &[f32], right: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            simd_sum += left_v * right_v;
        },
        |left_value, right_value| {
            scalar_sum += left_value * right_value;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_l2_squared(left: &[f32], right: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            let delta = left_v - right_v;
            simd_sum += delta * delta;
        },
        |left_value, right_value| {
            let delta = left_value - right_value;
            scalar_sum += delta * delta;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_dot_and_norms(left: &[f32], right: &[f32]) -> (f32, f32, f32) {
    let mut dot_sum = f32x8::ZERO;
    let mut left_sq_sum = f32x8::ZERO;
    let mut right_sq_sum = f32x8::ZERO;
    let mut dot_scalar = 0.0;
    let mut left_sq_scalar = 0.0;
    let mut right_sq_scalar = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            dot_sum += left_v * right_v;
            left_sq_sum += left_v * left_v;
            right_sq_sum += right_v * right_v;
        },
        |left_value, right_value| {
            dot_scalar += left_value * right_value;
            left_sq_scalar += left_value * left_value;
            right_sq_scalar += right_value * right_value;
        },
    );

    (
        dot_sum.reduce_add() + dot_scalar,
        left_sq_sum.reduce_add() + left_sq_scalar,
        right_sq_sum.reduce_add() + right_sq_scalar,
    )
}

#[cfg(test)]
mod tests;
