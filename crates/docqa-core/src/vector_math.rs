use crate::error::IndexError;

/// Cosine similarity of two equal-length vectors, clamped into `[-1, 1]`.
///
/// Returns `0.0` when either norm is zero or when the inputs are empty or of
/// different lengths; use [`try_cosine_similarity`] to tell those apart.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    try_cosine_similarity(a, b).unwrap_or(0.0)
}

pub fn try_cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, IndexError> {
    if a.is_empty() || b.is_empty() {
        return Err(IndexError::InvalidVector("empty vector".to_string()));
    }
    if a.len() != b.len() {
        return Err(IndexError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }

    // accumulate in f64; long f32 sums drift enough to push a·a past 1.0
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    #[allow(clippy::cast_possible_truncation)]
    Ok(sim.clamp(-1.0, 1.0) as f32)
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Check that `v` is usable as a candidate against a query of `expected` dims.
pub fn validate_vector(v: &[f32], expected: usize) -> Result<(), IndexError> {
    if v.len() != expected {
        return Err(IndexError::DimensionMismatch { expected, actual: v.len() });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(IndexError::InvalidVector("non-finite component".to_string()));
    }
    Ok(())
}
