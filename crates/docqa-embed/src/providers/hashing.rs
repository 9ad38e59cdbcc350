use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::vector_math::l2_norm;
use docqa_core::{EmbeddingError, EmbeddingProvider};
use twox_hash::XxHash64;

/// Deterministic bag-of-words vectors: every lowercase token is hashed into
/// one of `dim` buckets, then the vector is L2-normalized. Texts sharing words
/// land close together, which is enough for local runs and tests.
pub struct HashingEmbedder {
    dim: usize,
    id: String,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hashing:d{dim}") }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = l2_norm(&v);
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str, _timeout: Duration) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::cosine_similarity;

    #[test]
    fn deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.vector_for("Hello world");
        let b = e.vector_for("hello, WORLD");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_higher() {
        let e = HashingEmbedder::new(256);
        let q = e.vector_for("river fishing trip");
        let near = e.vector_for("our fishing trip on the river");
        let far = e.vector_for("tax forms and invoices");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }
}
