use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use prepwire_core::config::EmbeddingsConfig;

/// A computed embedding plus whether the hash fallback produced it.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub fallback: bool,
}

/// Sentence embedder: remote endpoint when configured, deterministic
/// hash-based fallback otherwise. `embed` never fails — the fallback
/// always yields a vector with valid cosine geometry.
pub struct Embedder {
    client: reqwest::Client,
    base_url: Option<String>,
    model: String,
    force_fallback: bool,
    dim: usize,
}

impl Embedder {
    pub fn new(cfg: &EmbeddingsConfig, dim: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            force_fallback: cfg.fallback,
            dim,
        }
    }

    pub async fn embed(&self, text: &str) -> Embedding {
        if !self.force_fallback {
            if let Some(base_url) = &self.base_url {
                match self.embed_remote(base_url, text).await {
                    Ok(vector) if vector.len() == self.dim => {
                        debug!(dims = vector.len(), "remote embedding ok");
                        return Embedding {
                            vector,
                            fallback: false,
                        };
                    }
                    Ok(vector) => {
                        warn!(
                            got = vector.len(),
                            want = self.dim,
                            fallback = true,
                            "embedding dimension mismatch, using hash fallback"
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, fallback = true, "embedding endpoint failed, using hash fallback");
                    }
                }
            } else {
                warn!(fallback = true, "no embedding endpoint configured, using hash fallback");
            }
        }

        Embedding {
            vector: hash_embed(text, self.dim),
            fallback: true,
        }
    }

    async fn embed_remote(&self, base_url: &str, text: &str) -> Result<Vec<f32>, String> {
        let url = format!("{base_url}/embeddings");
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status().as_u16()));
        }

        let body: EmbedResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(body.embedding)
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Deterministic fallback embedding: word n-grams hashed into a fixed
/// number of signed buckets, then L2-normalised. Similar texts share
/// n-grams and therefore buckets, so cosine similarity stays
/// meaningful even without a real model.
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0f32; dim];
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    if tokens.is_empty() {
        v[0] = 1.0;
        return v;
    }

    let n = tokens.len().min(3);
    for gram in tokens.windows(n) {
        let digest = Sha256::digest(gram.join(" ").as_bytes());
        let idx = u64::from_le_bytes(digest[..8].try_into().expect("8 bytes")) as usize % dim;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    } else {
        v[0] = 1.0;
    }
    v
}

/// Cosine similarity. Mismatched dimensions or a zero vector read as
/// no similarity rather than an error.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embed_is_deterministic() {
        let a = hash_embed("reverse a linked list in place", 384);
        let b = hash_embed("reverse a linked list in place", 384);
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[test]
    fn hash_embed_is_unit_length() {
        let v = hash_embed("design a rate limiter for an API gateway", 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_texts_score_higher_than_unrelated() {
        let a = hash_embed("reverse a linked list using two pointers", 384);
        let b = hash_embed("reverse a linked list using three pointers", 384);
        let c = hash_embed("bake sourdough bread with a dutch oven at home", 384);
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn empty_text_still_has_geometry() {
        let v = hash_embed("", 384);
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }
}
