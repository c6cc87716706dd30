use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use verdant_core::{VerdantError, VerdantResult};

use crate::tokenizer::tokenize;

/// Trait for mapping text to a fixed-dimension dense vector.
///
/// Implementations must be deterministic for identical input and must
/// report failures as [`VerdantError::EmbeddingUnavailable`] rather than
/// returning a zero vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Compute the embedding of a single text.
    async fn embed(&self, text: &str) -> VerdantResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> VerdantResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the vectors produced by this embedder.
    fn dimension(&self) -> usize;
}

/// Run `embedder.embed(text)` under a deadline. Expiry is reported as
/// [`VerdantError::EmbeddingUnavailable`]; other failures are mapped to it too.
pub async fn embed_with_timeout(
    embedder: &dyn Embedder,
    text: &str,
    timeout: Duration,
) -> VerdantResult<Vec<f32>> {
    match tokio::time::timeout(timeout, embedder.embed(text)).await {
        Ok(Ok(vector)) => Ok(vector),
        Ok(Err(VerdantError::EmbeddingUnavailable(reason))) => {
            Err(VerdantError::EmbeddingUnavailable(reason))
        }
        Ok(Err(e)) => Err(VerdantError::EmbeddingUnavailable(e.to_string())),
        Err(_) => Err(VerdantError::EmbeddingUnavailable(format!(
            "embedder did not answer within {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Local feature-hashing embedder (no external model needed).
///
/// Every term and every pair of adjacent terms is a feature. A feature lands
/// in one bucket with a sign taken from its hash, weighted by `1 + ln(count)`
/// (pairs at half weight), and the vector is L2-normalized. It captures
/// lexical overlap and a little word order, nothing more; the
/// `http-embeddings` feature provides a client for a real model.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

/// Weight of an adjacent-term feature relative to a single term.
const PAIR_WEIGHT: f32 = 0.5;

impl HashingEmbedder {
    /// Create an embedder producing vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = feature_hash(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> VerdantResult<Vec<f32>> {
        let terms = tokenize(text);
        if terms.is_empty() {
            return Err(VerdantError::EmbeddingUnavailable(
                "cannot embed text without terms".to_string(),
            ));
        }

        let mut counts: HashMap<String, (u32, f32)> = HashMap::new();
        for term in &terms {
            counts.entry(term.clone()).or_insert((0, 1.0)).0 += 1;
        }
        for pair in terms.windows(2) {
            let feature = format!("{} {}", pair[0], pair[1]);
            counts.entry(feature).or_insert((0, PAIR_WEIGHT)).0 += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, (count, weight)) in &counts {
            let damped = 1.0 + (*count as f32).ln();
            self.accumulate(&mut vector, feature, weight * damped);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(VerdantError::EmbeddingUnavailable(
                "hashed features cancelled out".to_string(),
            ));
        }
        vector.iter_mut().for_each(|v| *v /= norm);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 64-bit FNV-1a followed by the SplitMix64 finalizer, so neighbouring
/// strings spread over all bits. Stable across platforms and releases.
fn feature_hash(feature: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in feature.as_bytes() {
        h ^= u64::from(byte);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^ (h >> 31)
}

#[cfg(feature = "http-embeddings")]
pub use http::HttpEmbedder;

#[cfg(feature = "http-embeddings")]
mod http {
    use super::Embedder;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use verdant_core::{VerdantError, VerdantResult};

    #[derive(Serialize)]
    struct EmbedRequest<'a> {
        input: &'a [&'a str],
    }

    #[derive(Deserialize)]
    struct EmbedResponse {
        embeddings: Vec<Vec<f32>>,
    }

    /// Client for an external sentence-embedding service.
    ///
    /// Sends `POST {endpoint}` with `{"input": [texts]}` and expects
    /// `{"embeddings": [[f32; dimension], ...]}` back, one vector per input.
    pub struct HttpEmbedder {
        client: reqwest::Client,
        endpoint: String,
        dimension: usize,
    }

    impl HttpEmbedder {
        /// Create a client for `endpoint`; `timeout` bounds each request.
        pub fn new(
            endpoint: impl Into<String>,
            dimension: usize,
            timeout: Duration,
        ) -> VerdantResult<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| VerdantError::Config(format!("Failed to build HTTP client: {e}")))?;
            Ok(Self {
                client,
                endpoint: endpoint.into(),
                dimension,
            })
        }
    }

    #[async_trait]
    impl Embedder for HttpEmbedder {
        async fn embed(&self, text: &str) -> VerdantResult<Vec<f32>> {
            let mut vectors = self.embed_batch(&[text]).await?;
            vectors.pop().ok_or_else(|| {
                VerdantError::EmbeddingUnavailable("service returned no vectors".to_string())
            })
        }

        async fn embed_batch(&self, texts: &[&str]) -> VerdantResult<Vec<Vec<f32>>> {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&EmbedRequest { input: texts })
                .send()
                .await
                .map_err(|e| VerdantError::EmbeddingUnavailable(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(VerdantError::EmbeddingUnavailable(format!(
                    "service answered {status}"
                )));
            }

            let body: EmbedResponse = response.json().await.map_err(|e| {
                VerdantError::EmbeddingUnavailable(format!("malformed response: {e}"))
            })?;

            if body.embeddings.len() != texts.len() {
                return Err(VerdantError::EmbeddingUnavailable(format!(
                    "expected {} vectors, got {}",
                    texts.len(),
                    body.embeddings.len()
                )));
            }
            Ok(body.embeddings)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

}
