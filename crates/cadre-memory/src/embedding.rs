use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult};
use std::collections::BTreeMap;

/// Turns text into a fixed-length vector for similarity search.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Empty text is an error.
    async fn embed(&self, text: &str) -> CadreResult<Vec<f32>>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Offline embedding by signed feature hashing of lowercase word tokens.
///
/// Each token lands in bucket `h % dim` with sign taken from the top bit of
/// its 64-bit FNV-1a hash, weighted `1 + ln(count)`. The result is L2
/// normalised, so texts sharing vocabulary score high under cosine.
pub struct LocalEmbedding {
    dim: usize,
}

impl LocalEmbedding {
    /// Vectors of `dim` components (at least 1).
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn tokens(text: &str) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 1)
        {
            *counts.entry(word.to_lowercase()).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> CadreResult<Vec<f32>> {
        if text.is_empty() {
            return Err(CadreError::Memory("Cannot embed empty text".into()));
        }

        let mut v = vec![0.0f32; self.dim];
        for (token, count) in Self::tokens(text) {
            let h = fnv1a64(token.as_bytes());
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            let slot = (h % self.dim as u64) as usize;
            v[slot] += sign * (1.0 + (count as f32).ln());
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}
