//! Embedding service with content-addressed caching.
//!
//! Maps a species description to a fixed-length unit vector, either through
//! an OpenAI-compatible `/v1/embeddings` endpoint or a deterministic local
//! trigram-hash fallback. Vectors are cached in memory and on disk keyed by
//! a sha256 of the text, so a cache hit never touches the network.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

const LOCAL_DIM: usize = 64;
const MEMORY_CACHE_CAP: usize = 4096;

#[derive(Debug, Clone)]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `POST /v1/embeddings`.
    Remote {
        base_url: String,
        api_key: Option<String>,
        model: String,
    },
    /// Deterministic trigram-hash embedding; no network.
    Local,
}

struct MemoryCache {
    entries: HashMap<String, Arc<Vec<f32>>>,
    order: VecDeque<String>,
}

impl MemoryCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: String, value: Arc<Vec<f32>>) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > MEMORY_CACHE_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            } else {
                break;
            }
        }
    }
}

pub struct EmbeddingService {
    provider: EmbeddingProvider,
    client: reqwest::Client,
    cache: Mutex<MemoryCache>,
    disk_dir: Option<PathBuf>,
}

impl EmbeddingService {
    pub fn new(provider: EmbeddingProvider, disk_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &disk_dir {
            let _ = std::fs::create_dir_all(dir);
        }
        Self {
            provider,
            client: reqwest::Client::new(),
            cache: Mutex::new(MemoryCache::new()),
            disk_dir,
        }
    }

    pub fn local() -> Self {
        Self::new(EmbeddingProvider::Local, None)
    }

    fn content_key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        let key = Self::content_key(text);
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit);
            }
        }
        if let Some(vector) = self.read_disk(&key) {
            let vector = Arc::new(vector);
            self.remember(key, vector.clone());
            return Ok(vector);
        }

        let vector = match &self.provider {
            EmbeddingProvider::Local => local_embedding(text),
            EmbeddingProvider::Remote {
                base_url,
                api_key,
                model,
            } => match self.fetch_remote(base_url, api_key.as_deref(), model, text).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = %err, "embedding provider unreachable, using local fallback");
                    local_embedding(text)
                }
            },
        };
        let vector = Arc::new(vector);
        self.write_disk(&key, &vector);
        self.remember(key, vector.clone());
        Ok(vector)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Arc<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Symmetric S x S cosine similarity matrix with unit diagonal.
    pub async fn similarity_matrix(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let vectors = self.embed_batch(texts).await?;
        let n = vectors.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            matrix[i][i] = 1.0;
            for j in (i + 1)..n {
                let sim = cosine(&vectors[i], &vectors[j]);
                matrix[i][j] = sim;
                matrix[j][i] = sim;
            }
        }
        Ok(matrix)
    }

    fn remember(&self, key: String, vector: Arc<Vec<f32>>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, vector);
        }
    }

    fn read_disk(&self, key: &str) -> Option<Vec<f32>> {
        let dir = self.disk_dir.as_ref()?;
        let bytes = std::fs::read(dir.join(format!("{key}.json"))).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn write_disk(&self, key: &str, vector: &[f32]) {
        let Some(dir) = &self.disk_dir else { return };
        if let Ok(bytes) = serde_json::to_vec(vector) {
            let _ = std::fs::write(dir.join(format!("{key}.json")), bytes);
        }
    }

    async fn fetch_remote(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(url)
            .json(&json!({"model": model, "input": text}))
            .timeout(std::time::Duration::from_secs(30));
        if let Some(key) = api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let body: Value = request.send().await?.error_for_status()?.json().await?;
        let embedding = body
            .pointer("/data/0/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("embedding response missing data[0].embedding"))?;
        Ok(embedding
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect())
    }
}

/// Bag-of-trigrams hashed into a fixed number of buckets, L2-normalized.
/// Deterministic, and similar descriptions land on nearby vectors.
pub fn local_embedding(text: &str) -> Vec<f32> {
    let mut buckets = vec![0.0f32; LOCAL_DIM];
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let chars: Vec<char> = normalized.chars().collect();
    for window in chars.windows(3) {
        if window.iter().all(|c| *c == ' ') {
            continue;
        }
        let mut hash: u64 = 0xcbf29ce484222325;
        for c in window {
            hash ^= *c as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        buckets[(hash % LOCAL_DIM as u64) as usize] += 1.0;
    }
    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut buckets {
            *v /= norm;
        }
    }
    buckets
}

pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        na += f64::from(*x) * f64::from(*x);
        nb += f64::from(*y) * f64::from(*y);
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_embedding_cached() {
        let service = EmbeddingService::local();
        let a = service.embed("a green photosynthetic mat").await.unwrap();
        let b = service.embed("a green photosynthetic mat").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_local_embedding_deterministic_and_normalized() {
        let a = local_embedding("salt-loving single-celled drifter");
        let b = local_embedding("salt-loving single-celled drifter");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_texts_score_higher() {
        let mat = local_embedding("photosynthetic microbial mat in shallow water");
        let mat2 = local_embedding("photosynthetic microbial film in shallow seas");
        let vent = local_embedding("deep hydrothermal vent chemotroph");
        assert!(cosine(&mat, &mat2) > cosine(&mat, &vent));
    }

    #[tokio::test]
    async fn test_similarity_matrix_shape() {
        let service = EmbeddingService::local();
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let m = service.similarity_matrix(&texts).await.unwrap();
        assert_eq!(m.len(), 3);
        assert!((m[0][0] - 1.0).abs() < 1e-9);
        assert!((m[1][2] - m[2][1]).abs() < 1e-9);
    }
}
