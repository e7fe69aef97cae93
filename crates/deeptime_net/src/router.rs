//! Capability-based LLM routing.
//!
//! Callers name a capability, never a provider. The router owns the outbound
//! HTTP client, a process-wide FIFO concurrency gate, per-capability
//! deadlines, an optional round-robin provider pool per capability, and a
//! cancellation generation that fails in-flight requests fast when the
//! operator skips the current AI step.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Semaphore};

use crate::error::{Result, RouterError};
use crate::providers::{extract_json, parse_content, parse_stream_delta, ProviderConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SpeciationBatch,
    SpeciesStatusEval,
    Narrative,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::SpeciationBatch => "speciation_batch",
            Capability::SpeciesStatusEval => "species_status_eval",
            Capability::Narrative => "narrative",
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Capability::SpeciationBatch => Duration::from_secs(120),
            Capability::SpeciesStatusEval => Duration::from_secs(60),
            Capability::Narrative => Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub concurrency_limit: usize,
    /// Provider pool per capability; more than one entry means round-robin.
    pub routes: BTreeMap<Capability, Vec<ProviderConfig>>,
    /// Per-capability timeout overrides in seconds.
    #[serde(default)]
    pub timeouts: BTreeMap<Capability, u64>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 15,
            routes: BTreeMap::new(),
            timeouts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterDiagnostics {
    pub active_requests: usize,
    pub queued_requests: usize,
    pub total_requests: u64,
    pub total_timeouts: u64,
    pub last_latency_ms: u64,
}

/// One element of a streaming invocation.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(String),
    Done(Value),
    Failed(RouterError),
}

pub struct ModelRouter {
    client: RwLock<reqwest::Client>,
    config: RwLock<RouterConfig>,
    gate: Arc<Semaphore>,
    /// Bumped by skip/abort; requests in flight under an older generation
    /// fail with `Cancelled`.
    generation: watch::Sender<u64>,
    rr_counter: AtomicUsize,
    active: AtomicUsize,
    queued: AtomicUsize,
    total: AtomicU64,
    timeouts: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl ModelRouter {
    pub fn new(config: RouterConfig) -> Self {
        let limit = config.concurrency_limit.max(1);
        let (generation, _) = watch::channel(0u64);
        Self {
            client: RwLock::new(reqwest::Client::new()),
            config: RwLock::new(config),
            gate: Arc::new(Semaphore::new(limit)),
            generation,
            rr_counter: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    /// Applies a new route table. Reads during a turn see a stable copy.
    pub fn apply_config(&self, config: RouterConfig) {
        if let Ok(mut guard) = self.config.write() {
            *guard = config;
        }
    }

    pub fn has_route(&self, capability: Capability) -> bool {
        self.config
            .read()
            .map(|c| c.routes.get(&capability).map(|p| !p.is_empty()).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn diagnostics(&self) -> RouterDiagnostics {
        RouterDiagnostics {
            active_requests: self.active.load(Ordering::Relaxed),
            queued_requests: self.queued.load(Ordering::Relaxed),
            total_requests: self.total.load(Ordering::Relaxed),
            total_timeouts: self.timeouts.load(Ordering::Relaxed),
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
        }
    }

    /// Fails all in-flight requests fast and resets the HTTP pool. Queued
    /// waiters from the old generation are cancelled as they surface.
    pub fn skip_current(&self) {
        self.generation.send_modify(|g| *g += 1);
        if let Ok(mut client) = self.client.write() {
            *client = reqwest::Client::new();
        }
        tracing::warn!("AI step skipped; in-flight requests cancelled");
    }

    /// Same as skip, kept as a distinct name for the abort endpoint.
    pub fn abort_all(&self) {
        self.skip_current();
    }

    fn pick_provider(&self, capability: Capability) -> Result<(ProviderConfig, Duration)> {
        let config = self
            .config
            .read()
            .map_err(|_| RouterError::Malformed("router config poisoned".into()))?;
        let pool = config
            .routes
            .get(&capability)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RouterError::NoRoute(capability.as_str().to_string()))?;
        let idx = self.rr_counter.fetch_add(1, Ordering::Relaxed) % pool.len();
        let timeout = config
            .timeouts
            .get(&capability)
            .map(|s| Duration::from_secs(*s))
            .unwrap_or_else(|| capability.default_timeout());
        Ok((pool[idx].clone(), timeout))
    }

    async fn acquire(&self) -> Result<(tokio::sync::OwnedSemaphorePermit, u64)> {
        let entry_generation = *self.generation.borrow();
        self.queued.fetch_add(1, Ordering::Relaxed);
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RouterError::Cancelled)?;
        self.queued.fetch_sub(1, Ordering::Relaxed);
        // abort_all clears the wait queue: anything enqueued before the bump
        // is dropped instead of started.
        if *self.generation.borrow() != entry_generation {
            return Err(RouterError::Cancelled);
        }
        Ok((permit, entry_generation))
    }

    /// Non-streaming invocation. Returns the parsed JSON object from the
    /// model text. Zero retries; failures surface to the caller, whose
    /// stage falls back to rule-only behavior.
    pub async fn invoke(&self, capability: Capability, system: &str, prompt: &str) -> Result<Value> {
        let (provider, deadline) = self.pick_provider(capability)?;
        let (_permit, _) = self.acquire().await?;
        let client = self
            .client
            .read()
            .map_err(|_| RouterError::Malformed("router client poisoned".into()))?
            .clone();

        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let mut gen_rx = self.generation.subscribe();

        let request = provider
            .apply_headers(client.post(provider.endpoint(false)))
            .json(&provider.body(system, prompt, false))
            .timeout(deadline)
            .send();

        let result = tokio::select! {
            response = request => self.handle_response(capability, &provider, response).await,
            _ = gen_rx.changed() => Err(RouterError::Cancelled),
        };

        self.active.fetch_sub(1, Ordering::Relaxed);
        self.last_latency_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        result
    }

    async fn handle_response(
        &self,
        capability: Capability,
        provider: &ProviderConfig,
        response: std::result::Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Value> {
        let response = response.map_err(|e| {
            if e.is_timeout() {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                RouterError::Timeout {
                    capability: capability.as_str().to_string(),
                }
            } else {
                RouterError::Network(e)
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RouterError::Status {
                status: status.as_u16(),
                body: body.chars().take(400).collect(),
            });
        }
        let body: Value = response.json().await.map_err(RouterError::Network)?;
        let content = parse_content(provider.kind, &body)?;
        extract_json(&content)
    }

    /// Streaming invocation: a lazy sequence of content chunks followed by
    /// the final resolved JSON. Dropping the receiver abandons the request.
    pub async fn invoke_streaming(
        self: &Arc<Self>,
        capability: Capability,
        system: &str,
        prompt: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let (provider, deadline) = self.pick_provider(capability)?;
        let (permit, _entry_generation) = self.acquire().await?;
        let client = self
            .client
            .read()
            .map_err(|_| RouterError::Malformed("router client poisoned".into()))?
            .clone();
        let (tx, rx) = mpsc::channel(64);
        let router = Arc::clone(self);
        let system = system.to_string();
        let prompt = prompt.to_string();

        tokio::spawn(async move {
            let _permit = permit;
            router.active.fetch_add(1, Ordering::Relaxed);
            router.total.fetch_add(1, Ordering::Relaxed);
            let started = Instant::now();
            let outcome = router
                .run_stream(&client, capability, &provider, &system, &prompt, deadline, &tx)
                .await;
            if let Err(err) = outcome {
                if err.is_timeout() {
                    router.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                let _ = tx.send(StreamEvent::Failed(err)).await;
            }
            router.active.fetch_sub(1, Ordering::Relaxed);
            router
                .last_latency_ms
                .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);
        });
        Ok(rx)
    }

    async fn run_stream(
        &self,
        client: &reqwest::Client,
        capability: Capability,
        provider: &ProviderConfig,
        system: &str,
        prompt: &str,
        deadline: Duration,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let mut gen_rx = self.generation.subscribe();
        let send = provider
            .apply_headers(client.post(provider.endpoint(true)))
            .json(&provider.body(system, prompt, true))
            .timeout(deadline)
            .send();
        let response = tokio::select! {
            r = send => r.map_err(|e| {
                if e.is_timeout() {
                    RouterError::Timeout { capability: capability.as_str().to_string() }
                } else {
                    RouterError::Network(e)
                }
            })?,
            _ = gen_rx.changed() => return Err(RouterError::Cancelled),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RouterError::Status {
                status: status.as_u16(),
                body: body.chars().take(400).collect(),
            });
        }

        let mut full_text = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                c = stream.next() => c,
                _ = gen_rx.changed() => return Err(RouterError::Cancelled),
            };
            let Some(chunk) = chunk else { break };
            let bytes = chunk.map_err(RouterError::Network)?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                if let Some(delta) = parse_stream_delta(provider.kind, data.trim()) {
                    full_text.push_str(&delta);
                    // Receiver dropped means the consumer abandoned us.
                    if tx.send(StreamEvent::Chunk(delta)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        let value = extract_json(&full_text)?;
        let _ = tx.send(StreamEvent::Done(value)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_route_error() {
        let router = ModelRouter::new(RouterConfig::default());
        assert!(!router.has_route(Capability::SpeciationBatch));
        let err = router.pick_provider(Capability::Narrative).unwrap_err();
        assert!(matches!(err, RouterError::NoRoute(_)));
    }

    #[tokio::test]
    async fn test_queue_cancelled_by_abort() {
        let router = ModelRouter::new(RouterConfig {
            concurrency_limit: 1,
            ..RouterConfig::default()
        });
        let (_permit, generation) = router.acquire().await.unwrap();
        router.abort_all();
        // A waiter enqueued before the bump is dropped once it surfaces.
        assert_ne!(*router.generation.borrow(), generation);
    }

    #[test]
    fn test_diagnostics_start_clean() {
        let router = ModelRouter::new(RouterConfig::default());
        let d = router.diagnostics();
        assert_eq!(d.active_requests, 0);
        assert_eq!(d.total_requests, 0);
    }
}
